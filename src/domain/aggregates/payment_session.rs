//! Payment session: the per-checkout coordinator between an order and the gateway.
//!
//! A session is never persisted. It holds the flags that make redundant
//! gateway signals safe: one verification in flight at a time, one queued
//! re-check, a write-once outcome, and a bounded retry budget for
//! indeterminate verifications. The engine asks the session what to do next
//! and performs the I/O; the session itself never awaits.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::{OrderRecord, OrderStatus};
use crate::domain::value_objects::TrackingCode;

/// Anything that suggests the payment may have finished. None of these decide the outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind { WidgetSuccess, WidgetClosed, Poll, ManualConfirmation, PageReturn, Webhook, FallbackTimer }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason { GatewayDeclined, AmountMismatch, CurrencyMismatch }

impl DeclineReason {
    pub fn target_status(self) -> OrderStatus {
        match self {
            Self::GatewayDeclined => OrderStatus::Cancelled,
            Self::AmountMismatch | Self::CurrencyMismatch => OrderStatus::Failed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndeterminateReason { Transport, NotSettled }

/// Normalized answer from the verification client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationOutcome { Confirmed, Declined(DeclineReason), Indeterminate(IndeterminateReason) }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionOutcome { #[default] Unknown, Confirmed, Declined(DeclineReason) }

impl SessionOutcome {
    pub fn target_status(self) -> Option<OrderStatus> {
        match self {
            Self::Unknown => None,
            Self::Confirmed => Some(OrderStatus::Paid),
            Self::Declined(reason) => Some(reason.target_status()),
        }
    }
}

/// What the engine should do with an incoming signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalDecision {
    Verify,
    Coalesce,
    /// Outcome is known but the store write failed earlier; retry the write only.
    Reflect(SessionOutcome),
    Drop(SessionOutcome),
    AwaitManual,
}

/// What the engine should do once a verification call returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationStep {
    Reflect(SessionOutcome),
    Drop(SessionOutcome),
    VerifyAgain,
    ScheduleRetry,
    RetryPending,
    AwaitManual,
}

#[derive(Clone, Debug)]
pub struct PaymentSession {
    order_id: Uuid,
    reference: TrackingCode,
    expected_amount: i64,
    currency: String,
    verification_in_flight: bool,
    recheck_pending: bool,
    outcome: SessionOutcome,
    indeterminate_count: u32,
    retry_scheduled: bool,
    update_in_flight: bool,
    reflected: bool,
    opened_at: DateTime<Utc>,
}

impl PaymentSession {
    pub fn open(order: &OrderRecord, expected_amount: i64) -> Self {
        Self {
            order_id: order.id(), reference: order.tracking_code().clone(), expected_amount,
            currency: order.price().currency().to_string(),
            verification_in_flight: false, recheck_pending: false, outcome: SessionOutcome::Unknown,
            indeterminate_count: 0, retry_scheduled: false, update_in_flight: false, reflected: false,
            opened_at: Utc::now(),
        }
    }

    pub fn order_id(&self) -> Uuid { self.order_id }
    pub fn reference(&self) -> &TrackingCode { &self.reference }
    pub fn expected_amount(&self) -> i64 { self.expected_amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn outcome(&self) -> SessionOutcome { self.outcome }
    pub fn verification_in_flight(&self) -> bool { self.verification_in_flight }
    pub fn recheck_pending(&self) -> bool { self.recheck_pending }
    pub fn indeterminate_count(&self) -> u32 { self.indeterminate_count }
    pub fn is_reflected(&self) -> bool { self.reflected }

    /// Idle sessions past the TTL expire, including a decided outcome whose write failed.
    /// Nothing expires while a verification or a write is running.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        !self.verification_in_flight && !self.update_in_flight && !self.reflected && now - self.opened_at > ttl
    }

    /// Decided at the gateway but not yet recorded in the order store.
    pub fn is_unreflected_decision(&self) -> bool {
        self.outcome != SessionOutcome::Unknown && !self.reflected
    }

    fn exhausted(&self, retry_limit: u32) -> bool { self.indeterminate_count > retry_limit }

    pub fn on_signal(&mut self, signal: SignalKind, retry_limit: u32) -> SignalDecision {
        if self.outcome != SessionOutcome::Unknown {
            if self.reflected {
                return SignalDecision::Drop(self.outcome);
            }
            // The store does not have the outcome yet; never report it as settled.
            if self.update_in_flight {
                return SignalDecision::Coalesce;
            }
            self.update_in_flight = true;
            return SignalDecision::Reflect(self.outcome);
        }
        if self.verification_in_flight {
            self.recheck_pending = true;
            return SignalDecision::Coalesce;
        }
        if signal == SignalKind::FallbackTimer { self.retry_scheduled = false; }
        if self.exhausted(retry_limit) && signal != SignalKind::ManualConfirmation {
            return SignalDecision::AwaitManual;
        }
        self.verification_in_flight = true;
        SignalDecision::Verify
    }

    pub fn on_verification(&mut self, result: VerificationOutcome, retry_limit: u32) -> VerificationStep {
        self.verification_in_flight = false;
        let decided = match result {
            VerificationOutcome::Confirmed => SessionOutcome::Confirmed,
            VerificationOutcome::Declined(reason) => SessionOutcome::Declined(reason),
            VerificationOutcome::Indeterminate(_) => {
                self.indeterminate_count += 1;
                if self.exhausted(retry_limit) {
                    self.recheck_pending = false;
                    return VerificationStep::AwaitManual;
                }
                if self.recheck_pending {
                    self.recheck_pending = false;
                    self.verification_in_flight = true;
                    return VerificationStep::VerifyAgain;
                }
                if self.retry_scheduled { return VerificationStep::RetryPending; }
                self.retry_scheduled = true;
                return VerificationStep::ScheduleRetry;
            }
        };
        self.recheck_pending = false;
        if !self.record_outcome(decided) { return VerificationStep::Drop(self.outcome); }
        self.update_in_flight = true;
        VerificationStep::Reflect(decided)
    }

    /// First writer wins. Returns `false` when an outcome was already recorded.
    pub fn record_outcome(&mut self, outcome: SessionOutcome) -> bool {
        if self.outcome != SessionOutcome::Unknown || outcome == SessionOutcome::Unknown { return false; }
        self.outcome = outcome;
        true
    }

    pub fn on_reflection(&mut self, stored: bool) {
        self.update_in_flight = false;
        self.reflected = stored;
    }
}
