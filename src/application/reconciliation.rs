//! Reconciliation engine: turns redundant payment signals into at most one
//! order status write per payment session.
//!
//! Signals (widget callbacks, polls, webhooks, manual confirmations, page
//! reloads, the fallback timer) are only triggers. The verification client is
//! the single source of truth, and the session table decides whether a signal
//! verifies, waits behind an in-flight verification, retries a failed store
//! write, or is dropped.

use crate::application::verification::VerificationClient;
use crate::config::ReconcileConfig;
use crate::domain::aggregates::{
    Actor, OrderRecord, OrderStatus, PaymentSession, SessionOutcome, SignalDecision, SignalKind, Transition,
    VerificationStep,
};
use crate::domain::events::OrderEvent;
use crate::domain::ports::{EventPublisherRef, OrderStoreRef};
use crate::domain::value_objects::TrackingCode;
use crate::{Result, StorefrontError};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What a caller learns from delivering one signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "status", rename_all = "snake_case")]
pub enum SignalOutcome {
    /// This signal's verification decided the outcome and the order now has `status`.
    Settled(OrderStatus),
    /// The outcome was already decided (or the order left PENDING some other way).
    AlreadySettled(OrderStatus),
    /// A verification is in flight; this signal was folded into it.
    Coalesced,
    /// The gateway gave no answer; one re-check is scheduled.
    RetryScheduled,
    /// Retries are exhausted; the customer should use manual confirmation.
    PendingManualVerification,
}

struct EngineInner {
    sessions: Mutex<HashMap<TrackingCode, PaymentSession>>,
    // Serializes read-check-write on orders; the engine is their only mutator.
    write_lock: Mutex<()>,
    orders: OrderStoreRef,
    verifier: VerificationClient,
    events: EventPublisherRef,
    config: ReconcileConfig,
    retry_tx: mpsc::UnboundedSender<TrackingCode>,
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    inner: Arc<EngineInner>,
}

impl ReconciliationEngine {
    /// Must be called inside a Tokio runtime: it starts the retry scheduler task.
    pub fn new(orders: OrderStoreRef, verifier: VerificationClient, events: EventPublisherRef, config: ReconcileConfig) -> Self {
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let delay = config.retry_delay;
        let inner = Arc::new(EngineInner {
            sessions: Mutex::new(HashMap::new()),
            write_lock: Mutex::new(()),
            orders,
            verifier,
            events,
            config,
            retry_tx,
        });
        tokio::spawn(retry_scheduler(Arc::downgrade(&inner), retry_rx, delay));
        Self { inner }
    }

    /// Registers the payment session for a freshly created order.
    pub async fn open_session(&self, order: &OrderRecord) -> Result<()> {
        let amount = expected_amount(order)?;
        let mut sessions = self.inner.sessions.lock().await;
        sessions.entry(order.tracking_code().clone()).or_insert_with(|| PaymentSession::open(order, amount));
        debug!(tracking_code = %order.tracking_code(), "payment session opened");
        Ok(())
    }

    pub async fn has_session(&self, code: &TrackingCode) -> bool {
        self.inner.sessions.lock().await.contains_key(code)
    }

    #[tracing::instrument(skip(self, code), fields(tracking_code = %code))]
    pub async fn handle_signal(&self, code: &TrackingCode, signal: SignalKind) -> Result<SignalOutcome> {
        let limit = self.inner.config.retry_limit;
        let existing = {
            let mut sessions = self.inner.sessions.lock().await;
            sessions.get_mut(code).map(|s| s.on_signal(signal, limit))
        };
        let decision = match existing {
            Some(decision) => decision,
            None => match self.resume(code, signal).await? {
                Ok(decision) => decision,
                Err(status) => return Ok(SignalOutcome::AlreadySettled(status)),
            },
        };

        match decision {
            SignalDecision::Verify => self.verify(code).await,
            SignalDecision::Coalesce => {
                debug!(?signal, "verification or write in flight, signal coalesced");
                Ok(SignalOutcome::Coalesced)
            }
            SignalDecision::Reflect(outcome) => self.reflect(code, outcome).await,
            SignalDecision::Drop(outcome) => {
                debug!(?signal, ?outcome, "outcome already decided, signal dropped");
                Ok(SignalOutcome::AlreadySettled(outcome.target_status().unwrap_or_default()))
            }
            SignalDecision::AwaitManual => Ok(SignalOutcome::PendingManualVerification),
        }
    }

    /// No live session: rebuild one if the stored order is still pending,
    /// otherwise report the stored status.
    async fn resume(&self, code: &TrackingCode, signal: SignalKind) -> Result<std::result::Result<SignalDecision, OrderStatus>> {
        let order = self.inner.orders.find_by_tracking_code(code).await.map_err(|e| {
            error!(error = %e, "order lookup failed while resuming session");
            StorefrontError::from(e)
        })?.ok_or(StorefrontError::NotFound)?;
        if order.status() != OrderStatus::Pending {
            return Ok(Err(order.status()));
        }
        let amount = expected_amount(&order)?;
        let mut sessions = self.inner.sessions.lock().await;
        let session = sessions.entry(code.clone()).or_insert_with(|| {
            info!("resuming payment session for pending order");
            PaymentSession::open(&order, amount)
        });
        Ok(Ok(session.on_signal(signal, self.inner.config.retry_limit)))
    }

    async fn verify(&self, code: &TrackingCode) -> Result<SignalOutcome> {
        let limit = self.inner.config.retry_limit;
        loop {
            let (reference, amount, currency) = {
                let sessions = self.inner.sessions.lock().await;
                let session = sessions.get(code).ok_or(StorefrontError::NotFound)?;
                (session.reference().clone(), session.expected_amount(), session.currency().to_string())
            };

            let result = self.inner.verifier.verify(&reference, amount, &currency).await;

            let step = {
                let mut sessions = self.inner.sessions.lock().await;
                let session = sessions.get_mut(code).ok_or(StorefrontError::NotFound)?;
                session.on_verification(result, limit)
            };
            debug!(?result, ?step, "verification returned");

            match step {
                VerificationStep::VerifyAgain => continue,
                VerificationStep::Reflect(outcome) => return self.reflect(code, outcome).await,
                VerificationStep::Drop(outcome) => {
                    warn!(?result, kept = ?outcome, "conflicting verification result dropped");
                    return Ok(SignalOutcome::AlreadySettled(outcome.target_status().unwrap_or_default()));
                }
                VerificationStep::ScheduleRetry => {
                    if self.inner.retry_tx.send(code.clone()).is_err() {
                        warn!("retry scheduler stopped; re-check not scheduled");
                    }
                    return Ok(SignalOutcome::RetryScheduled);
                }
                VerificationStep::RetryPending => return Ok(SignalOutcome::RetryScheduled),
                VerificationStep::AwaitManual => {
                    info!("verification retries exhausted, awaiting manual confirmation");
                    self.inner.events.publish(&OrderEvent::VerificationPending { tracking_code: code.clone() }).await;
                    return Ok(SignalOutcome::PendingManualVerification);
                }
            };
        }
    }

    /// Writes a decided outcome to the order store, once.
    async fn reflect(&self, code: &TrackingCode, outcome: SessionOutcome) -> Result<SignalOutcome> {
        let Some(target) = outcome.target_status() else {
            return Ok(SignalOutcome::Coalesced);
        };
        let order_id = {
            let sessions = self.inner.sessions.lock().await;
            sessions.get(code).map(PaymentSession::order_id).ok_or(StorefrontError::NotFound)?
        };

        let written = self.write_verified(order_id, target).await;

        let mut sessions = self.inner.sessions.lock().await;
        match written {
            Ok(result) => {
                sessions.remove(code);
                Ok(result)
            }
            Err(e) => {
                if let Some(session) = sessions.get_mut(code) {
                    session.on_reflection(false);
                }
                error!(error = %e, status = %target, "could not record verified outcome; will retry on next signal");
                Err(e)
            }
        }
    }

    async fn write_verified(&self, order_id: Uuid, target: OrderStatus) -> Result<SignalOutcome> {
        let _guard = self.inner.write_lock.lock().await;
        let mut order = self.inner.orders.find_by_id(order_id).await?.ok_or(StorefrontError::NotFound)?;
        match order.transition(target, Actor::Verification) {
            Ok(Transition::Applied { .. }) => {
                let stored = self.inner.orders.update_status(order_id, target).await?;
                self.publish(&mut order).await;
                info!(status = %stored.status(), "order status reconciled");
                Ok(SignalOutcome::Settled(stored.status()))
            }
            Ok(Transition::Unchanged) => Ok(SignalOutcome::AlreadySettled(target)),
            Err(e) => {
                warn!(anomaly = %e, "verified outcome conflicts with stored status; not applied");
                Ok(SignalOutcome::AlreadySettled(order.status()))
            }
        }
    }

    /// Administrative status change. Goes through the same transition table.
    #[tracing::instrument(skip(self))]
    pub async fn admin_transition(&self, order_id: Uuid, target: OrderStatus) -> Result<OrderRecord> {
        let _guard = self.inner.write_lock.lock().await;
        let mut order = self.inner.orders.find_by_id(order_id).await?.ok_or(StorefrontError::NotFound)?;
        match order.transition(target, Actor::Admin) {
            Ok(Transition::Applied { from, to }) => {
                let stored = self.inner.orders.update_status(order_id, to).await?;
                self.publish(&mut order).await;
                info!(tracking_code = %stored.tracking_code(), %from, %to, "admin changed order status");
                Ok(stored)
            }
            Ok(Transition::Unchanged) => Ok(order),
            Err(e) => {
                warn!(anomaly = %e, "rejected admin transition");
                Err(e.into())
            }
        }
    }

    /// Drops idle sessions older than the TTL. Their orders stay PENDING; a
    /// later signal resumes from the store and verifies again.
    pub async fn expire_stale_sessions(&self) -> usize {
        let ttl = chrono::Duration::from_std(self.inner.config.session_ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        let now = Utc::now();
        let mut sessions = self.inner.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|code, s| {
            let expired = s.is_expired(ttl, now);
            if expired && s.is_unreflected_decision() {
                warn!(tracking_code = %code, outcome = ?s.outcome(), "decided outcome never reached the order store; session expired, order left pending");
            } else if expired {
                info!(tracking_code = %code, "payment session expired unconfirmed; order left pending");
            }
            !expired
        });
        before - sessions.len()
    }

    pub fn spawn_session_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let engine = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                let Some(inner) = engine.upgrade() else { break };
                let expired = ReconciliationEngine { inner }.expire_stale_sessions().await;
                if expired > 0 {
                    debug!(expired, "session sweep");
                }
            }
        })
    }

    async fn publish(&self, order: &mut OrderRecord) {
        for event in order.take_events() {
            self.inner.events.publish(&event).await;
        }
    }
}

fn expected_amount(order: &OrderRecord) -> Result<i64> {
    order.price().to_minor_units().map_err(|e| {
        error!(tracking_code = %order.tracking_code(), error = %e, "order price cannot be charged");
        StorefrontError::InvalidInput("order price cannot be charged".to_string())
    })
}

/// Runs each scheduled re-check after `delay` as a `FallbackTimer` signal.
async fn retry_scheduler(engine: Weak<EngineInner>, mut rx: mpsc::UnboundedReceiver<TrackingCode>, delay: Duration) {
    while let Some(code) = rx.recv().await {
        let engine = engine.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = engine.upgrade() else { return };
            let engine = ReconciliationEngine { inner };
            match engine.handle_signal(&code, SignalKind::FallbackTimer).await {
                Ok(outcome) => debug!(tracking_code = %code, ?outcome, "fallback re-check done"),
                Err(e) => warn!(tracking_code = %code, error = %e, "fallback re-check failed"),
            }
        });
    }
}
