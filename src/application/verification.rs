use crate::domain::aggregates::{DeclineReason, IndeterminateReason, VerificationOutcome};
use crate::domain::ports::{GatewayError, GatewayStatus, PaymentGatewayRef};
use crate::domain::value_objects::TrackingCode;
use tracing::{error, warn};

/// Turns a gateway reference into a definitive payment outcome.
///
/// One gateway round trip per call, no internal retries. The amount and
/// currency the gateway reports must match what the order recorded; a
/// mismatch is a decline whatever the gateway's own status says.
#[derive(Clone)]
pub struct VerificationClient {
    gateway: PaymentGatewayRef,
}

impl VerificationClient {
    pub fn new(gateway: PaymentGatewayRef) -> Self {
        Self { gateway }
    }

    #[tracing::instrument(skip(self, reference), fields(reference = %reference))]
    pub async fn verify(&self, reference: &TrackingCode, expected_amount: i64, currency: &str) -> VerificationOutcome {
        let tx = match self.gateway.verify_transaction(reference).await {
            Ok(tx) => tx,
            Err(GatewayError::Transport(e)) => {
                warn!(error = %e, "gateway unreachable during verification");
                return VerificationOutcome::Indeterminate(IndeterminateReason::Transport);
            }
            Err(GatewayError::UnknownReference(_)) => {
                return VerificationOutcome::Indeterminate(IndeterminateReason::NotSettled);
            }
            Err(GatewayError::Rejected(e)) => {
                error!(error = %e, "gateway refused the verification request");
                return VerificationOutcome::Indeterminate(IndeterminateReason::Transport);
            }
        };

        match tx.status {
            GatewayStatus::Success if tx.amount_minor != expected_amount => {
                warn!(expected_amount, reported = tx.amount_minor, "amount mismatch on verified payment");
                VerificationOutcome::Declined(DeclineReason::AmountMismatch)
            }
            GatewayStatus::Success if !tx.currency.eq_ignore_ascii_case(currency) => {
                warn!(expected = currency, reported = %tx.currency, "currency mismatch on verified payment");
                VerificationOutcome::Declined(DeclineReason::CurrencyMismatch)
            }
            GatewayStatus::Success => VerificationOutcome::Confirmed,
            GatewayStatus::Failed | GatewayStatus::Reversed => VerificationOutcome::Declined(DeclineReason::GatewayDeclined),
            GatewayStatus::Pending | GatewayStatus::Abandoned | GatewayStatus::Other(_) => {
                VerificationOutcome::Indeterminate(IndeterminateReason::NotSettled)
            }
        }
    }
}
