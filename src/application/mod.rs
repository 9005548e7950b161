//! Application layer: checkout, payment verification, reconciliation and status lookup.
//!
//! Services here own the orchestration between the domain aggregates and the
//! ports. External failures are converted into [`crate::StorefrontError`] at
//! this boundary.

pub mod checkout;
pub mod reconciliation;
pub mod status;
pub mod verification;

pub use checkout::{CheckoutReceipt, CheckoutRequest, CheckoutService};
pub use reconciliation::{ReconciliationEngine, SignalOutcome};
pub use status::{StatusReport, StatusService};
pub use verification::VerificationClient;
