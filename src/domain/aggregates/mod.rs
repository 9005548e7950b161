//! Aggregates module
pub mod order;
pub mod package;
pub mod payment_session;

pub use order::{Actor, OrderDraft, OrderError, OrderRecord, OrderStatus, Transition};
pub use package::{storefront_listing, DataPackage};
pub use payment_session::{
    DeclineReason, IndeterminateReason, PaymentSession, SessionOutcome, SignalDecision, SignalKind,
    VerificationOutcome, VerificationStep,
};
