//! Data-bundle storefront
//!
//! Sells mobile-data bundles, takes payment through a hosted gateway and
//! reconciles the gateway's answer with the stored order.
//!
//! ## Features
//! - Package catalog (read-only)
//! - Checkout with a double-submission guard
//! - Payment verification and idempotent order status reconciliation
//! - Order status lookup by tracking code
//! - Administrative status changes

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

use domain::aggregates::{OrderError, OrderStatus};
use domain::ports::StoreError;
use domain::value_objects::{PackageRef, TrackingCode};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Every failure a caller of the services can see. Transport and database
/// detail stays in the logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorefrontError {
    #[error("Order store unavailable")]
    StoreUnavailable,

    #[error("Payment gateway unavailable")]
    GatewayUnavailable { tracking_code: Option<TrackingCode> },

    #[error("Checkout already in progress")]
    AlreadyInProgress { tracking_code: Option<TrackingCode> },

    #[error("Order {tracking_code} cannot move from {from} to {to}")]
    InvalidTransition { tracking_code: TrackingCode, from: OrderStatus, to: OrderStatus },

    #[error("Order not found")]
    NotFound,

    #[error("Package {0} is not available")]
    PackageUnavailable(PackageRef),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,
}

impl StorefrontError {
    /// Text safe to show a customer.
    pub fn user_message(&self) -> String {
        match self {
            Self::StoreUnavailable => "We could not reach our order system. Please try again.".to_string(),
            Self::GatewayUnavailable { tracking_code: Some(code) } => format!(
                "Payment could not be started. Your order {code} is saved; please contact support with this ID."
            ),
            Self::GatewayUnavailable { tracking_code: None } => "Payment service is unavailable. Please try again.".to_string(),
            Self::AlreadyInProgress { .. } => "This purchase is already being processed.".to_string(),
            Self::InvalidTransition { .. } => "This order can no longer be changed.".to_string(),
            Self::NotFound => "Order not found. Please verify the ID.".to_string(),
            Self::PackageUnavailable(_) => "That package is not available right now.".to_string(),
            Self::InvalidInput(msg) => msg.clone(),
            Self::Unauthorized => "Invalid admin token.".to_string(),
        }
    }
}

impl From<StoreError> for StorefrontError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            StoreError::Conflict(_) | StoreError::Unavailable(_) => Self::StoreUnavailable,
        }
    }
}

impl From<OrderError> for StorefrontError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::InvalidTransition { tracking_code, from, to } => Self::InvalidTransition { tracking_code, from, to },
            OrderError::UnknownStatus(s) => Self::InvalidInput(format!("Unknown status {s}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
