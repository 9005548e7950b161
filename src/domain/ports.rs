//! Ports to the external collaborators: order store, catalog store, payment gateway, event bus.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::{DataPackage, OrderRecord, OrderStatus};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{PackageRef, TrackingCode};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record conflicts with an existing one: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted orders. Writes are atomic per record; there are no cross-record transactions.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Appends a new order. Called once per checkout attempt and never retried.
    async fn create_order(&self, order: OrderRecord) -> Result<OrderRecord, StoreError>;
    /// Not idempotent from the caller's point of view: every call is a write.
    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<OrderRecord, StoreError>;
    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<OrderRecord>, StoreError>;
    async fn find_by_tracking_code(&self, code: &TrackingCode) -> Result<Option<OrderRecord>, StoreError>;
    /// Newest first.
    async fn list_orders(&self, limit: u32, offset: u32) -> Result<Vec<OrderRecord>, StoreError>;
}

/// Read-only package lookup.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_package(&self, id: &PackageRef) -> Result<Option<DataPackage>, StoreError>;
    async fn list_packages(&self) -> Result<Vec<DataPackage>, StoreError>;
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Transport(String),
    #[error("gateway has no transaction for reference {0}")]
    UnknownReference(String),
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutInit {
    pub amount_minor: i64,
    pub currency: String,
    pub reference: TrackingCode,
    pub payer_contact: String,
}

/// What the storefront needs to open the hosted payment widget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutHandle {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayStatus { Success, Failed, Reversed, Pending, Abandoned, Other(String) }

impl GatewayStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "failed" => Self::Failed,
            "reversed" => Self::Reversed,
            "pending" | "ongoing" | "processing" | "queued" => Self::Pending,
            "abandoned" => Self::Abandoned,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayTransaction {
    pub status: GatewayStatus,
    pub amount_minor: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate_checkout(&self, request: CheckoutInit) -> Result<CheckoutHandle, GatewayError>;
    async fn verify_transaction(&self, reference: &TrackingCode) -> Result<GatewayTransaction, GatewayError>;
}

/// Best-effort outbound notifications. Implementations log failures themselves.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OrderEvent);
}

pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type CatalogStoreRef = Arc<dyn CatalogStore>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type EventPublisherRef = Arc<dyn EventPublisher>;
