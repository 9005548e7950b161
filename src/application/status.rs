use crate::domain::aggregates::{OrderRecord, OrderStatus};
use crate::domain::ports::OrderStoreRef;
use crate::domain::value_objects::TrackingCode;
use crate::{Result, StorefrontError};
use serde::Serialize;
use tracing::error;

/// Read-only view of an order for the public status checker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub tracking_code: TrackingCode,
    pub package_details: String,
    pub quantity_gb: u32,
    pub status: OrderStatus,
    pub message: &'static str,
}

impl From<&OrderRecord> for StatusReport {
    fn from(order: &OrderRecord) -> Self {
        Self {
            tracking_code: order.tracking_code().clone(),
            package_details: order.package_name().to_string(),
            quantity_gb: order.quantity_gb(),
            status: order.status(),
            message: status_message(order.status()),
        }
    }
}

pub fn status_message(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Waiting for payment confirmation. If you have paid, use the confirm button or contact support.",
        OrderStatus::Paid => "Payment received and confirmed. Awaiting administrator processing.",
        OrderStatus::Processing => "Order is actively being loaded onto your number.",
        OrderStatus::Fulfilled => "Data has been successfully loaded to your number!",
        OrderStatus::Cancelled => "Order could not be completed. Please contact support immediately.",
        OrderStatus::Failed => "Payment could not be verified. Please contact support immediately.",
    }
}

#[derive(Clone)]
pub struct StatusService {
    orders: OrderStoreRef,
}

impl StatusService {
    pub fn new(orders: OrderStoreRef) -> Self {
        Self { orders }
    }

    pub async fn lookup(&self, code: &TrackingCode) -> Result<StatusReport> {
        let order = self.orders.find_by_tracking_code(code).await.map_err(|e| {
            error!(error = %e, tracking_code = %code, "status lookup failed");
            StorefrontError::StoreUnavailable
        })?;
        order.as_ref().map(StatusReport::from).ok_or(StorefrontError::NotFound)
    }
}
