//! Domain events
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::TrackingCode;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, tracking_code: TrackingCode, price_minor: i64 },
    StatusChanged { order_id: Uuid, tracking_code: TrackingCode, from: OrderStatus, to: OrderStatus },
    VerificationPending { tracking_code: TrackingCode },
}

impl OrderEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> String {
        match self {
            Self::Created { .. } => "orders.created".to_string(),
            Self::StatusChanged { to, .. } => format!("orders.status.{}", to.as_str().to_lowercase()),
            Self::VerificationPending { .. } => "orders.verification_pending".to_string(),
        }
    }
}
