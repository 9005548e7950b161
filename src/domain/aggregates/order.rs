//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::DataPackage;
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{CustomerContact, Money, PackageRef, TrackingCode};

#[derive(Clone, Debug, Serialize)]
pub struct OrderRecord {
    id: Uuid,
    tracking_code: TrackingCode,
    customer_contact: CustomerContact,
    package_ref: PackageRef,
    package_name: String,
    quantity_gb: u32,
    price: Money,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<OrderEvent>,
}

/// Everything needed to create an order; the package is the catalog item as read at checkout.
#[derive(Clone, Debug)]
pub struct OrderDraft {
    pub tracking_code: TrackingCode,
    pub customer_contact: CustomerContact,
    pub package: DataPackage,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { #[default] Pending, Paid, Processing, Fulfilled, Cancelled, Failed }

/// Who is asking for a status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Actor { Verification, Admin }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition { Applied { from: OrderStatus, to: OrderStatus }, Unchanged }

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [Self::Pending, Self::Paid, Self::Processing, Self::Fulfilled, Self::Cancelled, Self::Failed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING", Self::Paid => "PAID", Self::Processing => "PROCESSING",
            Self::Fulfilled => "FULFILLED", Self::Cancelled => "CANCELLED", Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool { matches!(self, Self::Fulfilled | Self::Cancelled | Self::Failed) }

    /// The transition table. Same-status requests are handled by the caller.
    pub fn permits(self, to: OrderStatus, actor: Actor) -> bool {
        use OrderStatus::*;
        match (self, to, actor) {
            (Pending, Paid, _) => true,
            (Pending, Cancelled, _) => true,
            (Pending, Failed, Actor::Verification) => true,
            (Paid, Processing, Actor::Admin) => true,
            (Processing, Fulfilled, Actor::Admin) => true,
            (Paid | Processing, Cancelled, Actor::Admin) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str().eq_ignore_ascii_case(s.trim())).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

impl OrderRecord {
    pub fn create(draft: OrderDraft) -> Self {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let OrderDraft { tracking_code, customer_contact, package } = draft;
        let mut order = Self {
            id, tracking_code, customer_contact,
            package_ref: package.id().clone(), package_name: package.name().to_string(),
            quantity_gb: package.quantity_gb(), price: package.price().clone(),
            status: OrderStatus::Pending, created_at: now, updated_at: now, events: vec![],
        };
        let price_minor = order.price.to_minor_units().unwrap_or_default();
        order.raise_event(OrderEvent::Created { order_id: id, tracking_code: order.tracking_code.clone(), price_minor });
        order
    }

    /// Rebuilds a record read back from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, tracking_code: TrackingCode, customer_contact: CustomerContact, package_ref: PackageRef,
        package_name: String, quantity_gb: u32, price: Money, status: OrderStatus,
        created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, tracking_code, customer_contact, package_ref, package_name, quantity_gb, price, status, created_at, updated_at, events: vec![] }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn tracking_code(&self) -> &TrackingCode { &self.tracking_code }
    pub fn customer_contact(&self) -> &CustomerContact { &self.customer_contact }
    pub fn package_ref(&self) -> &PackageRef { &self.package_ref }
    pub fn package_name(&self) -> &str { &self.package_name }
    pub fn quantity_gb(&self) -> u32 { self.quantity_gb }
    pub fn price(&self) -> &Money { &self.price }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Moves the order to `to` if the table allows it for `actor`.
    pub fn transition(&mut self, to: OrderStatus, actor: Actor) -> Result<Transition, OrderError> {
        let from = self.status;
        if from == to { return Ok(Transition::Unchanged); }
        if !from.permits(to, actor) {
            return Err(OrderError::InvalidTransition { tracking_code: self.tracking_code.clone(), from, to });
        }
        self.overwrite_status(to);
        self.raise_event(OrderEvent::StatusChanged { order_id: self.id, tracking_code: self.tracking_code.clone(), from, to });
        Ok(Transition::Applied { from, to })
    }

    /// Storage-level write. Rule enforcement belongs to `transition`.
    pub fn overwrite_status(&mut self, to: OrderStatus) { self.status = to; self.touch(); }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    InvalidTransition { tracking_code: TrackingCode, from: OrderStatus, to: OrderStatus },
    UnknownStatus(String),
}
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTransition { tracking_code, from, to } => write!(f, "order {tracking_code} cannot move from {from} to {to}"),
            Self::UnknownStatus(s) => write!(f, "unknown order status {s:?}"),
        }
    }
}
