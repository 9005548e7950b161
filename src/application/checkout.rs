use crate::application::reconciliation::ReconciliationEngine;
use crate::domain::aggregates::{DataPackage, OrderDraft, OrderRecord};
use crate::domain::ports::{CatalogStoreRef, CheckoutHandle, CheckoutInit, EventPublisherRef, OrderStoreRef, PaymentGatewayRef};
use crate::domain::value_objects::{CustomerContact, PackageRef, TrackingCode};
use crate::{Result, StorefrontError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

const TRACKING_CODE_DRAWS: usize = 8;

/// One user action asking to buy a package. The price comes from the catalog, never from here.
#[derive(Clone, Debug)]
pub struct CheckoutRequest {
    pub package_id: PackageRef,
    pub customer_contact: CustomerContact,
    /// Identifies the user action (button press) so a double submit can be told apart from a new purchase.
    pub attempt_key: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckoutReceipt {
    pub order: OrderRecord,
    pub checkout: CheckoutHandle,
}

type Attempts = Mutex<HashMap<String, Option<TrackingCode>>>;

/// Held for the duration of one checkout; releases the attempt key on drop.
struct AttemptGuard<'a> {
    attempts: &'a Attempts,
    key: String,
}

impl AttemptGuard<'_> {
    fn record_tracking_code(&self, code: &TrackingCode) {
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        attempts.insert(self.key.clone(), Some(code.clone()));
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.key);
    }
}

pub struct CheckoutService {
    catalog: CatalogStoreRef,
    orders: OrderStoreRef,
    gateway: PaymentGatewayRef,
    engine: ReconciliationEngine,
    events: EventPublisherRef,
    currency: String,
    attempts: Attempts,
}

impl CheckoutService {
    pub fn new(
        catalog: CatalogStoreRef,
        orders: OrderStoreRef,
        gateway: PaymentGatewayRef,
        engine: ReconciliationEngine,
        events: EventPublisherRef,
        currency: impl Into<String>,
    ) -> Self {
        Self { catalog, orders, gateway, engine, events, currency: currency.into().to_uppercase(), attempts: Mutex::new(HashMap::new()) }
    }

    /// Creates the order and opens the gateway checkout for it.
    ///
    /// A second call with the same `attempt_key` while the first is running is
    /// rejected with `AlreadyInProgress`. Order creation is never retried here.
    #[tracing::instrument(skip(self, request), fields(package = %request.package_id))]
    pub async fn begin_checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        let guard = self.acquire(&request.attempt_key)?;

        let package = self.catalog.get_package(&request.package_id).await
            .map_err(|e| {
                error!(error = %e, "catalog lookup failed");
                StorefrontError::StoreUnavailable
            })?
            .filter(DataPackage::is_enabled)
            .ok_or_else(|| StorefrontError::PackageUnavailable(request.package_id.clone()))?;
        if !package.price().currency().eq_ignore_ascii_case(&self.currency) {
            warn!(currency = package.price().currency(), "package priced in a currency the store does not charge in");
            return Err(StorefrontError::PackageUnavailable(request.package_id));
        }
        let amount_minor = package.price().to_minor_units().map_err(|e| {
            warn!(error = %e, "package price cannot be charged");
            StorefrontError::PackageUnavailable(request.package_id.clone())
        })?;

        let tracking_code = self.allocate_tracking_code().await?;
        guard.record_tracking_code(&tracking_code);

        let mut draft = OrderRecord::create(OrderDraft {
            tracking_code: tracking_code.clone(),
            customer_contact: request.customer_contact.clone(),
            package,
        });
        let events = draft.take_events();
        let order = self.orders.create_order(draft).await.map_err(|e| {
            error!(error = %e, %tracking_code, "order creation failed");
            StorefrontError::StoreUnavailable
        })?;
        for event in &events {
            self.events.publish(event).await;
        }
        info!(%tracking_code, order_id = %order.id(), "order created");

        self.engine.open_session(&order).await?;

        let checkout = self.gateway
            .initiate_checkout(CheckoutInit {
                amount_minor,
                currency: self.currency.clone(),
                reference: tracking_code.clone(),
                payer_contact: request.customer_contact.as_str().to_string(),
            })
            .await
            .map_err(|e| {
                warn!(error = %e, %tracking_code, "gateway checkout could not be started; order left pending");
                StorefrontError::GatewayUnavailable { tracking_code: Some(tracking_code.clone()) }
            })?;

        drop(guard);
        Ok(CheckoutReceipt { order, checkout })
    }

    fn acquire(&self, key: &str) -> Result<AttemptGuard<'_>> {
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = attempts.get(key) {
            warn!(attempt_key = key, "duplicate checkout submission rejected");
            return Err(StorefrontError::AlreadyInProgress { tracking_code: existing.clone() });
        }
        attempts.insert(key.to_string(), None);
        Ok(AttemptGuard { attempts: &self.attempts, key: key.to_string() })
    }

    async fn allocate_tracking_code(&self) -> Result<TrackingCode> {
        for _ in 0..TRACKING_CODE_DRAWS {
            let code = TrackingCode::generate();
            let taken = self.orders.find_by_tracking_code(&code).await.map_err(|e| {
                error!(error = %e, "tracking code lookup failed");
                StorefrontError::StoreUnavailable
            })?;
            if taken.is_none() {
                return Ok(code);
            }
        }
        error!(draws = TRACKING_CODE_DRAWS, "no free tracking code found");
        Err(StorefrontError::StoreUnavailable)
    }
}
