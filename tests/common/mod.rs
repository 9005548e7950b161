//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use databundle_store::api::AppState;
use databundle_store::application::{CheckoutService, ReconciliationEngine, StatusService, VerificationClient};
use databundle_store::config::ReconcileConfig;
use databundle_store::domain::aggregates::{DataPackage, OrderDraft, OrderRecord, OrderStatus};
use databundle_store::domain::ports::{
    CheckoutHandle, CheckoutInit, GatewayError, GatewayStatus, GatewayTransaction, OrderStore, PaymentGateway, StoreError,
};
use databundle_store::domain::value_objects::{CustomerContact, Money, PackageRef, TrackingCode};
use databundle_store::infrastructure::events::LogEventPublisher;
use databundle_store::infrastructure::in_memory::{InMemoryCatalogStore, InMemoryOrderStore};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Wraps the in-memory store, counting status writes and optionally failing some.
#[derive(Default)]
pub struct CountingOrderStore {
    inner: InMemoryOrderStore,
    updates: AtomicUsize,
    failing_updates: AtomicUsize,
}

impl CountingOrderStore {
    pub fn update_calls(&self) -> usize { self.updates.load(Ordering::SeqCst) }
    pub fn fail_next_updates(&self, n: usize) { self.failing_updates.store(n, Ordering::SeqCst); }
}

#[async_trait]
impl OrderStore for CountingOrderStore {
    async fn create_order(&self, order: OrderRecord) -> Result<OrderRecord, StoreError> {
        self.inner.create_order(order).await
    }

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<OrderRecord, StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_updates.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_updates.store(failing - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        self.inner.update_status(order_id, status).await
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<OrderRecord>, StoreError> {
        self.inner.find_by_id(order_id).await
    }

    async fn find_by_tracking_code(&self, code: &TrackingCode) -> Result<Option<OrderRecord>, StoreError> {
        self.inner.find_by_tracking_code(code).await
    }

    async fn list_orders(&self, limit: u32, offset: u32) -> Result<Vec<OrderRecord>, StoreError> {
        self.inner.list_orders(limit, offset).await
    }
}

/// One scripted answer from the gateway's verify endpoint.
#[derive(Clone, Debug)]
pub enum Reply {
    Status(&'static str, i64, &'static str),
    Transport,
    UnknownReference,
}

impl Reply {
    pub fn paid(amount_minor: i64) -> Self { Self::Status("success", amount_minor, "GHS") }

    fn into_result(self) -> Result<GatewayTransaction, GatewayError> {
        match self {
            Self::Status(status, amount_minor, currency) => Ok(GatewayTransaction {
                status: GatewayStatus::parse(status),
                amount_minor,
                currency: currency.to_string(),
            }),
            Self::Transport => Err(GatewayError::Transport("connection reset".into())),
            Self::UnknownReference => Err(GatewayError::UnknownReference("unknown".into())),
        }
    }
}

/// Gateway whose verify answers are scripted; once the script runs out it repeats `fallback`.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    delay: Duration,
    verify_calls: AtomicUsize,
    initiated: Mutex<Vec<CheckoutInit>>,
    refuse_checkout: AtomicBool,
}

impl ScriptedGateway {
    pub fn new(fallback: Reply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            verify_calls: AtomicUsize::new(0),
            initiated: Mutex::new(Vec::new()),
            refuse_checkout: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self { self.delay = delay; self }

    pub fn then(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.script.lock().unwrap().extend(replies);
        self
    }

    pub fn refuse_checkout(&self) { self.refuse_checkout.store(true, Ordering::SeqCst); }
    pub fn verify_calls(&self) -> usize { self.verify_calls.load(Ordering::SeqCst) }
    pub fn initiated(&self) -> Vec<CheckoutInit> { self.initiated.lock().unwrap().clone() }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate_checkout(&self, request: CheckoutInit) -> Result<CheckoutHandle, GatewayError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.refuse_checkout.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("gateway down".into()));
        }
        let reference = request.reference.to_string();
        self.initiated.lock().unwrap().push(request);
        Ok(CheckoutHandle {
            authorization_url: format!("https://checkout.test/{reference}"),
            access_code: Some(format!("ac_{reference}")),
            reference,
        })
    }

    async fn verify_transaction(&self, _reference: &TrackingCode) -> Result<GatewayTransaction, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone()).into_result()
    }
}

pub struct Harness {
    pub store: Arc<CountingOrderStore>,
    pub catalog: Arc<InMemoryCatalogStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub engine: ReconciliationEngine,
    pub checkout: Arc<CheckoutService>,
}

/// Re-checks far in the future unless a test asks otherwise.
pub fn quiet_config() -> ReconcileConfig {
    ReconcileConfig { retry_delay: Duration::from_secs(3_600), ..ReconcileConfig::default() }
}

impl Harness {
    pub fn new(gateway: ScriptedGateway) -> Self {
        Self::with_config(gateway, quiet_config())
    }

    pub fn with_config(gateway: ScriptedGateway, config: ReconcileConfig) -> Self {
        let store = Arc::new(CountingOrderStore::default());
        let catalog = Arc::new(InMemoryCatalogStore::with_default_packages("GHS"));
        let gateway = Arc::new(gateway);
        let engine = ReconciliationEngine::new(store.clone(), VerificationClient::new(gateway.clone()), Arc::new(LogEventPublisher), config);
        let checkout = Arc::new(CheckoutService::new(
            catalog.clone(), store.clone(), gateway.clone(), engine.clone(), Arc::new(LogEventPublisher), "GHS",
        ));
        Self { store, catalog, gateway, engine, checkout }
    }

    /// Stores a PENDING 5GB order (22.00 GHS) directly and opens its session.
    pub async fn pending_order(&self, code: &str) -> OrderRecord {
        let package = DataPackage::new(PackageRef::new("p5"), "5GB MTN", 5, Money::from_minor_units(2200, "GHS"), true);
        let order = self.store.create_order(OrderRecord::create(OrderDraft {
            tracking_code: TrackingCode::parse(code).unwrap(),
            customer_contact: CustomerContact::new("0241111222").unwrap(),
            package,
        })).await.unwrap();
        self.engine.open_session(&order).await.unwrap();
        order
    }

    pub async fn stored_status(&self, order: &OrderRecord) -> OrderStatus {
        self.store.find_by_id(order.id()).await.unwrap().unwrap().status()
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            checkout: self.checkout.clone(),
            engine: self.engine.clone(),
            status: StatusService::new(self.store.clone()),
            catalog: self.catalog.clone(),
            orders: self.store.clone(),
            admin_token: ADMIN_TOKEN.into(),
            support_link: "https://wa.me/233000000000".into(),
        }
    }
}
