use crate::domain::aggregates::{DataPackage, OrderRecord, OrderStatus};
use crate::domain::ports::{CatalogStore, OrderStore, StoreError};
use crate::domain::value_objects::{Money, PackageRef, TrackingCode};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct OrderTable {
    orders: HashMap<Uuid, OrderRecord>,
    by_code: HashMap<TrackingCode, Uuid>,
}

/// A thread-safe in-memory order store.
///
/// Used by the tests and when no `DATABASE_URL` is configured.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    table: Arc<RwLock<OrderTable>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, mut order: OrderRecord) -> Result<OrderRecord, StoreError> {
        let mut table = self.table.write().await;
        if table.by_code.contains_key(order.tracking_code()) {
            return Err(StoreError::Conflict(format!("tracking code {} already used", order.tracking_code())));
        }
        order.take_events();
        table.by_code.insert(order.tracking_code().clone(), order.id());
        table.orders.insert(order.id(), order.clone());
        Ok(order)
    }

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<OrderRecord, StoreError> {
        let mut table = self.table.write().await;
        let order = table.orders.get_mut(&order_id).ok_or(StoreError::NotFound)?;
        order.overwrite_status(status);
        Ok(order.clone())
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<OrderRecord>, StoreError> {
        let table = self.table.read().await;
        Ok(table.orders.get(&order_id).cloned())
    }

    async fn find_by_tracking_code(&self, code: &TrackingCode) -> Result<Option<OrderRecord>, StoreError> {
        let table = self.table.read().await;
        Ok(table.by_code.get(code).and_then(|id| table.orders.get(id)).cloned())
    }

    async fn list_orders(&self, limit: u32, offset: u32) -> Result<Vec<OrderRecord>, StoreError> {
        let table = self.table.read().await;
        let mut orders: Vec<_> = table.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(&a.id())));
        Ok(orders.into_iter().skip(offset as usize).take(limit as usize).collect())
    }
}

/// A thread-safe in-memory package catalog.
#[derive(Default, Clone)]
pub struct InMemoryCatalogStore {
    packages: Arc<RwLock<HashMap<PackageRef, DataPackage>>>,
}

impl InMemoryCatalogStore {
    pub fn new(packages: impl IntoIterator<Item = DataPackage>) -> Self {
        let packages = packages.into_iter().map(|p| (p.id().clone(), p)).collect();
        Self { packages: Arc::new(RwLock::new(packages)) }
    }

    /// The MTN bundle list the storefront launched with.
    pub fn with_default_packages(currency: &str) -> Self {
        let rows: [(&str, &str, u32, i64, bool); 6] = [
            ("p1", "1GB MTN", 1, 480, true),
            ("p2", "2GB MTN", 2, 940, true),
            ("p3", "3GB MTN", 3, 1450, true),
            ("p4", "4GB MTN", 4, 1840, false),
            ("p5", "5GB MTN", 5, 2200, true),
            ("p10", "10GB MTN", 10, 4400, true),
        ];
        Self::new(rows.into_iter().map(|(id, name, gb, minor, enabled)| {
            DataPackage::new(PackageRef::new(id), name, gb, Money::new(Decimal::new(minor, 2), currency), enabled)
        }))
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn get_package(&self, id: &PackageRef) -> Result<Option<DataPackage>, StoreError> {
        let packages = self.packages.read().await;
        Ok(packages.get(id).cloned())
    }

    async fn list_packages(&self) -> Result<Vec<DataPackage>, StoreError> {
        let packages = self.packages.read().await;
        Ok(packages.values().cloned().collect())
    }
}
