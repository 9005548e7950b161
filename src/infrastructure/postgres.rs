//! Postgres-backed stores (`sqlx`). Schema lives in `migrations/`.

use crate::domain::aggregates::{DataPackage, OrderRecord, OrderStatus};
use crate::domain::ports::{CatalogStore, OrderStore, StoreError};
use crate::domain::value_objects::{CustomerContact, Money, PackageRef, TrackingCode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    tracking_code: String,
    customer_contact: String,
    package_ref: String,
    package_name: String,
    quantity_gb: i32,
    price_minor: i64,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for OrderRecord {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| StoreError::Unavailable(format!("corrupt order row {}: {what}", r.id));
        Ok(OrderRecord::restore(
            r.id,
            TrackingCode::parse(&r.tracking_code).map_err(|_| corrupt("tracking_code"))?,
            CustomerContact::new(&r.customer_contact).map_err(|_| corrupt("customer_contact"))?,
            PackageRef::new(r.package_ref.clone()),
            r.package_name.clone(),
            u32::try_from(r.quantity_gb).map_err(|_| corrupt("quantity_gb"))?,
            Money::from_minor_units(r.price_minor, &r.currency),
            r.status.parse::<OrderStatus>().map_err(|_| corrupt("status"))?,
            r.created_at,
            r.updated_at,
        ))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PackageRow { id: String, name: String, quantity_gb: i32, price_minor: i64, currency: String, enabled: bool }

impl From<PackageRow> for DataPackage {
    fn from(r: PackageRow) -> Self {
        DataPackage::new(PackageRef::new(r.id), r.name, r.quantity_gb.max(0) as u32, Money::from_minor_units(r.price_minor, &r.currency), r.enabled)
    }
}

fn store_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(db.message().to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[derive(Clone)]
pub struct PgOrderStore { db: PgPool }

impl PgOrderStore {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_order(&self, order: OrderRecord) -> Result<OrderRecord, StoreError> {
        let price_minor = order.price().to_minor_units().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let row = sqlx::query_as::<_, OrderRow>("INSERT INTO orders (id, tracking_code, customer_contact, package_ref, package_name, quantity_gb, price_minor, currency, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *")
            .bind(order.id()).bind(order.tracking_code().as_str()).bind(order.customer_contact().as_str())
            .bind(order.package_ref().as_str()).bind(order.package_name()).bind(order.quantity_gb() as i32)
            .bind(price_minor).bind(order.price().currency()).bind(order.status().as_str())
            .bind(order.created_at()).bind(order.updated_at())
            .fetch_one(&self.db).await.map_err(store_err)?;
        row.try_into()
    }

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<OrderRecord, StoreError> {
        sqlx::query_as::<_, OrderRow>("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(order_id).bind(status.as_str())
            .fetch_optional(&self.db).await.map_err(store_err)?
            .ok_or(StoreError::NotFound)?
            .try_into()
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<OrderRecord>, StoreError> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(order_id)
            .fetch_optional(&self.db).await.map_err(store_err)?
            .map(OrderRecord::try_from).transpose()
    }

    async fn find_by_tracking_code(&self, code: &TrackingCode) -> Result<Option<OrderRecord>, StoreError> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE tracking_code = $1").bind(code.as_str())
            .fetch_optional(&self.db).await.map_err(store_err)?
            .map(OrderRecord::try_from).transpose()
    }

    async fn list_orders(&self, limit: u32, offset: u32) -> Result<Vec<OrderRecord>, StoreError> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2")
            .bind(limit as i64).bind(offset as i64)
            .fetch_all(&self.db).await.map_err(store_err)?
            .into_iter().map(OrderRecord::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgCatalogStore { db: PgPool }

impl PgCatalogStore {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn get_package(&self, id: &PackageRef) -> Result<Option<DataPackage>, StoreError> {
        let row = sqlx::query_as::<_, PackageRow>("SELECT * FROM packages WHERE id = $1").bind(id.as_str())
            .fetch_optional(&self.db).await.map_err(store_err)?;
        Ok(row.map(DataPackage::from))
    }

    async fn list_packages(&self) -> Result<Vec<DataPackage>, StoreError> {
        let rows = sqlx::query_as::<_, PackageRow>("SELECT * FROM packages ORDER BY quantity_gb")
            .fetch_all(&self.db).await.map_err(store_err)?;
        Ok(rows.into_iter().map(DataPackage::from).collect())
    }
}
