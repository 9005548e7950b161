//! HTTP surface (axum).

use crate::application::{CheckoutReceipt, CheckoutRequest, CheckoutService, ReconciliationEngine, SignalOutcome, StatusReport, StatusService};
use crate::domain::aggregates::{storefront_listing, DataPackage, OrderRecord, OrderStatus, SignalKind};
use crate::domain::ports::{CatalogStoreRef, OrderStoreRef};
use crate::domain::value_objects::{CustomerContact, PackageRef, TrackingCode};
use crate::StorefrontError;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<CheckoutService>,
    pub engine: ReconciliationEngine,
    pub status: StatusService,
    pub catalog: CatalogStoreRef,
    pub orders: OrderStoreRef,
    pub admin_token: Arc<str>,
    pub support_link: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "databundle-store"})) }))
        .route("/api/v1/packages", get(list_packages))
        .route("/api/v1/settings", get(get_settings))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/payments/signal", post(payment_signal))
        .route("/api/v1/payments/webhook", post(payment_webhook))
        .route("/api/v1/orders/status/:code", get(order_status))
        .route("/api/v1/admin/orders", get(admin_list_orders))
        .route("/api/v1/admin/orders/:id/status", put(admin_update_status))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_code: Option<TrackingCode>,
}

pub struct ApiError(pub StorefrontError);

impl From<StorefrontError> for ApiError {
    fn from(e: StorefrontError) -> Self { Self(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            StorefrontError::StoreUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            StorefrontError::GatewayUnavailable { .. } => (StatusCode::BAD_GATEWAY, "gateway_unavailable"),
            StorefrontError::AlreadyInProgress { .. } => (StatusCode::CONFLICT, "already_in_progress"),
            StorefrontError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            StorefrontError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            StorefrontError::PackageUnavailable(_) => (StatusCode::UNPROCESSABLE_ENTITY, "package_unavailable"),
            StorefrontError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            StorefrontError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
        };
        let tracking_code = match &self.0 {
            StorefrontError::GatewayUnavailable { tracking_code } | StorefrontError::AlreadyInProgress { tracking_code } => tracking_code.clone(),
            _ => None,
        };
        (status, Json(ErrorBody { error: kind, message: self.0.user_message(), tracking_code })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_code(raw: &str) -> ApiResult<TrackingCode> {
    TrackingCode::parse(raw).map_err(|_| ApiError(StorefrontError::InvalidInput("Please enter a valid 6-digit tracking ID.".to_string())))
}

// =============================================================================
// Storefront
// =============================================================================

async fn list_packages(State(s): State<AppState>) -> ApiResult<Json<Vec<DataPackage>>> {
    let packages = s.catalog.list_packages().await.map_err(|e| {
        error!(error = %e, "catalog listing failed");
        StorefrontError::StoreUnavailable
    })?;
    Ok(Json(storefront_listing(packages)))
}

#[derive(Debug, Serialize)] pub struct Settings { pub support_link: String }

async fn get_settings(State(s): State<AppState>) -> Json<Settings> {
    Json(Settings { support_link: s.support_link.to_string() })
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutBody {
    #[validate(length(min = 1, max = 64))]
    pub package_id: String,
    #[validate(length(min = 10, max = 16))]
    pub customer_contact: String,
    #[validate(length(min = 8, max = 128))]
    pub attempt_key: String,
}

async fn checkout(State(s): State<AppState>, Json(body): Json<CheckoutBody>) -> ApiResult<(StatusCode, Json<CheckoutReceipt>)> {
    body.validate().map_err(|e| StorefrontError::InvalidInput(e.to_string()))?;
    let customer_contact = CustomerContact::new(&body.customer_contact)
        .map_err(|_| StorefrontError::InvalidInput("Please enter a valid Mobile Money number (10 digits).".to_string()))?;
    let receipt = s.checkout.begin_checkout(CheckoutRequest {
        package_id: PackageRef::new(body.package_id),
        customer_contact,
        attempt_key: body.attempt_key,
    }).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[derive(Debug, Deserialize)] pub struct SignalBody { pub tracking_code: String, pub signal: SignalKind }
#[derive(Debug, Serialize)] pub struct SignalResponse { pub tracking_code: TrackingCode, pub outcome: SignalOutcome }

async fn payment_signal(State(s): State<AppState>, Json(body): Json<SignalBody>) -> ApiResult<Json<SignalResponse>> {
    let code = parse_code(&body.tracking_code)?;
    let outcome = s.engine.handle_signal(&code, body.signal).await?;
    Ok(Json(SignalResponse { tracking_code: code, outcome }))
}

#[derive(Debug, Deserialize)] pub struct WebhookBody { pub event: String, pub data: WebhookData }
#[derive(Debug, Deserialize)] pub struct WebhookData { pub reference: String }

/// The webhook only triggers verification; its claimed status is ignored.
async fn payment_webhook(State(s): State<AppState>, Json(body): Json<WebhookBody>) -> ApiResult<StatusCode> {
    let Ok(code) = TrackingCode::parse(&body.data.reference) else {
        debug!(reference = %body.data.reference, "webhook for a reference we did not issue");
        return Ok(StatusCode::OK);
    };
    debug!(event = %body.event, tracking_code = %code, "gateway webhook");
    match s.engine.handle_signal(&code, SignalKind::Webhook).await {
        Ok(_) | Err(StorefrontError::NotFound) => Ok(StatusCode::OK),
        Err(e) => Err(e.into()),
    }
}

async fn order_status(State(s): State<AppState>, Path(code): Path<String>) -> ApiResult<Json<StatusReport>> {
    let code = parse_code(&code)?;
    Ok(Json(s.status.lookup(&code).await?))
}

// =============================================================================
// Admin
// =============================================================================

fn authorize(headers: &HeaderMap, s: &AppState) -> ApiResult<()> {
    let presented = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()).and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if bool::from(token.trim().as_bytes().ct_eq(s.admin_token.as_bytes())) => Ok(()),
        _ => Err(ApiError(StorefrontError::Unauthorized)),
    }
}

#[derive(Debug, Deserialize)] pub struct ListParams { pub page: Option<u32>, pub per_page: Option<u32> }
#[derive(Debug, Serialize)] pub struct PaginatedResponse<T> { pub data: Vec<T>, pub page: u32 }

async fn admin_list_orders(State(s): State<AppState>, headers: HeaderMap, Query(p): Query<ListParams>) -> ApiResult<Json<PaginatedResponse<OrderRecord>>> {
    authorize(&headers, &s)?;
    let page = p.page.unwrap_or(1).max(1); let per_page = p.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1).checked_mul(per_page)
        .ok_or_else(|| StorefrontError::InvalidInput(format!("page {page} is out of range")))?;
    let orders = s.orders.list_orders(per_page, offset).await.map_err(|e| {
        error!(error = %e, "order listing failed");
        StorefrontError::StoreUnavailable
    })?;
    Ok(Json(PaginatedResponse { data: orders, page }))
}

#[derive(Debug, Deserialize)] pub struct StatusChangeBody { pub status: OrderStatus }

async fn admin_update_status(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>, Json(body): Json<StatusChangeBody>) -> ApiResult<Json<OrderRecord>> {
    authorize(&headers, &s)?;
    Ok(Json(s.engine.admin_transition(id, body.status).await?))
}
