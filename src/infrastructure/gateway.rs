//! HTTP client for a Paystack-style hosted payment gateway.

use crate::config::GatewayConfig;
use crate::domain::ports::{CheckoutHandle, CheckoutInit, GatewayError, GatewayStatus, GatewayTransaction, PaymentGateway};
use crate::domain::value_objects::TrackingCode;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    amount: i64,
    currency: &'a str,
    reference: &'a str,
    email: String,
    metadata: InitializeMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct InitializeMetadata<'a> { phone: &'a str }

/// Envelope every gateway response is wrapped in.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData { authorization_url: String, access_code: Option<String>, reference: String }

#[derive(Debug, Deserialize)]
struct VerifyData { status: String, amount: i64, currency: String }

#[derive(Clone)]
pub struct HttpPaymentGateway {
    http: Client,
    base_url: String,
    secret_key: String,
}

impl HttpPaymentGateway {
    pub fn new(cfg: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { http, base_url: cfg.base_url.trim_end_matches('/').to_string(), secret_key: cfg.secret_key.clone() })
    }

    async fn read<T: DeserializeOwned>(&self, response: reqwest::Response, reference: &str) -> Result<T, GatewayError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND { return Err(GatewayError::UnknownReference(reference.to_string())); }
        if status.is_server_error() { return Err(GatewayError::Transport(format!("gateway answered {status}"))); }
        let envelope: Envelope<T> = response.json().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
        match (envelope.status, envelope.data) {
            (true, Some(data)) => Ok(data),
            _ if envelope.message.to_ascii_lowercase().contains("not found") => Err(GatewayError::UnknownReference(reference.to_string())),
            _ => Err(GatewayError::Rejected(format!("{status}: {}", envelope.message))),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initiate_checkout(&self, request: CheckoutInit) -> Result<CheckoutHandle, GatewayError> {
        let body = InitializeRequest {
            amount: request.amount_minor,
            currency: &request.currency,
            reference: request.reference.as_str(),
            // The gateway insists on an email; customers here are identified by phone.
            email: format!("{}@customers.invalid", request.payer_contact.trim_start_matches('+')),
            metadata: InitializeMetadata { phone: &request.payer_contact },
        };
        debug!(reference = %request.reference, amount = request.amount_minor, "initializing gateway checkout");
        let response = self.http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send().await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let data: InitializeData = self.read(response, request.reference.as_str()).await?;
        if data.reference != request.reference.as_str() {
            warn!(expected = %request.reference, got = %data.reference, "gateway echoed a different reference");
            return Err(GatewayError::Rejected("reference mismatch".to_string()));
        }
        Ok(CheckoutHandle { reference: data.reference, authorization_url: data.authorization_url, access_code: data.access_code })
    }

    async fn verify_transaction(&self, reference: &TrackingCode) -> Result<GatewayTransaction, GatewayError> {
        let response = self.http
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send().await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let data: VerifyData = self.read(response, reference.as_str()).await?;
        Ok(GatewayTransaction { status: GatewayStatus::parse(&data.status), amount_minor: data.amount, currency: data.currency.to_uppercase() })
    }
}
