//! Event publishers: NATS when configured, otherwise the log.

use crate::domain::events::OrderEvent;
use crate::domain::ports::EventPublisher;
use async_trait::async_trait;
use tracing::{info, warn};

pub struct NatsEventPublisher { client: async_nats::Client }

impl NatsEventPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl EventPublisher for NatsEventPublisher {
    async fn publish(&self, event: &OrderEvent) {
        let payload = match serde_json::to_vec(event) {
            Ok(p) => p,
            Err(e) => { warn!(error = %e, "could not encode order event"); return; }
        };
        if let Err(e) = self.client.publish(event.subject(), payload.into()).await {
            warn!(error = %e, subject = %event.subject(), "failed to publish order event");
        }
    }
}

#[derive(Default, Clone, Copy)]
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, event: &OrderEvent) {
        info!(subject = %event.subject(), ?event, "order event");
    }
}
