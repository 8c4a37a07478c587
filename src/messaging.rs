//! Domain event publication over NATS.

use tracing::{debug, warn};
use crate::domain::events::DomainEvent;

/// Publishes domain events when a NATS connection is configured. Delivery is best
/// effort: a failed publish is logged and never fails the request that raised it.
#[derive(Clone, Debug, Default)]
pub struct EventBus { nats: Option<async_nats::Client> }

impl EventBus {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }
    pub fn disabled() -> Self { Self::default() }

    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events { self.publish(&event).await; }
    }

    pub async fn publish(&self, event: &DomainEvent) {
        let Some(nats) = &self.nats else {
            debug!(subject = event.subject(), "event bus disabled, dropping event");
            return;
        };
        let payload = match serde_json::to_vec(event) {
            Ok(p) => p,
            Err(e) => { warn!(subject = event.subject(), error = %e, "failed to encode event"); return; }
        };
        if let Err(e) = nats.publish(event.subject().to_string(), payload.into()).await {
            warn!(subject = event.subject(), error = %e, "failed to publish event");
        }
    }
}
