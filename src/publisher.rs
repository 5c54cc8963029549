//! Domain event publishing.
//!
//! Events go to NATS as JSON on `storefront.<kind>` when a bus is configured.
//! Publishing happens after the commit, so a failure is logged and swallowed.

use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

const SUBJECT_PREFIX: &str = "storefront";

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    /// Publisher that only logs.
    pub fn disabled() -> Self { Self::default() }

    pub async fn connect(url: &str) -> Result<Self, async_nats::ConnectError> {
        let client = async_nats::connect(url).await?;
        Ok(Self { nats: Some(client) })
    }

    pub fn is_enabled(&self) -> bool { self.nats.is_some() }

    pub async fn publish(&self, event: DomainEvent) {
        let subject = subject(&event);
        let Some(client) = &self.nats else {
            debug!(%subject, ?event, "event bus disabled; dropping event");
            return;
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => {
                warn!(%subject, error = %e, "failed to encode event");
                return;
            }
        };
        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            warn!(%subject, error = %e, "failed to publish event");
        }
    }
}

fn subject(event: &DomainEvent) -> String { format!("{SUBJECT_PREFIX}.{}", event.kind()) }
