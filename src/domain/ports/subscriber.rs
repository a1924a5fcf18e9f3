//! Event subscriber port - the transport boundary for progress events.

use async_trait::async_trait;

use crate::domain::errors::DeliveryError;
use crate::domain::models::ProgressEvent;

/// A connected client receiving events for one session.
///
/// A delivery error tells the hub the subscriber is gone.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn deliver(&self, event: &ProgressEvent) -> Result<(), DeliveryError>;
}
