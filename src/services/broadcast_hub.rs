//! Per-session fan-out of progress events.
//!
//! Subscribers register under a session id. Each send takes a snapshot of
//! the session's subscribers under the registry lock, delivers outside the
//! lock, then removes the subscribers whose delivery failed. One failing
//! subscriber never stops delivery to the others.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::DeliveryError;
use crate::domain::models::{ProgressEvent, SessionId};
use crate::domain::ports::EventSubscriber;

/// Handle identifying one connected subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle(Uuid);

impl SubscriberHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

type Subscribers = HashMap<SubscriberHandle, Arc<dyn EventSubscriber>>;

/// Registry of subscribers per session.
#[derive(Default)]
pub struct EventBroadcastHub {
    sessions: Mutex<HashMap<SessionId, Subscribers>>,
}

impl EventBroadcastHub {
    /// Create an empty hub. One instance is shared by every session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for a session.
    ///
    /// # Arguments
    ///
    /// * `session_id` - Session whose events the subscriber receives
    /// * `subscriber` - Delivery target
    ///
    /// # Returns
    ///
    /// A handle for [`disconnect`](Self::disconnect).
    pub async fn connect(
        &self,
        session_id: SessionId,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> SubscriberHandle {
        let handle = SubscriberHandle::new();
        let mut sessions = self.sessions.lock().await;
        let subscribers = sessions.entry(session_id).or_default();
        subscribers.insert(handle, subscriber);
        info!(
            session_id = %session_id,
            subscriber = %handle,
            connections = subscribers.len(),
            "subscriber connected"
        );
        handle
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub async fn disconnect(&self, session_id: SessionId, handle: SubscriberHandle) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(subscribers) = sessions.get_mut(&session_id) else {
            return false;
        };
        let removed = subscribers.remove(&handle).is_some();
        if subscribers.is_empty() {
            sessions.remove(&session_id);
        }
        if removed {
            info!(session_id = %session_id, subscriber = %handle, "subscriber disconnected");
        }
        removed
    }

    /// Deliver an event to every subscriber of a session.
    ///
    /// Deliveries run concurrently outside the registry lock. Subscribers
    /// whose delivery fails are removed, and a session left without
    /// subscribers is pruned. Failures never reach the caller.
    ///
    /// # Returns
    ///
    /// The number of successful deliveries, 0 for an unknown session.
    pub async fn send(&self, session_id: SessionId, event: &ProgressEvent) -> usize {
        let snapshot: Vec<(SubscriberHandle, Arc<dyn EventSubscriber>)> = {
            let sessions = self.sessions.lock().await;
            match sessions.get(&session_id) {
                Some(subscribers) => subscribers
                    .iter()
                    .map(|(handle, sub)| (*handle, Arc::clone(sub)))
                    .collect(),
                None => return 0,
            }
        };

        let results = join_all(snapshot.iter().map(|(handle, subscriber)| async move {
            (*handle, subscriber.deliver(event).await)
        }))
        .await;

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (handle, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        session_id = %session_id,
                        subscriber = %handle,
                        error = %e,
                        "dropping subscriber after failed delivery"
                    );
                    failed.push(handle);
                }
            }
        }

        if !failed.is_empty() {
            let mut sessions = self.sessions.lock().await;
            if let Some(subscribers) = sessions.get_mut(&session_id) {
                for handle in &failed {
                    subscribers.remove(handle);
                }
                if subscribers.is_empty() {
                    sessions.remove(&session_id);
                }
            }
        }

        debug!(
            session_id = %session_id,
            kind = event.kind(),
            delivered,
            failed = failed.len(),
            "event sent"
        );
        delivered
    }

    /// Deliver an event to every known session, re-addressed to each.
    pub async fn broadcast_all(&self, event: &ProgressEvent) -> usize {
        let sessions: Vec<SessionId> = self.sessions.lock().await.keys().copied().collect();
        let mut delivered = 0;
        for session_id in sessions {
            delivered += self.send(session_id, &event.readdressed(session_id)).await;
        }
        delivered
    }

    /// Subscribers currently registered for `session_id`.
    pub async fn connection_count(&self, session_id: SessionId) -> usize {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .map_or(0, HashMap::len)
    }

    /// Sessions with at least one subscriber.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Subscriber forwarding events into a bounded channel.
///
/// Delivery fails once the receiving side has been dropped.
pub struct ChannelSubscriber {
    sender: mpsc::Sender<ProgressEvent>,
}

impl ChannelSubscriber {
    /// Create the subscriber and the receiving end of its channel.
    ///
    /// A zero `capacity` is raised to 1.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSubscriber for ChannelSubscriber {
    async fn deliver(&self, event: &ProgressEvent) -> Result<(), DeliveryError> {
        self.sender
            .send(event.clone())
            .await
            .map_err(|_| DeliveryError("receiver closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting(AtomicU32);

    #[async_trait]
    impl EventSubscriber for Counting {
        async fn deliver(&self, _event: &ProgressEvent) -> Result<(), DeliveryError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventSubscriber for Failing {
        async fn deliver(&self, _event: &ProgressEvent) -> Result<(), DeliveryError> {
            Err(DeliveryError("socket closed".into()))
        }
    }

    fn event(session: SessionId) -> ProgressEvent {
        ProgressEvent::error(session, "test", None)
    }

    #[tokio::test]
    async fn test_send_without_subscribers_is_noop() {
        let hub = EventBroadcastHub::new();
        let session = SessionId::new();
        assert_eq!(hub.send(session, &event(session)).await, 0);
        assert_eq!(hub.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_subscriber_is_dropped_others_receive() {
        let hub = EventBroadcastHub::new();
        let session = SessionId::new();
        let a = Arc::new(Counting(AtomicU32::new(0)));
        let b = Arc::new(Counting(AtomicU32::new(0)));
        hub.connect(session, a.clone()).await;
        hub.connect(session, Arc::new(Failing)).await;
        hub.connect(session, b.clone()).await;

        assert_eq!(hub.send(session, &event(session)).await, 2);
        assert_eq!(hub.connection_count(session).await, 2);
        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);

        assert_eq!(hub.send(session, &event(session)).await, 2);
        assert_eq!(a.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_sessions_are_pruned() {
        let hub = EventBroadcastHub::new();
        let session = SessionId::new();
        let handle = hub.connect(session, Arc::new(Failing)).await;
        assert_eq!(hub.session_count().await, 1);

        hub.send(session, &event(session)).await;
        assert_eq!(hub.session_count().await, 0);
        assert!(!hub.disconnect(session, handle).await);

        let handle = hub
            .connect(session, Arc::new(Counting(AtomicU32::new(0))))
            .await;
        assert!(hub.disconnect(session, handle).await);
        assert_eq!(hub.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let hub = EventBroadcastHub::new();
        let (one, two) = (SessionId::new(), SessionId::new());
        let first = Arc::new(Counting(AtomicU32::new(0)));
        let second = Arc::new(Counting(AtomicU32::new(0)));
        hub.connect(one, first.clone()).await;
        hub.connect(two, second.clone()).await;

        hub.send(one, &event(one)).await;
        assert_eq!(first.0.load(Ordering::SeqCst), 1);
        assert_eq!(second.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_broadcast_all_readdresses() {
        let hub = EventBroadcastHub::new();
        let (one, two) = (SessionId::new(), SessionId::new());
        let (sub_one, mut rx_one) = ChannelSubscriber::new(4);
        let (sub_two, mut rx_two) = ChannelSubscriber::new(4);
        hub.connect(one, Arc::new(sub_one)).await;
        hub.connect(two, Arc::new(sub_two)).await;

        let delivered = hub.broadcast_all(&event(SessionId::new())).await;
        assert_eq!(delivered, 2);
        assert_eq!(rx_one.recv().await.unwrap().session_id, one);
        assert_eq!(rx_two.recv().await.unwrap().session_id, two);
    }

    #[tokio::test]
    async fn test_closed_channel_subscriber_is_removed() {
        let hub = EventBroadcastHub::new();
        let session = SessionId::new();
        let (subscriber, receiver) = ChannelSubscriber::new(1);
        hub.connect(session, Arc::new(subscriber)).await;
        drop(receiver);

        assert_eq!(hub.send(session, &event(session)).await, 0);
        assert_eq!(hub.connection_count(session).await, 0);
    }
}
