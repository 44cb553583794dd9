//! Event bus for view subscribers
//!
//! Tokio broadcast pub/sub. Publishing never blocks and never fails because
//! nobody is listening; a slow subscriber lags and skips.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::SessionNotice;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<SessionNotice>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish a notice to all subscribers
    pub fn publish(&self, notice: SessionNotice) {
        let notice_type = notice.notice_type();
        match self.sender.send(notice) {
            Ok(count) => debug!(notice_type, receivers = count, "Notice published"),
            Err(_) => debug!(notice_type, "Notice published (no receivers)"),
        }
    }

    /// Subscribe to receive notices
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.sender.subscribe()
    }

    /// Subscribe to a subset of notice types
    pub fn subscribe_filtered(&self, filter: NoticeFilter) -> FilteredReceiver {
        FilteredReceiver {
            receiver: self.subscribe(),
            filter,
        }
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Notice filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct NoticeFilter {
    notice_types: Option<Vec<String>>,
}

impl NoticeFilter {
    /// Create a new empty filter (matches all notices)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by notice types
    pub fn types(mut self, notice_types: Vec<&str>) -> Self {
        self.notice_types = Some(notice_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if a notice matches this filter
    pub fn matches(&self, notice: &SessionNotice) -> bool {
        match &self.notice_types {
            Some(types) => types.iter().any(|t| t == notice.notice_type()),
            None => true,
        }
    }
}

/// Filtered receiver that only yields matching notices
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<SessionNotice>,
    filter: NoticeFilter,
}

impl FilteredReceiver {
    /// Receive the next matching notice
    pub async fn recv(&mut self) -> Result<SessionNotice, broadcast::error::RecvError> {
        loop {
            let notice = self.receiver.recv().await?;
            if self.filter.matches(&notice) {
                return Ok(notice);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::AppState;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(SessionNotice::ProcessingStatus {
            message: "Checking device coverage...".into(),
        });

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.notice_type(), "processing_status");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(SessionNotice::TranscriptUpdated {
            text: "hola".into(),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.notice_type(), e2.notice_type());
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(SessionNotice::TranscriptUpdated { text: "sí".into() });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new();
        let mut filtered = bus.subscribe_filtered(NoticeFilter::new().types(vec!["state_changed"]));

        bus.publish(SessionNotice::TranscriptUpdated { text: "no".into() });
        bus.publish(SessionNotice::StateChanged {
            from: AppState::Listening,
            to: AppState::Processing,
            generation: 2,
            timestamp: Utc::now(),
        });

        let notice = filtered.recv().await.unwrap();
        assert_eq!(notice.notice_type(), "state_changed");
    }
}
