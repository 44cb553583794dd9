//! Chat transcript, activity clock and completion-marker rules
//!
//! The async session loop lives in the runtime crate; everything here is
//! driven by explicit `Instant`s so it can be tested with a simulated clock.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::form::ImageRef;

/// Default inactivity window before the chat gives up.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default polling period of the inactivity check.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Text or an attached image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Image { image: ImageRef },
}

impl MessageContent {
    /// Content as sent to the assistant: text as-is, images by reference.
    pub fn as_request_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::Image { image } => &image.uri,
        }
    }
}

/// One transcript entry. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text { text: text.into() })
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text { text: text.into() })
    }

    pub fn user_image(image: ImageRef) -> Self {
        Self::new(Role::User, MessageContent::Image { image })
    }

    fn new(role: Role, content: MessageContent) -> Self {
        Self {
            role,
            content,
            timestamp: Utc::now(),
        }
    }
}

/// `{role, content}` pair as sent to the assistant endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// Data handed to the intake endpoint once the assistant confirms capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatIntakeReport {
    pub session_id: String,
    pub turns: Vec<ChatTurn>,
    pub resolved_at: DateTime<Utc>,
}

/// Append-only message log owned by one chat session.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Ordered request payload for the assistant.
    pub fn turns(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content.as_request_text().to_string(),
            })
            .collect()
    }

    pub fn intake_report(&self, session_id: &str) -> ChatIntakeReport {
        ChatIntakeReport {
            session_id: session_id.to_string(),
            turns: self.turns(),
            resolved_at: Utc::now(),
        }
    }
}

/// Whether an assistant reply signals that the incident data was captured.
///
/// An empty marker never matches.
pub fn contains_completion_marker(reply: &str, marker: &str) -> bool {
    !marker.is_empty() && reply.contains(marker)
}

/// Reply text with the marker removed, for display.
pub fn strip_completion_marker(reply: &str, marker: &str) -> String {
    if marker.is_empty() {
        return reply.to_string();
    }
    reply.replace(marker, "").trim().to_string()
}

/// Tracks the time of last user input and decides when the session times out.
///
/// Fires at most once. `touch` resets the window, but once the window has
/// expired the timeout is latched: a late touch cannot cancel it.
#[derive(Debug, Clone)]
pub struct InactivityMonitor {
    timeout: Duration,
    last_activity: Instant,
    expired: bool,
    fired: bool,
}

impl InactivityMonitor {
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            last_activity: now,
            expired: false,
            fired: false,
        }
    }

    /// Record user activity.
    pub fn touch(&mut self, now: Instant) {
        if self.fired {
            return;
        }
        if self.window_elapsed(now) {
            self.expired = true;
        }
        self.last_activity = now;
    }

    /// Periodic check. Returns `true` exactly once, on the first poll that
    /// sees the window expired.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.fired {
            return false;
        }
        if self.expired || self.window_elapsed(now) {
            self.fired = true;
            return true;
        }
        false
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    fn window_elapsed(&self, now: Instant) -> bool {
        self.idle_for(now) >= self.timeout
    }
}
