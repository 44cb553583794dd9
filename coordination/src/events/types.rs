//! Notice types published to view subscribers
//!
//! The view layer never reads `AppState` directly; it renders from these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::Message;
use crate::escalation::AppState;
use crate::form::{EmergencyFormData, FieldError};

/// Severity of a transient notification (toast).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Reason for an escalation or de-escalation, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Everything a view subscriber can receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionNotice {
    /// The active screen changed.
    StateChanged {
        from: AppState,
        to: AppState,
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// Transient notification derived from the event that caused a step.
    Notification {
        level: NoticeLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Loading-screen status line.
    ProcessingStatus { message: String },

    /// Live transcript while the voice detector is armed.
    TranscriptUpdated { text: String },

    /// A message was appended to the chat transcript.
    ChatMessage { message: Message },

    /// The form is (re)presented with its current data.
    FormPresented { data: EmergencyFormData },

    /// Submit attempt failed validation; field-level feedback.
    FormRejected { errors: Vec<FieldError> },
}

impl SessionNotice {
    /// Wrap a `Notice` with the current time.
    pub fn notification(notice: Notice) -> Self {
        Self::Notification {
            level: notice.level,
            message: notice.message,
            timestamp: Utc::now(),
        }
    }

    /// Get the notice type name.
    pub fn notice_type(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::Notification { .. } => "notification",
            Self::ProcessingStatus { .. } => "processing_status",
            Self::TranscriptUpdated { .. } => "transcript_updated",
            Self::ChatMessage { .. } => "chat_message",
            Self::FormPresented { .. } => "form_presented",
            Self::FormRejected { .. } => "form_rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_type_names() {
        let notice = SessionNotice::notification(Notice {
            level: NoticeLevel::Warning,
            message: "No activity".into(),
        });
        assert_eq!(notice.notice_type(), "notification");

        let changed = SessionNotice::StateChanged {
            from: AppState::Chat,
            to: AppState::CheckingCoverage,
            generation: 3,
            timestamp: Utc::now(),
        };
        assert_eq!(changed.notice_type(), "state_changed");
    }

    #[test]
    fn test_serialization_is_tagged() {
        let notice = SessionNotice::ProcessingStatus {
            message: "Validating SIM...".into(),
        };
        let json = serde_json::to_string(&notice).unwrap();
        assert!(json.contains("\"type\":\"processing_status\""));
    }
}
