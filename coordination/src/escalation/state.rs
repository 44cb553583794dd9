//! Escalation State — the closed set of screens and the events that move between them

use serde::{Deserialize, Serialize};

/// Where the user is in the incident flow.
///
/// Exactly one state is active at a time; the `EscalationStateMachine` is the
/// only writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    /// Landing screen with the SOS button.
    Initial,
    /// Voice activation detector armed.
    Listening,
    /// Validating the voice command (or routing straight to the fallback).
    Processing,
    /// Conversational assistant session.
    Chat,
    /// Coverage probe, then SIM probe.
    CheckingCoverage,
    /// Dialing the emergency number.
    EmergencyCall,
    /// Manual form, the universal terminal fallback.
    EmergencyForm,
    /// Assistance finished.
    Completed,
}

impl AppState {
    /// All states, in escalation order.
    pub const ALL: [AppState; 8] = [
        Self::Initial,
        Self::Listening,
        Self::Processing,
        Self::Chat,
        Self::CheckingCoverage,
        Self::EmergencyCall,
        Self::EmergencyForm,
        Self::Completed,
    ];

    /// Whether assistance is in progress (anything between the landing
    /// screen and completion).
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Initial | Self::Completed)
    }
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Listening => write!(f, "listening"),
            Self::Processing => write!(f, "processing"),
            Self::Chat => write!(f, "chat"),
            Self::CheckingCoverage => write!(f, "checking_coverage"),
            Self::EmergencyCall => write!(f, "emergency_call"),
            Self::EmergencyForm => write!(f, "emergency_form"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Every input the machine reacts to.
///
/// Components emit exactly one event per outcome; the transition table
/// decides what to do about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscalationEvent {
    /// SOS pressed.
    Start,
    /// Activation phrase heard.
    Activated,
    /// Deactivation phrase heard.
    Deactivated,
    VoiceCommandValid,
    VoiceCommandInvalid,
    /// No user activity for the whole inactivity window.
    ChatTimeout,
    /// Assistant confirmed the incident data was captured.
    ChatResolved,
    CoverageOk,
    CoverageFailed,
    SimValid,
    SimInvalid,
    CallInitiated,
    CallFailed,
    FormSubmitted,
    /// Intake rejected a valid form; the form is shown again.
    FormSubmissionFailed {
        reason: String,
    },
    Reset,
    /// An entry action errored (or panicked). Routed to the failure edge of
    /// whatever state is active.
    StepFailed {
        reason: String,
    },
}

impl EscalationEvent {
    /// Stable snake_case name for logs and transition records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
            Self::VoiceCommandValid => "voice_command_valid",
            Self::VoiceCommandInvalid => "voice_command_invalid",
            Self::ChatTimeout => "chat_timeout",
            Self::ChatResolved => "chat_resolved",
            Self::CoverageOk => "coverage_ok",
            Self::CoverageFailed => "coverage_failed",
            Self::SimValid => "sim_valid",
            Self::SimInvalid => "sim_invalid",
            Self::CallInitiated => "call_initiated",
            Self::CallFailed => "call_failed",
            Self::FormSubmitted => "form_submitted",
            Self::FormSubmissionFailed { .. } => "form_submission_failed",
            Self::Reset => "reset",
            Self::StepFailed { .. } => "step_failed",
        }
    }

    /// Payload-free representatives of every event, for exhaustive table tests.
    pub fn samples() -> Vec<EscalationEvent> {
        vec![
            Self::Start,
            Self::Activated,
            Self::Deactivated,
            Self::VoiceCommandValid,
            Self::VoiceCommandInvalid,
            Self::ChatTimeout,
            Self::ChatResolved,
            Self::CoverageOk,
            Self::CoverageFailed,
            Self::SimValid,
            Self::SimInvalid,
            Self::CallInitiated,
            Self::CallFailed,
            Self::FormSubmitted,
            Self::FormSubmissionFailed {
                reason: "sample".to_string(),
            },
            Self::Reset,
            Self::StepFailed {
                reason: "sample".to_string(),
            },
        ]
    }
}

impl std::fmt::Display for EscalationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FormSubmissionFailed { reason } | Self::StepFailed { reason } => {
                write!(f, "{} ({})", self.kind(), reason)
            }
            _ => write!(f, "{}", self.kind()),
        }
    }
}

/// Which way `processing` was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPath {
    /// Activation phrase: validate the command, then chat.
    Assisted,
    /// Deactivation phrase or no speech capability: straight to the probes.
    Fallback,
}

/// Transient record alive only while `processing` or `checking_coverage`
/// is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingContext {
    /// Status line shown on the loading screen.
    pub message: String,
    /// Event that entered the state.
    pub trigger: EscalationEvent,
}

impl ProcessingContext {
    pub fn new(message: impl Into<String>, trigger: EscalationEvent) -> Self {
        Self {
            message: message.into(),
            trigger,
        }
    }

    /// Path taken through `processing`, derived from the trigger.
    pub fn path(&self) -> ProcessingPath {
        match self.trigger {
            EscalationEvent::Activated => ProcessingPath::Assisted,
            _ => ProcessingPath::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_is_snake_case() {
        assert_eq!(AppState::CheckingCoverage.to_string(), "checking_coverage");
        assert_eq!(AppState::EmergencyForm.to_string(), "emergency_form");
    }

    #[test]
    fn test_active_states() {
        assert!(!AppState::Initial.is_active());
        assert!(!AppState::Completed.is_active());
        assert!(AppState::Chat.is_active());
        assert!(AppState::EmergencyForm.is_active());
    }

    #[test]
    fn test_event_serde_tagged() {
        let event = EscalationEvent::StepFailed {
            reason: "probe timed out".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"step_failed\""));
        let restored: EscalationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, event);
    }

    #[test]
    fn test_processing_path_from_trigger() {
        let assisted = ProcessingContext::new("Verifying", EscalationEvent::Activated);
        assert_eq!(assisted.path(), ProcessingPath::Assisted);

        let declined = ProcessingContext::new("Verifying", EscalationEvent::Deactivated);
        assert_eq!(declined.path(), ProcessingPath::Fallback);

        let no_speech = ProcessingContext::new(
            "Verifying",
            EscalationEvent::StepFailed {
                reason: "speech unsupported".into(),
            },
        );
        assert_eq!(no_speech.path(), ProcessingPath::Fallback);
    }
}
