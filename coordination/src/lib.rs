//! AutoRescue coordination library
//!
//! Deterministic core of the incident assistant:
//! - `escalation`: the state machine, its transition table and entry/exit actions
//! - `events`: broadcast bus the view layer subscribes to
//! - `chat`: transcript, inactivity monitor and completion marker
//! - `voice`: activation phrase matching
//! - `probe`: coverage → SIM → call chain order and outcomes
//! - `form`: emergency form data and validation
//!
//! Nothing here sleeps or performs I/O. The async runtime lives in the
//! `rescue-agents` crate.

#![allow(clippy::uninlined_format_args)]

pub mod chat;
pub mod escalation;
pub mod events;
pub mod form;
pub mod probe;
pub mod voice;

pub use chat::{
    ChatIntakeReport, ChatTurn, InactivityMonitor, Message, MessageContent, Role, Transcript,
};
pub use escalation::{
    Action, AppState, EscalationEvent, EscalationStateMachine, Outcome, ProcessingContext,
    ProcessingPath, Reaction, TransitionRecord,
};
pub use events::{EventBus, Notice, NoticeLevel, SessionNotice, SharedEventBus};
pub use form::{EmergencyFormData, FieldError, FormField, ImageRef, ImageRejection};
pub use probe::{ChainReport, ProbeKind, ProbeOutcome};
pub use voice::{PhraseMatcher, VoiceSignal};
