//! Chat session task.
//!
//! One session per entry into `chat`. It owns the transcript and the
//! inactivity monitor, hands sends and the final report to spawned tasks so
//! the poll loop never waits, and ends with exactly one of `chat_timeout` /
//! `chat_resolved` (or nothing, if its scope is cancelled first).
//!
//! ```text
//!   inputs ──▶ ┌─────────────┐ ──turns──▶ assistant (spawned request)
//!              │ ChatSession │ ◀──reply──
//!   5s tick ─▶ └─────────────┘ ──report──▶ intake
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use coordination::chat::{
    contains_completion_marker, strip_completion_marker, InactivityMonitor, Message, Transcript,
};
use coordination::escalation::EscalationEvent;
use coordination::events::{SessionNotice, SharedEventBus};
use coordination::form::ImageRef;

use crate::assistant::ConversationalAssistant;
use crate::config::RescueConfig;
use crate::errors::CollaboratorError;
use crate::intake::IntakeEndpoint;

/// Assistant-role text appended when a send fails.
const SEND_FAILED_MESSAGE: &str =
    "Sorry, I could not send your message. Please try again.";
/// Assistant-role text appended when the report could not be delivered.
const INTAKE_FAILED_MESSAGE: &str =
    "I could not register your report yet. Please send any message to retry.";

/// User interaction inside the chat screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Send(String),
    /// Keystroke or any other sign of life.
    Typing,
    /// Live dictation update.
    VoiceTranscript(String),
    AttachImage(ImageRef),
}

/// Session parameters.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub welcome_message: String,
    pub image_ack_message: String,
    pub completion_marker: String,
    pub inactivity_timeout: Duration,
    pub poll_interval: Duration,
}

impl ChatSettings {
    pub fn from_config(config: &RescueConfig) -> Self {
        Self {
            welcome_message: config.chat.welcome_message.clone(),
            image_ack_message: config.chat.image_ack_message.clone(),
            completion_marker: config.chat.completion_marker.clone(),
            inactivity_timeout: config.inactivity_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

pub struct ChatSession {
    id: String,
    settings: ChatSettings,
    assistant: Arc<dyn ConversationalAssistant>,
    intake: Arc<dyn IntakeEndpoint>,
    bus: SharedEventBus,
    transcript: Transcript,
    awaiting_reply: bool,
    /// A user message arrived while a request was in flight.
    follow_up: bool,
    /// The chat report is on its way to intake.
    resolving: bool,
    /// Last reply carried the marker but the report did not go through.
    resolution_pending: bool,
}

type ReplyResult = Result<String, CollaboratorError>;
type ReportResult = Result<usize, CollaboratorError>;

/// Return path for the requests a session spawns.
struct Outbox {
    replies: mpsc::Sender<ReplyResult>,
    reports: mpsc::Sender<ReportResult>,
    cancel: CancellationToken,
}

impl ChatSession {
    pub fn new(
        settings: ChatSettings,
        assistant: Arc<dyn ConversationalAssistant>,
        intake: Arc<dyn IntakeEndpoint>,
        bus: SharedEventBus,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            settings,
            assistant,
            intake,
            bus,
            transcript: Transcript::new(),
            awaiting_reply: false,
            follow_up: false,
            resolving: false,
            resolution_pending: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Drive the session until it times out, resolves, or is cancelled.
    ///
    /// Returns the event to feed to the machine; `None` when cancelled or
    /// when every input sender is gone. Assistant and intake requests run
    /// on their own tasks so the poll loop never waits on them.
    pub async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<ChatInput>,
        cancel: CancellationToken,
    ) -> Result<Option<EscalationEvent>, CollaboratorError> {
        info!(session_id = %self.id, "Chat session started");
        let mut monitor =
            InactivityMonitor::new(self.settings.inactivity_timeout, Instant::now().into_std());
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.settings.poll_interval,
            self.settings.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let (reply_tx, mut reply_rx) = mpsc::channel::<ReplyResult>(1);
        let (report_tx, mut report_rx) = mpsc::channel::<ReportResult>(1);
        let outbox = Outbox {
            replies: reply_tx,
            reports: report_tx,
            cancel: cancel.clone(),
        };

        self.append(Message::assistant_text(self.settings.welcome_message.clone()));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(session_id = %self.id, "Chat session cancelled");
                    return Ok(None);
                }
                _ = ticker.tick() => {
                    if monitor.poll(Instant::now().into_std()) {
                        info!(
                            session_id = %self.id,
                            timeout_secs = self.settings.inactivity_timeout.as_secs(),
                            "Chat inactivity timeout"
                        );
                        return Ok(Some(EscalationEvent::ChatTimeout));
                    }
                }
                input = inputs.recv() => {
                    let Some(input) = input else {
                        return Ok(None);
                    };
                    monitor.touch(Instant::now().into_std());
                    self.on_input(input, &outbox);
                }
                Some(reply) = reply_rx.recv() => {
                    self.awaiting_reply = false;
                    self.on_reply(reply, &outbox);
                }
                Some(report) = report_rx.recv() => {
                    self.resolving = false;
                    if let Some(event) = self.on_report(report, &outbox) {
                        return Ok(Some(event));
                    }
                }
            }
        }
    }

    fn on_input(&mut self, input: ChatInput, outbox: &Outbox) {
        match input {
            ChatInput::Typing => {}
            ChatInput::VoiceTranscript(text) => {
                self.bus.publish(SessionNotice::TranscriptUpdated { text });
            }
            ChatInput::AttachImage(image) => match image.validate() {
                Ok(()) => {
                    self.append(Message::user_image(image));
                    self.append(Message::assistant_text(self.settings.image_ack_message.clone()));
                }
                Err(rejection) => {
                    debug!(session_id = %self.id, "Image rejected: {rejection}");
                    self.append(Message::assistant_text(rejection.to_string()));
                }
            },
            ChatInput::Send(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return;
                }
                self.append(Message::user_text(text));
                if self.awaiting_reply || self.resolving {
                    debug!(session_id = %self.id, "Request in flight; message queued");
                    self.follow_up = true;
                } else if self.resolution_pending {
                    self.start_resolution(outbox);
                } else {
                    self.request_reply(outbox);
                }
            }
        }
    }

    fn request_reply(&mut self, outbox: &Outbox) {
        self.awaiting_reply = true;
        self.follow_up = false;
        let assistant = self.assistant.clone();
        let turns = self.transcript.turns();
        let reply_tx = outbox.replies.clone();
        let cancel = outbox.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                reply = assistant.reply(&turns) => {
                    let _ = reply_tx.send(reply).await;
                }
            }
        });
    }

    fn on_reply(&mut self, reply: ReplyResult, outbox: &Outbox) {
        match reply {
            Ok(text) => {
                let marker = self.settings.completion_marker.clone();
                let resolved = contains_completion_marker(&text, &marker);
                let shown = strip_completion_marker(&text, &marker);
                if !shown.is_empty() {
                    self.append(Message::assistant_text(shown));
                }
                if resolved {
                    self.start_resolution(outbox);
                    return;
                }
            }
            Err(e) => {
                warn!(session_id = %self.id, class = %e.class(), "Assistant request failed: {e}");
                self.append(Message::assistant_text(SEND_FAILED_MESSAGE));
            }
        }
        if self.follow_up {
            self.request_reply(outbox);
        }
    }

    /// Submit the transcript to intake. The session only resolves once the
    /// report is accepted.
    fn start_resolution(&mut self, outbox: &Outbox) {
        self.resolving = true;
        self.follow_up = false;
        let intake = self.intake.clone();
        let report = self.transcript.intake_report(&self.id);
        let turns = report.turns.len();
        let report_tx = outbox.reports.clone();
        let cancel = outbox.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = intake.submit_chat(&report) => {
                    let _ = report_tx.send(result.map(|()| turns)).await;
                }
            }
        });
    }

    fn on_report(&mut self, report: ReportResult, outbox: &Outbox) -> Option<EscalationEvent> {
        match report {
            Ok(turns) => {
                info!(session_id = %self.id, turns, "Chat resolved");
                Some(EscalationEvent::ChatResolved)
            }
            Err(e) => {
                warn!(session_id = %self.id, class = %e.class(), "Chat report submission failed: {e}");
                self.resolution_pending = true;
                self.append(Message::assistant_text(INTAKE_FAILED_MESSAGE));
                // Anything the user sent meanwhile counts as the retry.
                if self.follow_up {
                    self.start_resolution(outbox);
                }
                None
            }
        }
    }

    fn append(&mut self, message: Message) {
        self.transcript.push(message.clone());
        self.bus.publish(SessionNotice::ChatMessage { message });
    }
}
