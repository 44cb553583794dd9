//! Orchestrator — the single-writer event loop around `EscalationStateMachine`.
//!
//! ```text
//!  OrchestratorHandle ──UserInput──┐
//!                                  ▼
//!  component tasks ──(gen, event)──▶ mpsc ──▶ loop ──▶ machine.handle_from()
//!        ▲                                      │
//!        └────── spawn_step() under scope ◀─────┤ exit / entry actions
//!                                               ├──▶ watch<AppState>
//!                                               └──▶ EventBus<SessionNotice>
//! ```
//!
//! Each state gets a fresh `CancellationToken` scope. Leaving the state
//! cancels it unconditionally, and anything a torn-down task still manages to
//! send carries an old generation that the machine discards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use coordination::escalation::{
    Action, AppState, EscalationEvent, EscalationStateMachine, Outcome, TransitionRecord,
};
use coordination::events::{EventBus, Notice, NoticeLevel, SessionNotice, SharedEventBus};
use coordination::form::{EmergencyFormData, FormField, ImageRef};
use coordination::probe::ProbeKind;
use coordination::voice::PhraseMatcher;

use crate::assistant::ConversationalAssistant;
use crate::chat::{ChatInput, ChatSession, ChatSettings};
use crate::config::RescueConfig;
use crate::errors::CollaboratorError;
use crate::intake::IntakeEndpoint;
use crate::probes::{ConnectivityProbes, ProbeChain};
use crate::telemetry::{self, SessionRecord};
use crate::voice::{self, SpeechCapability, SpeechRecognizer, VoiceCommandValidator};

/// Capacity of the orchestrator queue.
const QUEUE_CAPACITY: usize = 64;

/// What a spawned step resolves to: the event to queue, if any.
type StepResult = Result<Option<EscalationEvent>, CollaboratorError>;

/// Edits on the manual form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormInput {
    Edit { field: FormField, value: String },
    AttachImage(ImageRef),
    RemoveImage(usize),
    Submit,
}

/// Everything the view layer can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// SOS button.
    Start,
    /// Back to the landing screen after completion.
    Reset,
    Chat(ChatInput),
    Form(FormInput),
}

enum Envelope {
    Input(UserInput),
    Component {
        generation: u64,
        event: EscalationEvent,
    },
    Shutdown,
}

/// External collaborators, all behind trait objects.
#[derive(Clone)]
pub struct Collaborators {
    pub speech: SpeechCapability,
    pub validator: Arc<dyn VoiceCommandValidator>,
    /// `None` when no assistant endpoint is configured; entering `chat` then
    /// fails over to the probes.
    pub assistant: Option<Arc<dyn ConversationalAssistant>>,
    pub probes: Arc<dyn ConnectivityProbes>,
    pub intake: Arc<dyn IntakeEndpoint>,
}

/// Cloneable front door to a running orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Envelope>,
    state: watch::Receiver<AppState>,
    bus: SharedEventBus,
}

impl OrchestratorHandle {
    /// Queue a user input. Fails only if the orchestrator has stopped.
    pub async fn send(&self, input: UserInput) -> Result<(), CollaboratorError> {
        self.tx
            .send(Envelope::Input(input))
            .await
            .map_err(|_| CollaboratorError::Cancelled("orchestrator stopped".into()))
    }

    pub async fn start(&self) -> Result<(), CollaboratorError> {
        self.send(UserInput::Start).await
    }

    pub async fn reset(&self) -> Result<(), CollaboratorError> {
        self.send(UserInput::Reset).await
    }

    pub async fn chat(&self, input: ChatInput) -> Result<(), CollaboratorError> {
        self.send(UserInput::Chat(input)).await
    }

    pub async fn form(&self, input: FormInput) -> Result<(), CollaboratorError> {
        self.send(UserInput::Form(input)).await
    }

    /// Current state as last published.
    pub fn state(&self) -> AppState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<AppState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.bus.subscribe()
    }

    pub fn bus(&self) -> SharedEventBus {
        self.bus.clone()
    }

    /// Wait until the published state equals `target`.
    pub async fn wait_for(&self, target: AppState) -> Result<(), CollaboratorError> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| CollaboratorError::Cancelled("orchestrator stopped".into()))
    }

    /// Ask the loop to tear down the active state and exit.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Envelope::Shutdown).await;
    }
}

/// In-progress session bookkeeping for telemetry.
struct SessionTracker {
    id: String,
    started_at: DateTime<Utc>,
    started: tokio::time::Instant,
    first_transition: usize,
}

/// Owns the machine and performs every action it returns.
pub struct Orchestrator {
    machine: EscalationStateMachine,
    collaborators: Collaborators,
    chain: ProbeChain,
    chat_settings: ChatSettings,
    activation_phrase: String,
    deactivation_phrase: String,
    settle_delay: Duration,
    request_timeout: Duration,
    telemetry_path: Option<std::path::PathBuf>,
    bus: SharedEventBus,
    state_tx: watch::Sender<AppState>,
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
    scope: CancellationToken,
    chat: Option<mpsc::UnboundedSender<ChatInput>>,
    form: Option<EmergencyFormData>,
    submitting: bool,
    session: Option<SessionTracker>,
}

impl Orchestrator {
    pub fn new(config: &RescueConfig, collaborators: Collaborators) -> (Self, OrchestratorHandle) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let (state_tx, state_rx) = watch::channel(AppState::Initial);
        let bus = EventBus::new().shared();
        let chain = ProbeChain::new(collaborators.probes.clone(), &config.call.emergency_number);

        let handle = OrchestratorHandle {
            tx: tx.clone(),
            state: state_rx,
            bus: bus.clone(),
        };
        let orchestrator = Self {
            machine: EscalationStateMachine::new(),
            collaborators,
            chain,
            chat_settings: ChatSettings::from_config(config),
            activation_phrase: config.voice.activation_phrase.clone(),
            deactivation_phrase: config.voice.deactivation_phrase.clone(),
            settle_delay: config.settle_delay(),
            request_timeout: config.request_timeout(),
            telemetry_path: config.telemetry.path.clone(),
            bus,
            state_tx,
            tx,
            rx,
            scope: CancellationToken::new(),
            chat: None,
            form: None,
            submitting: false,
            session: None,
        };
        (orchestrator, handle)
    }

    /// Build and run on the current runtime.
    pub fn spawn(
        config: &RescueConfig,
        collaborators: Collaborators,
    ) -> (OrchestratorHandle, JoinHandle<Vec<TransitionRecord>>) {
        let (orchestrator, handle) = Self::new(config, collaborators);
        (handle, tokio::spawn(orchestrator.run()))
    }

    /// Process envelopes one at a time until shutdown. Returns the full
    /// transition log.
    pub async fn run(mut self) -> Vec<TransitionRecord> {
        info!("Orchestrator started");
        while let Some(envelope) = self.rx.recv().await {
            match envelope {
                Envelope::Input(input) => self.on_input(input),
                Envelope::Component { generation, event } => {
                    let outcome = self.machine.handle_from(generation, event);
                    self.apply(outcome);
                }
                Envelope::Shutdown => break,
            }
        }

        self.scope.cancel();
        self.finish_session();
        info!(summary = %self.machine.summary(), "Orchestrator stopped");
        self.machine.transitions().to_vec()
    }

    fn on_input(&mut self, input: UserInput) {
        match input {
            UserInput::Start => {
                let outcome = self.machine.handle(EscalationEvent::Start);
                self.apply(outcome);
            }
            UserInput::Reset => {
                let outcome = self.machine.handle(EscalationEvent::Reset);
                self.apply(outcome);
            }
            UserInput::Chat(input) => match &self.chat {
                Some(chat) => {
                    if chat.send(input).is_err() {
                        debug!("Chat input after the session ended");
                    }
                }
                None => debug!(state = %self.machine.current(), "Chat input outside chat"),
            },
            UserInput::Form(input) => self.on_form_input(input),
        }
    }

    fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Stale { .. } | Outcome::Ignored { .. } => {}
            Outcome::Internal {
                actions, notice, ..
            } => {
                self.publish_notice(notice);
                self.publish_status();
                for action in actions {
                    self.perform(action);
                }
            }
            Outcome::Transitioned {
                from,
                to,
                generation,
                exit,
                entry,
                notice,
            } => {
                self.scope.cancel();
                self.scope = CancellationToken::new();
                for action in exit {
                    self.perform(action);
                }

                self.state_tx.send_replace(to);
                self.bus.publish(SessionNotice::StateChanged {
                    from,
                    to,
                    generation,
                    timestamp: Utc::now(),
                });
                self.publish_notice(notice);
                self.publish_status();

                if from == AppState::Initial {
                    self.begin_session();
                }
                if to == AppState::Completed {
                    self.finish_session();
                }

                for action in entry {
                    self.perform(action);
                }
            }
        }
    }

    fn perform(&mut self, action: Action) {
        debug!(?action, state = %self.machine.current(), "Performing action");
        match action {
            Action::ArmVoice => self.arm_voice(),
            Action::DisarmVoice | Action::AbandonCheck => {
                // Covered by the scope cancellation.
            }
            Action::ValidateVoiceCommand => {
                let validator = self.collaborators.validator.clone();
                self.spawn_step(
                    "voice_validation",
                    validate_voice_command(validator, self.request_timeout),
                );
            }
            Action::DeclineAssistance => {
                self.spawn_step("decline_assistance", async {
                    StepResult::Ok(Some(EscalationEvent::VoiceCommandInvalid))
                });
            }
            Action::StartChat => self.start_chat(),
            Action::StopChat => self.chat = None,
            Action::RunProbe(kind) => {
                self.spawn_step(
                    "probe",
                    run_probe(self.chain.clone(), kind, self.settle_delay),
                );
            }
            Action::PresentForm => {
                let form = EmergencyFormData::new();
                self.bus
                    .publish(SessionNotice::FormPresented { data: form.clone() });
                self.form = Some(form);
                self.submitting = false;
            }
            Action::RepresentForm => {
                self.submitting = false;
                if let Some(form) = &self.form {
                    self.bus
                        .publish(SessionNotice::FormPresented { data: form.clone() });
                }
            }
            Action::DiscardForm => {
                self.form = None;
                self.submitting = false;
            }
        }
    }

    fn arm_voice(&mut self) {
        match &self.collaborators.speech {
            SpeechCapability::Unavailable => {
                warn!("Speech recognition unavailable, using fallback path");
                self.spawn_step("voice_detector", async {
                    StepResult::Err(CollaboratorError::Unavailable(
                        "speech recognition not supported".into(),
                    ))
                });
            }
            SpeechCapability::Available(recognizer) => {
                let recognizer = recognizer.clone();
                let matcher = PhraseMatcher::new(&self.activation_phrase, &self.deactivation_phrase);
                self.spawn_step(
                    "voice_detector",
                    listen_for_phrase(recognizer, matcher, self.bus.clone(), self.scope.clone()),
                );
            }
        }
    }

    fn start_chat(&mut self) {
        let Some(assistant) = self.collaborators.assistant.clone() else {
            warn!("No assistant endpoint configured");
            self.spawn_step("chat_session", async {
                StepResult::Err(CollaboratorError::Configuration(
                    "assistant endpoint not configured".into(),
                ))
            });
            return;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let session = ChatSession::new(
            self.chat_settings.clone(),
            assistant,
            self.collaborators.intake.clone(),
            self.bus.clone(),
        );
        info!(session_id = %session.id(), "Starting chat session");
        let cancel = self.scope.clone();
        self.chat = Some(tx);
        self.spawn_step("chat_session", session.run(rx, cancel));
    }

    fn on_form_input(&mut self, input: FormInput) {
        let Some(form) = self.form.as_mut() else {
            debug!(state = %self.machine.current(), "Form input outside form");
            return;
        };

        match input {
            FormInput::Edit { field, value } => form.set_text(field, &value),
            FormInput::AttachImage(image) => {
                if let Err(rejection) = form.attach_image(image) {
                    self.bus.publish(SessionNotice::notification(Notice {
                        level: NoticeLevel::Warning,
                        message: rejection.to_string(),
                    }));
                }
            }
            FormInput::RemoveImage(index) => {
                form.remove_image(index);
            }
            FormInput::Submit => {
                if self.submitting {
                    debug!("Form submission already in flight");
                    return;
                }
                match form.validate() {
                    Err(errors) => {
                        info!(errors = errors.len(), "Form rejected by validation");
                        self.bus.publish(SessionNotice::FormRejected { errors });
                    }
                    Ok(()) => {
                        let data = form.clone();
                        let intake = self.collaborators.intake.clone();
                        self.submitting = true;
                        self.spawn_step("form_submission", submit_form(intake, data));
                    }
                }
            }
        }
    }

    /// Run `step` under the current state's scope and generation.
    ///
    /// The result is queued as an event. Errors and panics become
    /// `StepFailed`; cancellation produces nothing.
    fn spawn_step<F>(&self, label: &'static str, step: F)
    where
        F: Future<Output = StepResult> + Send + 'static,
    {
        let generation = self.machine.generation();
        let scope = self.scope.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let task = tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = scope.cancelled() => None,
                    result = step => Some(result),
                }
            });

            let event = match task.await {
                Ok(None) => {
                    debug!(step = label, generation, "Step cancelled");
                    return;
                }
                Ok(Some(Ok(Some(event)))) => event,
                Ok(Some(Ok(None))) => return,
                Ok(Some(Err(e))) if !e.class().is_reportable() => {
                    debug!(step = label, generation, "Step cancelled: {e}");
                    return;
                }
                Ok(Some(Err(e))) => {
                    warn!(step = label, generation, class = %e.class(), "Step failed: {e}");
                    EscalationEvent::StepFailed {
                        reason: e.to_string(),
                    }
                }
                Err(join_err) if join_err.is_panic() => {
                    error!(step = label, generation, "Step panicked");
                    EscalationEvent::StepFailed {
                        reason: format!("{label} panicked"),
                    }
                }
                Err(_) => return,
            };

            let _ = tx.send(Envelope::Component { generation, event }).await;
        });
    }

    fn publish_notice(&self, notice: Option<Notice>) {
        if let Some(notice) = notice {
            self.bus.publish(SessionNotice::notification(notice));
        }
    }

    fn publish_status(&self) {
        if let Some(ctx) = self.machine.context() {
            self.bus.publish(SessionNotice::ProcessingStatus {
                message: ctx.message.clone(),
            });
        }
    }

    fn begin_session(&mut self) {
        let id = uuid::Uuid::new_v4().to_string();
        info!(session_id = %id, "Escalation session started");
        self.session = Some(SessionTracker {
            id,
            started_at: Utc::now(),
            started: tokio::time::Instant::now(),
            // The `start` transition is already recorded.
            first_transition: self.machine.transitions().len().saturating_sub(1),
        });
    }

    fn finish_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let final_state = self.machine.current();
        let record = SessionRecord {
            session_id: session.id,
            started_at: session.started_at,
            finished_at: Utc::now(),
            final_state,
            completed: final_state == AppState::Completed,
            elapsed_ms: session.started.elapsed().as_millis() as u64,
            transitions: self.machine.transitions()[session.first_transition..].to_vec(),
        };
        info!(
            session_id = %record.session_id,
            final_state = %record.final_state,
            elapsed_ms = record.elapsed_ms,
            "Escalation session finished"
        );
        if let Some(path) = &self.telemetry_path {
            telemetry::append_session(&record, path);
        }
    }
}

async fn validate_voice_command(
    validator: Arc<dyn VoiceCommandValidator>,
    timeout: Duration,
) -> StepResult {
    let valid = tokio::time::timeout(timeout, validator.validate_voice_command())
        .await
        .map_err(|_| CollaboratorError::Timeout(timeout))??;
    Ok(Some(if valid {
        EscalationEvent::VoiceCommandValid
    } else {
        EscalationEvent::VoiceCommandInvalid
    }))
}

async fn listen_for_phrase(
    recognizer: Arc<dyn SpeechRecognizer>,
    matcher: PhraseMatcher,
    bus: SharedEventBus,
    cancel: CancellationToken,
) -> StepResult {
    let signal = voice::detect(recognizer, matcher, bus, cancel).await?;
    Ok(signal.map(|s| s.to_event()))
}

/// One probe. A successful call is held for the settle delay before it
/// counts, so the dialer has time to take over.
async fn run_probe(chain: ProbeChain, kind: ProbeKind, settle_delay: Duration) -> StepResult {
    let outcome = chain.run(kind).await;
    if kind == ProbeKind::Call && outcome.is_ok() {
        tokio::time::sleep(settle_delay).await;
    }
    Ok(Some(outcome.to_event(kind)))
}

/// Intake failures re-present the form instead of escalating. The call runs
/// on its own task so a panicking endpoint is reported the same way.
async fn submit_form(intake: Arc<dyn IntakeEndpoint>, data: EmergencyFormData) -> StepResult {
    let submission = tokio::spawn(async move { intake.submit_form(&data).await });
    let reason = match submission.await {
        Ok(Ok(())) => return Ok(Some(EscalationEvent::FormSubmitted)),
        Ok(Err(e)) => {
            warn!(class = %e.class(), "Form submission failed: {e}");
            e.to_string()
        }
        Err(join_err) if join_err.is_panic() => {
            error!("Intake panicked during form submission");
            "intake panicked".to_string()
        }
        Err(join_err) => return Err(CollaboratorError::Cancelled(join_err.to_string())),
    };
    Ok(Some(EscalationEvent::FormSubmissionFailed { reason }))
}
