//! Escalation State Machine — the single writer of `AppState`.
//!
//! Wraps the pure table in `engine` with:
//! 1. A generation counter, bumped on every state change, so callbacks from
//!    a component that was already torn down can be recognised and dropped.
//! 2. The `ProcessingContext` for `processing` / `checking_coverage`.
//! 3. A transition log for telemetry and diagnostics.
//!
//! The orchestrator feeds every event through `handle` (user input) or
//! `handle_from` (component output tagged with its generation) and performs
//! the returned actions.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::escalation::engine::{self, Action, Reaction, SIM_STATUS_MESSAGE};
use crate::escalation::state::{AppState, EscalationEvent, ProcessingContext};
use crate::events::types::Notice;

/// A single recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The state transitioned from.
    pub from: AppState,
    /// The state transitioned to.
    pub to: AppState,
    /// Kind of the event that caused it.
    pub event: String,
    /// Generation of the new state.
    pub generation: u64,
    /// Milliseconds since the machine was created.
    pub elapsed_ms: u64,
    /// Failure reason carried by the event, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of feeding one event to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Event came from a generation that is no longer active.
    Stale { event_generation: u64, current: u64 },
    /// Event not accepted in the current state.
    Ignored { state: AppState },
    /// Accepted without a state change.
    Internal {
        state: AppState,
        actions: Vec<Action>,
        notice: Option<Notice>,
    },
    /// The state changed. Run `exit` first, then `entry`.
    Transitioned {
        from: AppState,
        to: AppState,
        generation: u64,
        exit: Vec<Action>,
        entry: Vec<Action>,
        notice: Option<Notice>,
    },
}

impl Outcome {
    /// Whether `AppState` changed.
    pub fn is_transition(&self) -> bool {
        matches!(self, Self::Transitioned { .. })
    }
}

/// The escalation state machine.
pub struct EscalationStateMachine {
    current: AppState,
    generation: u64,
    context: Option<ProcessingContext>,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl EscalationStateMachine {
    /// Create a new machine at `Initial`, generation 0.
    pub fn new() -> Self {
        Self {
            current: AppState::Initial,
            generation: 0,
            context: None,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    /// Get the current state.
    pub fn current(&self) -> AppState {
        self.current
    }

    /// Generation of the active state.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Loading-screen context, only while processing / checking coverage.
    pub fn context(&self) -> Option<&ProcessingContext> {
        self.context.as_ref()
    }

    /// Feed an event that is not bound to a component (user input).
    pub fn handle(&mut self, event: EscalationEvent) -> Outcome {
        match engine::react(self.current, &event) {
            Reaction::Ignore => {
                tracing::debug!(state = %self.current, event = event.kind(), "Event ignored");
                Outcome::Ignored {
                    state: self.current,
                }
            }
            Reaction::Stay(actions) => {
                let notice = engine::notice_for(self.current, &event);
                if self.current == AppState::CheckingCoverage
                    && event == EscalationEvent::CoverageOk
                {
                    if let Some(ctx) = self.context.as_mut() {
                        ctx.message = SIM_STATUS_MESSAGE.to_string();
                    }
                }
                tracing::debug!(state = %self.current, event = event.kind(), "Internal step");
                Outcome::Internal {
                    state: self.current,
                    actions,
                    notice,
                }
            }
            Reaction::Move(to) => self.advance(to, event),
        }
    }

    /// Feed an event emitted by a component spawned under `generation`.
    ///
    /// Events from an older generation are dropped without touching the state.
    pub fn handle_from(&mut self, generation: u64, event: EscalationEvent) -> Outcome {
        if generation != self.generation {
            tracing::debug!(
                state = %self.current,
                event = event.kind(),
                event_generation = generation,
                current_generation = self.generation,
                "Stale event discarded"
            );
            return Outcome::Stale {
                event_generation: generation,
                current: self.generation,
            };
        }
        self.handle(event)
    }

    fn advance(&mut self, to: AppState, event: EscalationEvent) -> Outcome {
        let from = self.current;
        let notice = engine::notice_for(from, &event);
        let exit = engine::exit_actions(from);
        let entry = engine::entry_actions(to, &event);

        self.generation += 1;
        self.current = to;
        self.context =
            engine::status_message(to).map(|msg| ProcessingContext::new(msg, event.clone()));

        let reason = match &event {
            EscalationEvent::StepFailed { reason }
            | EscalationEvent::FormSubmissionFailed { reason } => Some(reason.clone()),
            _ => None,
        };

        tracing::info!(
            from = %from,
            to = %to,
            event = event.kind(),
            generation = self.generation,
            "State transition"
        );

        self.transitions.push(TransitionRecord {
            from,
            to,
            event: event.kind().to_string(),
            generation: self.generation,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason,
        });

        Outcome::Transitioned {
            from,
            to,
            generation: self.generation,
            exit,
            entry,
            notice,
        }
    }

    /// Get the full transition log.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Milliseconds since the machine was created.
    pub fn elapsed_ms(&self) -> u64 {
        self.created_at.elapsed().as_millis() as u64
    }

    /// Get a summary string of the machine's history.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        format!(
            "{} → {} ({}ms, {} transitions)",
            AppState::Initial,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        ) + if states.is_empty() {
            String::new()
        } else {
            format!(" [{}]", states.join(" → "))
        }
        .as_str()
    }
}

impl Default for EscalationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeKind;

    fn machine_at(state: AppState) -> EscalationStateMachine {
        EscalationStateMachine {
            current: state,
            generation: 7,
            context: None,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    #[test]
    fn test_initial_state() {
        let sm = EscalationStateMachine::new();
        assert_eq!(sm.current(), AppState::Initial);
        assert_eq!(sm.generation(), 0);
        assert!(sm.context().is_none());
        assert!(sm.transitions().is_empty());
    }

    #[test]
    fn test_voice_activation_path() {
        let mut sm = EscalationStateMachine::new();
        sm.handle(EscalationEvent::Start);
        let outcome = sm.handle_from(1, EscalationEvent::Activated);

        match outcome {
            Outcome::Transitioned {
                from,
                to,
                exit,
                entry,
                ..
            } => {
                assert_eq!(from, AppState::Listening);
                assert_eq!(to, AppState::Processing);
                assert_eq!(exit, vec![Action::DisarmVoice]);
                assert_eq!(entry, vec![Action::ValidateVoiceCommand]);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let ctx = sm.context().unwrap();
        assert_eq!(ctx.trigger, EscalationEvent::Activated);
        assert_eq!(ctx.message, "Verifying your request...");

        sm.handle_from(2, EscalationEvent::VoiceCommandValid);
        assert_eq!(sm.current(), AppState::Chat);
        assert!(sm.context().is_none());
    }

    #[test]
    fn test_generation_bumps_on_every_transition() {
        let mut sm = EscalationStateMachine::new();
        sm.handle(EscalationEvent::Start);
        assert_eq!(sm.generation(), 1);
        sm.handle(EscalationEvent::Deactivated);
        assert_eq!(sm.generation(), 2);
        // Ignored events leave the generation alone.
        sm.handle(EscalationEvent::FormSubmitted);
        assert_eq!(sm.generation(), 2);
    }

    #[test]
    fn test_stale_probe_result_is_discarded() {
        let mut sm = EscalationStateMachine::new();
        sm.handle(EscalationEvent::Start);
        sm.handle(EscalationEvent::Deactivated);
        sm.handle(EscalationEvent::VoiceCommandInvalid);
        assert_eq!(sm.current(), AppState::CheckingCoverage);
        let probe_generation = sm.generation();

        // Coverage probe errors out and we move on to the form...
        sm.handle_from(
            probe_generation,
            EscalationEvent::StepFailed {
                reason: "timeout".into(),
            },
        );
        assert_eq!(sm.current(), AppState::EmergencyForm);

        // ...then a slow duplicate resolution from the old probe arrives.
        let outcome = sm.handle_from(probe_generation, EscalationEvent::SimValid);
        assert_eq!(
            outcome,
            Outcome::Stale {
                event_generation: probe_generation,
                current: probe_generation + 1,
            }
        );
        assert_eq!(sm.current(), AppState::EmergencyForm);
        assert_eq!(sm.transitions().len(), 4);
    }

    #[test]
    fn test_coverage_ok_updates_status_without_new_generation() {
        let mut sm = machine_at(AppState::Listening);
        sm.handle(EscalationEvent::Deactivated);
        sm.handle(EscalationEvent::VoiceCommandInvalid);
        let generation = sm.generation();
        assert_eq!(sm.context().unwrap().message, "Checking device coverage...");

        let outcome = sm.handle_from(generation, EscalationEvent::CoverageOk);
        match outcome {
            Outcome::Internal {
                actions, notice, ..
            } => {
                assert_eq!(actions, vec![Action::RunProbe(ProbeKind::Sim)]);
                assert_eq!(notice.unwrap().message, "Coverage available");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(sm.generation(), generation);
        assert_eq!(sm.context().unwrap().message, SIM_STATUS_MESSAGE);
    }

    #[test]
    fn test_ignored_event_reports_state() {
        let mut sm = machine_at(AppState::Chat);
        assert_eq!(
            sm.handle(EscalationEvent::Reset),
            Outcome::Ignored {
                state: AppState::Chat
            }
        );
        assert_eq!(sm.current(), AppState::Chat);
    }

    #[test]
    fn test_reset_from_completed() {
        let mut sm = machine_at(AppState::Completed);
        let outcome = sm.handle(EscalationEvent::Reset);
        assert!(outcome.is_transition());
        assert_eq!(sm.current(), AppState::Initial);
    }

    #[test]
    fn test_failure_reason_is_recorded() {
        let mut sm = machine_at(AppState::EmergencyCall);
        sm.handle(EscalationEvent::StepFailed {
            reason: "dialer crashed".into(),
        });
        let record = &sm.transitions()[0];
        assert_eq!(record.from, AppState::EmergencyCall);
        assert_eq!(record.to, AppState::EmergencyForm);
        assert_eq!(record.event, "step_failed");
        assert_eq!(record.reason.as_deref(), Some("dialer crashed"));
    }

    #[test]
    fn test_transition_record_serde_roundtrip() {
        let record = TransitionRecord {
            from: AppState::Chat,
            to: AppState::CheckingCoverage,
            event: "chat_timeout".into(),
            generation: 4,
            elapsed_ms: 65_000,
            reason: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("reason"));
        let restored: TransitionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.to, AppState::CheckingCoverage);
        assert_eq!(restored.generation, 4);
    }

    #[test]
    fn test_summary() {
        let mut sm = EscalationStateMachine::new();
        sm.handle(EscalationEvent::Start);
        sm.handle(EscalationEvent::Deactivated);
        let summary = sm.summary();
        assert!(summary.contains("processing"));
        assert!(summary.contains("2 transitions"));
    }
}
