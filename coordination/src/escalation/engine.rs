//! Escalation Engine — the transition table, entry/exit actions and notices
//!
//! Pure functions only: no timers, no I/O. The runtime owns the side effects
//! and feeds every outcome back in as an `EscalationEvent`.

use std::collections::{HashMap, VecDeque};

use crate::escalation::state::{AppState, EscalationEvent};
use crate::events::types::{Notice, NoticeLevel};
use crate::probe::ProbeKind;
use serde::{Deserialize, Serialize};

/// Side effect requested by the table. Performed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Start the voice activation detector.
    ArmVoice,
    /// Stop listening; late transcript callbacks are dropped.
    DisarmVoice,
    /// Ask the backend whether the voice command is valid.
    ValidateVoiceCommand,
    /// Skip validation and queue `VoiceCommandInvalid` (fallback path).
    DeclineAssistance,
    /// Start a fresh chat session.
    StartChat,
    /// Tear down the chat session and its inactivity timer.
    StopChat,
    /// Run one connectivity/identity probe.
    RunProbe(ProbeKind),
    /// Abandon any in-flight check (validation, probe, call settle timer).
    AbandonCheck,
    /// Create an empty form and show it.
    PresentForm,
    /// Show the current form again after a failed submission.
    RepresentForm,
    /// Drop the form data.
    DiscardForm,
}

/// What the table says about `(state, event)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Not accepted in this state; nothing changes.
    Ignore,
    /// Accepted without leaving the state (e.g. coverage ok → SIM probe).
    Stay(Vec<Action>),
    /// Leave for another state.
    Move(AppState),
}

/// Look up the table.
///
/// Every failure edge points further down the chain
/// (voice → chat → coverage → SIM → call → form), never back.
pub fn react(state: AppState, event: &EscalationEvent) -> Reaction {
    use AppState::*;
    use EscalationEvent as E;

    match (state, event) {
        (Initial, E::Start) => Reaction::Move(Listening),

        // A capability error while listening is the same as "no".
        (Listening, E::Activated | E::Deactivated | E::StepFailed { .. }) => {
            Reaction::Move(Processing)
        }

        (Processing, E::VoiceCommandValid) => Reaction::Move(Chat),
        (Processing, E::VoiceCommandInvalid | E::StepFailed { .. }) => {
            Reaction::Move(CheckingCoverage)
        }

        (Chat, E::ChatResolved) => Reaction::Move(Completed),
        (Chat, E::ChatTimeout | E::StepFailed { .. }) => Reaction::Move(CheckingCoverage),

        (CheckingCoverage, E::CoverageOk) => Reaction::Stay(vec![Action::RunProbe(ProbeKind::Sim)]),
        (CheckingCoverage, E::SimValid) => Reaction::Move(EmergencyCall),
        (CheckingCoverage, E::CoverageFailed | E::SimInvalid | E::StepFailed { .. }) => {
            Reaction::Move(EmergencyForm)
        }

        (EmergencyCall, E::CallInitiated) => Reaction::Move(Completed),
        (EmergencyCall, E::CallFailed | E::StepFailed { .. }) => Reaction::Move(EmergencyForm),

        // The form has no failure edge of its own.
        (EmergencyForm, E::FormSubmitted) => Reaction::Move(Completed),
        (EmergencyForm, E::FormSubmissionFailed { .. }) => {
            Reaction::Stay(vec![Action::RepresentForm])
        }

        (Completed, E::Reset) => Reaction::Move(Initial),

        _ => Reaction::Ignore,
    }
}

/// `transition(current, event) -> next`. Unaccepted events leave the state
/// unchanged.
pub fn transition(state: AppState, event: &EscalationEvent) -> AppState {
    match react(state, event) {
        Reaction::Move(next) => next,
        Reaction::Ignore | Reaction::Stay(_) => state,
    }
}

/// Actions run once when `state` becomes active. `trigger` is the event that
/// caused the entry.
pub fn entry_actions(state: AppState, trigger: &EscalationEvent) -> Vec<Action> {
    match state {
        AppState::Initial | AppState::Completed => Vec::new(),
        AppState::Listening => vec![Action::ArmVoice],
        AppState::Processing => match trigger {
            EscalationEvent::Activated => vec![Action::ValidateVoiceCommand],
            _ => vec![Action::DeclineAssistance],
        },
        AppState::Chat => vec![Action::StartChat],
        AppState::CheckingCoverage => vec![Action::RunProbe(ProbeKind::Coverage)],
        AppState::EmergencyCall => vec![Action::RunProbe(ProbeKind::Call)],
        AppState::EmergencyForm => vec![Action::PresentForm],
    }
}

/// Cleanup run once when `state` is left, whatever the event.
pub fn exit_actions(state: AppState) -> Vec<Action> {
    match state {
        AppState::Initial | AppState::Completed => Vec::new(),
        AppState::Listening => vec![Action::DisarmVoice],
        AppState::Processing | AppState::CheckingCoverage | AppState::EmergencyCall => {
            vec![Action::AbandonCheck]
        }
        AppState::Chat => vec![Action::StopChat],
        AppState::EmergencyForm => vec![Action::DiscardForm],
    }
}

/// Loading-screen text for states that carry a `ProcessingContext`.
pub fn status_message(state: AppState) -> Option<&'static str> {
    match state {
        AppState::Processing => Some("Verifying your request..."),
        AppState::CheckingCoverage => Some("Checking device coverage..."),
        _ => None,
    }
}

/// Status line once the coverage probe passed and the SIM probe is running.
pub const SIM_STATUS_MESSAGE: &str = "Validating SIM...";

/// User-facing notice for an accepted event. Sourced from the event (and the
/// state it arrived in) so the escalation reason is stated in one place.
pub fn notice_for(state: AppState, event: &EscalationEvent) -> Option<Notice> {
    use AppState::*;
    use EscalationEvent as E;

    let (level, message) = match (state, event) {
        (Initial, E::Start) => (
            NoticeLevel::Info,
            "Say the activation phrase to start emergency assistance".to_string(),
        ),
        (Listening, E::Activated) => (NoticeLevel::Info, "Activation phrase detected".to_string()),
        (Listening, E::Deactivated) => (
            NoticeLevel::Info,
            "Automated assistance declined. Starting fallback protocol.".to_string(),
        ),
        (Listening, E::StepFailed { .. }) => (
            NoticeLevel::Warning,
            "Voice recognition unavailable. Starting fallback protocol.".to_string(),
        ),
        (Processing, E::VoiceCommandValid) => (
            NoticeLevel::Success,
            "Command recognised. Starting assistance.".to_string(),
        ),
        (Processing, E::VoiceCommandInvalid) => (
            NoticeLevel::Error,
            "Could not validate your request. Starting fallback protocol.".to_string(),
        ),
        (Processing, E::StepFailed { .. }) => (
            NoticeLevel::Error,
            "Error processing your request. Starting fallback protocol.".to_string(),
        ),
        (Chat, E::ChatTimeout) => (
            NoticeLevel::Warning,
            "No activity in the chat. Checking device coverage.".to_string(),
        ),
        (Chat, E::StepFailed { .. }) => (
            NoticeLevel::Error,
            "Chat unavailable. Checking device coverage.".to_string(),
        ),
        (Chat, E::ChatResolved) => (
            NoticeLevel::Success,
            "Incident details captured. An agent will contact you.".to_string(),
        ),
        (CheckingCoverage, E::CoverageOk) => {
            (NoticeLevel::Success, "Coverage available".to_string())
        }
        (CheckingCoverage, E::CoverageFailed) => (
            NoticeLevel::Error,
            "No coverage available. Showing emergency form.".to_string(),
        ),
        (CheckingCoverage, E::SimValid) => (
            NoticeLevel::Success,
            "SIM valid. Starting emergency call...".to_string(),
        ),
        (CheckingCoverage, E::SimInvalid) => (
            NoticeLevel::Error,
            "Could not validate the SIM. Showing emergency form.".to_string(),
        ),
        (CheckingCoverage, E::StepFailed { .. }) => (
            NoticeLevel::Error,
            "Error checking coverage. Showing emergency form.".to_string(),
        ),
        (EmergencyCall, E::CallInitiated) => (
            NoticeLevel::Success,
            "Emergency call started. Help is on the way.".to_string(),
        ),
        (EmergencyCall, E::CallFailed | E::StepFailed { .. }) => (
            NoticeLevel::Error,
            "Could not place the call. Showing emergency form.".to_string(),
        ),
        (EmergencyForm, E::FormSubmitted) => (
            NoticeLevel::Success,
            "Information received. An agent will contact you.".to_string(),
        ),
        (EmergencyForm, E::FormSubmissionFailed { reason }) => (
            NoticeLevel::Error,
            format!("Could not send the form ({reason}). Please try again."),
        ),
        _ => return None,
    };

    Some(Notice { level, message })
}

/// Event kinds accepted in `state` (anything else is a no-op).
pub fn accepted_events(state: AppState) -> Vec<&'static str> {
    EscalationEvent::samples()
        .iter()
        .filter(|e| react(state, e) != Reaction::Ignore)
        .map(|e| e.kind())
        .collect()
}

/// Shortest sequence of state changes from `from` to `Completed`, ignoring
/// `Reset`. Returns `None` when `Completed` is unreachable.
pub fn shortest_path_to_completed(from: AppState) -> Option<Vec<AppState>> {
    let mut parents: HashMap<AppState, AppState> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    let mut seen = vec![from];

    while let Some(state) = queue.pop_front() {
        if state == AppState::Completed {
            let mut path = vec![state];
            let mut cursor = state;
            while let Some(parent) = parents.get(&cursor) {
                path.push(*parent);
                cursor = *parent;
            }
            path.reverse();
            return Some(path);
        }
        for next in successors(state) {
            if !seen.contains(&next) {
                seen.push(next);
                parents.insert(next, state);
                queue.push_back(next);
            }
        }
    }
    None
}

/// States reachable in one move, excluding `Reset`.
pub fn successors(state: AppState) -> Vec<AppState> {
    let mut out = Vec::new();
    for event in EscalationEvent::samples() {
        if event == EscalationEvent::Reset {
            continue;
        }
        if let Reaction::Move(next) = react(state, &event) {
            if !out.contains(&next) {
                out.push(next);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> EscalationEvent {
        EscalationEvent::StepFailed {
            reason: "boom".into(),
        }
    }

    #[test]
    fn test_happy_voice_path() {
        let mut state = AppState::Initial;
        for event in [
            EscalationEvent::Start,
            EscalationEvent::Activated,
            EscalationEvent::VoiceCommandValid,
            EscalationEvent::ChatResolved,
        ] {
            state = transition(state, &event);
        }
        assert_eq!(state, AppState::Completed);
    }

    #[test]
    fn test_invalid_events_are_noops() {
        for state in AppState::ALL {
            let accepted = accepted_events(state);
            for event in EscalationEvent::samples() {
                if !accepted.contains(&event.kind()) {
                    assert_eq!(
                        transition(state, &event),
                        state,
                        "{state} should ignore {}",
                        event.kind()
                    );
                    assert_eq!(react(state, &event), Reaction::Ignore);
                }
            }
        }
    }

    #[test]
    fn test_every_state_reaches_completed_within_four_hops() {
        for state in AppState::ALL {
            let path = shortest_path_to_completed(state)
                .unwrap_or_else(|| panic!("{state} has no path to completed"));
            assert!(
                path.len() - 1 <= 4,
                "{state} needs {} hops: {path:?}",
                path.len() - 1
            );
        }
    }

    #[test]
    fn test_graph_without_reset_is_acyclic() {
        // DFS colouring over the move graph.
        fn visit(state: AppState, stack: &mut Vec<AppState>, done: &mut Vec<AppState>) {
            assert!(!stack.contains(&state), "cycle through {state}: {stack:?}");
            if done.contains(&state) {
                return;
            }
            stack.push(state);
            for next in successors(state) {
                visit(next, stack, done);
            }
            stack.pop();
            done.push(state);
        }

        let mut done = Vec::new();
        for state in AppState::ALL {
            visit(state, &mut Vec::new(), &mut done);
        }
    }

    #[test]
    fn test_failure_edges_point_down_the_chain() {
        assert_eq!(
            transition(AppState::Listening, &failure()),
            AppState::Processing
        );
        assert_eq!(
            transition(AppState::Processing, &failure()),
            AppState::CheckingCoverage
        );
        assert_eq!(
            transition(AppState::Chat, &failure()),
            AppState::CheckingCoverage
        );
        assert_eq!(
            transition(AppState::CheckingCoverage, &failure()),
            AppState::EmergencyForm
        );
        assert_eq!(
            transition(AppState::EmergencyCall, &failure()),
            AppState::EmergencyForm
        );
        // The form never escalates further.
        assert_eq!(
            transition(AppState::EmergencyForm, &failure()),
            AppState::EmergencyForm
        );
    }

    #[test]
    fn test_coverage_ok_runs_sim_probe_in_place() {
        assert_eq!(
            react(AppState::CheckingCoverage, &EscalationEvent::CoverageOk),
            Reaction::Stay(vec![Action::RunProbe(ProbeKind::Sim)])
        );
        assert_eq!(
            transition(AppState::CheckingCoverage, &EscalationEvent::SimValid),
            AppState::EmergencyCall
        );
    }

    #[test]
    fn test_call_failure_never_returns_to_coverage() {
        assert_eq!(
            transition(AppState::EmergencyCall, &EscalationEvent::CallFailed),
            AppState::EmergencyForm
        );
    }

    #[test]
    fn test_processing_entry_depends_on_trigger() {
        assert_eq!(
            entry_actions(AppState::Processing, &EscalationEvent::Activated),
            vec![Action::ValidateVoiceCommand]
        );
        assert_eq!(
            entry_actions(AppState::Processing, &EscalationEvent::Deactivated),
            vec![Action::DeclineAssistance]
        );
        assert_eq!(
            entry_actions(AppState::Processing, &failure()),
            vec![Action::DeclineAssistance]
        );
    }

    #[test]
    fn test_every_active_state_has_teardown() {
        for state in AppState::ALL.into_iter().filter(|s| s.is_active()) {
            assert!(
                !exit_actions(state).is_empty(),
                "{state} has no exit action"
            );
        }
    }

    #[test]
    fn test_every_move_has_a_notice() {
        for state in AppState::ALL {
            for event in EscalationEvent::samples() {
                if event == EscalationEvent::Reset {
                    continue;
                }
                if let Reaction::Move(_) = react(state, &event) {
                    assert!(
                        notice_for(state, &event).is_some(),
                        "missing notice for {state} + {}",
                        event.kind()
                    );
                }
            }
        }
    }

    #[test]
    fn test_form_submission_failure_stays() {
        let event = EscalationEvent::FormSubmissionFailed {
            reason: "503".into(),
        };
        assert_eq!(
            react(AppState::EmergencyForm, &event),
            Reaction::Stay(vec![Action::RepresentForm])
        );
        let notice = notice_for(AppState::EmergencyForm, &event).unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.contains("503"));
    }
}
