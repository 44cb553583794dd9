//! Probe Chain — ordered coverage → SIM → call checks
//!
//! Each probe runs only after the previous one resolved `ok`. A failure or an
//! error short-circuits the rest of the chain.
//!
//! ```text
//! coverage ──ok──▶ sim ──ok──▶ call ──ok──▶ (done)
//!    │ fail         │ fail       │ fail
//!    └──────────────┴────────────┴────────▶ stop
//! ```
//!
//! The async runner lives in the runtime crate; this module holds the order,
//! the outcome types and the mapping onto escalation events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::escalation::EscalationEvent;

/// One link of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Coverage,
    Sim,
    Call,
}

impl ProbeKind {
    /// Chain order.
    pub const CHAIN: [ProbeKind; 3] = [Self::Coverage, Self::Sim, Self::Call];

    /// Probe that runs after this one succeeds.
    pub fn next(self) -> Option<ProbeKind> {
        match self {
            Self::Coverage => Some(Self::Sim),
            Self::Sim => Some(Self::Call),
            Self::Call => None,
        }
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coverage => write!(f, "coverage"),
            Self::Sim => write!(f, "sim"),
            Self::Call => write!(f, "call"),
        }
    }
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Ok,
    /// The probe answered no.
    Fail,
    /// The probe itself errored or was rejected.
    Error { reason: String },
}

impl ProbeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Escalation event for `kind` resolving with this outcome.
    pub fn to_event(&self, kind: ProbeKind) -> EscalationEvent {
        match (kind, self) {
            (ProbeKind::Coverage, Self::Ok) => EscalationEvent::CoverageOk,
            (ProbeKind::Coverage, Self::Fail) => EscalationEvent::CoverageFailed,
            (ProbeKind::Sim, Self::Ok) => EscalationEvent::SimValid,
            (ProbeKind::Sim, Self::Fail) => EscalationEvent::SimInvalid,
            (ProbeKind::Call, Self::Ok) => EscalationEvent::CallInitiated,
            (ProbeKind::Call, Self::Fail) => EscalationEvent::CallFailed,
            (_, Self::Error { reason }) => EscalationEvent::StepFailed {
                reason: format!("{kind} probe: {reason}"),
            },
        }
    }
}

/// One executed probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeStep {
    pub kind: ProbeKind,
    pub outcome: ProbeOutcome,
    pub completed_at: DateTime<Utc>,
}

/// What ran and how it ended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainReport {
    pub steps: Vec<ProbeStep>,
}

impl ChainReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of the next probe.
    pub fn record(&mut self, kind: ProbeKind, outcome: ProbeOutcome) {
        self.steps.push(ProbeStep {
            kind,
            outcome,
            completed_at: Utc::now(),
        });
    }

    /// Probe that should run next, or `None` if the chain is finished or
    /// short-circuited.
    pub fn next_probe(&self) -> Option<ProbeKind> {
        match self.steps.last() {
            None => Some(ProbeKind::Coverage),
            Some(step) if step.outcome.is_ok() => step.kind.next(),
            Some(_) => None,
        }
    }

    /// Every probe in the chain resolved `ok`.
    pub fn succeeded(&self) -> bool {
        self.steps.len() == ProbeKind::CHAIN.len() && self.steps.iter().all(|s| s.outcome.is_ok())
    }

    /// The probe that stopped the chain, if any.
    pub fn failed_at(&self) -> Option<ProbeKind> {
        self.steps
            .iter()
            .find(|s| !s.outcome.is_ok())
            .map(|s| s.kind)
    }

    pub fn executed(&self) -> Vec<ProbeKind> {
        self.steps.iter().map(|s| s.kind).collect()
    }

    /// Escalation events the chain would have produced, in order.
    pub fn events(&self) -> Vec<EscalationEvent> {
        self.steps.iter().map(|s| s.outcome.to_event(s.kind)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_order() {
        assert_eq!(ProbeKind::Coverage.next(), Some(ProbeKind::Sim));
        assert_eq!(ProbeKind::Sim.next(), Some(ProbeKind::Call));
        assert_eq!(ProbeKind::Call.next(), None);
    }

    #[test]
    fn test_failure_short_circuits() {
        let mut report = ChainReport::new();
        assert_eq!(report.next_probe(), Some(ProbeKind::Coverage));

        report.record(ProbeKind::Coverage, ProbeOutcome::Fail);
        assert_eq!(report.next_probe(), None);
        assert_eq!(report.failed_at(), Some(ProbeKind::Coverage));
        assert_eq!(report.executed(), vec![ProbeKind::Coverage]);
        assert_eq!(report.events(), vec![EscalationEvent::CoverageFailed]);
        assert!(!report.succeeded());
    }

    #[test]
    fn test_full_chain() {
        let mut report = ChainReport::new();
        while let Some(kind) = report.next_probe() {
            report.record(kind, ProbeOutcome::Ok);
        }
        assert!(report.succeeded());
        assert_eq!(
            report.events(),
            vec![
                EscalationEvent::CoverageOk,
                EscalationEvent::SimValid,
                EscalationEvent::CallInitiated,
            ]
        );
    }

    #[test]
    fn test_error_maps_to_step_failed() {
        let event = ProbeOutcome::Error {
            reason: "connection reset".into(),
        }
        .to_event(ProbeKind::Sim);
        assert_eq!(
            event,
            EscalationEvent::StepFailed {
                reason: "sim probe: connection reset".into()
            }
        );
    }
}
