//! Activation phrase matching for the voice detector.

use serde::{Deserialize, Serialize};

use crate::escalation::EscalationEvent;

pub const DEFAULT_ACTIVATION_PHRASE: &str = "sí";
pub const DEFAULT_DEACTIVATION_PHRASE: &str = "no";

/// What the detector heard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceSignal {
    Activated,
    Deactivated,
}

impl VoiceSignal {
    pub fn to_event(self) -> EscalationEvent {
        match self {
            Self::Activated => EscalationEvent::Activated,
            Self::Deactivated => EscalationEvent::Deactivated,
        }
    }
}

/// Case-insensitive substring matcher over live transcript updates.
///
/// Activation is checked before deactivation. The first match disarms the
/// matcher, so at most one signal is produced.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    activation: String,
    deactivation: String,
    armed: bool,
}

impl PhraseMatcher {
    pub fn new(activation: &str, deactivation: &str) -> Self {
        Self {
            activation: activation.trim().to_lowercase(),
            deactivation: deactivation.trim().to_lowercase(),
            armed: true,
        }
    }

    /// Feed the latest transcript (the whole text so far, or a fragment).
    pub fn observe(&mut self, transcript: &str) -> Option<VoiceSignal> {
        if !self.armed {
            return None;
        }
        let heard = transcript.to_lowercase();
        let signal = if matches_phrase(&heard, &self.activation) {
            VoiceSignal::Activated
        } else if matches_phrase(&heard, &self.deactivation) {
            VoiceSignal::Deactivated
        } else {
            return None;
        };
        self.armed = false;
        Some(signal)
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl Default for PhraseMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVATION_PHRASE, DEFAULT_DEACTIVATION_PHRASE)
    }
}

fn matches_phrase(heard: &str, phrase: &str) -> bool {
    !phrase.is_empty() && heard.contains(phrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_phrase() {
        let mut matcher = PhraseMatcher::default();
        assert_eq!(matcher.observe("um"), None);
        assert_eq!(matcher.observe("Sí, ayuda"), Some(VoiceSignal::Activated));
        assert!(!matcher.is_armed());
    }

    #[test]
    fn test_emits_once_then_disarms() {
        let mut matcher = PhraseMatcher::default();
        assert_eq!(matcher.observe("sí"), Some(VoiceSignal::Activated));
        assert_eq!(matcher.observe("sí sí"), None);
        assert_eq!(matcher.observe("no"), None);
    }

    #[test]
    fn test_activation_checked_first() {
        let mut matcher = PhraseMatcher::default();
        assert_eq!(matcher.observe("no sé, sí"), Some(VoiceSignal::Activated));
    }

    #[test]
    fn test_deactivation() {
        let mut matcher = PhraseMatcher::new("help", "NO THANKS");
        assert_eq!(
            matcher.observe("no thanks, I'm fine"),
            Some(VoiceSignal::Deactivated)
        );
        assert_eq!(VoiceSignal::Deactivated.to_event(), EscalationEvent::Deactivated);
    }

    #[test]
    fn test_disarmed_matcher_is_silent() {
        let mut matcher = PhraseMatcher::default();
        matcher.disarm();
        assert_eq!(matcher.observe("sí"), None);
    }

    #[test]
    fn test_empty_phrase_never_matches() {
        let mut matcher = PhraseMatcher::new("", "stop");
        assert_eq!(matcher.observe("anything"), None);
        assert_eq!(matcher.observe("stop"), Some(VoiceSignal::Deactivated));
    }
}
