//! Runtime configuration.
//!
//! Loaded from an optional TOML file, then overridden by `RESCUE_*`
//! environment variables. Every section has defaults so an empty file (or no
//! file) gives a working simulated setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use coordination::voice::{DEFAULT_ACTIVATION_PHRASE, DEFAULT_DEACTIVATION_PHRASE};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RescueConfig {
    pub voice: VoiceConfig,
    pub chat: ChatConfig,
    pub call: CallConfig,
    pub endpoints: EndpointsConfig,
    pub simulation: SimulationConfig,
    pub telemetry: TelemetryConfig,
}

/// Activation / deactivation phrases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub activation_phrase: String,
    pub deactivation_phrase: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            activation_phrase: DEFAULT_ACTIVATION_PHRASE.to_string(),
            deactivation_phrase: DEFAULT_DEACTIVATION_PHRASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub inactivity_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub welcome_message: String,
    /// Assistant reply after an accepted image.
    pub image_ack_message: String,
    /// Substring in an assistant reply meaning the incident data is captured.
    pub completion_marker: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 60,
            poll_interval_secs: 5,
            welcome_message: "Hola, soy AutoRescue. ¿En qué puedo ayudarte con el accidente?"
                .to_string(),
            image_ack_message: "He recibido su imagen del accidente. ¿Puede proporcionarme más detalles sobre lo ocurrido?".to_string(),
            completion_marker: "[[INCIDENT_CAPTURED]]".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub emergency_number: String,
    /// Delay between a successful dial and `completed`.
    pub settle_delay_ms: u64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            emergency_number: "112".to_string(),
            settle_delay_ms: 2000,
        }
    }
}

/// Remote collaborators. Unset URLs fall back to local implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub assistant_url: Option<String>,
    pub assistant_api_key: Option<String>,
    pub chatbot_id: Option<String>,
    pub intake_url: Option<String>,
    /// Upper bound for any single collaborator call.
    pub request_timeout_ms: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            assistant_url: None,
            assistant_api_key: None,
            chatbot_id: None,
            intake_url: None,
            request_timeout_ms: 10_000,
        }
    }
}

/// Fixed outcomes for the simulated collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub speech_available: bool,
    pub voice_command_valid: bool,
    pub coverage: bool,
    pub sim_valid: bool,
    pub call_succeeds: bool,
    pub latency_ms: u64,
    pub intake_latency_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            speech_available: true,
            voice_command_valid: true,
            coverage: true,
            sim_valid: true,
            call_succeeds: true,
            latency_ms: 1500,
            intake_latency_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// JSONL file receiving one summary line per session.
    pub path: Option<PathBuf>,
}

impl RescueConfig {
    /// Load from `path` (if given), apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .context(format!("Failed to read {}", path.display()))?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse rescue config TOML")
    }

    /// Apply `RESCUE_*` overrides from `lookup` (normally the process env).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("RESCUE_ASSISTANT_URL") {
            self.endpoints.assistant_url = Some(url);
        }
        if let Some(key) = get("RESCUE_ASSISTANT_API_KEY") {
            self.endpoints.assistant_api_key = Some(key);
        }
        if let Some(id) = get("RESCUE_CHATBOT_ID") {
            self.endpoints.chatbot_id = Some(id);
        }
        if let Some(url) = get("RESCUE_INTAKE_URL") {
            self.endpoints.intake_url = Some(url);
        }
        if let Some(number) = get("RESCUE_EMERGENCY_NUMBER") {
            self.call.emergency_number = number;
        }
        if let Some(path) = get("RESCUE_TELEMETRY_PATH") {
            self.telemetry.path = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chat.inactivity_timeout_secs == 0 {
            bail!("chat.inactivity_timeout_secs must be greater than zero");
        }
        if self.chat.poll_interval_secs == 0
            || self.chat.poll_interval_secs > self.chat.inactivity_timeout_secs
        {
            bail!(
                "chat.poll_interval_secs must be between 1 and {}",
                self.chat.inactivity_timeout_secs
            );
        }
        if self.call.emergency_number.trim().is_empty() {
            bail!("call.emergency_number must not be empty");
        }
        if self.voice.activation_phrase.trim().is_empty()
            && self.voice.deactivation_phrase.trim().is_empty()
        {
            bail!("at least one voice phrase must be configured");
        }
        if self.endpoints.assistant_url.is_some() && self.endpoints.chatbot_id.is_none() {
            bail!("endpoints.chatbot_id is required when assistant_url is set");
        }
        Ok(())
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.chat.inactivity_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.chat.poll_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.call.settle_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoints.request_timeout_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RescueConfig::default();
        assert_eq!(config.voice.activation_phrase, "sí");
        assert_eq!(config.voice.deactivation_phrase, "no");
        assert_eq!(config.inactivity_timeout(), Duration::from_secs(60));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.call.emergency_number, "112");
        assert_eq!(config.simulation.latency_ms, 1500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RescueConfig::from_toml_str(
            r#"
[voice]
activation_phrase = "help"

[call]
settle_delay_ms = 500

[simulation]
coverage = false
"#,
        )
        .unwrap();
        assert_eq!(config.voice.activation_phrase, "help");
        assert_eq!(config.voice.deactivation_phrase, "no");
        assert_eq!(config.call.emergency_number, "112");
        assert_eq!(config.settle_delay(), Duration::from_millis(500));
        assert!(!config.simulation.coverage);
        assert!(config.simulation.sim_valid);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RESCUE_ASSISTANT_URL", "https://assistant.test/api/v1/chat"),
            ("RESCUE_CHATBOT_ID", "bot-42"),
            ("RESCUE_EMERGENCY_NUMBER", "911"),
            ("RESCUE_INTAKE_URL", "   "),
        ]);
        let mut config = RescueConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.endpoints.assistant_url.as_deref(),
            Some("https://assistant.test/api/v1/chat")
        );
        assert_eq!(config.endpoints.chatbot_id.as_deref(), Some("bot-42"));
        assert_eq!(config.call.emergency_number, "911");
        // Blank values are ignored.
        assert!(config.endpoints.intake_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = RescueConfig::default();
        config.chat.poll_interval_secs = 120;
        assert!(config.validate().is_err());

        let mut config = RescueConfig::default();
        config.endpoints.assistant_url = Some("https://assistant.test".into());
        assert!(config.validate().is_err());

        let mut config = RescueConfig::default();
        config.call.emergency_number = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rescue.toml");
        std::fs::write(&path, "[chat]\ninactivity_timeout_secs = 30\n").unwrap();

        let config = RescueConfig::load(Some(&path)).unwrap();
        assert_eq!(config.inactivity_timeout(), Duration::from_secs(30));

        assert!(RescueConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
