//! Voice activation detector and voice command validation.
//!
//! Speech sits behind `SpeechCapability`: a device without recognition is
//! `Unavailable` and the orchestrator downgrades to the fallback path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use coordination::events::{SessionNotice, SharedEventBus};
use coordination::voice::{PhraseMatcher, VoiceSignal};

use crate::errors::CollaboratorError;

/// Buffer between a recognizer and the detector loop.
const TRANSCRIPT_BUFFER: usize = 32;

/// Source of live transcript updates.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Push transcript updates into `updates` until `cancel` fires or the
    /// source runs dry. Returning closes the stream.
    async fn listen(
        &self,
        updates: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<(), CollaboratorError>;
}

/// Whether the device can recognise speech at all.
#[derive(Clone)]
pub enum SpeechCapability {
    Available(Arc<dyn SpeechRecognizer>),
    Unavailable,
}

impl SpeechCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl std::fmt::Debug for SpeechCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(_) => write!(f, "Available"),
            Self::Unavailable => write!(f, "Unavailable"),
        }
    }
}

/// Backend check run after the activation phrase.
#[async_trait]
pub trait VoiceCommandValidator: Send + Sync {
    async fn validate_voice_command(&self) -> Result<bool, CollaboratorError>;
}

/// Validator with a fixed answer and latency.
pub struct SimulatedValidator {
    valid: bool,
    latency: Duration,
}

impl SimulatedValidator {
    pub fn new(valid: bool, latency: Duration) -> Self {
        Self { valid, latency }
    }
}

#[async_trait]
impl VoiceCommandValidator for SimulatedValidator {
    async fn validate_voice_command(&self) -> Result<bool, CollaboratorError> {
        tokio::time::sleep(self.latency).await;
        debug!(valid = self.valid, "Simulated voice command validation");
        Ok(self.valid)
    }
}

/// Recognizer that replays a fixed script of `(delay, transcript)` pairs.
pub struct ScriptedRecognizer {
    script: Vec<(Duration, String)>,
}

impl ScriptedRecognizer {
    pub fn new<S: Into<String>>(script: impl IntoIterator<Item = (Duration, S)>) -> Self {
        Self {
            script: script.into_iter().map(|(d, s)| (d, s.into())).collect(),
        }
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn listen(
        &self,
        updates: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<(), CollaboratorError> {
        for (delay, text) in &self.script {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(*delay) => {}
            }
            if updates.send(text.clone()).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Recognizer fed from outside (the console view types what was "heard").
///
/// Lines fed while nobody listens are dropped.
pub struct RelayRecognizer {
    feed: broadcast::Sender<String>,
}

impl RelayRecognizer {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(TRANSCRIPT_BUFFER);
        Self { feed }
    }

    pub fn feed(&self, transcript: impl Into<String>) {
        let _ = self.feed.send(transcript.into());
    }
}

impl Default for RelayRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechRecognizer for RelayRecognizer {
    async fn listen(
        &self,
        updates: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<(), CollaboratorError> {
        let mut feed = self.feed.subscribe();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                line = feed.recv() => match line {
                    Ok(text) => {
                        if updates.send(text).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Transcript relay lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                },
            }
        }
    }
}

/// Run the detector until the first phrase match.
///
/// Every transcript update is published for the view. Returns `Ok(None)`
/// when the recognizer stops without a match; a recognizer error is
/// returned as-is.
pub async fn detect(
    recognizer: Arc<dyn SpeechRecognizer>,
    mut matcher: PhraseMatcher,
    bus: SharedEventBus,
    cancel: CancellationToken,
) -> Result<Option<VoiceSignal>, CollaboratorError> {
    let (tx, mut rx) = mpsc::channel(TRANSCRIPT_BUFFER);
    let listen_cancel = cancel.child_token();
    let listener = {
        let cancel = listen_cancel.clone();
        tokio::spawn(async move { recognizer.listen(tx, cancel).await })
    };

    while let Some(text) = rx.recv().await {
        bus.publish(SessionNotice::TranscriptUpdated { text: text.clone() });
        if let Some(signal) = matcher.observe(&text) {
            info!(?signal, "Voice phrase matched");
            listen_cancel.cancel();
            return Ok(Some(signal));
        }
    }

    match listener.await {
        Ok(result) => result.map(|()| None),
        Err(join_err) => Err(CollaboratorError::Internal(anyhow::anyhow!(
            "speech recognizer task failed: {join_err}"
        ))),
    }
}
