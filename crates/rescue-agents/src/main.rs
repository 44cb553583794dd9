use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use coordination::chat::MessageContent;
use coordination::escalation::AppState;
use coordination::events::SessionNotice;
use coordination::form::{FormField, ImageRef};
use rescue_agents::assistant::{ConversationalAssistant, HttpAssistant};
use rescue_agents::chat::ChatInput;
use rescue_agents::config::RescueConfig;
use rescue_agents::intake::{HttpIntake, IntakeEndpoint, LocalIntake};
use rescue_agents::probes::SimulatedProbes;
use rescue_agents::voice::{RelayRecognizer, SimulatedValidator, SpeechCapability};
use rescue_agents::{Collaborators, FormInput, Orchestrator, OrchestratorHandle};

/// Console front end for the AutoRescue escalation ladder.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = RescueConfig::load(cli.config.as_deref())?;
    info!(
        emergency_number = %config.call.emergency_number,
        assistant = config.endpoints.assistant_url.is_some(),
        intake = config.endpoints.intake_url.is_some(),
        "AutoRescue starting"
    );

    let relay = Arc::new(RelayRecognizer::new());
    let collaborators = build_collaborators(&config, relay.clone())?;
    let (handle, orchestrator) = Orchestrator::spawn(&config, collaborators);

    let printer = tokio::spawn(print_notices(handle.subscribe()));
    println!("AutoRescue ready. Type 'sos' to start, 'quit' to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "quit" {
            break;
        }
        if let Err(e) = route_line(&handle, &relay, line).await {
            warn!("Input not accepted: {e:#}");
        }
    }

    handle.shutdown().await;
    let transitions = orchestrator.await.context("orchestrator task failed")?;
    printer.abort();
    info!(transitions = transitions.len(), "AutoRescue stopped");
    Ok(())
}

fn build_collaborators(config: &RescueConfig, relay: Arc<RelayRecognizer>) -> Result<Collaborators> {
    let timeout = config.request_timeout();
    let latency = Duration::from_millis(config.simulation.latency_ms);

    let speech = if config.simulation.speech_available {
        SpeechCapability::Available(relay)
    } else {
        SpeechCapability::Unavailable
    };

    let assistant = HttpAssistant::from_config(&config.endpoints, timeout)?
        .map(|a| Arc::new(a) as Arc<dyn ConversationalAssistant>);
    if assistant.is_none() {
        warn!("No assistant endpoint configured; the chat step will fall through to the probes");
    }

    let intake: Arc<dyn IntakeEndpoint> = match config.endpoints.intake_url.as_deref() {
        Some(url) => Arc::new(HttpIntake::new(url, timeout)?),
        None => Arc::new(LocalIntake::new(Duration::from_millis(
            config.simulation.intake_latency_ms,
        ))),
    };

    Ok(Collaborators {
        speech,
        validator: Arc::new(SimulatedValidator::new(
            config.simulation.voice_command_valid,
            latency,
        )),
        assistant,
        probes: Arc::new(SimulatedProbes::from_config(&config.simulation)),
        intake,
    })
}

/// Interpret a console line according to the active screen.
async fn route_line(handle: &OrchestratorHandle, relay: &RelayRecognizer, line: &str) -> Result<()> {
    match handle.state() {
        AppState::Initial => handle.start().await?,
        AppState::Listening => relay.feed(line),
        AppState::Chat => {
            let input = match line.strip_prefix("/image ") {
                Some(path) => ChatInput::AttachImage(image_from_path(Path::new(path.trim()))?),
                None => ChatInput::Send(line.to_string()),
            };
            handle.chat(input).await?;
        }
        AppState::EmergencyForm => {
            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
            let input = match command {
                "plate" => FormInput::Edit {
                    field: FormField::LicensePlate,
                    value: rest.to_string(),
                },
                "id" => FormInput::Edit {
                    field: FormField::IdNumber,
                    value: rest.to_string(),
                },
                "desc" => FormInput::Edit {
                    field: FormField::Description,
                    value: rest.to_string(),
                },
                "image" => FormInput::AttachImage(image_from_path(Path::new(rest.trim()))?),
                "remove" => FormInput::RemoveImage(rest.trim().parse().context("image index")?),
                "submit" => FormInput::Submit,
                _ => {
                    println!("Form commands: plate <v> | id <v> | desc <text> | image <path> | remove <n> | submit");
                    return Ok(());
                }
            };
            handle.form(input).await?;
        }
        AppState::Completed => {
            if line == "reset" {
                handle.reset().await?;
            }
        }
        AppState::Processing | AppState::CheckingCoverage | AppState::EmergencyCall => {
            println!("Please wait...");
        }
    }
    Ok(())
}

fn image_from_path(path: &Path) -> Result<ImageRef> {
    let metadata =
        std::fs::metadata(path).context(format!("Failed to read {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let mime_type = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    };
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    Ok(ImageRef {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        mime_type: mime_type.to_string(),
        size_bytes: metadata.len(),
        uri: format!("file://{}", canonical.display()),
    })
}

/// The console "view": render every notice as a line.
async fn print_notices(mut notices: tokio::sync::broadcast::Receiver<SessionNotice>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        let notice = match notices.recv().await {
            Ok(notice) => notice,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return,
        };
        match notice {
            SessionNotice::StateChanged { to, .. } => {
                println!("== {to} ==");
                match to {
                    AppState::Listening => println!("Say 'sí' for assistance or 'no' to skip."),
                    AppState::EmergencyForm => println!(
                        "Form commands: plate <v> | id <v> | desc <text> | image <path> | remove <n> | submit"
                    ),
                    AppState::Completed => println!("Type 'reset' to start over."),
                    _ => {}
                }
            }
            SessionNotice::Notification { level, message, .. } => {
                println!("[{level}] {message}");
            }
            SessionNotice::ProcessingStatus { message } => println!("... {message}"),
            SessionNotice::TranscriptUpdated { text } => println!("(heard) {text}"),
            SessionNotice::ChatMessage { message } => match message.content {
                MessageContent::Text { text } => println!("{:?}: {text}", message.role),
                MessageContent::Image { image } => {
                    println!("{:?}: [image {}]", message.role, image.name)
                }
            },
            SessionNotice::FormPresented { data } => {
                println!(
                    "Form: plate='{}' id='{}' images={} description='{}'",
                    data.license_plate,
                    data.id_number,
                    data.images.len(),
                    data.description
                );
            }
            SessionNotice::FormRejected { errors } => {
                for error in errors {
                    println!("  ! {error}");
                }
            }
        }
    }
}
