//! AutoRescue runtime.
//!
//! Drives the `coordination` escalation machine on tokio: collaborator
//! traits and their HTTP/simulated implementations, the chat session task,
//! the voice detector, the probe chain runner and the orchestrator loop.

pub mod assistant;
pub mod chat;
pub mod config;
pub mod errors;
pub mod intake;
pub mod orchestrator;
pub mod probes;
pub mod telemetry;
pub mod voice;

pub use errors::{CollaboratorError, ErrorClass};
pub use orchestrator::{Collaborators, FormInput, Orchestrator, OrchestratorHandle, UserInput};
