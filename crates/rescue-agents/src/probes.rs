//! Connectivity probes and the runner for the coverage → SIM → call chain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use coordination::probe::{ChainReport, ProbeKind, ProbeOutcome};

use crate::config::SimulationConfig;
use crate::errors::CollaboratorError;

/// Device-side checks. `Ok(false)` is a definite "no"; `Err` means the check
/// itself could not complete.
#[async_trait]
pub trait ConnectivityProbes: Send + Sync {
    async fn check_coverage(&self) -> Result<bool, CollaboratorError>;
    async fn validate_sim(&self) -> Result<bool, CollaboratorError>;
    async fn initiate_call(&self, number: &str) -> Result<bool, CollaboratorError>;
}

/// Probes with fixed, configured outcomes.
#[derive(Debug, Clone)]
pub struct SimulatedProbes {
    pub coverage: bool,
    pub sim_valid: bool,
    pub call_succeeds: bool,
    pub latency: Duration,
}

impl SimulatedProbes {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            coverage: config.coverage,
            sim_valid: config.sim_valid,
            call_succeeds: config.call_succeeds,
            latency: Duration::from_millis(config.latency_ms),
        }
    }
}

#[async_trait]
impl ConnectivityProbes for SimulatedProbes {
    async fn check_coverage(&self) -> Result<bool, CollaboratorError> {
        tokio::time::sleep(self.latency).await;
        Ok(self.coverage)
    }

    async fn validate_sim(&self) -> Result<bool, CollaboratorError> {
        tokio::time::sleep(self.latency).await;
        Ok(self.sim_valid)
    }

    async fn initiate_call(&self, number: &str) -> Result<bool, CollaboratorError> {
        info!(number, "Dialing emergency number (simulated)");
        tokio::time::sleep(self.latency).await;
        Ok(self.call_succeeds)
    }
}

/// Runs probes one at a time. A probe takes as long as it takes; leaving the
/// state is the only thing that cuts one short.
#[derive(Clone)]
pub struct ProbeChain {
    probes: Arc<dyn ConnectivityProbes>,
    emergency_number: String,
}

impl ProbeChain {
    pub fn new(probes: Arc<dyn ConnectivityProbes>, emergency_number: &str) -> Self {
        Self {
            probes,
            emergency_number: emergency_number.to_string(),
        }
    }

    /// Run a single probe.
    pub async fn run(&self, kind: ProbeKind) -> ProbeOutcome {
        let result = match kind {
            ProbeKind::Coverage => self.probes.check_coverage().await,
            ProbeKind::Sim => self.probes.validate_sim().await,
            ProbeKind::Call => self.probes.initiate_call(&self.emergency_number).await,
        };

        match result {
            Ok(true) => {
                debug!(probe = %kind, "Probe ok");
                ProbeOutcome::Ok
            }
            Ok(false) => {
                info!(probe = %kind, "Probe failed");
                ProbeOutcome::Fail
            }
            Err(e) => {
                warn!(probe = %kind, class = %e.class(), "Probe error: {e}");
                ProbeOutcome::Error {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Run the whole chain in order, stopping at the first non-ok outcome.
    pub async fn run_all(&self) -> ChainReport {
        let mut report = ChainReport::new();
        while let Some(kind) = report.next_probe() {
            let outcome = self.run(kind).await;
            report.record(kind, outcome);
        }
        report
    }
}
