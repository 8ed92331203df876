//! Run phases
//!
//! A run moves strictly forward through [`RunPhase`]. The two waiting
//! phases may be re-entered while their poller retries.

use crate::error::{ProvisionError, Result};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunPhase {
    BootstrappingState,
    ApplyingInfra,
    DeterminingClusterExistence,
    GeneratingClusterSpec,
    FinalizingInfra,
    AwaitingConvergence,
    ApplyingClusterResources,
    AwaitingAuthReadiness,
    Complete,
}

impl RunPhase {
    pub const ALL: [RunPhase; 9] = [
        RunPhase::BootstrappingState,
        RunPhase::ApplyingInfra,
        RunPhase::DeterminingClusterExistence,
        RunPhase::GeneratingClusterSpec,
        RunPhase::FinalizingInfra,
        RunPhase::AwaitingConvergence,
        RunPhase::ApplyingClusterResources,
        RunPhase::AwaitingAuthReadiness,
        RunPhase::Complete,
    ];

    pub fn next(self) -> Option<RunPhase> {
        let index = Self::ALL.iter().position(|p| *p == self)?;
        Self::ALL.get(index + 1).copied()
    }

    /// Phases that loop on themselves until their exit condition holds.
    pub fn is_retry_state(self) -> bool {
        matches!(
            self,
            RunPhase::AwaitingConvergence | RunPhase::AwaitingAuthReadiness
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            RunPhase::BootstrappingState => "bootstrapping state",
            RunPhase::ApplyingInfra => "applying infra",
            RunPhase::DeterminingClusterExistence => "determining cluster existence",
            RunPhase::GeneratingClusterSpec => "generating cluster spec",
            RunPhase::FinalizingInfra => "finalizing infra",
            RunPhase::AwaitingConvergence => "awaiting convergence",
            RunPhase::ApplyingClusterResources => "applying cluster resources",
            RunPhase::AwaitingAuthReadiness => "awaiting auth readiness",
            RunPhase::Complete => "complete",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Enforces forward-only movement and records the phases a run visited.
#[derive(Debug, Default)]
pub struct PhaseTracker {
    visited: Vec<RunPhase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<RunPhase> {
        self.visited.last().copied()
    }

    pub fn visited(&self) -> &[RunPhase] {
        &self.visited
    }

    pub fn advance(&mut self, to: RunPhase) -> Result<()> {
        let allowed = match self.current() {
            None => to == RunPhase::BootstrappingState,
            Some(from) if from == to => from.is_retry_state(),
            Some(from) => from.next() == Some(to),
        };

        if !allowed {
            return Err(ProvisionError::InvalidTransition {
                from: self
                    .current()
                    .map_or_else(|| "start".to_string(), |p| p.to_string()),
                to,
            });
        }

        if self.current() != Some(to) {
            debug!(phase = %to, "Entering phase");
            self.visited.push(to);
        }
        Ok(())
    }
}
