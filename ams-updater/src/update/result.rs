//! Failure accounting for a single run.

use crate::utils::UpdateError;
use serde::Serialize;
use std::fmt;

pub const EXIT_COMMITTED: u8 = 0;
pub const EXIT_ROLLED_BACK: u8 = 2;
pub const EXIT_FATAL: u8 = 3;

/// Pipeline phases that record per-item failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Migration,
    PackageInstall,
    FileDeploy,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Migration => "migration",
            Phase::PackageInstall => "package_install",
            Phase::FileDeploy => "file_deploy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub phase: Phase,
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Committed,
    RolledBack,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Committed => EXIT_COMMITTED,
            Outcome::RolledBack => EXIT_ROLLED_BACK,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResult {
    failure_count: usize,
    failures: Vec<Failure>,
    outcome: Option<Outcome>,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one caught item failure.
    pub fn record(&mut self, phase: Phase, error: UpdateError) {
        let (target, message) = match error {
            UpdateError::Migration { target, message }
            | UpdateError::PackageInstall { target, message }
            | UpdateError::FileDeploy { target, message } => (target, message),
            other => (phase.to_string(), other.to_string()),
        };

        tracing::warn!(%phase, item = %target, "{}", message);

        self.failure_count += 1;
        self.failures.push(Failure {
            phase,
            target,
            message,
        });
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn failures_in(&self, phase: Phase) -> usize {
        self.failures.iter().filter(|f| f.phase == phase).count()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub(crate) fn set_outcome(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }
}
