//! The update run state machine.
//!
//! A run takes the lock, snapshots the live tree, then runs migrations,
//! package installs and file deployment to completion regardless of item
//! failures. Only the final evaluation looks at the failure count and decides
//! between committing and restoring the snapshot.

use crate::config::Config;
use crate::db::SchemaStore;
use crate::fs::Host;
use crate::manifest::{StagingArea, UpdateManifest};
use crate::update::backup::{BackupManager, BackupSnapshot};
use crate::update::context::RunContext;
use crate::update::deploy::FileDeployer;
use crate::update::lock::RunLock;
use crate::update::migrate::SchemaMigrator;
use crate::update::packages::PackageInstaller;
use crate::update::result::{Outcome, Phase, RunResult};
use crate::update::rollback::{RestoreStats, RollbackController};
use crate::utils::{Result, UpdateError};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    BackingUp,
    Migrating,
    InstallingPackages,
    DeployingFiles,
    Evaluating,
    Committed,
    RollingBack,
    Done,
    Fatal,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::BackingUp => "backing_up",
            RunState::Migrating => "migrating",
            RunState::InstallingPackages => "installing_packages",
            RunState::DeployingFiles => "deploying_files",
            RunState::Evaluating => "evaluating",
            RunState::Committed => "committed",
            RunState::RollingBack => "rolling_back",
            RunState::Done => "done",
            RunState::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Summary of a run that reached `Done`.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub target_version: String,
    pub snapshot: BackupSnapshot,
    pub result: RunResult,
    pub restore: Option<RestoreStats>,
    pub states: Vec<RunState>,
}

impl RunReport {
    pub fn outcome(&self) -> Outcome {
        self.result.outcome().unwrap_or(Outcome::RolledBack)
    }
}

pub struct UpdateOrchestrator<'a> {
    host: &'a dyn Host,
    config: &'a Config,
    state: RunState,
    history: Vec<RunState>,
}

impl<'a> UpdateOrchestrator<'a> {
    pub fn new(host: &'a dyn Host, config: &'a Config) -> Self {
        Self {
            host,
            config,
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// States visited by the most recent run, starting with `Idle`.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Execute one update run.
    ///
    /// `open_db` is called after the snapshot is taken so the database file is
    /// never open while it is being copied. Failing to open it is recorded as a
    /// migration failure and forces a rollback.
    ///
    /// Returns the report for runs ending in `Done`, committed or rolled back.
    /// A failed snapshot yields [`UpdateError::RunAborted`] and a failed
    /// restore yields [`UpdateError::Rollback`]; both leave the machine in
    /// `Fatal`. A held lock yields [`UpdateError::Locked`] and touches nothing.
    pub fn run<D, F>(
        &mut self,
        manifest: &UpdateManifest,
        staging: &StagingArea,
        open_db: F,
    ) -> Result<RunReport>
    where
        D: SchemaStore,
        F: FnOnce() -> Result<D>,
    {
        let config = self.config;
        let paths = &config.paths;
        let _lock = RunLock::acquire(&paths.lock_file)?;

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "update_run",
            %run_id,
            device = %config.device.id,
            version = %manifest.target_version
        );
        let _enter = span.enter();

        self.state = RunState::Idle;
        self.history = vec![RunState::Idle];
        tracing::info!(manifest = %manifest.summary(), "Starting update run");

        self.transition(RunState::BackingUp);
        let snapshot = match BackupManager::new(self.host, &paths.backup_root)
            .create_snapshot(&paths.live_root, &manifest.target_version)
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.transition(RunState::Fatal);
                tracing::error!(error = %e, "Snapshot failed, nothing was changed");
                return Err(UpdateError::RunAborted(e.to_string()));
            }
        };

        let mut result = RunResult::new();
        let db = match open_db() {
            Ok(db) => Some(db),
            Err(e) => {
                result.record(Phase::Migration, UpdateError::migration("database", e));
                None
            }
        };
        let mut ctx = RunContext::new(db, manifest, staging, result);

        self.transition(RunState::Migrating);
        SchemaMigrator::apply_all(&mut ctx);

        self.transition(RunState::InstallingPackages);
        PackageInstaller::from_config(self.host, config).install_all(&mut ctx);

        self.transition(RunState::DeployingFiles);
        FileDeployer::from_config(self.host, config).deploy(&mut ctx);

        self.transition(RunState::Evaluating);
        let RunContext { db, mut result, .. } = ctx;
        // the database lives in the tree that may be restored
        drop(db);

        let mut restore = None;
        if result.failure_count() == 0 {
            result.set_outcome(Outcome::Committed);
            self.transition(RunState::Committed);
        } else {
            tracing::warn!(failures = result.failure_count(), "Run had failures, rolling back");
            self.transition(RunState::RollingBack);
            match RollbackController::new(self.host).rollback(&snapshot, &paths.live_root) {
                Ok(stats) => {
                    result.set_outcome(Outcome::RolledBack);
                    restore = Some(stats);
                }
                Err(e) => {
                    self.transition(RunState::Fatal);
                    tracing::error!(
                        error = %e,
                        failures = result.failure_count(),
                        snapshot = %snapshot.destination_path.display(),
                        "Restore failed, manual recovery required"
                    );
                    return Err(e);
                }
            }
        }
        self.transition(RunState::Done);

        let report = RunReport {
            run_id,
            target_version: manifest.target_version.clone(),
            snapshot,
            result,
            restore,
            states: self.history.clone(),
        };

        match serde_json::to_string(&report) {
            Ok(summary) => tracing::info!(outcome = ?report.outcome(), %summary, "Update run finished"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize run summary"),
        }
        Ok(report)
    }

    fn transition(&mut self, next: RunState) {
        tracing::info!(from = %self.state, to = %next, "State change");
        self.state = next;
        self.history.push(next);
    }
}
