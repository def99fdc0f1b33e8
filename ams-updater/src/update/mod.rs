//! The update pipeline: snapshot, migrate, install, deploy, then commit or
//! roll back.

pub mod backup;
pub mod context;
pub mod deploy;
pub mod lock;
pub mod migrate;
pub mod orchestrator;
pub mod packages;
pub mod result;
pub mod rollback;

pub use backup::{BackupManager, BackupSnapshot};
pub use context::RunContext;
pub use deploy::FileDeployer;
pub use lock::RunLock;
pub use migrate::{SchemaMigrator, StepOutcome};
pub use orchestrator::{RunReport, RunState, UpdateOrchestrator};
pub use packages::PackageInstaller;
pub use result::{Failure, Outcome, Phase, RunResult, EXIT_COMMITTED, EXIT_FATAL, EXIT_ROLLED_BACK};
pub use rollback::{RestoreStats, RollbackController};
