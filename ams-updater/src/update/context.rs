//! Per-run state handed to each pipeline component.

use crate::manifest::{StagingArea, UpdateManifest};
use crate::update::result::RunResult;

/// Everything one run needs, owned by the orchestrator for the run's lifetime.
///
/// `db` is `None` when the database could not be opened; that failure has
/// already been recorded and migrations are skipped.
pub struct RunContext<'a, D> {
    pub db: Option<D>,
    pub manifest: &'a UpdateManifest,
    pub staging: &'a StagingArea,
    pub result: RunResult,
}

impl<'a, D> RunContext<'a, D> {
    pub fn new(
        db: Option<D>,
        manifest: &'a UpdateManifest,
        staging: &'a StagingArea,
        result: RunResult,
    ) -> Self {
        Self {
            db,
            manifest,
            staging,
            result,
        }
    }
}
