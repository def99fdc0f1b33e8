//! Application file and service unit deployment.

use crate::config::Config;
use crate::fs::Host;
use crate::manifest::StagingArea;
use crate::update::context::RunContext;
use crate::update::result::Phase;
use crate::utils::{Result, UpdateError};
use std::path::Path;

pub struct FileDeployer<'a> {
    host: &'a dyn Host,
    live_root: &'a Path,
    service_dir: &'a Path,
    executable_extensions: &'a [String],
    reload_command: Option<&'a [String]>,
}

impl<'a> FileDeployer<'a> {
    pub fn new(
        host: &'a dyn Host,
        live_root: &'a Path,
        service_dir: &'a Path,
        executable_extensions: &'a [String],
        reload_command: Option<&'a [String]>,
    ) -> Self {
        Self {
            host,
            live_root,
            service_dir,
            executable_extensions,
            reload_command,
        }
    }

    pub fn from_config(host: &'a dyn Host, config: &'a Config) -> Self {
        Self::new(
            host,
            &config.paths.live_root,
            &config.paths.service_dir,
            &config.deploy.executable_extensions,
            config.deploy.service_reload_command.as_deref(),
        )
    }

    /// Copy created and updated files, delete removed ones, then install
    /// service units. Every failure is recorded and the rest still proceeds.
    ///
    /// Returns the number of failures recorded.
    pub fn deploy<D>(&self, ctx: &mut RunContext<'_, D>) -> usize {
        let manifest = ctx.manifest;
        let before = ctx.result.failure_count();

        for relative in manifest.files_to_create.iter().chain(&manifest.files_to_update) {
            if let Err(e) = self.deploy_file(ctx.staging, relative) {
                ctx.result.record(Phase::FileDeploy, e);
            }
        }

        for relative in &manifest.files_to_delete {
            match self.delete_file(relative) {
                Ok(true) => tracing::debug!(path = %relative.display(), "Deleted file"),
                Ok(false) => tracing::debug!(path = %relative.display(), "Already absent"),
                Err(e) => ctx.result.record(Phase::FileDeploy, e),
            }
        }

        let mut units_installed = 0;
        for relative in &manifest.service_files {
            match self.install_service(ctx.staging, relative) {
                Ok(()) => units_installed += 1,
                Err(e) => ctx.result.record(Phase::FileDeploy, e),
            }
        }

        if units_installed > 0 {
            if let Some(command) = self.reload_command {
                if let Err(e) = self.host.run_command(command, self.service_dir) {
                    ctx.result
                        .record(Phase::FileDeploy, UpdateError::file_deploy(command.join(" "), e));
                }
            }
        }

        let failed = ctx.result.failure_count() - before;
        tracing::info!(
            copied = manifest.files_to_create.len() + manifest.files_to_update.len(),
            deleted = manifest.files_to_delete.len(),
            units = units_installed,
            failed,
            "File deployment finished"
        );
        failed
    }

    /// Copy one staged file over its live counterpart.
    pub fn deploy_file(&self, staging: &StagingArea, relative: &Path) -> Result<()> {
        let dest = self.live_root.join(relative);
        self.host
            .copy_file(&staging.file(relative), &dest)
            .map_err(|e| UpdateError::file_deploy(relative.display().to_string(), e))?;

        if self.is_executable(relative) {
            self.host
                .set_executable(&dest)
                .map_err(|e| UpdateError::file_deploy(relative.display().to_string(), e))?;
        }
        Ok(())
    }

    /// Remove a live file; a file that is already gone is not an error.
    pub fn delete_file(&self, relative: &Path) -> Result<bool> {
        self.host
            .remove_file(&self.live_root.join(relative))
            .map_err(|e| UpdateError::file_deploy(relative.display().to_string(), e))
    }

    fn install_service(&self, staging: &StagingArea, relative: &Path) -> Result<()> {
        let unit = relative.file_name().ok_or_else(|| {
            UpdateError::file_deploy(relative.display().to_string(), "service file has no name")
        })?;
        self.host
            .copy_file(&staging.file(relative), &self.service_dir.join(unit))
            .map_err(|e| UpdateError::file_deploy(relative.display().to_string(), e))?;
        tracing::info!(unit = %unit.to_string_lossy(), "Installed service unit");
        Ok(())
    }

    fn is_executable(&self, relative: &Path) -> bool {
        relative
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.executable_extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}
