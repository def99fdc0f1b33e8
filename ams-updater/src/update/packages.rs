//! Dependency package installation.
//!
//! Each archive is unpacked twice: into the scratch work directory, where its
//! install command runs, and into the permanent install root, which keeps a
//! copy for later diagnostics.

use crate::config::Config;
use crate::fs::Host;
use crate::manifest::{archive_dir_name, PackageSpec, StagingArea};
use crate::update::context::RunContext;
use crate::update::result::Phase;
use crate::utils::{Result, UpdateError};
use std::io;
use std::path::{Path, PathBuf};

pub struct PackageInstaller<'a> {
    host: &'a dyn Host,
    work_dir: &'a Path,
    install_root: &'a Path,
    install_command: &'a [String],
}

impl<'a> PackageInstaller<'a> {
    pub fn new(
        host: &'a dyn Host,
        work_dir: &'a Path,
        install_root: &'a Path,
        install_command: &'a [String],
    ) -> Self {
        Self {
            host,
            work_dir,
            install_root,
            install_command,
        }
    }

    pub fn from_config(host: &'a dyn Host, config: &'a Config) -> Self {
        Self::new(
            host,
            &config.paths.work_dir,
            &config.paths.install_root,
            &config.packages.install_command,
        )
    }

    /// Install every package in manifest order. A failed package is recorded
    /// and the next one is still attempted.
    ///
    /// Returns the number of failed packages.
    pub fn install_all<D>(&self, ctx: &mut RunContext<'_, D>) -> usize {
        let mut failed = 0;
        for package in &ctx.manifest.packages {
            match self.install_package(ctx.staging, package) {
                Ok(()) => tracing::info!(package = %package.name, "Package installed"),
                Err(e) => {
                    ctx.result.record(Phase::PackageInstall, e);
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Install sub-packages in declared order, then the main archive. Stops at
    /// the first failing archive, since the rest of the package depends on it.
    pub fn install_package(&self, staging: &StagingArea, package: &PackageSpec) -> Result<()> {
        for archive in package.install_order() {
            self.install_archive(staging, archive).map_err(|e| {
                UpdateError::package_install(format!("{} ({})", package.name, archive), e)
            })?;
            tracing::debug!(package = %package.name, %archive, "Archive installed");
        }
        Ok(())
    }

    fn install_archive(&self, staging: &StagingArea, archive: &str) -> io::Result<()> {
        let dir_name = archive_dir_name(archive).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "unsupported archive name")
        })?;
        let source = staging.archive(archive);

        let scratch = ScratchDir::enter(self.host, self.work_dir.join(dir_name))?;
        self.host.extract_archive(&source, self.work_dir)?;
        self.host.extract_archive(&source, self.install_root)?;

        self.host.check_readable_dir(scratch.path()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("archive did not unpack to {}", dir_name),
            )
        })?;

        self.host.run_command(self.install_command, scratch.path())
    }
}

/// Scratch extraction directory for one archive.
///
/// Cleared on entry so a killed run's leftovers never mix in, and removed
/// again on drop whether or not the install succeeded.
struct ScratchDir<'a> {
    host: &'a dyn Host,
    path: PathBuf,
}

impl<'a> ScratchDir<'a> {
    fn enter(host: &'a dyn Host, path: PathBuf) -> io::Result<Self> {
        host.remove_tree(&path)?;
        Ok(Self { host, path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.host.remove_tree(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to clean scratch directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::archive::tests::write_tar_gz;
    use crate::fs::host::testing::{FaultyHost, Op};
    use crate::manifest::UpdateManifest;
    use crate::update::result::RunResult;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        staging: StagingArea,
        work_dir: PathBuf,
        install_root: PathBuf,
        command: Vec<String>,
    }

    impl Fixture {
        fn new(archives: &[&str]) -> Self {
            let temp = TempDir::new().unwrap();
            let staging = StagingArea::new(temp.path().join("staging"));
            fs::create_dir_all(staging.archive("x").parent().unwrap()).unwrap();
            for archive in archives {
                let top = archive_dir_name(archive).unwrap();
                write_tar_gz(&staging.archive(archive), top, &[("setup.py", b"# setup")]).unwrap();
            }
            Self {
                work_dir: temp.path().join("work"),
                install_root: temp.path().join("packages"),
                command: vec!["python3".into(), "setup.py".into(), "install".into()],
                staging,
                _temp: temp,
            }
        }

        fn installer<'a>(&'a self, host: &'a FaultyHost) -> PackageInstaller<'a> {
            PackageInstaller::new(host, &self.work_dir, &self.install_root, &self.command)
        }
    }

    fn package(name: &str, subs: &[&str], main: &str) -> PackageSpec {
        PackageSpec {
            name: name.to_string(),
            main_archive: main.to_string(),
            sub_packages: subs.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn manifest(packages: Vec<PackageSpec>) -> UpdateManifest {
        UpdateManifest {
            target_version: "2.4.0".to_string(),
            migrations: vec![],
            packages,
            files_to_create: vec![],
            files_to_update: vec![],
            files_to_delete: vec![],
            service_files: vec![],
        }
    }

    fn run_dirs(host: &FaultyHost) -> Vec<String> {
        host.calls(Op::Run)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_sub_packages_install_before_main() {
        let fixture = Fixture::new(&["a-1.0.tar.gz", "b-1.0.tar.gz", "m-1.0.tar.gz"]);
        let host = FaultyHost::new();

        fixture
            .installer(&host)
            .install_package(
                &fixture.staging,
                &package("m", &["a-1.0.tar.gz", "b-1.0.tar.gz"], "m-1.0.tar.gz"),
            )
            .unwrap();

        assert_eq!(run_dirs(&host), vec!["a-1.0", "b-1.0", "m-1.0"]);
    }

    #[test]
    fn test_reversed_sub_packages_reverse_order() {
        let fixture = Fixture::new(&["a-1.0.tar.gz", "b-1.0.tar.gz", "m-1.0.tar.gz"]);
        let host = FaultyHost::new();

        fixture
            .installer(&host)
            .install_package(
                &fixture.staging,
                &package("m", &["b-1.0.tar.gz", "a-1.0.tar.gz"], "m-1.0.tar.gz"),
            )
            .unwrap();

        assert_eq!(run_dirs(&host), vec!["b-1.0", "a-1.0", "m-1.0"]);
    }

    #[test]
    fn test_archive_lands_in_install_root_and_scratch_is_released() {
        let fixture = Fixture::new(&["paho-mqtt-1.6.1.tar.gz"]);
        let host = FaultyHost::new();

        fixture
            .installer(&host)
            .install_package(&fixture.staging, &package("mqtt", &[], "paho-mqtt-1.6.1.tar.gz"))
            .unwrap();

        assert!(fixture.install_root.join("paho-mqtt-1.6.1/setup.py").exists());
        assert!(!fixture.work_dir.join("paho-mqtt-1.6.1").exists());
    }

    #[test]
    fn test_scratch_released_when_install_fails() {
        let fixture = Fixture::new(&["gpio-0.7.tar.gz"]);
        let host = FaultyHost::new();
        host.fail(Op::Run, "gpio-0.7");

        let result = fixture
            .installer(&host)
            .install_package(&fixture.staging, &package("gpio", &[], "gpio-0.7.tar.gz"));

        assert!(matches!(result, Err(UpdateError::PackageInstall { .. })));
        assert!(!fixture.work_dir.join("gpio-0.7").exists());
    }

    #[test]
    fn test_failed_sub_package_skips_main() {
        let fixture = Fixture::new(&["a-1.0.tar.gz", "m-1.0.tar.gz"]);
        let host = FaultyHost::new();
        host.fail(Op::Run, "a-1.0");

        let err = fixture
            .installer(&host)
            .install_package(&fixture.staging, &package("m", &["a-1.0.tar.gz"], "m-1.0.tar.gz"))
            .unwrap_err();

        assert!(err.to_string().contains("m (a-1.0.tar.gz)"));
        assert_eq!(run_dirs(&host), vec!["a-1.0"]);
    }

    #[test]
    fn test_failed_package_does_not_block_next() {
        let fixture = Fixture::new(&["gpio-0.7.tar.gz", "mqtt-1.6.tar.gz"]);
        let host = FaultyHost::new();
        let manifest = manifest(vec![
            // archive never written to staging
            package("camera", &[], "picamera-1.13.tar.gz"),
            package("gpio", &[], "gpio-0.7.tar.gz"),
            package("mqtt", &[], "mqtt-1.6.tar.gz"),
        ]);
        let mut ctx: RunContext<'_, ()> =
            RunContext::new(None, &manifest, &fixture.staging, RunResult::new());

        let failed = fixture.installer(&host).install_all(&mut ctx);

        assert_eq!(failed, 1);
        assert_eq!(ctx.result.failures()[0].phase, Phase::PackageInstall);
        assert!(ctx.result.failures()[0].target.starts_with("camera"));
        assert_eq!(run_dirs(&host), vec!["gpio-0.7", "mqtt-1.6"]);
    }

    #[test]
    fn test_archive_without_expected_directory() {
        let fixture = Fixture::new(&[]);
        let archive = fixture.staging.archive("tool-2.0.tar.gz");
        write_tar_gz(&archive, "something-else", &[("setup.py", b"")]).unwrap();
        let host = FaultyHost::new();

        let err = fixture
            .installer(&host)
            .install_package(&fixture.staging, &package("tool", &[], "tool-2.0.tar.gz"))
            .unwrap_err();

        assert!(err.to_string().contains("did not unpack"));
        assert!(host.calls(Op::Run).is_empty());
    }
}
