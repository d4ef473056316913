//! Release bundles and dependency installation
//!
//! A release bundle is a directory produced by the build pipeline:
//!
//! ```text
//! <bundle>/
//!   release.json     # {"version": "4.4.9", "tree": "app.tar.gz", "dependencies": "wheels"}
//!   app.tar.gz       # the application tree
//!   wheels/          # dependency artifacts consumed by the dependency command
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::accounts::ServiceAccount;
use super::runner::{as_account, ToolRunner};
use crate::error::{StewardError, StewardResult};
use crate::storage::file_io::read_json_required;
use crate::version::Version;

/// Name of the manifest inside a bundle
pub const RELEASE_MANIFEST: &str = "release.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReleaseManifest {
    version: String,
    tree: PathBuf,
    #[serde(default)]
    dependencies: Option<PathBuf>,
}

/// A validated, installable release
#[derive(Debug, Clone)]
pub struct Release {
    pub version: Version,
    /// Gzip tarball of the application tree
    pub tree_archive: PathBuf,
    /// Dependency artifacts, if the release ships any
    pub dependency_dir: Option<PathBuf>,
}

/// Supplies releases and installs their dependencies
pub trait PackageProvider {
    /// Load the release, checking it matches `requested` when given
    fn fetch(&self, requested: Option<&Version>) -> StewardResult<Release>;

    /// Install or upgrade the release's dependencies into the tree at `root`
    fn install_dependencies(
        &self,
        release: &Release,
        root: &Path,
        account: &ServiceAccount,
    ) -> StewardResult<()>;

    /// Recreate the derived subtrees (virtual environment, collected assets)
    /// of the tree at `root` from the tree's own dependency manifest
    fn rebuild_dependencies(&self, root: &Path, account: &ServiceAccount) -> StewardResult<()>;
}

/// Reads releases from a bundle directory
#[derive(Debug, Clone)]
pub struct BundleProvider {
    bundle_dir: PathBuf,
    dependency_command: Vec<String>,
    rebuild_commands: Vec<Vec<String>>,
    runner: ToolRunner,
}

impl BundleProvider {
    pub fn new(
        bundle_dir: PathBuf,
        dependency_command: Vec<String>,
        rebuild_commands: Vec<Vec<String>>,
        runner: ToolRunner,
    ) -> Self {
        Self {
            bundle_dir,
            dependency_command,
            rebuild_commands,
            runner,
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.bundle_dir.join(path)
        }
    }
}

impl PackageProvider for BundleProvider {
    fn fetch(&self, requested: Option<&Version>) -> StewardResult<Release> {
        let manifest_path = self.bundle_dir.join(RELEASE_MANIFEST);
        if !manifest_path.exists() {
            return Err(StewardError::Precondition(format!(
                "No release manifest at {}",
                manifest_path.display()
            )));
        }
        let manifest: ReleaseManifest = read_json_required(&manifest_path)?;
        let version = Version::parse(&manifest.version)?;

        if let Some(requested) = requested {
            if *requested != version {
                return Err(StewardError::Precondition(format!(
                    "Bundle contains version {}, but {} was requested",
                    version, requested
                )));
            }
        }

        let tree_archive = self.resolve(&manifest.tree);
        if !tree_archive.is_file() {
            return Err(StewardError::Precondition(format!(
                "Release tree archive missing: {}",
                tree_archive.display()
            )));
        }

        let dependency_dir = manifest.dependencies.as_deref().map(|p| self.resolve(p));
        if let Some(dir) = &dependency_dir {
            if !dir.is_dir() {
                return Err(StewardError::Precondition(format!(
                    "Release dependency directory missing: {}",
                    dir.display()
                )));
            }
        }

        info!(%version, bundle = %self.bundle_dir.display(), "Release validated");
        Ok(Release {
            version,
            tree_archive,
            dependency_dir,
        })
    }

    fn install_dependencies(
        &self,
        release: &Release,
        root: &Path,
        account: &ServiceAccount,
    ) -> StewardResult<()> {
        let Some((program, args)) = self.dependency_command.split_first() else {
            info!("No dependency command configured");
            return Ok(());
        };

        let deps = release
            .dependency_dir
            .as_deref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();

        let mut cmd = Command::new(program);
        cmd.current_dir(root)
            .args(args.iter().map(|arg| arg.replace("{deps}", &deps)));
        as_account(&mut cmd, account);

        info!(version = %release.version, "Installing dependencies");
        self.runner.run("dependencies", &mut cmd)
    }

    fn rebuild_dependencies(&self, root: &Path, account: &ServiceAccount) -> StewardResult<()> {
        for command in &self.rebuild_commands {
            let Some((program, args)) = command.split_first() else {
                continue;
            };
            let mut cmd = Command::new(program);
            cmd.current_dir(root).args(args);
            as_account(&mut cmd, account);

            info!(command = %command.join(" "), "Rebuilding derived files");
            self.runner.run("rebuild", &mut cmd)?;
        }
        Ok(())
    }
}
