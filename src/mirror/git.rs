//! Git-backed mirror sync

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::mirror::{
    SyncError, SyncResult, VEX_DIR, VexSync, checkout_dir, copy_vex_documents, package_dir,
};
use crate::purl::PackageUrl;
use crate::source::SourceUrl;

const DEFAULT_GIT: &str = "git";

/// Keeps a shallow checkout per source repository and copies its `.vex/` documents
pub struct GitMirror {
    git: PathBuf,
}

impl Default for GitMirror {
    fn default() -> Self {
        Self::new(DEFAULT_GIT)
    }
}

impl GitMirror {
    pub fn new(git: impl Into<PathBuf>) -> Self {
        Self { git: git.into() }
    }

    async fn run_git(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
        source: &SourceUrl,
    ) -> Result<(), SyncError> {
        let mut command = Command::new(&self.git);
        command.args(args).kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        debug!("Running git {}", args.join(" "));

        let output = command.output().await?;
        if !output.status.success() {
            return Err(SyncError::Git {
                command: args.first().copied().unwrap_or_default().to_string(),
                source_url: source.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Clones on first use, otherwise fetches and resets to the remote head
    ///
    /// A checkout that cannot be refreshed is discarded and cloned again.
    async fn update_checkout(&self, checkout: &Path, source: &SourceUrl) -> Result<(), SyncError> {
        if checkout.join(".git").is_dir() {
            match self.refresh(checkout, source).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!(
                    checkout = %checkout.display(),
                    error = %e,
                    "Discarding unusable checkout"
                ),
            }
        }
        self.fresh_clone(checkout, source).await
    }

    async fn refresh(&self, checkout: &Path, source: &SourceUrl) -> Result<(), SyncError> {
        self.run_git(&["fetch", "--depth", "1", "origin"], Some(checkout), source)
            .await?;
        self.run_git(&["reset", "--hard", "FETCH_HEAD"], Some(checkout), source)
            .await
    }

    /// Clones into a sibling staging directory and moves it into place
    async fn fresh_clone(&self, checkout: &Path, source: &SourceUrl) -> Result<(), SyncError> {
        let staging = staging_dir(checkout);
        if tokio::fs::try_exists(&staging).await? {
            tokio::fs::remove_dir_all(&staging).await?;
        }
        if let Some(parent) = checkout.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let clone_url = source.clone_url();
        let target = staging.to_string_lossy();
        self.run_git(
            &["clone", "--depth", "1", "--quiet", clone_url.as_str(), &*target],
            None,
            source,
        )
        .await?;

        if tokio::fs::try_exists(checkout).await? {
            tokio::fs::remove_dir_all(checkout).await?;
        }
        tokio::fs::rename(&staging, checkout).await?;
        Ok(())
    }
}

fn staging_dir(checkout: &Path) -> PathBuf {
    let mut name = checkout.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

#[async_trait::async_trait]
impl VexSync for GitMirror {
    async fn sync(
        &self,
        root: &Path,
        source: &SourceUrl,
        purl: &PackageUrl,
    ) -> Result<SyncResult, SyncError> {
        let checkout = checkout_dir(root, source)?;
        let dest = package_dir(root, purl)?;
        self.update_checkout(&checkout, source).await?;

        let vex_dir = checkout.join(VEX_DIR);
        let root = root.to_path_buf();
        let documents =
            tokio::task::spawn_blocking(move || copy_vex_documents(&root, &vex_dir, &dest))
                .await
                .map_err(std::io::Error::other)??;

        info!(
            purl = %purl,
            source = %source,
            documents,
            "Synced VEX documents"
        );
        Ok(SyncResult { documents })
    }
}
