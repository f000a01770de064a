//! Local VEX mirror
//!
//! Mirror layout under the hub root:
//!
//! ```text
//! <root>/
//! ├── .cache/repos/<host>/<path>/    shallow checkouts of source repositories
//! └── pkg/<type>/<namespace>/<name>/ VEX documents copied from `.vex/`
//! ```

pub mod git;

pub use git::GitMirror;

#[cfg(test)]
use mockall::automock;

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::purl::PackageUrl;
use crate::source::SourceUrl;

/// Directory inside a source repository holding its VEX documents
pub const VEX_DIR: &str = ".vex";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("git {command} failed for {source_url}: {stderr}")]
    Git {
        command: String,
        source_url: String,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("refusing to write outside the mirror root: {0}")]
    UnsafePath(String),
}

/// Outcome of syncing one package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncResult {
    pub documents: usize,
}

/// Collaborator that brings a package's VEX documents into the mirror
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait VexSync: Send + Sync {
    async fn sync(
        &self,
        root: &Path,
        source: &SourceUrl,
        purl: &PackageUrl,
    ) -> Result<SyncResult, SyncError>;
}

/// Mirror directory for a package: `<root>/pkg/<type>/<namespace...>/<name>`
///
/// Fails if any component would step outside the mirror root.
pub fn package_dir(root: &Path, purl: &PackageUrl) -> Result<PathBuf, SyncError> {
    let namespace = purl.namespace().into_iter().flat_map(|ns| ns.split('/'));
    let segments = std::iter::once(purl.ty())
        .chain(namespace)
        .chain(std::iter::once(purl.name()));
    join_under(root, &root.join("pkg"), segments, &purl.to_string())
}

/// Checkout directory for a source repository
pub fn checkout_dir(root: &Path, source: &SourceUrl) -> Result<PathBuf, SyncError> {
    let segments = source.host().split(':').chain(source.path().split('/'));
    join_under(
        root,
        &root.join(".cache").join("repos"),
        segments,
        &source.to_string(),
    )
}

fn join_under<'a>(
    root: &Path,
    base: &Path,
    segments: impl IntoIterator<Item = &'a str>,
    subject: &str,
) -> Result<PathBuf, SyncError> {
    let mut dir = base.to_path_buf();
    for segment in segments {
        if segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.contains(['/', '\\', '\0'])
        {
            return Err(SyncError::UnsafePath(subject.to_string()));
        }
        dir.push(segment);
    }
    ensure_within(root, &dir)?;
    Ok(dir)
}

/// Checks that `path` names a directory strictly below `root`
fn ensure_within(root: &Path, path: &Path) -> Result<(), SyncError> {
    let inside = path.strip_prefix(root).is_ok_and(|relative| {
        relative.components().next().is_some()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
    });
    if inside {
        Ok(())
    } else {
        Err(SyncError::UnsafePath(path.display().to_string()))
    }
}

/// Replaces `dest` with every `*.json` file under `vex_dir`, keeping relative paths
///
/// `dest` must lie below `root`; nothing is removed otherwise.
pub fn copy_vex_documents(root: &Path, vex_dir: &Path, dest: &Path) -> Result<usize, SyncError> {
    ensure_within(root, dest)?;
    if dest.exists() {
        std::fs::remove_dir_all(dest)?;
    }
    if !vex_dir.is_dir() {
        return Ok(0);
    }

    let mut copied = 0;
    for entry in WalkDir::new(vex_dir).follow_links(false) {
        let entry = entry.map_err(std::io::Error::other)?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }
        let Ok(relative) = path.strip_prefix(vex_dir) else {
            continue;
        };
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(path, &target)?;
        copied += 1;
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("pkg:golang/github.com/aquasecurity/trivy", "pkg/golang/github.com/aquasecurity/trivy")]
    #[case("pkg:npm/%40angular/core@17.0.0", "pkg/npm/@angular/core")]
    #[case("pkg:pypi/requests", "pkg/pypi/requests")]
    #[case("pkg:oci/trivy?repository_url=ghcr.io/aquasecurity/trivy", "pkg/oci/trivy")]
    fn package_dir_is_keyed_by_package_identity(#[case] purl: &str, #[case] expected: &str) {
        let purl: PackageUrl = purl.parse().unwrap();

        assert_eq!(
            package_dir(Path::new("/mirror"), &purl).unwrap(),
            Path::new("/mirror").join(expected)
        );
    }

    #[rstest]
    #[case("pkg:npm/%2E%2E/%2E%2E/%2E%2E/victim")]
    #[case("pkg:npm/%2E%2E")]
    #[case("pkg:golang/./name")]
    #[case("pkg:npm/scope/a%2Fb")]
    #[case("pkg:npm/a%5C..%5Cb")]
    fn package_dir_rejects_components_leaving_the_root(#[case] purl: &str) {
        let purl: PackageUrl = purl.parse().unwrap();

        assert!(matches!(
            package_dir(Path::new("/mirror"), &purl),
            Err(SyncError::UnsafePath(_))
        ));
    }

    #[test]
    fn traversal_purl_never_deletes_outside_the_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("mirror");
        std::fs::create_dir_all(root.join("pkg/npm")).unwrap();
        let victim = temp_dir.path().join("victim");
        std::fs::create_dir_all(&victim).unwrap();
        std::fs::write(victim.join("important.txt"), "keep").unwrap();
        let purl: PackageUrl = "pkg:npm/%2E%2E/%2E%2E/%2E%2E/victim".parse().unwrap();

        assert!(package_dir(&root, &purl).is_err());

        let crafted = root.join("pkg/npm/../../../victim");
        let result = copy_vex_documents(&root, &temp_dir.path().join(".vex"), &crafted);

        assert!(matches!(result, Err(SyncError::UnsafePath(_))));
        assert!(victim.join("important.txt").is_file());
    }

    #[rstest]
    #[case("/elsewhere/pkg/npm/x")]
    #[case("/mirror")]
    #[case("/mirror/pkg/../../etc")]
    fn copy_vex_documents_refuses_destinations_outside_root(#[case] dest: &str) {
        let result = copy_vex_documents(
            Path::new("/mirror"),
            Path::new("/nonexistent/.vex"),
            Path::new(dest),
        );

        assert!(matches!(result, Err(SyncError::UnsafePath(_))));
    }

    #[test]
    fn checkout_dir_splits_host_port_and_path() {
        let source: SourceUrl = "https://git.example.com:8443/org/repo".parse().unwrap();

        assert_eq!(
            checkout_dir(Path::new("/mirror"), &source).unwrap(),
            Path::new("/mirror/.cache/repos/git.example.com/8443/org/repo")
        );
    }

    #[test]
    fn checkout_dir_is_unreachable_for_traversal_sources() {
        // Such sources never normalize, so no checkout path exists for them
        assert!("https://github.com/../../x".parse::<SourceUrl>().is_err());
        assert!("https://../../x".parse::<SourceUrl>().is_err());
    }

    #[test]
    fn copy_vex_documents_copies_only_json_files() {
        let temp_dir = TempDir::new().unwrap();
        let vex_dir = temp_dir.path().join("checkout/.vex");
        std::fs::create_dir_all(vex_dir.join("nested")).unwrap();
        std::fs::write(vex_dir.join("trivy.openvex.json"), "{}").unwrap();
        std::fs::write(vex_dir.join("nested/extra.json"), "{}").unwrap();
        std::fs::write(vex_dir.join("README.md"), "docs").unwrap();
        let dest = temp_dir.path().join("mirror/pkg/golang/trivy");

        let copied = copy_vex_documents(temp_dir.path(), &vex_dir, &dest).unwrap();

        assert_eq!(copied, 2);
        assert!(dest.join("trivy.openvex.json").is_file());
        assert!(dest.join("nested/extra.json").is_file());
        assert!(!dest.join("README.md").exists());
    }

    #[test]
    fn copy_vex_documents_replaces_stale_documents() {
        let temp_dir = TempDir::new().unwrap();
        let vex_dir = temp_dir.path().join(".vex");
        std::fs::create_dir_all(&vex_dir).unwrap();
        std::fs::write(vex_dir.join("current.json"), "{}").unwrap();
        let dest = temp_dir.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.json"), "{}").unwrap();

        copy_vex_documents(temp_dir.path(), &vex_dir, &dest).unwrap();

        assert!(dest.join("current.json").is_file());
        assert!(!dest.join("stale.json").exists());
    }

    #[test]
    fn copy_vex_documents_returns_zero_without_vex_dir() {
        let temp_dir = TempDir::new().unwrap();

        let copied = copy_vex_documents(
            temp_dir.path(),
            &temp_dir.path().join(".vex"),
            &temp_dir.path().join("dest"),
        )
        .unwrap();

        assert_eq!(copied, 0);
    }
}
