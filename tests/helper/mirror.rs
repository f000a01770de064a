//! Mirror test utilities

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use vex_collector::mirror::{SyncError, SyncResult, VexSync};
use vex_collector::purl::PackageUrl;
use vex_collector::source::SourceUrl;

/// One recorded `VexSync::sync` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCall {
    pub root: PathBuf,
    pub source: String,
    pub purl: String,
}

/// VexSync that records every call instead of touching git
#[derive(Default)]
pub struct RecordingSync {
    calls: Mutex<Vec<SyncCall>>,
    fail_on: Option<String>,
}

impl RecordingSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the sync of the package with this name
    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_on: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<SyncCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Synced purls, in call order
    pub fn synced_purls(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.purl).collect()
    }
}

#[async_trait]
impl VexSync for RecordingSync {
    async fn sync(
        &self,
        root: &Path,
        source: &SourceUrl,
        purl: &PackageUrl,
    ) -> Result<SyncResult, SyncError> {
        self.calls.lock().unwrap().push(SyncCall {
            root: root.to_path_buf(),
            source: source.to_string(),
            purl: purl.to_string(),
        });

        if self.fail_on.as_deref() == Some(purl.name()) {
            return Err(SyncError::Git {
                command: "clone".to_string(),
                source_url: source.to_string(),
                stderr: "fatal: repository not found".to_string(),
            });
        }
        Ok(SyncResult { documents: 1 })
    }
}
