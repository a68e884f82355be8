use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::record::UploadedFile;
use crate::service::{ExtractionService, RemoteArtifactHandle};

const STAGED_PREFIX: &str = "datasheet-";
const STAGED_EXTENSION: &str = "pdf";

/// Local copy of one upload, owned by a single batch iteration.
///
/// Normally consumed by [`ArtifactStager::release`]. If it is dropped
/// without being released the file is still removed.
#[derive(Debug)]
pub struct StagedArtifact {
    path: PathBuf,
    display_name: String,
    released: bool,
}

impl StagedArtifact {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Hands the file over to the caller; `Drop` no longer removes it.
    fn into_path(mut self) -> PathBuf {
        self.released = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for StagedArtifact {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), "Failed to remove unreleased artifact: {e}");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupTarget {
    Remote,
    Local,
}

/// Deletion that failed during cleanup. Logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub target: CleanupTarget,
    pub resource: String,
    pub message: String,
}

impl std::fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let what = match self.target {
            CleanupTarget::Remote => "remote artifact",
            CleanupTarget::Local => "local artifact",
        };
        write!(f, "Failed to delete {what} {}: {}", self.resource, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub remote_deleted: bool,
    pub local_deleted: bool,
    pub warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Temporary artifact manager: writes uploads to uniquely named local
/// files and tears down both the local file and the remote copy.
#[derive(Debug, Clone)]
pub struct ArtifactStager {
    dir: PathBuf,
}

impl ArtifactStager {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn unique_path(&self) -> PathBuf {
        self.dir
            .join(format!("{STAGED_PREFIX}{}.{STAGED_EXTENSION}", Uuid::new_v4()))
    }

    pub async fn stage(&self, file: &UploadedFile) -> std::io::Result<StagedArtifact> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.unique_path();
        if let Err(e) = tokio::fs::write(&path, &file.bytes).await {
            // A partial write may have left a file behind.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }

        tracing::debug!(path = %path.display(), bytes = file.len(), "staged {}", file.name);

        Ok(StagedArtifact {
            path,
            display_name: file.name.clone(),
            released: false,
        })
    }

    /// Deletes the remote handle (if any) and then the local file (if any).
    ///
    /// Failures are logged and reported, never returned.
    pub async fn release(
        &self,
        artifact: Option<StagedArtifact>,
        remote: Option<RemoteArtifactHandle>,
        service: &dyn ExtractionService,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();

        if let Some(handle) = remote {
            match service.delete(&handle).await {
                Ok(()) => {
                    tracing::debug!(handle = %handle, "deleted remote artifact");
                    report.remote_deleted = true;
                }
                Err(e) => {
                    let warning = CleanupWarning {
                        target: CleanupTarget::Remote,
                        resource: handle.name.clone(),
                        message: e.to_string(),
                    };
                    tracing::warn!("{warning}");
                    report.warnings.push(warning);
                }
            }
        }

        if let Some(artifact) = artifact {
            let path = artifact.into_path();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "deleted local artifact");
                    report.local_deleted = true;
                }
                Err(e) => {
                    let warning = CleanupWarning {
                        target: CleanupTarget::Local,
                        resource: path.display().to_string(),
                        message: e.to_string(),
                    };
                    tracing::warn!("{warning}");
                    report.warnings.push(warning);
                }
            }
        }

        report
    }
}
