use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::LaunchError;

const RUN_DIR_PREFIX: &str = "prow-docker.";
const LOG_FILE_NAME: &str = "build-log.txt";

/// Per-run scratch directory.
///
/// Holds the run log, the overlay work areas and (unless `ARTIFACTS` points
/// elsewhere) the artifacts. It is left on disk after the run so the log and
/// artifacts can be inspected; the OS temp cleanup reclaims it eventually.
#[derive(Debug, Clone)]
pub struct RunDir {
    path: PathBuf,
}

impl RunDir {
    pub fn create() -> Result<Self, LaunchError> {
        Self::create_in(std::env::temp_dir())
    }

    pub fn create_in(parent: impl AsRef<Path>) -> Result<Self, LaunchError> {
        let dir = tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .tempdir_in(parent)
            .map_err(|source| LaunchError::TempDirCreationFailed { source })?;
        let path = dir.keep();
        debug!("Created run directory {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_file(&self) -> PathBuf {
        self.path.join(LOG_FILE_NAME)
    }

    pub fn overlays_root(&self) -> PathBuf {
        self.path.join("overlays")
    }
}
