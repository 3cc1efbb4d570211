//! Read-write overlay work areas.
//!
//! The container sees `source` through an overlay whose upper and work
//! layers live in the run directory, so writes made inside the container
//! never reach the host tree. Each area is handed back with a
//! [`CleanupAction`] that deletes it once the run is over.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cleanup::CleanupAction;
use crate::error::LaunchError;
use crate::mounts::OverlayLayers;

#[derive(Debug)]
pub struct OverlayManager {
    root: PathBuf,
    created: usize,
}

impl OverlayManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            created: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the upper/work layers for an overlay over `source`.
    pub fn create(
        &mut self,
        source: &Path,
    ) -> Result<(OverlayLayers, CleanupAction), LaunchError> {
        let area = self
            .root
            .join(format!("{}-{}", self.created, slug(source)));
        let layers = OverlayLayers {
            upper_dir: area.join("upper"),
            work_dir: area.join("work"),
        };

        for dir in [&layers.upper_dir, &layers.work_dir] {
            fs::create_dir_all(dir).map_err(|err| LaunchError::OverlayCreationFailed {
                source_path: source.to_path_buf(),
                source: err,
            })?;
        }
        self.created += 1;
        debug!(
            "Prepared overlay work area {} for {}",
            area.display(),
            source.display()
        );

        let label = format!("overlay {}", source.display());
        let cleanup = CleanupAction::new(label, move || remove_area(&area));
        Ok((layers, cleanup))
    }
}

fn remove_area(area: &Path) {
    match fs::remove_dir_all(area) {
        Ok(()) => info!("Removed overlay work area {}", area.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("Overlay work area {} already gone", area.display())
        }
        Err(err) => warn!(
            "Failed to remove overlay work area {}: {}",
            area.display(),
            err
        ),
    }
}

fn slug(source: &Path) -> String {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "root".to_string()
    } else {
        cleaned.to_string()
    }
}
