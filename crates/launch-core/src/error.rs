use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while preparing or running the container.
///
/// Only `ImagePullFailed` is recoverable: the runner logs it and carries on.
/// Every other variant aborts the run before the container starts (or, for
/// `ContainerExecutionFailed`, reports that it never started).
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Missing mandatory environment variable(s): {}", .names.join(", "))]
    MissingMandatoryVariable { names: Vec<String> },

    #[error("Failed to create temporary run directory: {source}")]
    TempDirCreationFailed { source: io::Error },

    #[error("Failed to resolve repository root: {message}")]
    RepoRootResolutionFailed { message: String },

    #[error("Failed to create overlay for {}: {source}", .source_path.display())]
    OverlayCreationFailed {
        source_path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to pull image {image}: {message}")]
    ImagePullFailed { image: String, message: String },

    #[error("Failed to execute container runtime {runtime}: {source}")]
    ContainerExecutionFailed { runtime: String, source: io::Error },

    #[error("Failed to open run log {}: {source}", .path.display())]
    LogFileFailed { path: PathBuf, source: io::Error },
}

impl LaunchError {
    pub fn code(&self) -> &'static str {
        match self {
            LaunchError::MissingMandatoryVariable { .. } => "MISSING_MANDATORY_VARIABLE",
            LaunchError::TempDirCreationFailed { .. } => "TEMP_DIR_CREATION_FAILED",
            LaunchError::RepoRootResolutionFailed { .. } => "REPO_ROOT_RESOLUTION_FAILED",
            LaunchError::OverlayCreationFailed { .. } => "OVERLAY_CREATION_FAILED",
            LaunchError::ImagePullFailed { .. } => "IMAGE_PULL_FAILED",
            LaunchError::ContainerExecutionFailed { .. } => "CONTAINER_EXECUTION_FAILED",
            LaunchError::LogFileFailed { .. } => "LOG_FILE_FAILED",
        }
    }

    /// Whether the run should stop when this error surfaces.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LaunchError::ImagePullFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variables_are_listed_in_message() {
        let err = LaunchError::MissingMandatoryVariable {
            names: vec!["A".to_string(), "B".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Missing mandatory environment variable(s): A, B"
        );
        assert_eq!(err.code(), "MISSING_MANDATORY_VARIABLE");
    }

    #[test]
    fn only_pull_failures_are_recoverable() {
        let pull = LaunchError::ImagePullFailed {
            image: "img".to_string(),
            message: "exit status 1".to_string(),
        };
        assert!(!pull.is_fatal());

        let overlay = LaunchError::OverlayCreationFailed {
            source_path: PathBuf::from("/repo"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(overlay.is_fatal());
        assert!(overlay.to_string().contains("/repo"));
    }
}
