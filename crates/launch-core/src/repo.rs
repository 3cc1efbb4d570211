use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::error::LaunchError;

/// Top level of the git checkout containing the current directory.
pub fn resolve_repo_root() -> Result<PathBuf, LaunchError> {
    resolve_repo_root_from(Path::new("."))
}

pub fn resolve_repo_root_from(dir: &Path) -> Result<PathBuf, LaunchError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .map_err(|err| LaunchError::RepoRootResolutionFailed {
            message: format!("failed to run git: {}", err),
        })?;

    if !output.status.success() {
        return Err(LaunchError::RepoRootResolutionFailed {
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if root.is_empty() {
        return Err(LaunchError::RepoRootResolutionFailed {
            message: "git reported an empty top-level directory".to_string(),
        });
    }
    debug!("Resolved repository root {}", root);
    Ok(PathBuf::from(root))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn resolves_top_level_from_nested_dir() {
        if !git_available() {
            return;
        }
        let repo = tempfile::tempdir().unwrap();
        let status = Command::new("git")
            .arg("init")
            .arg("-q")
            .arg(repo.path())
            .status()
            .unwrap();
        assert!(status.success());
        let nested = repo.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let root = resolve_repo_root_from(&nested).unwrap();
        assert_eq!(
            root.canonicalize().unwrap(),
            repo.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn outside_a_checkout_is_an_error() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        // A parent of the temp dir may itself be a checkout; only assert when it is not.
        if let Err(err) = resolve_repo_root_from(dir.path()) {
            assert!(matches!(err, LaunchError::RepoRootResolutionFailed { .. }));
        }
    }
}
