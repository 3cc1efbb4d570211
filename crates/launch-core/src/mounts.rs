use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MountKind {
    Bind,
    RwOverlay,
}

/// Upper and work directories backing a read-write overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayLayers {
    pub upper_dir: PathBuf,
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountSpec {
    pub kind: MountKind,
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<OverlayLayers>,
}

impl MountSpec {
    pub fn bind(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            kind: MountKind::Bind,
            source: source.into(),
            destination: destination.into(),
            layers: None,
        }
    }

    pub fn rw_overlay(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        layers: OverlayLayers,
    ) -> Self {
        Self {
            kind: MountKind::RwOverlay,
            source: source.into(),
            destination: destination.into(),
            layers: Some(layers),
        }
    }

    /// Runtime flags for this mount, `--mount` followed by its value.
    pub fn flags(&self) -> [String; 2] {
        ["--mount".to_string(), self.mount_value()]
    }

    fn mount_value(&self) -> String {
        match (&self.kind, &self.layers) {
            (MountKind::RwOverlay, Some(layers)) => format!(
                "type=volume,dst={},volume-driver=local,volume-opt=type=overlay,\
                 volume-opt=device=overlay,\"volume-opt=o=lowerdir={},upperdir={},workdir={}\"",
                self.destination.display(),
                self.source.display(),
                layers.upper_dir.display(),
                layers.work_dir.display()
            ),
            _ => format!(
                "type=bind,source={},target={}",
                self.source.display(),
                self.destination.display()
            ),
        }
    }
}

/// Makes `path` absolute against the current directory without touching the filesystem.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_mount_renders_source_and_target() {
        let spec = MountSpec::bind("/a/path", "/a/path");
        assert_eq!(
            spec.flags(),
            [
                "--mount".to_string(),
                "type=bind,source=/a/path,target=/a/path".to_string()
            ]
        );
    }

    #[test]
    fn overlay_mount_quotes_the_option_list() {
        let spec = MountSpec::rw_overlay(
            "/home/u/repo",
            "/home/u/repo",
            OverlayLayers {
                upper_dir: PathBuf::from("/tmp/run/overlays/0-repo/upper"),
                work_dir: PathBuf::from("/tmp/run/overlays/0-repo/work"),
            },
        );
        let [flag, value] = spec.flags();
        assert_eq!(flag, "--mount");
        assert!(value.starts_with("type=volume,dst=/home/u/repo,volume-driver=local"));
        assert!(value.ends_with(
            "\"volume-opt=o=lowerdir=/home/u/repo,upperdir=/tmp/run/overlays/0-repo/upper,\
             workdir=/tmp/run/overlays/0-repo/work\""
        ));
    }

    #[test]
    fn absolutize_keeps_absolute_paths() {
        assert_eq!(absolutize(Path::new("/x/y")), PathBuf::from("/x/y"));
        assert!(absolutize(Path::new("rel")).is_absolute());
    }
}
