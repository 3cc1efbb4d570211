//! Container invocation assembly.
//!
//! [`InvocationBuilder`] appends argument groups in exactly the order it is
//! called; [`InvocationBuilder::finish`] consumes it and produces the
//! immutable [`Invocation`] the runner executes.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::cleanup::CleanupAction;
use crate::env::EnvironmentMap;
use crate::error::LaunchError;
use crate::mounts::MountSpec;
use crate::overlay::OverlayManager;

#[derive(Debug)]
pub struct InvocationBuilder {
    runtime: String,
    args: Vec<String>,
    mounts: Vec<MountSpec>,
    env: EnvironmentMap,
    workdir: Option<PathBuf>,
    overlays: OverlayManager,
}

impl InvocationBuilder {
    /// Starts a `<runtime> run --rm` invocation, with `-it` when `interactive`.
    pub fn new(runtime: impl Into<String>, interactive: bool, overlays: OverlayManager) -> Self {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        if interactive {
            args.push("-it".to_string());
        }
        Self {
            runtime: runtime.into(),
            args,
            mounts: Vec::new(),
            env: EnvironmentMap::new(),
            workdir: None,
            overlays,
        }
    }

    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    pub fn mounts(&self) -> &[MountSpec] {
        &self.mounts
    }

    pub fn add_bind_mount(&mut self, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) {
        self.push_mount(MountSpec::bind(source, destination));
    }

    /// Mounts `source` at `destination` through a writable overlay.
    ///
    /// The returned action removes the overlay's work area and must be run
    /// after the container exits.
    pub fn add_rw_overlay(
        &mut self,
        source: impl AsRef<Path>,
        destination: impl Into<PathBuf>,
    ) -> Result<CleanupAction, LaunchError> {
        let source = source.as_ref();
        let (layers, cleanup) = self.overlays.create(source)?;
        self.push_mount(MountSpec::rw_overlay(source, destination, layers));
        Ok(cleanup)
    }

    pub fn set_workdir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.args.push(format!("-w={}", dir.display()));
        self.workdir = Some(dir);
    }

    /// Adds one `--env NAME=VALUE` pair per entry, in name order.
    pub fn add_env(&mut self, env: &EnvironmentMap) {
        for (name, value) in env {
            self.args.push("--env".to_string());
            self.args.push(format!("{}={}", name, value));
            self.env.insert(name.clone(), value.clone());
        }
    }

    pub fn add_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
    }

    /// Appends the image, the entrypoint and any extra arguments.
    pub fn finish<I, S>(mut self, image: &str, entrypoint: &str, extra: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command: Vec<String> = std::iter::once(entrypoint.to_string())
            .chain(extra.into_iter().map(Into::into))
            .collect();
        self.args.push(image.to_string());
        self.args.extend(command.iter().cloned());
        debug!("Finished invocation with {} arguments", self.args.len());

        Invocation {
            runtime: self.runtime,
            args: self.args,
            mounts: self.mounts,
            env: self.env,
            workdir: self.workdir,
            image: image.to_string(),
            command,
        }
    }

    fn push_mount(&mut self, spec: MountSpec) {
        self.args.extend(spec.flags());
        self.mounts.push(spec);
    }
}

/// A fully assembled container run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    runtime: String,
    args: Vec<String>,
    mounts: Vec<MountSpec>,
    env: EnvironmentMap,
    workdir: Option<PathBuf>,
    image: String,
    command: Vec<String>,
}

impl Invocation {
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn mounts(&self) -> &[MountSpec] {
        &self.mounts
    }

    pub fn env(&self) -> &EnvironmentMap {
        &self.env
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Entrypoint followed by the extra arguments.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.runtime);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_escape(&self.runtime))?;
        for arg in &self.args {
            write!(f, " {}", shell_escape(arg))?;
        }
        Ok(())
    }
}

pub(crate) fn shell_escape(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@+%".contains(c));
    if plain {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}
