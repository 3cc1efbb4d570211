//! Building blocks for running a CI test image locally.
//!
//! A run binds environment variables, creates a per-run scratch directory,
//! overlays the repository and kube config so the container cannot modify
//! them, and then executes the image's `runner.sh` through the container
//! runtime. Teardown actions are collected as the run is set up and are
//! executed once, in order, however the run ends.

pub mod cleanup;
pub mod env;
pub mod error;
pub mod invocation;
pub mod launch;
pub mod mounts;
pub mod overlay;
pub mod repo;
pub mod run_dir;
pub mod runner;

pub use cleanup::{CleanupAction, CleanupStack};
pub use env::{bind, split_list, EnvProvider, EnvironmentMap, HostEnv, MapEnv};
pub use error::LaunchError;
pub use invocation::{Invocation, InvocationBuilder};
pub use launch::{prepare, DryRunReport, LaunchConfig, PreparedLaunch};
pub use mounts::{MountKind, MountSpec, OverlayLayers};
pub use overlay::OverlayManager;
pub use repo::{resolve_repo_root, resolve_repo_root_from};
pub use run_dir::RunDir;
pub use runner::{CommandInvoker, Runner, SystemInvoker, ENTRYPOINT};

/// Whether stdin is attached to a terminal, which decides `-it`.
pub fn stdin_is_terminal() -> bool {
    atty::is(atty::Stream::Stdin)
}
