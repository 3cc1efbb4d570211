//! Setup of a single run: environment, run directory, mounts, overlays and
//! the artifacts location, wired into an [`InvocationBuilder`].

use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::cleanup::{CleanupAction, CleanupStack};
use crate::env::{self, EnvProvider, EnvironmentMap};
use crate::error::LaunchError;
use crate::invocation::{Invocation, InvocationBuilder};
use crate::mounts::absolutize;
use crate::overlay::OverlayManager;
use crate::run_dir::RunDir;
use crate::runner::{CommandInvoker, Runner, ENTRYPOINT};

pub const DEFAULT_TEST_IMAGE: &str = "gcr.io/knative-tests/test-infra/prow-tests:stable";
pub const DEFAULT_MANDATORY_ENV_VARS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const DEFAULT_RUNTIME: &str = "docker";
pub const KUBE_CONTAINER_DIR: &str = "/root/.kube";
pub const ARTIFACTS_VAR: &str = "ARTIFACTS";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    pub image: String,
    pub mounts: Vec<PathBuf>,
    pub mandatory_env: Vec<String>,
    pub optional_env: Vec<String>,
    pub runtime: String,
    #[serde(serialize_with = "serialize_duration")]
    pub grace_period: Duration,
    pub pull: bool,
    pub interactive: bool,
    pub args: Vec<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_TEST_IMAGE.to_string(),
            mounts: Vec::new(),
            mandatory_env: env::split_list(DEFAULT_MANDATORY_ENV_VARS),
            optional_env: Vec::new(),
            runtime: DEFAULT_RUNTIME.to_string(),
            grace_period: Duration::from_secs(3),
            pull: true,
            interactive: false,
            args: Vec::new(),
        }
    }
}

fn serialize_duration<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_duration(*value))
}

/// Everything set up for the run, waiting to be executed.
///
/// Dropping it without launching still runs the registered cleanups.
#[derive(Debug)]
pub struct PreparedLaunch {
    builder: InvocationBuilder,
    cleanup: CleanupStack,
    run_dir: RunDir,
    repo_root: PathBuf,
    artifacts_dir: PathBuf,
    env: EnvironmentMap,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunReport<'a> {
    pub config: &'a LaunchConfig,
    pub run_dir: PathBuf,
    pub repo_root: PathBuf,
    pub artifacts_dir: PathBuf,
    pub invocation: Invocation,
    pub rendered: String,
}

/// Prepares a run.
///
/// Environment binding happens first so a missing mandatory variable fails
/// before any directory is created. `resolve_root` is only called once the
/// run directory exists. `temp_parent` overrides the system temp dir.
#[instrument(skip_all, fields(image = %config.image))]
pub fn prepare<P, F>(
    config: &LaunchConfig,
    provider: &P,
    resolve_root: F,
    temp_parent: Option<&Path>,
) -> Result<PreparedLaunch, LaunchError>
where
    P: EnvProvider + ?Sized,
    F: FnOnce() -> Result<PathBuf, LaunchError>,
{
    let mut envs = env::bind(provider, &config.mandatory_env, &config.optional_env)?;

    let run_dir = match temp_parent {
        Some(parent) => RunDir::create_in(parent)?,
        None => RunDir::create()?,
    };

    let mut builder = InvocationBuilder::new(
        &config.runtime,
        config.interactive,
        OverlayManager::new(run_dir.overlays_root()),
    );
    let mut cleanup = CleanupStack::new();

    for mount in &config.mounts {
        let path = absolutize(mount);
        builder.add_bind_mount(&path, &path);
    }

    let repo_root = resolve_root()?;
    cleanup.push(builder.add_rw_overlay(&repo_root, &repo_root)?);

    match provider.get("HOME").filter(|home| !home.is_empty()) {
        Some(home) => {
            let kube_dir = Path::new(&home).join(".kube");
            if kube_dir.is_dir() {
                cleanup.push(builder.add_rw_overlay(&kube_dir, KUBE_CONTAINER_DIR)?);
            } else {
                warn!(
                    "No kube config directory at {}, skipping its overlay",
                    kube_dir.display()
                );
            }
        }
        None => warn!("HOME is not set, skipping the kube config overlay"),
    }

    builder.set_workdir(&repo_root);

    let artifacts_dir = match provider.get(ARTIFACTS_VAR).filter(|dir| !dir.is_empty()) {
        Some(dir) => absolutize(Path::new(&dir)),
        None => {
            info!(
                "Setting local ARTIFACTS directory to {}",
                run_dir.path().display()
            );
            run_dir.path().to_path_buf()
        }
    };
    builder.add_bind_mount(&artifacts_dir, &artifacts_dir);
    envs.insert(
        ARTIFACTS_VAR.to_string(),
        artifacts_dir.display().to_string(),
    );
    let reported = artifacts_dir.clone();
    cleanup.push(CleanupAction::new("artifacts", move || {
        info!("Artifacts found at {}", reported.display())
    }));
    builder.add_env(&envs);

    Ok(PreparedLaunch {
        builder,
        cleanup,
        run_dir,
        repo_root,
        artifacts_dir,
        env: envs,
    })
}

impl PreparedLaunch {
    pub fn run_dir(&self) -> &RunDir {
        &self.run_dir
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Variables the container will receive, `ARTIFACTS` included.
    pub fn env(&self) -> &EnvironmentMap {
        &self.env
    }

    pub fn cleanup_labels(&self) -> Vec<&str> {
        self.cleanup.labels()
    }

    /// Pulls, runs the container and tears everything down, in that order.
    pub fn launch<I: CommandInvoker + ?Sized>(
        self,
        runner: &Runner<'_, I>,
        image: &str,
        args: &[String],
    ) -> Result<ExitStatus, LaunchError> {
        let PreparedLaunch {
            builder,
            mut cleanup,
            run_dir,
            ..
        } = self;
        let log_file = run_dir.log_file();
        let result = runner.run(builder, image, args.iter().cloned(), Some(log_file.as_path()));
        cleanup.run_all();
        result
    }

    /// Finishes the invocation without running anything, then tears down.
    pub fn dry_run<'a>(self, config: &'a LaunchConfig) -> DryRunReport<'a> {
        let PreparedLaunch {
            builder,
            mut cleanup,
            run_dir,
            repo_root,
            artifacts_dir,
            ..
        } = self;
        let invocation = builder.finish(&config.image, ENTRYPOINT, config.args.iter().cloned());
        cleanup.run_all();
        DryRunReport {
            config,
            run_dir: run_dir.path().to_path_buf(),
            repo_root,
            artifacts_dir,
            rendered: invocation.to_string(),
            invocation,
        }
    }
}
