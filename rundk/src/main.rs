//! rundk
//!
//! Runs the CI test image locally: the checkout and kube config are mounted
//! through writable overlays, selected environment variables are forwarded,
//! and the image's `runner.sh` is executed with any trailing arguments.

use anyhow::{Context, Result};
use clap::Parser;
use launch_core::launch::{DEFAULT_MANDATORY_ENV_VARS, DEFAULT_RUNTIME, DEFAULT_TEST_IMAGE};
use launch_core::{
    prepare, resolve_repo_root, split_list, stdin_is_terminal, HostEnv, LaunchConfig, Runner,
    SystemInvoker,
};
use std::path::PathBuf;
use std::process::{ExitCode, ExitStatus};
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "rundk", version)]
#[command(about = "Run the CI test image against the local checkout", long_about = None)]
struct Cli {
    /// The image used to run the test flow
    #[arg(long, env = "RUNDK_TEST_IMAGE", default_value = DEFAULT_TEST_IMAGE)]
    test_image: String,

    /// Comma separated host paths mounted at the same path in the container
    #[arg(long, env = "RUNDK_MOUNTS", default_value = "")]
    mounts: String,

    /// Comma separated environment variables that must be set locally
    #[arg(long, env = "RUNDK_MANDATORY_ENV_VARS", default_value = DEFAULT_MANDATORY_ENV_VARS)]
    mandatory_env_vars: String,

    /// Comma separated environment variables forwarded when set locally
    #[arg(long, env = "RUNDK_OPTIONAL_ENV_VARS", default_value = "")]
    optional_env_vars: String,

    /// Container runtime binary used to pull and run the image
    #[arg(long, env = "RUNDK_CONTAINER_RUNTIME", default_value = DEFAULT_RUNTIME)]
    runtime: String,

    /// Pause between printing the command and running it (e.g. 3s, 500ms)
    #[arg(long, env = "RUNDK_GRACE_PERIOD", default_value = "3s", value_parser = humantime::parse_duration)]
    grace_period: Duration,

    /// Do not pull the image before running
    #[arg(long)]
    no_pull: bool,

    /// Never allocate a TTY, even when stdin is a terminal
    #[arg(long)]
    no_tty: bool,

    /// Print the container command without running it
    #[arg(long)]
    dry_run: bool,

    /// With --dry-run, print a JSON report instead of the command line
    #[arg(long, requires = "dry_run")]
    json: bool,

    /// Arguments passed to runner.sh inside the container
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Cli {
    fn launch_config(&self, interactive: bool) -> LaunchConfig {
        LaunchConfig {
            image: self.test_image.clone(),
            mounts: split_list(&self.mounts)
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            mandatory_env: split_list(&self.mandatory_env_vars),
            optional_env: split_list(&self.optional_env_vars),
            runtime: self.runtime.clone(),
            grace_period: self.grace_period,
            pull: !self.no_pull,
            interactive: interactive && !self.no_tty,
            args: self.args.clone(),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = cli.launch_config(stdin_is_terminal());
    let prepared = prepare(&config, &HostEnv, resolve_repo_root, None)?;

    if cli.dry_run {
        let report = prepared.dry_run(&config);
        if cli.json {
            let json = serde_json::to_string_pretty(&report)
                .context("Failed to serialize dry-run report")?;
            println!("{}", json);
        } else {
            println!("Logging to {}", report.run_dir.display());
            println!("{}", report.rendered);
        }
        return Ok(ExitCode::SUCCESS);
    }

    println!("Logging to {}", prepared.run_dir().path().display());
    let runner = Runner::new(&SystemInvoker)
        .grace_period(config.grace_period)
        .pull(config.pull);
    let status = prepared.launch(&runner, &config.image, &config.args)?;
    Ok(exit_code(status))
}

/// Mirrors the container's exit status; a signal-terminated child or a code
/// outside 0..=255 maps to 1.
fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    }
}
