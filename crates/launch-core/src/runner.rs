use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::LaunchError;
use crate::invocation::{Invocation, InvocationBuilder};

/// Entrypoint every test image ships.
pub const ENTRYPOINT: &str = "runner.sh";

/// Executes external commands on behalf of the runner.
pub trait CommandInvoker {
    /// Runs `program` to completion with inherited stdin. When `log` is
    /// given, stdout and stderr are copied into it as well as the terminal.
    fn status(&self, program: &str, args: &[String], log: Option<File>) -> io::Result<ExitStatus>;
}

/// Spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInvoker;

impl CommandInvoker for SystemInvoker {
    fn status(&self, program: &str, args: &[String], log: Option<File>) -> io::Result<ExitStatus> {
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::inherit());

        let Some(log) = log else {
            return command.status();
        };

        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = command.spawn()?;

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let log = log.try_clone()?;
            pumps.push(thread::spawn(move || tee(stdout, io::stdout(), log)));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(thread::spawn(move || tee(stderr, io::stderr(), log)));
        }

        let status = child.wait()?;
        for pump in pumps {
            match pump.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("Failed to copy container output to the run log: {}", err),
                Err(_) => warn!("Output copier thread panicked"),
            }
        }
        Ok(status)
    }
}

fn tee<R: Read, W: Write>(mut reader: R, mut terminal: W, mut log: File) -> io::Result<()> {
    let mut buf = [0u8; 8192];
    let mut terminal_open = true;
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        log.write_all(&buf[..read])?;
        if terminal_open {
            if let Err(err) = terminal.write_all(&buf[..read]).and_then(|_| terminal.flush()) {
                debug!("Terminal write failed, continuing with the run log only: {}", err);
                terminal_open = false;
            }
        }
    }
    log.flush()
}

/// Pulls the image, announces the invocation and runs it once.
pub struct Runner<'a, I: CommandInvoker + ?Sized> {
    invoker: &'a I,
    grace_period: Duration,
    pull: bool,
}

impl<'a, I: CommandInvoker + ?Sized> Runner<'a, I> {
    pub fn new(invoker: &'a I) -> Self {
        Self {
            invoker,
            grace_period: Duration::from_secs(3),
            pull: true,
        }
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn pull(mut self, pull: bool) -> Self {
        self.pull = pull;
        self
    }

    /// Pulls `image` through the builder's runtime. Failures are returned
    /// for logging; they never stop the run.
    pub fn pull_image(&self, runtime: &str, image: &str) -> Result<(), LaunchError> {
        let args = vec!["pull".to_string(), image.to_string()];
        match self.invoker.status(runtime, &args, None) {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(LaunchError::ImagePullFailed {
                image: image.to_string(),
                message: status.to_string(),
            }),
            Err(err) => Err(LaunchError::ImagePullFailed {
                image: image.to_string(),
                message: err.to_string(),
            }),
        }
    }

    /// Runs the container and returns its exit status.
    ///
    /// Output is copied to `log_path` when given.
    #[instrument(skip(self, builder, extra, log_path))]
    pub fn run<S: Into<String>>(
        &self,
        builder: InvocationBuilder,
        image: &str,
        extra: impl IntoIterator<Item = S>,
        log_path: Option<&Path>,
    ) -> Result<ExitStatus, LaunchError> {
        if self.pull {
            if let Err(err) = self.pull_image(builder.runtime(), image) {
                warn!("{}; continuing with the local image if present", err);
            }
        }

        let invocation = builder.finish(image, ENTRYPOINT, extra);
        self.announce(&invocation);
        self.execute(&invocation, log_path)
    }

    pub fn execute(
        &self,
        invocation: &Invocation,
        log_path: Option<&Path>,
    ) -> Result<ExitStatus, LaunchError> {
        let log = log_path.map(open_log).transpose()?;
        let status = self
            .invoker
            .status(invocation.runtime(), invocation.args(), log)
            .map_err(|source| LaunchError::ContainerExecutionFailed {
                runtime: invocation.runtime().to_string(),
                source,
            })?;
        info!("Container exited with {}", status);
        Ok(status)
    }

    fn announce(&self, invocation: &Invocation) {
        println!("{}", invocation);
        if self.grace_period.is_zero() {
            return;
        }
        println!(
            "Starting in {}, ^C to abort!",
            humantime::format_duration(self.grace_period)
        );
        thread::sleep(self.grace_period);
    }
}

fn open_log(path: &Path) -> Result<File, LaunchError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LaunchError::LogFileFailed {
            path: path.to_path_buf(),
            source,
        })
}


#[cfg(all(test, unix))]
mod tests {
    use super::mock::MockInvoker;
    use super::*;
    use crate::overlay::OverlayManager;

    fn builder(root: &Path) -> InvocationBuilder {
        let mut b = InvocationBuilder::new("docker", false, OverlayManager::new(root));
        b.add_bind_mount("/a/path", "/a/path");
        b
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn closed_terminal_does_not_truncate_the_run_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build-log.txt");
        let log = File::create(&path).unwrap();
        let output = "line\n".repeat(5000);

        tee(output.as_bytes(), BrokenPipe, log).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), output);
    }

    #[test]
    fn pulls_then_runs_image_with_entrypoint_and_extra_args() {
        let run = tempfile::tempdir().unwrap();
        let invoker = MockInvoker::default();
        let runner = Runner::new(&invoker).grace_period(Duration::ZERO);

        let log = run.path().join("build-log.txt");
        let status = runner
            .run(builder(run.path()), "img:stable", ["e2e"], Some(&log))
            .unwrap();
        assert!(status.success());

        let calls = invoker.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "docker");
        assert_eq!(calls[0].1, ["pull", "img:stable"]);
        assert!(!calls[0].2);
        assert_eq!(calls[1].1[calls[1].1.len() - 3..], ["img:stable", "runner.sh", "e2e"]);
        assert!(calls[1].2);
        assert!(log.exists());
    }

    #[test]
    fn pull_failure_is_not_fatal() {
        let run = tempfile::tempdir().unwrap();
        let invoker = MockInvoker::with_responses(vec![Err(io::ErrorKind::NotFound), Ok(0)]);
        let runner = Runner::new(&invoker).grace_period(Duration::ZERO);

        let status = runner
            .run(builder(run.path()), "img", Vec::<String>::new(), None)
            .unwrap();
        assert!(status.success());
        assert_eq!(invoker.calls().len(), 2);
    }

    #[test]
    fn child_exit_status_is_propagated() {
        let run = tempfile::tempdir().unwrap();
        let invoker = MockInvoker::with_responses(vec![Ok(0), Ok(3)]);
        let runner = Runner::new(&invoker).grace_period(Duration::ZERO);

        let status = runner
            .run(builder(run.path()), "img", Vec::<String>::new(), None)
            .unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn spawn_failure_is_container_execution_failed() {
        let run = tempfile::tempdir().unwrap();
        let invoker = MockInvoker::with_responses(vec![Err(io::ErrorKind::NotFound)]);
        let runner = Runner::new(&invoker).pull(false).grace_period(Duration::ZERO);

        let err = runner
            .run(builder(run.path()), "img", Vec::<String>::new(), None)
            .unwrap_err();
        assert!(matches!(err, LaunchError::ContainerExecutionFailed { .. }));
        assert_eq!(invoker.calls().len(), 1);
    }

    #[test]
    fn pull_reports_non_zero_exit() {
        let invoker = MockInvoker::with_responses(vec![Ok(1)]);
        let runner = Runner::new(&invoker);
        let err = runner.pull_image("docker", "img").unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("img"));
    }

    #[test]
    fn system_invoker_tees_output_into_log() {
        let run = tempfile::tempdir().unwrap();
        let log_path = run.path().join("log.txt");
        let log = open_log(&log_path).unwrap();

        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 4".to_string()];
        let status = SystemInvoker.status("sh", &args, Some(log)).unwrap();

        assert_eq!(status.code(), Some(4));
        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("out"));
        assert!(contents.contains("err"));
    }
}
