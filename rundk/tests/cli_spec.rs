use assert_cmd::Command;
use predicates::prelude::*;

fn rundk() -> Command {
    let mut cmd = Command::cargo_bin("rundk").unwrap();
    for var in [
        "RUNDK_TEST_IMAGE",
        "RUNDK_MOUNTS",
        "RUNDK_MANDATORY_ENV_VARS",
        "RUNDK_OPTIONAL_ENV_VARS",
        "RUNDK_CONTAINER_RUNTIME",
        "RUNDK_GRACE_PERIOD",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Help lists the CI-compatible flags
#[test]
fn given_help_flag_then_show_usage() {
    rundk()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--test-image"))
        .stdout(predicate::str::contains("--mounts"))
        .stdout(predicate::str::contains("--mandatory-env-vars"))
        .stdout(predicate::str::contains("--optional-env-vars"));
}

/// A missing mandatory variable aborts before the run directory is created
#[test]
fn given_missing_credentials_when_run_then_fail_without_setup() {
    let tmp = tempfile::tempdir().unwrap();

    rundk()
        .env_remove("GOOGLE_APPLICATION_CREDENTIALS")
        .env("TMPDIR", tmp.path())
        .args(["--grace-period", "0s"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Missing mandatory environment variable(s): GOOGLE_APPLICATION_CREDENTIALS",
        ))
        .stdout(predicate::str::contains("Logging to").not());

    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

/// Every absent mandatory name is reported
#[test]
fn given_several_missing_variables_then_all_are_named() {
    rundk()
        .env_remove("RUNDK_TEST_VAR_FIRST")
        .env_remove("RUNDK_TEST_VAR_SECOND")
        .args(["--mandatory-env-vars", "RUNDK_TEST_VAR_FIRST,RUNDK_TEST_VAR_SECOND"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RUNDK_TEST_VAR_FIRST, RUNDK_TEST_VAR_SECOND"));
}

/// --json is only meaningful for dry runs
#[test]
fn given_json_without_dry_run_then_usage_error() {
    rundk().arg("--json").assert().failure().code(2);
}
