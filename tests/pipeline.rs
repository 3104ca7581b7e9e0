#![cfg(unix)]

use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
};

use pretty_assertions::assert_eq;
use shortcut_runner::{
    config::RunnerConfig,
    executor::{Classification, ExecutionResult, ScriptExecutor, Stage},
    process::SystemRunner,
    status::NoopSink,
    ShortcutRunner,
};
use tempfile::TempDir;

const ENTRY_SCRIPT: &str = "steam_macos_shortcut_creator/fixicons.py";

/// Stands in for Python: creates "environments", records pip calls and runs
/// entry scripts with `sh`.
const STUB_PYTHON: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
    echo "Python 3.12.0"
    exit 0
fi
if [ "$1" = "-m" ] && [ "$2" = "venv" ]; then
    mkdir -p "$3/bin" && cp "$0" "$3/bin/python" && chmod +x "$3/bin/python"
    exit $?
fi
if [ "$1" = "-m" ] && [ "$2" = "pip" ]; then
    echo "$*" >> "$(dirname "$0")/../pip.log"
    exit 0
fi
script="$1"
shift
exec sh "$script" "$@"
"#;

const SCRIPT_V1: &str = r#"
if [ "$1" = "--fail" ]; then
    echo "Error: missing icon" 1>&2
    exit 1
fi
if [ "$1" = "--echo" ]; then
    shift
    for arg in "$@"; do
        printf '[%s]\n' "$arg"
    done
    exit 0
fi
echo "Successfully created 1 shortcut(s)"
"#;

struct Fixture {
    _dir: TempDir,
    remote: PathBuf,
    config: RunnerConfig,
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(cwd: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Fixture",
            "-c",
            "user.email=fixture@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(cwd)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn commit_script(remote: &Path, content: &str, message: &str) {
    std::fs::write(remote.join(ENTRY_SCRIPT), content).unwrap();
    git(remote, &["add", "-A"]);
    git(remote, &["commit", "-q", "-m", message]);
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();

    let remote = dir.path().join("remote src").join("VDF");
    std::fs::create_dir_all(remote.join("steam_macos_shortcut_creator")).unwrap();
    git(&remote, &["init", "-q"]);
    git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(remote.join("requirements.txt"), "vdf>=3.4\nPillow\n").unwrap();
    std::fs::write(remote.join("setup.py"), "from setuptools import setup\nsetup()\n").unwrap();
    commit_script(&remote, SCRIPT_V1, "initial");

    let bin = dir.path().join("stub bin");
    std::fs::create_dir_all(&bin).unwrap();
    let python = bin.join("python3");
    std::fs::write(&python, STUB_PYTHON).unwrap();
    std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = RunnerConfig::with_data_dir(&dir.path().join("Application Support"));
    config.repository.url = remote.display().to_string();
    config.python.interpreter = python;

    Fixture {
        _dir: dir,
        remote,
        config,
    }
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn pip_calls(config: &RunnerConfig) -> usize {
    std::fs::read_to_string(config.environment_path().join("pip.log"))
        .map(|log| log.lines().count())
        .unwrap_or(0)
}

#[test]
fn fresh_checkout_bootstrap_and_run() {
    if !git_available() {
        eprintln!("git is not installed, skipping");
        return;
    }
    let fixture = fixture();
    let config = &fixture.config;
    let mut executor = ScriptExecutor::new(config.clone(), Arc::new(SystemRunner));

    let result = executor.execute(
        &args(&["/Applications/Foo.app", "--size", "128"]),
        &NoopSink,
    );
    assert_eq!(
        result,
        ExecutionResult {
            combined_output: "Successfully created 1 shortcut(s)".to_owned(),
            classification: Classification::Success,
            exit_code: 0,
            failed_stage: None,
        }
    );
    assert!(config.repository.dir.join(".git").is_dir());
    assert!(config.environment_path().join("bin/python").is_file());
    assert_eq!(pip_calls(config), 2);

    let result = executor.execute(&args(&["--fail"]), &NoopSink);
    assert_eq!(result.classification, Classification::Failure);
    assert_eq!(result.failed_stage, Some(Stage::Execution));
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.combined_output, "Error: missing icon");
    assert_eq!(pip_calls(config), 2, "environment is bootstrapped once");
}

#[test]
fn update_discards_local_changes_and_follows_remote() {
    if !git_available() {
        eprintln!("git is not installed, skipping");
        return;
    }
    let fixture = fixture();
    let config = &fixture.config;
    let mut executor = ScriptExecutor::new(config.clone(), Arc::new(SystemRunner));
    executor.execute(&args(&["/Applications/Foo.app"]), &NoopSink);

    std::fs::write(config.entry_script_path(), "echo tampered").unwrap();
    commit_script(
        &fixture.remote,
        "echo 'Successfully created 2 shortcut(s)'\n",
        "second",
    );

    let result = executor.execute(&args(&["/Applications/Foo.app"]), &NoopSink);
    assert_eq!(result.combined_output, "Successfully created 2 shortcut(s)");
    assert_eq!(result.classification, Classification::Success);
    assert!(executor.repository().state().last_sync_time.is_some());
}

#[test]
fn corrupt_checkout_is_replaced() {
    if !git_available() {
        eprintln!("git is not installed, skipping");
        return;
    }
    let fixture = fixture();
    let config = &fixture.config;
    std::fs::create_dir_all(config.repository.dir.join("steam_macos_shortcut_creator")).unwrap();
    std::fs::write(config.entry_script_path(), "echo stale").unwrap();

    let mut executor = ScriptExecutor::new(config.clone(), Arc::new(SystemRunner));
    let result = executor.execute(&args(&["/Applications/Foo.app"]), &NoopSink);
    assert_eq!(result.combined_output, "Successfully created 1 shortcut(s)");
    assert!(config.repository.dir.join(".git").is_dir());
}

#[test]
fn unreachable_remote_stops_before_bootstrap() {
    if !git_available() {
        eprintln!("git is not installed, skipping");
        return;
    }
    let fixture = fixture();
    let mut config = fixture.config.clone();
    config.repository.url = fixture
        .remote
        .with_file_name("missing")
        .display()
        .to_string();

    let mut executor = ScriptExecutor::new(config.clone(), Arc::new(SystemRunner));
    let result = executor.execute(&args(&["/Applications/Foo.app"]), &NoopSink);
    assert_eq!(result.classification, Classification::Failure);
    assert_eq!(result.failed_stage, Some(Stage::Sync));
    assert!(result.combined_output.starts_with("git clone failed: "));
    assert!(!config.environment_path().exists());
    assert!(executor.repository().state().last_error.is_some());
}

#[tokio::test]
async fn arguments_survive_the_shell_envelope() {
    if !git_available() {
        eprintln!("git is not installed, skipping");
        return;
    }
    let fixture = fixture();
    let mut config = fixture.config.clone();
    config.python.shell = Some(PathBuf::from("/bin/sh"));

    let runner = ShortcutRunner::builder()
        .config(config)
        .try_build()
        .unwrap();
    let result = runner
        .execute(
            args(&[
                "--echo",
                "/Applications/My Game.app",
                r#"say "hi""#,
                "$HOME",
            ]),
            Arc::new(NoopSink),
        )
        .await;
    assert_eq!(
        result.combined_output,
        "[/Applications/My Game.app]\n[say \"hi\"]\n[$HOME]"
    );
    assert!(runner.status().await.environment_ready);
}
