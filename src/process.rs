use std::{
    ffi::OsString,
    io::Read,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use log::{debug, trace};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("{program} was not found")]
    NotFound { program: String },
    #[error("Cannot run {program}: working directory {} does not exist", cwd.display())]
    WorkingDirectory { program: String, cwd: PathBuf },
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("IO error while reading output of {program}: {source}")]
    Output {
        program: String,
        source: std::io::Error,
    },
}

/// A single external process invocation.
///
/// Arguments are kept as a discrete vector and handed to the OS untouched.
/// [`CommandSpec::in_shell`] is the only place where they get joined into
/// one command line, and every token is quoted with [`quote_arg`] first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(OsString, OsString)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Wraps the invocation into `<shell> -c "<rendered line>"`.
    pub fn in_shell(self, shell: &Path) -> Self {
        let line = self.render();
        CommandSpec {
            program: shell.to_path_buf(),
            args: vec!["-c".into(), line.into()],
            cwd: self.cwd,
            env: self.env,
        }
    }

    /// Program and arguments as a single, shell-safe command line.
    pub fn render(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|token| quote_arg(&token.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The arguments as UTF-8, for matching in logs and tests.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Wraps a token in double quotes, escaping everything a POSIX shell still
/// interprets inside them.
pub fn quote_arg(token: &str) -> String {
    let mut quoted = String::with_capacity(token.len() + 2);
    quoted.push('"');
    for c in token.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The process' own diagnostic, or a generic message naming the step.
    pub fn diagnostic(&self, step: &str) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("{} exited with code {}", step, self.exit_code)
        } else {
            stderr.to_owned()
        }
    }
}

/// Runs external processes to completion.
///
/// A non-zero exit code is not an error at this level; it is returned in
/// [`ProcessOutput`] and the caller decides whether it is fatal.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, RunError>;
}

/// [`CommandRunner`] backed by real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, RunError> {
        let program = command.program_name();
        debug!(
            "Running {} (in {})",
            command.render(),
            command
                .cwd
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ".".to_owned())
        );

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| {
            // A missing working directory is reported with the same kind as a
            // missing program.
            let missing_cwd = command.cwd.as_ref().filter(|cwd| !cwd.is_dir());
            if let Some(cwd) = missing_cwd {
                RunError::WorkingDirectory {
                    program: program.clone(),
                    cwd: cwd.clone(),
                }
            } else if source.kind() == std::io::ErrorKind::NotFound {
                RunError::NotFound {
                    program: program.clone(),
                }
            } else {
                RunError::Spawn {
                    program: program.clone(),
                    source,
                }
            }
        })?;

        // Both pipes are drained at the same time, otherwise a child that
        // fills one of them blocks forever while we wait on the other.
        let mut stderr_pipe = child.stderr.take();
        let stderr_reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                pipe.read_to_end(&mut buf)?;
            }
            Ok::<_, std::io::Error>(buf)
        });

        let mut stdout = Vec::new();
        let stdout_result = match child.stdout.take() {
            Some(mut pipe) => pipe.read_to_end(&mut stdout).map(|_| ()),
            None => Ok(()),
        };

        let stderr = stderr_reader
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::other("stderr reader panicked")));
        let status = child.wait();

        let output_error = |source| RunError::Output {
            program: program.clone(),
            source,
        };
        stdout_result.map_err(output_error)?;
        let stderr = stderr.map_err(output_error)?;
        let status = status.map_err(output_error)?;

        let output = ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code().unwrap_or(-1),
        };
        trace!("{} exited with code {}", program, output.exit_code);
        Ok(output)
    }
}
