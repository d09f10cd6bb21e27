//! External command execution.
//!
//! Every side effect of a launch goes through [`Runner`]: commands are echoed
//! as `$ <command line>`, recorded in a history, and skipped entirely in
//! dry-run mode. Background daemons (hostapd, wpa_supplicant, wireshark) are
//! spawned and left running after the launcher exits.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;

use crate::error::LauncherError;

/// A program invocation. Privileged commands get a `sudo` prefix when the
/// runner is configured to use it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    privileged: bool,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Cmd {
            program: program.into(),
            args: Vec::new(),
            privileged: false,
        }
    }

    pub fn sudo(program: impl Into<String>) -> Self {
        Cmd {
            privileged: true,
            ..Cmd::new(program)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

pub struct Runner {
    dry_run: bool,
    echo: bool,
    use_sudo: bool,
    search_path: Option<OsString>,
    history: Mutex<Vec<String>>,
}

impl Runner {
    pub fn new(dry_run: bool, use_sudo: bool) -> Self {
        Runner {
            dry_run,
            echo: dry_run,
            use_sudo,
            search_path: None,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Echo commands in live runs too.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo || self.dry_run;
        self
    }

    /// Looks programs up in `path` instead of the inherited `PATH`.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Every command line seen so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    fn command_line(&self, cmd: &Cmd) -> String {
        if cmd.privileged && self.use_sudo {
            format!("sudo {}", cmd)
        } else {
            cmd.to_string()
        }
    }

    fn record(&self, line: String) {
        if self.echo {
            println!("$ {}", line);
        }
        tracing::debug!(command = %line, dry_run = self.dry_run, "exec");
        if let Ok(mut history) = self.history.lock() {
            history.push(line);
        }
    }

    fn build(&self, cmd: &Cmd) -> Command {
        let mut command = if cmd.privileged && self.use_sudo {
            let mut c = Command::new("sudo");
            c.arg(&cmd.program);
            c
        } else {
            Command::new(&cmd.program)
        };
        command.args(&cmd.args);
        if let Some(path) = &self.search_path {
            command.env("PATH", path);
        }
        command
    }

    /// Runs `cmd` to completion and returns its exit code (-1 when killed
    /// by a signal).
    pub async fn run(&self, cmd: &Cmd) -> Result<i32> {
        let line = self.command_line(cmd);
        self.record(line.clone());
        if self.dry_run {
            return Ok(0);
        }

        let status = self
            .build(cmd)
            .status()
            .await
            .with_context(|| format!("Failed to execute {}", line))?;

        Ok(status.code().unwrap_or(-1))
    }

    /// Runs `cmd` with its output discarded, ignoring any failure.
    pub async fn run_quiet(&self, cmd: &Cmd) {
        let line = self.command_line(cmd);
        self.record(line.clone());
        if self.dry_run {
            return;
        }

        let result = self
            .build(cmd)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            tracing::debug!(command = %line, error = %e, "ignored failure");
        }
    }

    /// Runs `cmd` and fails on a non-zero exit code.
    pub async fn check(&self, cmd: &Cmd) -> Result<()> {
        let code = self.run(cmd).await?;
        if code != 0 {
            return Err(LauncherError::CommandFailed {
                command: self.command_line(cmd),
                reason: format!("exit code {}", code),
            }
            .into());
        }
        Ok(())
    }

    /// Captures stdout. Returns an empty string in dry-run mode.
    pub async fn capture(&self, cmd: &Cmd) -> Result<String> {
        Ok(self
            .capture_within(cmd, None)
            .await?
            .unwrap_or_default())
    }

    /// Captures stdout, giving up after `limit`. `None` means the command
    /// did not finish in time; it is killed.
    pub async fn capture_within(&self, cmd: &Cmd, limit: Option<Duration>) -> Result<Option<String>> {
        let line = self.command_line(cmd);
        self.record(line.clone());
        if self.dry_run {
            return Ok(Some(String::new()));
        }

        let mut command = self.build(cmd);
        command.stdin(Stdio::null()).kill_on_drop(true);
        let output = command.output();

        let output = match limit {
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(result) => result,
                Err(_) => return Ok(None),
            },
            None => output.await,
        }
        .with_context(|| format!("Failed to execute {}", line))?;

        Ok(Some(String::from_utf8_lossy(&output.stdout).to_string()))
    }

    /// Starts `cmd` in the background and does not wait for it.
    pub fn spawn(&self, cmd: &Cmd) -> Result<()> {
        let line = self.command_line(cmd);
        self.record(format!("{} &", line));
        if self.dry_run {
            return Ok(());
        }

        let child = self
            .build(cmd)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start {}", line))?;
        tracing::info!(command = %line, pid = ?child.id(), "started in background");
        Ok(())
    }

    pub async fn sleep(&self, secs: u64) {
        if self.dry_run || secs == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    /// Reads the conf template `src`, applies `edit` and writes the result to
    /// `dst`. Nothing is read or written in dry-run mode.
    pub fn render_conf<F>(&self, src: &Path, dst: &Path, edit: F) -> Result<()>
    where
        F: FnOnce(&str) -> String,
    {
        self.record(format!("render {} -> {}", src.display(), dst.display()));
        if self.dry_run {
            return Ok(());
        }

        let template = fs::read_to_string(src)
            .map_err(|e| LauncherError::Template(format!("{}: {}", src.display(), e)))?;
        fs::write(dst, edit(&template))
            .with_context(|| format!("Failed to write conf file: {}", dst.display()))?;

        Ok(())
    }
}
