//! Shared command-execution plumbing for external CLIs.
//!
//! Everything snapstrap does to the outside world goes through a binary it
//! does not own (`snaptel`, `kubectl`), so command execution sits behind a
//! trait and the rest of the crate never touches `std::process` directly.

use anyhow::{anyhow, Context, Result};
use std::process::Command;

/// Fully buffered result of one external command invocation.
///
/// Output is interpreted only after the process exits; there is no streaming
/// of partial output.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl CommandOutput {
    /// First non-empty stderr line, for error messages.
    pub fn error_detail(&self) -> String {
        self.stderr
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("command exited with failure status")
            .to_string()
    }
}

/// Seam for external command execution so the control-plane and cluster
/// clients can be scripted in tests.
///
/// An `Err` means the command could not be run at all (missing binary,
/// spawn failure); a command that ran but exited non-zero is reported
/// through [`CommandOutput::success`].
pub trait CommandRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        (**self).run(argv)
    }
}

/// Runs commands through `std::process::Command`, blocking until exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command line"))?;
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("spawn {program}"))?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        })
    }
}

/// Parse a user-supplied base command (e.g. `--snaptel "sudo snaptel"`) into
/// argv form, verifying the program resolves on PATH when it is a bare name.
pub fn resolve_base_command(raw: &str) -> Result<Vec<String>> {
    let argv = shell_words::split(raw).with_context(|| format!("parse command {raw:?}"))?;
    let program = argv
        .first()
        .ok_or_else(|| anyhow!("empty command: {raw:?}"))?;
    if !program.contains('/') {
        which::which(program).with_context(|| format!("{program} not found on PATH"))?;
    }
    Ok(argv)
}
