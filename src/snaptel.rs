//! Control-plane client for the snap collector's `snaptel` CLI.
//!
//! The collector loads plugins and starts tasks asynchronously, and its
//! command exit status alone is not trustworthy: a load or create can
//! "succeed" before the collector's own state reflects it. Every mutating
//! operation here is therefore followed by a polling confirmation against
//! the listing commands. Retry counts and delays are fixed policy constants
//! rather than computed backoff; the control plane is a co-located local
//! process, not a remote peer.

use crate::runner::{CommandOutput, CommandRunner};
use anyhow::{anyhow, Result};
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Polls of the plugin listing after a load command reports success.
pub const WAIT_RETRIES: u32 = 5;
/// Delay between plugin-listing polls.
pub const WAIT_DELAY: Duration = Duration::from_secs(5);
/// Attempts of the plugin-load command itself.
pub const LOAD_RETRIES: u32 = 20;
/// Delay between plugin-load attempts.
pub const LOAD_DELAY: Duration = Duration::from_secs(5);

/// Fixed retry policy; tests zero the delays to stay deterministic while
/// keeping the attempt counts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub wait_retries: u32,
    pub wait_delay: Duration,
    pub load_retries: u32,
    pub load_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            wait_retries: WAIT_RETRIES,
            wait_delay: WAIT_DELAY,
            load_retries: LOAD_RETRIES,
            load_delay: LOAD_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Same attempt counts with no sleeping, for tests.
    pub fn immediate() -> Self {
        Self {
            wait_delay: Duration::ZERO,
            load_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Stateless façade over the collector control CLI. Owns no state beyond
/// transient command results; collector state is observed on demand.
pub struct Snaptel<R: CommandRunner> {
    runner: R,
    base: Vec<String>,
    policy: RetryPolicy,
}

impl<R: CommandRunner> Snaptel<R> {
    pub fn new(runner: R, base: Vec<String>) -> Self {
        Self::with_policy(runner, base, RetryPolicy::default())
    }

    pub fn with_policy(runner: R, base: Vec<String>, policy: RetryPolicy) -> Self {
        Self {
            runner,
            base,
            policy,
        }
    }

    /// IDs of tasks the collector reports as running.
    ///
    /// A listing failure is unrecoverable: the listing is assumed always
    /// available when the control plane is healthy.
    pub fn list_running_tasks(&self) -> Result<Vec<String>> {
        let output = self.invoke(&["task", "list"])?;
        Ok(leading_tokens(&output.stdout))
    }

    /// Names of plugins whose reported status is exactly `loaded`; plugins
    /// still `loading` are excluded.
    pub fn list_loaded_plugins(&self) -> Result<Vec<String>> {
        let output = self.invoke(&["plugin", "list"])?;
        Ok(loaded_plugin_names(&output.stdout))
    }

    /// Poll the plugin listing until the loaded count reaches
    /// `expected_before + 1`.
    ///
    /// Confirmation is count-based by design: the collector may normalize
    /// plugin names in its listing, so the requested name is only logged,
    /// never matched. Exhausting the polls is fatal for the run.
    pub fn wait_until_plugin_loaded(&self, plugin: &str, expected_before: usize) -> Result<()> {
        for attempt in 1..=self.policy.wait_retries {
            let loaded = self.list_loaded_plugins()?;
            if loaded.len() == expected_before + 1 {
                tracing::debug!(plugin, loaded = loaded.len(), "plugin load confirmed");
                return Ok(());
            }
            tracing::debug!(
                plugin,
                attempt,
                loaded = loaded.len(),
                expected = expected_before + 1,
                "plugin not visible as loaded yet"
            );
            if attempt < self.policy.wait_retries {
                thread::sleep(self.policy.wait_delay);
            }
        }
        Err(anyhow!(
            "plugin {plugin} did not appear as loaded within {} checks",
            self.policy.wait_retries
        ))
    }

    /// Load a plugin artifact, confirming through the listing that the
    /// loaded count advanced by one.
    ///
    /// A failing load command consumes one attempt and retries; `Ok(false)`
    /// means every attempt failed. A command that succeeds but whose plugin
    /// never shows up as loaded is an `Err` (the collector accepted the load
    /// and then lost it — not worth retrying).
    pub fn load_plugin(&self, name: &str, artifact: &Path) -> Result<bool> {
        let before = self.list_loaded_plugins()?.len();
        let artifact_arg = artifact
            .to_str()
            .ok_or_else(|| anyhow!("artifact path {} is not valid UTF-8", artifact.display()))?;
        tracing::info!(plugin = name, artifact = artifact_arg, "loading plugin");
        for attempt in 1..=self.policy.load_retries {
            match self.try_invoke(&["plugin", "load", artifact_arg])? {
                Ok(_) => {
                    self.wait_until_plugin_loaded(name, before)?;
                    tracing::info!(plugin = name, "plugin loaded");
                    return Ok(true);
                }
                Err(detail) => {
                    tracing::warn!(plugin = name, attempt, detail = %detail, "plugin load attempt failed");
                }
            }
            if attempt < self.policy.load_retries {
                thread::sleep(self.policy.load_delay);
            }
        }
        Ok(false)
    }

    /// Submit a task definition. No retry: the collector starts accepted
    /// tasks asynchronously and the orchestrator confirms through
    /// [`Self::list_running_tasks`].
    pub fn submit_task(&self, definition: &Path) -> Result<bool> {
        let definition_arg = definition
            .to_str()
            .ok_or_else(|| anyhow!("task path {} is not valid UTF-8", definition.display()))?;
        tracing::info!(task = definition_arg, "submitting task");
        match self.try_invoke(&["task", "create", "-t", definition_arg])? {
            Ok(_) => Ok(true),
            Err(detail) => {
                tracing::warn!(task = definition_arg, detail = %detail, "task submission failed");
                Ok(false)
            }
        }
    }

    /// Run a control-plane command; a command-reported error becomes the
    /// inner `Err` so callers can choose between retrying and aborting. The
    /// outer `Err` is a spawn failure, always fatal.
    fn try_invoke(&self, args: &[&str]) -> Result<std::result::Result<CommandOutput, String>> {
        let mut argv = self.base.clone();
        argv.extend(args.iter().map(|arg| arg.to_string()));
        let output = self.runner.run(&argv)?;
        if output.success {
            Ok(Ok(output))
        } else {
            Ok(Err(output.error_detail()))
        }
    }

    fn invoke(&self, args: &[&str]) -> Result<CommandOutput> {
        self.try_invoke(args)?
            .map_err(|detail| anyhow!("snaptel {} failed: {detail}", args.join(" ")))
    }
}

/// Leading whitespace-delimited token of every line after the header,
/// skipping lines with no token at all.
fn leading_tokens(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Leading token of every post-header line whose status field is exactly
/// `loaded`. The status is any later field so column order does not matter.
fn loaded_plugin_names(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            fields.any(|field| field == "loaded").then(|| name.to_string())
        })
        .collect()
}

#[cfg(test)]
#[path = "snaptel_tests.rs"]
mod tests;
