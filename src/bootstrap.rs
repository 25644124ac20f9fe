//! End-to-end bootstrap sequencing and fleet-level consistency checks.
//!
//! The run is all-or-nothing: any fatal step aborts with already-loaded
//! plugins and already-submitted tasks left in place, and a re-run re-fetches
//! and re-attempts everything. Only storage provisioning is best-effort.
//! Control flow is strictly sequential; all waiting happens inside the
//! control-plane client's fixed retry loops.

use crate::cluster::ClusterApi;
use crate::context::Accessor;
use crate::fetch::Fetch;
use crate::manifest::{self, Manifest};
use crate::provision::{self, InfluxApi};
use crate::runner::CommandRunner;
use crate::snaptel::Snaptel;
use crate::taskdef;
use crate::template;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Inputs resolved from the CLI.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Manifest path or URL.
    pub manifest: String,
    /// Overrides for the manifest's destination directories.
    pub plugins_dir: Option<PathBuf>,
    pub tasks_dir: Option<PathBuf>,
    pub configs_dir: Option<PathBuf>,
}

/// Plugin lifecycle as observed through the control plane. The orchestrator
/// never sets collector state directly; it only records what it observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Submitted,
    ConfirmedRunning,
    SubmissionFailed,
}

#[derive(Debug)]
pub struct PluginRecord {
    pub name: String,
    pub location: String,
    pub artifact: PathBuf,
    pub state: PluginState,
}

#[derive(Debug)]
pub struct TaskRecord {
    pub location: String,
    pub definition: PathBuf,
    pub state: TaskState,
}

/// Final state of a successful run.
#[derive(Debug)]
pub struct BootstrapReport {
    pub deployment_id: String,
    pub plugins: Vec<PluginRecord>,
    pub tasks: Vec<TaskRecord>,
}

/// External collaborators the orchestrator drives.
pub struct Collaborators<'a, R: CommandRunner> {
    pub fetcher: &'a dyn Fetch,
    pub cluster: &'a dyn ClusterApi,
    pub snaptel: &'a Snaptel<R>,
    pub influx: &'a dyn InfluxApi,
}

/// Run the full bootstrap: fetch, render, provision, load, submit, verify.
pub fn run<R: CommandRunner>(
    opts: &BootstrapOptions,
    deps: &Collaborators<'_, R>,
) -> Result<BootstrapReport> {
    let workdir = Path::new(".");
    let manifest = manifest::load(deps.fetcher, &opts.manifest, workdir)?;
    tracing::info!(
        plugins = manifest.plugins.len(),
        tasks = manifest.tasks.len(),
        "manifest loaded"
    );

    // Resolved once, threaded explicitly into rendering.
    let deployment_id = deps.cluster.deployment_id()?;
    tracing::info!(deployment_id = %deployment_id, "resolved cluster deployment identity");
    let accessor = Accessor::new(deps.cluster, deployment_id.clone());

    let plugins_dir = destination(&opts.plugins_dir, &manifest.plugins_path);
    let tasks_dir = destination(&opts.tasks_dir, &manifest.tasks_path);
    let configs_dir = destination(&opts.configs_dir, &manifest.configs_path);
    for dir in [&plugins_dir, &tasks_dir, &configs_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("create destination directory {}", dir.display()))?;
    }

    let mut plugins = fetch_plugins(&manifest, deps.fetcher, &plugins_dir)?;
    let mut tasks = fetch_tasks(&manifest, deps.fetcher, &tasks_dir)?;
    for location in &manifest.configs {
        deps.fetcher
            .fetch(location, &configs_dir)
            .with_context(|| format!("fetch config {location}"))?;
    }

    for task in &tasks {
        render_and_provision(task, &accessor, deps.influx)?;
    }

    load_plugins(&mut plugins, deps.snaptel)?;
    submit_tasks(&mut tasks, deps.snaptel)?;

    Ok(BootstrapReport {
        deployment_id,
        plugins,
        tasks,
    })
}

fn destination(override_dir: &Option<PathBuf>, manifest_dir: &Option<PathBuf>) -> PathBuf {
    override_dir
        .clone()
        .or_else(|| manifest_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn fetch_plugins(
    manifest: &Manifest,
    fetcher: &dyn Fetch,
    plugins_dir: &Path,
) -> Result<Vec<PluginRecord>> {
    let mut plugins = Vec::with_capacity(manifest.plugins.len());
    for spec in manifest.plugins.iter() {
        let artifact = fetcher
            .fetch(&spec.location, plugins_dir)
            .with_context(|| format!("fetch plugin {}", spec.name))?;
        plugins.push(PluginRecord {
            name: spec.name.clone(),
            location: spec.location.clone(),
            artifact,
            state: PluginState::Unloaded,
        });
    }
    Ok(plugins)
}

fn fetch_tasks(
    manifest: &Manifest,
    fetcher: &dyn Fetch,
    tasks_dir: &Path,
) -> Result<Vec<TaskRecord>> {
    let mut tasks = Vec::with_capacity(manifest.tasks.len());
    for location in &manifest.tasks {
        let definition = fetcher
            .fetch(location, tasks_dir)
            .with_context(|| format!("fetch task {location}"))?;
        tasks.push(TaskRecord {
            location: location.clone(),
            definition,
            state: TaskState::Pending,
        });
    }
    Ok(tasks)
}

/// Render a fetched task definition in place, then provision metrics storage
/// for every InfluxDB publish destination it declares. Rendering failures
/// are fatal; provisioning failures are logged and skipped.
fn render_and_provision(
    task: &TaskRecord,
    accessor: &Accessor<'_>,
    influx: &dyn InfluxApi,
) -> Result<()> {
    let path = &task.definition;
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read task definition {}", path.display()))?;
    let rendered = template::render(&raw, accessor)
        .with_context(|| format!("render task definition {}", path.display()))?;
    fs::write(path, &rendered)
        .with_context(|| format!("write rendered task {}", path.display()))?;
    let doc: Value = serde_json::from_str(&rendered)
        .with_context(|| format!("parse rendered task {}", path.display()))?;

    for sink in taskdef::influxdb_sinks(&doc) {
        match provision::ensure_database(influx, &sink) {
            Ok(true) => {
                tracing::info!(database = %sink.database, host = %sink.host, "created metrics database");
            }
            Ok(false) => {
                tracing::debug!(database = %sink.database, "metrics database already present");
            }
            Err(err) => {
                tracing::warn!(
                    database = %sink.database,
                    error = %format!("{err:#}"),
                    "metrics database provisioning failed; continuing"
                );
            }
        }
    }
    Ok(())
}

/// Load every plugin in manifest order. A single failure aborts the run;
/// the fleet is left partially loaded, no rollback is attempted.
fn load_plugins<R: CommandRunner>(
    plugins: &mut [PluginRecord],
    snaptel: &Snaptel<R>,
) -> Result<()> {
    for plugin in plugins {
        plugin.state = PluginState::Loading;
        if snaptel.load_plugin(&plugin.name, &plugin.artifact)? {
            plugin.state = PluginState::Loaded;
        } else {
            plugin.state = PluginState::Failed;
            return Err(anyhow!(
                "plugin {} failed to load from {}",
                plugin.name,
                plugin.artifact.display()
            ));
        }
    }
    Ok(())
}

/// Submit every task in order. After each submission the running-task count
/// must equal the cumulative submissions of this run; the control plane can
/// report a successful create and still silently drop the task, and the
/// listing offers no per-task correlation to check against.
fn submit_tasks<R: CommandRunner>(tasks: &mut [TaskRecord], snaptel: &Snaptel<R>) -> Result<()> {
    let mut submitted = 0usize;
    for task in tasks {
        if !snaptel.submit_task(&task.definition)? {
            task.state = TaskState::SubmissionFailed;
            return Err(anyhow!(
                "task {} submission failed",
                task.definition.display()
            ));
        }
        task.state = TaskState::Submitted;
        submitted += 1;

        let running = snaptel.list_running_tasks()?;
        if running.len() != submitted {
            return Err(anyhow!(
                "control plane reports {} running tasks, expected {} after submitting {}",
                running.len(),
                submitted,
                task.definition.display()
            ));
        }
        task.state = TaskState::ConfirmedRunning;
        tracing::info!(
            task = %task.definition.display(),
            running = running.len(),
            "task confirmed running"
        );
    }
    Ok(())
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
