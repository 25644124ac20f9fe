//! snapstrap: bootstrap orchestrator for a snap telemetry collector.
//!
//! Fetches plugin and task artifacts, renders task definitions against
//! cluster context, provisions InfluxDB databases for publish sinks, loads
//! plugins through the collector's `snaptel` CLI, and submits tasks,
//! confirming observed collector state after every step.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod bootstrap;
mod cli;
mod cluster;
mod context;
mod fetch;
mod manifest;
mod provision;
mod runner;
mod snaptel;
mod taskdef;
mod template;

use bootstrap::{BootstrapOptions, Collaborators};
use cli::RootArgs;
use cluster::{ClusterUnavailable, KubectlCluster};
use fetch::HttpFetcher;
use manifest::ManifestError;
use provision::HttpInflux;
use runner::{resolve_base_command, SystemRunner};
use snaptel::Snaptel;

/// Configuration or argument problem: bad flags, missing/unreadable manifest.
const EXIT_CONFIG: u8 = 2;
/// Any other fatal bootstrap failure.
const EXIT_FAILURE: u8 = 1;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "bootstrap failed");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run(args: &RootArgs) -> Result<()> {
    let snaptel_base = resolve_base_command(&args.snaptel)?;
    let kubectl_base = resolve_base_command(&args.kubectl)?;

    let fetcher = HttpFetcher;
    let cluster = KubectlCluster::new(SystemRunner, kubectl_base);
    let snaptel = Snaptel::new(SystemRunner, snaptel_base);
    let influx = HttpInflux;

    let opts = BootstrapOptions {
        manifest: args.config.clone(),
        plugins_dir: args.plugins_dir.clone(),
        tasks_dir: args.tasks_dir.clone(),
        configs_dir: args.configs_dir.clone(),
    };
    let deps = Collaborators {
        fetcher: &fetcher,
        cluster: &cluster,
        snaptel: &snaptel,
        influx: &influx,
    };

    let report = bootstrap::run(&opts, &deps)?;
    tracing::info!(
        plugins = report.plugins.len(),
        tasks = report.tasks.len(),
        "all plugins loaded and all tasks confirmed running"
    );
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Map the failure to the process exit code: cluster resolution failures get
/// the permission-denied code (the accessors only work in-cluster), manifest
/// problems the configuration code, everything else the generic failure code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ClusterUnavailable>().is_some() {
        libc::EPERM as u8
    } else if err.downcast_ref::<ManifestError>().is_some() {
        EXIT_CONFIG
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn cluster_unavailable_maps_to_eperm() {
        let err = anyhow!(ClusterUnavailable {
            detail: "no kubeconfig".to_string(),
        });
        assert_eq!(exit_code_for(&err), libc::EPERM as u8);
    }

    #[test]
    fn manifest_errors_map_to_config_code() {
        let err = Err::<(), _>(anyhow!("missing file"))
            .context(ManifestError)
            .expect_err("context attaches marker");
        assert_eq!(exit_code_for(&err), EXIT_CONFIG);
    }

    #[test]
    fn other_errors_map_to_generic_failure() {
        assert_eq!(exit_code_for(&anyhow!("plugin load failed")), EXIT_FAILURE);
    }
}
