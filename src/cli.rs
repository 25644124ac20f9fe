//! CLI argument parsing for the bootstrap run.
//!
//! The CLI is intentionally thin: one command, a manifest reference, and a
//! handful of overrides. Everything else lives in the manifest so a fleet
//! can be reconfigured without touching container args.

use clap::Parser;
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "snapstrap",
    version,
    about = "Bootstrap a snap telemetry collector: fetch artifacts, load plugins, submit tasks",
    after_help = "Examples:\n  snapstrap --config http://configs.internal/bootstrap.json\n  snapstrap --config ./bootstrap.json --plugins-dir /opt/snap/plugins\n  snapstrap --config ./bootstrap.json --snaptel \"snaptel -u http://localhost:8181\""
)]
pub struct RootArgs {
    /// Bootstrap manifest, a local path or an http(s) URL
    #[arg(long, value_name = "PATH_OR_URL")]
    pub config: String,

    /// Destination directory for plugin artifacts (overrides manifest pluginsPath)
    #[arg(long, value_name = "DIR")]
    pub plugins_dir: Option<PathBuf>,

    /// Destination directory for task definitions (overrides manifest tasksPath)
    #[arg(long, value_name = "DIR")]
    pub tasks_dir: Option<PathBuf>,

    /// Destination directory for config artifacts (overrides manifest configsPath)
    #[arg(long, value_name = "DIR")]
    pub configs_dir: Option<PathBuf>,

    /// Control-plane CLI command (parsed shell-style)
    #[arg(long, value_name = "CMD", default_value = "snaptel")]
    pub snaptel: String,

    /// Cluster CLI command used for identity and discovery
    #[arg(long, value_name = "CMD", default_value = "kubectl")]
    pub kubectl: String,

    /// Emit a verbose transcript of the bootstrap
    #[arg(long)]
    pub verbose: bool,
}
