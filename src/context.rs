//! Runtime-context accessors consumed by the template renderer.
//!
//! Task definitions reach runtime context through accessor calls such as
//! `a.env("NODE_NAME")` or `a.k8s_service("influxsrv")`. The deployment
//! identity is resolved once by the orchestrator and threaded through this
//! type explicitly rather than smuggled through the process environment.

use crate::cluster::ClusterApi;
use anyhow::{anyhow, Context, Result};

pub const DEFAULT_NAMESPACE: &str = "default";

/// Named accessors available inside task-definition placeholders.
pub struct Accessor<'a> {
    cluster: &'a dyn ClusterApi,
    deployment_id: String,
}

impl<'a> Accessor<'a> {
    pub fn new(cluster: &'a dyn ClusterApi, deployment_id: String) -> Self {
        Self {
            cluster,
            deployment_id,
        }
    }

    /// Dispatch one accessor call from a rendered placeholder.
    pub fn call(&self, method: &str, args: &[String]) -> Result<String> {
        match method {
            "env" => {
                let name = expect_args(method, args, 1, 1)?[0];
                std::env::var(name)
                    .with_context(|| format!("environment variable {name} is not set"))
            }
            "deployment_id" => {
                expect_args(method, args, 0, 0)?;
                Ok(self.deployment_id.clone())
            }
            "k8s_service" => {
                let args = expect_args(method, args, 1, 2)?;
                let namespace = args.get(1).copied().unwrap_or(DEFAULT_NAMESPACE);
                self.cluster.service_url(args[0], namespace)
            }
            "pod_ips" => {
                let selector = expect_args(method, args, 1, 1)?[0];
                Ok(self.cluster.pod_ips(selector)?.join(","))
            }
            "pod_ips_from_env" => {
                let name = expect_args(method, args, 1, 1)?[0];
                let value = std::env::var(name)
                    .with_context(|| format!("environment variable {name} is not set"))?;
                Ok(self.cluster.pod_ips(&format!("app={value}"))?.join(","))
            }
            other => Err(anyhow!("unknown accessor a.{other}")),
        }
    }
}

fn expect_args<'s>(
    method: &str,
    args: &'s [String],
    min: usize,
    max: usize,
) -> Result<Vec<&'s str>> {
    if args.len() < min || args.len() > max {
        return Err(anyhow!(
            "a.{method} takes {min}..={max} arguments, got {}",
            args.len()
        ));
    }
    Ok(args.iter().map(String::as_str).collect())
}
