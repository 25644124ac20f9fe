//! Cluster identity and service discovery through the cluster CLI.
//!
//! All cluster-facing lookups share one failure mode: if the cluster API
//! cannot be reached (no in-cluster credentials, no kubeconfig), the whole
//! accessor family is unusable and the process exits with the
//! permission-denied code. That mapping happens in `main` by downcasting
//! [`ClusterUnavailable`].

use crate::runner::CommandRunner;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fmt;

/// Node label carrying the deployment identity.
pub const DEPLOYMENT_LABEL: &str = "hyperpilot/deployment";

/// The cluster API could not be reached; these accessors only work inside
/// the target cluster.
#[derive(Debug)]
pub struct ClusterUnavailable {
    pub detail: String,
}

impl fmt::Display for ClusterUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster API unavailable: {}", self.detail)
    }
}

impl std::error::Error for ClusterUnavailable {}

/// Runtime-context lookups backed by the cluster control plane.
pub trait ClusterApi {
    /// Deployment identity: the deployment label of the first node, empty
    /// when the node carries no such label.
    fn deployment_id(&self) -> Result<String>;

    /// `http://<clusterIP>:<port>` for the named in-cluster service, using
    /// its first declared port.
    fn service_url(&self, name: &str, namespace: &str) -> Result<String>;

    /// IPs of running pods matching a label selector.
    fn pod_ips(&self, selector: &str) -> Result<Vec<String>>;
}

/// Cluster lookups via `kubectl ... -o json`.
pub struct KubectlCluster<R: CommandRunner> {
    runner: R,
    base: Vec<String>,
}

impl<R: CommandRunner> KubectlCluster<R> {
    pub fn new(runner: R, base: Vec<String>) -> Self {
        Self { runner, base }
    }

    fn get_json(&self, args: &[&str]) -> Result<Value> {
        let mut argv = self.base.clone();
        argv.extend(args.iter().map(|arg| arg.to_string()));
        argv.push("-o".to_string());
        argv.push("json".to_string());
        let output = match self.runner.run(&argv) {
            Ok(output) => output,
            Err(err) => {
                return Err(anyhow!(ClusterUnavailable {
                    detail: format!("{err:#}"),
                }))
            }
        };
        if !output.success {
            return Err(anyhow!(ClusterUnavailable {
                detail: output.error_detail(),
            }));
        }
        serde_json::from_str(&output.stdout).context("parse cluster CLI output")
    }
}

impl<R: CommandRunner> ClusterApi for KubectlCluster<R> {
    fn deployment_id(&self) -> Result<String> {
        let nodes = self.get_json(&["get", "nodes"])?;
        let label = nodes
            .pointer("/items/0/metadata/labels")
            .and_then(|labels| labels.get(DEPLOYMENT_LABEL))
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(label.to_string())
    }

    fn service_url(&self, name: &str, namespace: &str) -> Result<String> {
        let service = self.get_json(&["get", "service", name, "-n", namespace])?;
        let cluster_ip = service
            .pointer("/spec/clusterIP")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("service {name} has no cluster IP"))?;
        let port = service
            .pointer("/spec/ports/0/port")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("service {name} declares no ports"))?;
        Ok(format!("http://{cluster_ip}:{port}"))
    }

    fn pod_ips(&self, selector: &str) -> Result<Vec<String>> {
        let pods = self.get_json(&["get", "pods", "-l", selector])?;
        let items = pods
            .pointer("/items")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("pod listing has no items array"))?;
        Ok(items
            .iter()
            .filter_map(|pod| pod.pointer("/status/podIP").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod tests;
