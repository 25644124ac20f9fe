//! Best-effort InfluxDB provisioning for task publish sinks.
//!
//! Before a task that publishes to InfluxDB is submitted, its target
//! database must exist. Provisioning is create-if-absent and never fatal:
//! the orchestrator logs failures and keeps going, since degraded metrics
//! delivery does not invalidate bootstrap.

use crate::taskdef::SinkConfig;
use anyhow::{Context, Result};
use serde_json::Value;

/// Thin surface over the InfluxDB HTTP API so the ensure logic can be
/// exercised without a live server.
pub trait InfluxApi {
    fn list_databases(&self, sink: &SinkConfig) -> Result<Vec<String>>;
    fn create_database(&self, sink: &SinkConfig) -> Result<()>;
}

/// Talks to the InfluxDB 1.x `/query` endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpInflux;

impl HttpInflux {
    fn query_url(sink: &SinkConfig) -> String {
        format!("http://{}:{}/query", sink.host, sink.port)
    }
}

impl InfluxApi for HttpInflux {
    fn list_databases(&self, sink: &SinkConfig) -> Result<Vec<String>> {
        let mut response = ureq::get(&Self::query_url(sink))
            .query("u", &sink.user)
            .query("p", &sink.password)
            .query("q", "SHOW DATABASES")
            .call()
            .context("query influxdb databases")?;
        let body: Value = response
            .body_mut()
            .read_json()
            .context("parse influxdb response")?;
        let values = body
            .pointer("/results/0/series/0/values")
            .and_then(Value::as_array);
        Ok(values
            .into_iter()
            .flatten()
            .filter_map(|row| row.get(0).and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    fn create_database(&self, sink: &SinkConfig) -> Result<()> {
        let statement = format!("CREATE DATABASE \"{}\"", sink.database);
        ureq::post(&Self::query_url(sink))
            .send_form([
                ("u", sink.user.as_str()),
                ("p", sink.password.as_str()),
                ("q", statement.as_str()),
            ])
            .with_context(|| format!("create influxdb database {}", sink.database))?;
        Ok(())
    }
}

/// Idempotent create-if-absent. Returns whether a create was attempted.
pub fn ensure_database(api: &dyn InfluxApi, sink: &SinkConfig) -> Result<bool> {
    let existing = api.list_databases(sink)?;
    if existing.iter().any(|name| name == &sink.database) {
        return Ok(false);
    }
    api.create_database(sink)?;
    Ok(true)
}
