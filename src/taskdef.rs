//! Rendered task-definition documents and publish-sink extraction.
//!
//! A task definition is an arbitrary JSON document with at least
//! `workflow.collect`. Publish destinations live directly under the collect
//! stage and under any `process` stage nested below it; only sinks naming
//! the InfluxDB publisher are interesting to storage provisioning.

use serde::Deserialize;
use serde_json::Value;

/// Sink plugin identity that triggers storage provisioning.
pub const INFLUXDB_SINK: &str = "influxdb";

/// Connection config carried by an InfluxDB publish destination.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SinkConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Collect every InfluxDB publish destination in the document, walking the
/// collect stage and all nested process stages.
pub fn influxdb_sinks(doc: &Value) -> Vec<SinkConfig> {
    let mut sinks = Vec::new();
    if let Some(collect) = doc.pointer("/workflow/collect") {
        stage_sinks(collect, &mut sinks);
    }
    sinks
}

fn stage_sinks(stage: &Value, sinks: &mut Vec<SinkConfig>) {
    if let Some(entries) = stage.get("publish").and_then(Value::as_array) {
        for entry in entries {
            if let Some(sink) = sink_from_entry(entry) {
                sinks.push(sink);
            }
        }
    }
    if let Some(children) = stage.get("process").and_then(Value::as_array) {
        for child in children {
            stage_sinks(child, sinks);
        }
    }
}

fn sink_from_entry(entry: &Value) -> Option<SinkConfig> {
    let name = entry.get("plugin_name").and_then(Value::as_str)?;
    if name != INFLUXDB_SINK {
        return None;
    }
    let config = entry.get("config")?;
    match serde_json::from_value::<SinkConfig>(config.clone()) {
        Ok(sink) => Some(sink),
        Err(err) => {
            // Provisioning is best-effort; a sink we cannot parse degrades
            // metrics delivery, not bootstrap.
            tracing::warn!(error = %err, "skipping malformed influxdb publish config");
            None
        }
    }
}
