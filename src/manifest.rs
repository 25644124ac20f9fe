//! Bootstrap manifest: which artifacts to fetch and where to put them.
//!
//! The manifest is loaded once at startup and is immutable for the run. Its
//! own path may be a remote reference, in which case it is fetched before
//! parsing. Plugin order and task order both matter downstream: plugins are
//! loaded and tasks submitted in exactly the order the manifest declares.

use crate::fetch::{self, Fetch};
use anyhow::{Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Marker attached to manifest load failures so `main` can map them to the
/// configuration-error exit code.
#[derive(Debug, Clone, Copy)]
pub struct ManifestError;

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid bootstrap manifest")
    }
}

impl std::error::Error for ManifestError {}

/// One plugin declaration: the collector-facing name paired with the
/// artifact location it is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSpec {
    pub name: String,
    pub location: String,
}

/// Plugin declarations in manifest document order.
///
/// The manifest encodes plugins as a JSON object, but load order must follow
/// the document, so deserialization goes through a map visitor instead of a
/// sorted map type.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PluginSet(pub Vec<PluginSpec>);

impl PluginSet {
    pub fn iter(&self) -> impl Iterator<Item = &PluginSpec> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for PluginSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PluginSetVisitor;

        impl<'de> Visitor<'de> for PluginSetVisitor {
            type Value = PluginSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of plugin name to artifact location")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut plugins = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, location)) = map.next_entry::<String, String>()? {
                    plugins.push(PluginSpec { name, location });
                }
                Ok(PluginSet(plugins))
            }
        }

        deserializer.deserialize_map(PluginSetVisitor)
    }
}

/// Declarative bootstrap manifest.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Manifest {
    /// Destination directory for plugin artifacts (default: current dir).
    #[serde(default)]
    pub plugins_path: Option<PathBuf>,
    /// Destination directory for task definitions (default: current dir).
    #[serde(default)]
    pub tasks_path: Option<PathBuf>,
    /// Destination directory for config artifacts (default: current dir).
    #[serde(default)]
    pub configs_path: Option<PathBuf>,
    pub plugins: PluginSet,
    pub tasks: Vec<String>,
    #[serde(default)]
    pub configs: Vec<String>,
}

/// Load the manifest, fetching it first when the reference is remote.
pub fn load(fetcher: &dyn Fetch, reference: &str, workdir: &Path) -> Result<Manifest> {
    let local_path = if fetch::is_remote(reference) {
        fetcher
            .fetch(reference, workdir)
            .with_context(|| format!("fetch manifest {reference}"))
            .context(ManifestError)?
    } else {
        PathBuf::from(reference)
    };
    let bytes = fs::read(&local_path)
        .with_context(|| format!("read manifest {}", local_path.display()))
        .context(ManifestError)?;
    let manifest: Manifest = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse manifest {}", local_path.display()))
        .context(ManifestError)?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_order_follows_document_order() {
        let manifest: Manifest = serde_json::from_str(
            r#"{
                "plugins": {
                    "zeta": "http://x/zeta.plugin",
                    "cpu": "http://x/cpu.plugin",
                    "alpha": "http://x/alpha.plugin"
                },
                "tasks": ["http://x/task1.json", "http://x/task2.json"]
            }"#,
        )
        .expect("parse manifest");

        let names: Vec<&str> = manifest.plugins.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "cpu", "alpha"]);
        assert_eq!(manifest.tasks.len(), 2);
        assert!(manifest.configs.is_empty());
    }

    #[test]
    fn destination_paths_are_optional() {
        let manifest: Manifest = serde_json::from_str(
            r#"{
                "pluginsPath": "/opt/snap/plugins",
                "plugins": {"cpu": "http://x/cpu.plugin"},
                "tasks": []
            }"#,
        )
        .expect("parse manifest");

        assert_eq!(
            manifest.plugins_path.as_deref(),
            Some(Path::new("/opt/snap/plugins"))
        );
        assert!(manifest.tasks_path.is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<Manifest>(
            r#"{"plugins": {}, "tasks": [], "bogus": 1}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn load_surfaces_manifest_error_marker() {
        let fetcher = NoFetch;
        let err = load(&fetcher, "/nonexistent/manifest.json", Path::new("."))
            .expect_err("missing manifest must fail");
        assert!(err.downcast_ref::<ManifestError>().is_some());
    }

    struct NoFetch;

    impl Fetch for NoFetch {
        fn fetch(&self, _reference: &str, _dest_dir: &Path) -> Result<PathBuf> {
            unreachable!("local references are not fetched")
        }
    }
}
