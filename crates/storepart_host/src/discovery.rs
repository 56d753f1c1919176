//! Finding slices to install at startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use storepart::{DomainRegistry, Slice};

use crate::{HostError, HostResult};

/// Entries of the slice directory, sorted by path.
///
/// An unset or missing directory has no entries.
pub fn discover(dir: Option<&Path>) -> HostResult<Vec<PathBuf>> {
    let Some(dir) = dir else {
        return Ok(Vec::new());
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(dir = %dir.display(), "slice directory does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.sort();
    tracing::debug!(dir = %dir.display(), found = paths.len(), "discovered slices");
    Ok(paths)
}

/// Turns a discovered path into a slice.
pub trait SliceLoader {
    /// Whether this loader knows how to load `path`.
    fn accepts(&self, path: &Path) -> bool;

    /// Load the slice at `path`, registering its domain.
    fn load(&self, path: &Path, registry: &DomainRegistry) -> HostResult<Slice>;
}

/// Loads field-only slices from JSON manifests:
/// `{ "domain": "settings", "fields": { "theme": "dark" } }`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSliceLoader;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    domain: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl SliceLoader for JsonSliceLoader {
    fn accepts(&self, path: &Path) -> bool {
        path.is_file() && path.extension().map_or(false, |ext| ext == "json")
    }

    fn load(&self, path: &Path, registry: &DomainRegistry) -> HostResult<Slice> {
        let manifest_error = |reason: String| HostError::Manifest {
            path: path.display().to_string(),
            reason,
        };
        let manifest: Manifest = serde_json::from_str(&std::fs::read_to_string(path)?)
            .map_err(|e| manifest_error(e.to_string()))?;
        manifest
            .fields
            .into_iter()
            .fold(Slice::builder(manifest.domain), |builder, (name, initial)| {
                builder.field(name, initial)
            })
            .build(registry)
            .map_err(|e| manifest_error(e.to_string()))
    }
}

/// Load every path some loader accepts, with the first such loader.
/// Paths nobody accepts are skipped.
pub fn load_all(
    paths: &[PathBuf],
    loaders: &[&dyn SliceLoader],
    registry: &DomainRegistry,
) -> HostResult<Vec<Slice>> {
    let mut slices = Vec::new();
    for path in paths {
        match loaders.iter().find(|loader| loader.accepts(path)) {
            Some(loader) => slices.push(loader.load(path, registry)?),
            None => tracing::debug!(path = %path.display(), "no loader for path, skipping"),
        }
    }
    Ok(slices)
}
