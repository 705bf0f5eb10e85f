//! Build artifacts handed from stage to stage.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Logical benchmark name to file-system path, in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ArtifactSet {
    entries: BTreeMap<String, PathBuf>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: impl Into<String>, path: impl Into<PathBuf>) {
        self.entries.insert(target.into(), path.into());
    }

    pub fn get(&self, target: &str) -> Option<&Path> {
        self.entries.get(target).map(PathBuf::as_path)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Common parent directory of every artifact, if there is exactly one.
    pub fn root(&self) -> Option<&Path> {
        let mut parents = self.entries.values().filter_map(|p| p.parent());
        let first = parents.next()?;
        parents.all(|p| p == first).then_some(first)
    }
}

impl<K: Into<String>, P: Into<PathBuf>> FromIterator<(K, P)> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = (K, P)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        }
    }
}

/// One staged artifact as recorded in `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ManifestEntry {
    pub target: String,
    /// File name of the build output the artifact was copied from.
    pub source: String,
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactManifest {
    pub artifacts: Vec<ManifestEntry>,
}

impl ArtifactManifest {
    pub const FILE_NAME: &'static str = "manifest.json";
}
