//! Staging of build outputs into the layout the benchmark service expects.
//!
//! Cargo writes bench binaries as `<target>-<hash>` next to dependency
//! tracking files such as `<target>-<hash>.d`. The normalizer picks one
//! binary per target, copies it to `<dest_dir>/<target>`, removes auxiliary
//! files and records what it staged in `manifest.json`.
//!
//! An artifact that names an existing file (the executable the build
//! reported) is staged as is. An artifact that names a stem such as
//! `target/release/deps/lexer` is resolved among the `<target>-<hash>` files
//! next to it. When several match, the [`SelectionPolicy`] decides: `newest`
//! takes the most recently modified file, breaking ties by the greatest file
//! name; `unique` fails.

use benchline_core::artifact::{ArtifactManifest, ArtifactSet, ManifestEntry};
use benchline_core::config::{ArtifactConfig, SelectionPolicy};
use benchline_core::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// A build output that may belong to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub file_name: String,
    pub modified: SystemTime,
}

impl Candidate {
    fn from_file(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            modified: metadata.modified()?,
        })
    }
}

/// List files in `dir` named `<target>-<suffix>[.ext]`, where the suffix is
/// alphanumeric and the extension is not in `ignore_extensions`.
///
/// A missing directory yields no candidates.
pub fn find_candidates(dir: &Path, target: &str, ignore_extensions: &[String]) -> Result<Vec<Candidate>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let prefix = format!("{target}-");
    let mut candidates = Vec::new();

    for entry in entries {
        let entry = entry?;
        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let Some(rest) = file_name.strip_prefix(&prefix) else {
            continue;
        };

        let (suffix, extension) = match rest.split_once('.') {
            Some((suffix, ext)) => (suffix, Some(ext)),
            None => (rest, None),
        };
        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            continue;
        }
        if let Some(ext) = extension
            && ignore_extensions.iter().any(|ignored| ignored == ext)
        {
            continue;
        }

        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        candidates.push(Candidate {
            path: entry.path(),
            file_name,
            modified: metadata.modified()?,
        });
    }

    candidates.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(candidates)
}

/// Copies build outputs into a canonical directory.
#[derive(Debug, Clone)]
pub struct ArtifactNormalizer {
    selection: SelectionPolicy,
    ignore_extensions: Vec<String>,
    discard_extensions: Vec<String>,
    write_manifest: bool,
}

impl ArtifactNormalizer {
    pub fn new(config: &ArtifactConfig) -> Self {
        Self {
            selection: config.selection,
            ignore_extensions: config.ignore_extensions.clone(),
            discard_extensions: config.discard_extensions.clone(),
            write_manifest: config.write_manifest,
        }
    }

    /// Stage every artifact into `dest_dir`.
    ///
    /// `artifacts` maps each target either to its executable or to its stem
    /// inside the build output directory (e.g. `target/release/deps/lexer`).
    /// The returned set maps each target to its staged file
    /// (`<dest_dir>/<target>`).
    pub fn normalize(&self, artifacts: &ArtifactSet, dest_dir: &Path) -> Result<ArtifactSet> {
        fs::create_dir_all(dest_dir)?;

        let mut staged = ArtifactSet::new();
        let mut manifest = ArtifactManifest::default();

        for (target, path) in artifacts.iter() {
            let selected = if path.is_file() {
                Candidate::from_file(path)?
            } else {
                let search_dir = path.parent().unwrap_or_else(|| Path::new("."));
                let candidates = find_candidates(search_dir, target, &self.ignore_extensions)?;
                self.select(target, candidates)?
            };

            let dest = dest_dir.join(target);
            fs::copy(&selected.path, &dest).map_err(|e| Error::Normalize {
                target: target.to_string(),
                reason: format!("failed to copy {}: {}", selected.path.display(), e),
            })?;
            debug!(target, source = %selected.file_name, dest = %dest.display(), "Staged artifact");

            let (sha256, size_bytes) = digest(&dest)?;
            manifest.artifacts.push(ManifestEntry {
                target: target.to_string(),
                source: selected.file_name,
                sha256,
                size_bytes,
            });
            staged.insert(target, dest);
        }

        let removed = self.discard_auxiliary(dest_dir)?;

        if self.write_manifest {
            let json = serde_json::to_string_pretty(&manifest)?;
            fs::write(dest_dir.join(ArtifactManifest::FILE_NAME), json)?;
        }

        info!(
            dest_dir = %dest_dir.display(),
            staged = staged.len(),
            removed,
            "Artifacts normalized"
        );
        Ok(staged)
    }

    fn select(&self, target: &str, candidates: Vec<Candidate>) -> Result<Candidate> {
        if candidates.is_empty() {
            return Err(Error::Normalize {
                target: target.to_string(),
                reason: "no build output found".to_string(),
            });
        }

        match self.selection {
            SelectionPolicy::Unique if candidates.len() > 1 => {
                let names: Vec<_> = candidates.iter().map(|c| c.file_name.as_str()).collect();
                Err(Error::Normalize {
                    target: target.to_string(),
                    reason: format!("{} candidates: {}", candidates.len(), names.join(", ")),
                })
            }
            _ => candidates
                .into_iter()
                .max_by(|a, b| {
                    a.modified
                        .cmp(&b.modified)
                        .then_with(|| a.file_name.cmp(&b.file_name))
                })
                .ok_or_else(|| Error::Internal("candidate list emptied".to_string())),
        }
    }

    /// Delete files with a discarded extension. Returns how many were removed.
    fn discard_auxiliary(&self, dest_dir: &Path) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(dest_dir)? {
            let path = entry?.path();
            let discard = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| self.discard_extensions.iter().any(|d| d == ext));
            if discard && path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn digest(path: &Path) -> Result<(String, u64)> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), size))
}
