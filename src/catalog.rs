//! Flat listing of the eligible images in one folder.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Which files in a folder count as wallpaper candidates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CatalogOptions {
    /// Allowed extensions, compared case-insensitively, without the dot.
    #[serde(default = "CatalogOptions::default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            extensions: Self::default_extensions(),
        }
    }
}

impl CatalogOptions {
    fn default_extensions() -> Vec<String> {
        vec!["jpg".into(), "jpeg".into()]
    }

    /// Lowercase and strip leading dots so matching is a plain comparison.
    pub fn normalized(mut self) -> Self {
        for ext in &mut self.extensions {
            *ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        }
        self
    }

    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }
}

/// Ordered, duplicate-free list of images found directly inside `source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    source: PathBuf,
    images: Vec<PathBuf>,
}

impl Catalog {
    /// Scan `folder` without recursing. Any I/O failure yields an empty catalog.
    pub fn build(folder: &Path, options: &CatalogOptions) -> Self {
        let images = match scan(folder, options) {
            Ok(images) => {
                info!(folder = %folder.display(), count = images.len(), "catalog built");
                images
            }
            Err(err) => {
                warn!(folder = %folder.display(), error = ?err, "catalog scan failed; no images available");
                Vec::new()
            }
        };
        Self {
            source: folder.to_path_buf(),
            images,
        }
    }

    /// The folder this catalog was built from, as configured.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Image at a 1-based position.
    pub fn get(&self, position: usize) -> Option<&Path> {
        position
            .checked_sub(1)
            .and_then(|idx| self.images.get(idx))
            .map(PathBuf::as_path)
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }
}

fn scan(folder: &Path, options: &CatalogOptions) -> Result<Vec<PathBuf>> {
    ensure!(folder.is_dir(), "{} is not a directory", folder.display());
    let root = std::path::absolute(folder)
        .with_context(|| format!("failed to resolve {}", folder.display()))?;

    let mut out = Vec::new();
    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(err).with_context(|| format!("failed to list {}", root.display()));
            }
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && options.accepts(entry.path()) {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}
