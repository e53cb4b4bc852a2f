//! Candidate file enumeration under the watch roots.
//!
//! One-shot snapshot: excluded directory names are pruned from the walk
//! entirely (case-insensitively), excluded filename globs are never
//! yielded, and a root that is itself a file is yielded directly. Roots
//! that do not exist are skipped, not errors — watch roots come and go.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Compiled exclusion rules shared by the scanner and the pipeline's own
/// per-path exclusion check.
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    dir_names: Vec<String>,
    globs: GlobSet,
}

impl ExcludeRules {
    pub fn new(exclude_dirs: &[String], exclude_globs: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in exclude_globs {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            dir_names: exclude_dirs.iter().map(|d| d.to_lowercase()).collect(),
            globs: builder.build()?,
        })
    }

    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.dir_names.iter().any(|d| d == &name.to_lowercase())
    }

    pub fn is_excluded_file(&self, path: &Path) -> bool {
        match path.file_name() {
            Some(name) => self.globs.is_match(Path::new(name)),
            None => false,
        }
    }

    /// A path is excluded when any component names an excluded directory
    /// or its filename matches an exclude glob.
    pub fn is_excluded_path(&self, path: &Path) -> bool {
        let component_hit = path.components().any(|c| match c {
            std::path::Component::Normal(name) => {
                self.is_excluded_dir(&name.to_string_lossy())
            }
            _ => false,
        });
        component_hit || self.is_excluded_file(path)
    }
}

/// Enumerate qualifying files under `roots`.
pub fn scan_paths(roots: &[PathBuf], recursive: bool, rules: &ExcludeRules) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    for root in roots {
        if !root.exists() {
            continue;
        }

        if root.is_file() {
            if !rules.is_excluded_file(root) {
                paths.push(root.clone());
            }
            continue;
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(root)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                !rules.is_excluded_dir(&entry.file_name().to_string_lossy())
            });

        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if rules.is_excluded_file(path) {
                continue;
            }
            paths.push(path.to_path_buf());
        }
    }

    // Deterministic ordering for backfill runs.
    paths.sort();
    paths
}
