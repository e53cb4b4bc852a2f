//! Per-path ingestion pipeline.
//!
//! One call to [`IngestPipeline::process`] drives a single path through
//! exclusion check → extraction → content hashing → dedup decision →
//! artifact persistence → normalization → rendering → vault write →
//! metadata record. Dedup is keyed on the hash of the *extracted text*,
//! so raw-byte differences the extractor normalizes away (a re-saved
//! file with identical text) do not produce duplicate notes.
//!
//! Failures after hashing abort the run for that path and leave any
//! prior record untouched. Artifacts already written stay on disk: they
//! are content-addressed, so a retry reuses them for free.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::extract::Extractor;
use crate::models::{SourceInfo, SourceRecord, SOURCE_TYPE_FILE};
use crate::normalizer::{NormalizeError, Normalizer};
use crate::render::Renderer;
use crate::scanner::ExcludeRules;
use crate::store::MetadataStore;
use crate::vault;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("extraction failed: {0}")]
    Extraction(#[source] anyhow::Error),
    #[error(transparent)]
    Normalization(#[from] NormalizeError),
    #[error("render failed: {0}")]
    Render(#[source] anyhow::Error),
    #[error("write failed: {0}")]
    Write(#[source] anyhow::Error),
    #[error("metadata store failure: {0}")]
    Store(#[source] anyhow::Error),
}

/// Why a path produced no work. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Matched an excluded directory component or filename glob.
    Excluded,
    /// Missing, not a regular file.
    NotAFile,
    /// Unsupported, oversized, or unparseable — the extractor had no text.
    NoText,
}

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    /// Same key, same content hash, not forced: zero side effects.
    Unchanged { note_path: Option<PathBuf> },
    /// New key for content another key already produced a note for; the
    /// new record points at the existing note.
    Deduplicated { note_path: PathBuf },
    Processed { note_path: PathBuf },
}

pub struct IngestPipeline {
    config: Config,
    rules: ExcludeRules,
    store: Arc<MetadataStore>,
    extractor: Arc<dyn Extractor>,
    normalizer: Arc<dyn Normalizer>,
    renderer: Arc<dyn Renderer>,
}

impl IngestPipeline {
    pub fn new(
        config: Config,
        store: Arc<MetadataStore>,
        extractor: Arc<dyn Extractor>,
        normalizer: Arc<dyn Normalizer>,
        renderer: Arc<dyn Renderer>,
    ) -> anyhow::Result<Self> {
        let rules = ExcludeRules::new(&config.watch.exclude_dirs, &config.watch.exclude_globs)?;
        Ok(Self {
            config,
            rules,
            store,
            extractor,
            normalizer,
            renderer,
        })
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    /// Run the state machine for one path.
    pub async fn process(&self, path: &Path, force: bool) -> Result<Outcome, PipelineError> {
        if !path.is_file() {
            return Ok(Outcome::Skipped(SkipReason::NotAFile));
        }
        if self.rules.is_excluded_path(path) {
            return Ok(Outcome::Skipped(SkipReason::Excluded));
        }

        let max_bytes = self.config.limits.max_file_bytes();
        let extracted = self
            .extractor
            .extract(path, max_bytes)
            .map_err(PipelineError::Extraction)?;
        let Some(extracted) = extracted else {
            return Ok(Outcome::Skipped(SkipReason::NoText));
        };

        let content_hash = hash_text(&extracted.text);
        let source_key = path.to_string_lossy().to_string();

        let existing = self
            .store
            .get(SOURCE_TYPE_FILE, &source_key)
            .await
            .map_err(PipelineError::Store)?;
        if !force {
            if let Some(existing) = &existing {
                if existing.content_hash == content_hash {
                    return Ok(Outcome::Unchanged {
                        note_path: existing.note_path.as_ref().map(PathBuf::from),
                    });
                }
            }
        }

        if !force {
            let same_hash = self
                .store
                .get_by_hash(SOURCE_TYPE_FILE, &content_hash)
                .await
                .map_err(PipelineError::Store)?;
            if let Some(same_hash) = same_hash {
                if let Some(note_path) = &same_hash.note_path {
                    let note_path = PathBuf::from(note_path);
                    let mut metadata = BTreeMap::new();
                    metadata.insert("note".to_string(), "deduplicated".to_string());
                    self.store
                        .upsert(&SourceRecord {
                            source_type: SOURCE_TYPE_FILE.to_string(),
                            source_key,
                            content_hash,
                            raw_path: same_hash.raw_path.clone(),
                            extracted_path: same_hash.extracted_path.clone(),
                            note_path: same_hash.note_path.clone(),
                            last_processed_at: None,
                            metadata,
                        })
                        .await
                        .map_err(PipelineError::Store)?;
                    return Ok(Outcome::Deduplicated { note_path });
                }
            }
        }

        let note_path = self
            .produce_note(path, &source_key, &content_hash, &extracted.text)
            .await?;

        Ok(Outcome::Processed { note_path })
    }

    /// `ToProcess` onward: persist artifacts, normalize, render, write
    /// the note, record metadata.
    async fn produce_note(
        &self,
        path: &Path,
        source_key: &str,
        content_hash: &str,
        text: &str,
    ) -> Result<PathBuf, PipelineError> {
        let raw_dir = self.config.data_lake.raw_dir().join(SOURCE_TYPE_FILE);
        let extracted_dir = self.config.data_lake.extracted_dir().join(SOURCE_TYPE_FILE);
        std::fs::create_dir_all(&raw_dir)
            .map_err(|e| PipelineError::Write(anyhow::Error::new(e)))?;
        std::fs::create_dir_all(&extracted_dir)
            .map_err(|e| PipelineError::Write(anyhow::Error::new(e)))?;

        let raw_bytes =
            std::fs::read(path).map_err(|e| PipelineError::Extraction(anyhow::Error::new(e)))?;
        let raw_hash = hash_bytes(&raw_bytes);
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let raw_path = raw_dir.join(format!("{raw_hash}{ext}"));
        if !raw_path.exists() {
            std::fs::write(&raw_path, &raw_bytes)
                .map_err(|e| PipelineError::Write(anyhow::Error::new(e)))?;
        }

        let extracted_path = extracted_dir.join(format!("{content_hash}.txt"));
        if !extracted_path.exists() {
            std::fs::write(&extracted_path, text)
                .map_err(|e| PipelineError::Write(anyhow::Error::new(e)))?;
        }

        let meta =
            std::fs::metadata(path).map_err(|e| PipelineError::Extraction(anyhow::Error::new(e)))?;
        let mtime: DateTime<Utc> = meta
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        let source_info = SourceInfo {
            path: source_key.to_string(),
            raw_path: raw_path.to_string_lossy().to_string(),
            size_bytes: meta.len(),
            mtime: mtime.to_rfc3339(),
        };

        let truncated: String = text
            .chars()
            .take(self.config.normalizer.max_input_chars)
            .collect();
        let note = self.normalizer.normalize(&truncated, &source_info).await?;

        let created_at = Utc::now();
        let source_links = vec![
            format!("Original: {}", file_uri(path)),
            format!("Raw: {}", file_uri(&raw_path)),
        ];
        let markdown = self
            .renderer
            .render(&note, &source_links, SOURCE_TYPE_FILE, created_at)
            .map_err(PipelineError::Render)?;

        let suffix = &content_hash[..8];
        let fallback = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| suffix.to_string());
        let note_rel = vault::note_relative_path(
            &self.config.vault.notes_subdir,
            &note.title,
            suffix,
            &fallback,
        );

        let note_path = vault::write_note(&self.config.vault.path, &note_rel, &markdown)
            .map_err(PipelineError::Write)?;

        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), SOURCE_TYPE_FILE.to_string());
        self.store
            .upsert(&SourceRecord {
                source_type: SOURCE_TYPE_FILE.to_string(),
                source_key: source_key.to_string(),
                content_hash: content_hash.to_string(),
                raw_path: Some(source_info.raw_path.clone()),
                extracted_path: Some(extracted_path.to_string_lossy().to_string()),
                note_path: Some(note_path.to_string_lossy().to_string()),
                last_processed_at: None,
                metadata,
            })
            .await
            .map_err(PipelineError::Store)?;

        let mut details = BTreeMap::new();
        details.insert("path".to_string(), source_key.to_string());
        details.insert("hash".to_string(), content_hash.to_string());
        self.store
            .log_event("file_processed", &details)
            .await
            .map_err(PipelineError::Store)?;

        info!(path = %path.display(), note = %note_path.display(), "processed");
        Ok(note_path)
    }
}

pub fn hash_text(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `file://` reference for a local path, resolved to absolute when the
/// path still exists.
fn file_uri(path: &Path) -> String {
    let absolute = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_hex() {
        let h = hash_text("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_text("hello"));
        assert_ne!(h, hash_text("hello world"));
    }

    #[test]
    fn file_uri_is_absolute() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();
        let uri = file_uri(&file);
        assert!(uri.starts_with("file:///"));
        assert!(uri.ends_with("a.txt"));
    }
}
