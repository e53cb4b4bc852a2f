//! Core data types that flow through the ingestion pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Source tag for locally ingested files. Currently the only source type.
pub const SOURCE_TYPE_FILE: &str = "file";

/// Persisted state for one ingested source, keyed by
/// `(source_type, source_key)` where `source_key` is the canonical path.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub source_type: String,
    pub source_key: String,
    /// SHA-256 hex digest of the *extracted text* — the dedup key.
    pub content_hash: String,
    pub raw_path: Option<String>,
    pub extracted_path: Option<String>,
    pub note_path: Option<String>,
    /// ISO-8601 UTC, stamped by the store on every upsert.
    pub last_processed_at: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Text plus extraction metadata produced by an [`Extractor`].
///
/// [`Extractor`]: crate::extract::Extractor
#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// Minimal source metadata handed to the normalizer alongside the text.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub path: String,
    pub raw_path: String,
    pub size_bytes: u64,
    pub mtime: String,
}

/// One action item pulled out of the source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub what: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub who: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// A named entity mentioned in the source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// Structured result of normalizing one source's text.
///
/// Always fully populated: construction goes through
/// [`coerce_payload`](crate::normalizer::coerce_payload), which fills
/// defaults and clamps `confidence` into `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedNote {
    pub title: String,
    pub summary: Vec<String>,
    pub decisions: Vec<String>,
    pub actions: Vec<ActionItem>,
    pub entities: Vec<Entity>,
    pub tags: Vec<String>,
    pub projects: Vec<String>,
    pub people: Vec<String>,
    pub confidence: f64,
}
