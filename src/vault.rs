//! Vault note placement and idempotent atomic writes.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Characters that never appear in a note filename.
const INVALID_CHARS: &[char] = &['<', '>', ':', '\\', '/', '?', '*', '"', '|'];

/// Maximum length of the sanitized title portion of a filename.
const MAX_TITLE_LEN: usize = 120;

/// Sanitize `value` into a filesystem-safe filename stem, substituting
/// `fallback` when nothing survives.
pub fn safe_filename(value: &str, fallback: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim().trim_matches('.');
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    trimmed.chars().take(MAX_TITLE_LEN).collect()
}

/// Relative note path inside the vault: `<subdir>/<title>_<suffix>.md`.
/// The hash suffix keeps distinct content apart under title collisions.
pub fn note_relative_path(
    notes_subdir: &str,
    title: &str,
    suffix: &str,
    fallback: &str,
) -> PathBuf {
    let safe = safe_filename(title, fallback);
    Path::new(notes_subdir).join(format!("{safe}_{suffix}.md"))
}

/// Write `content` at `vault_path/relative_path`, returning the absolute
/// destination.
///
/// Byte-identical existing content is left untouched. Otherwise the
/// content goes to a temporary sibling first and is renamed over the
/// destination, so an interrupted write never leaves a truncated note.
pub fn write_note(vault_path: &Path, relative_path: &Path, content: &str) -> Result<PathBuf> {
    let target = vault_path.join(relative_path);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create note directory: {}", parent.display()))?;
    }

    if target.exists() {
        let existing = std::fs::read_to_string(&target)
            .with_context(|| format!("Failed to read existing note: {}", target.display()))?;
        if existing == content {
            return Ok(target);
        }
    }

    let tmp = target.with_extension("md.tmp");
    std::fs::write(&tmp, content)
        .with_context(|| format!("Failed to write note: {}", tmp.display()))?;
    std::fs::rename(&tmp, &target)
        .with_context(|| format!("Failed to replace note: {}", target.display()))?;

    Ok(target)
}
