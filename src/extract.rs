//! Text extraction for ingested files.
//!
//! Expected "can't extract" conditions — unsupported extension, oversized
//! file, vanished path, unparseable binary — map to `Ok(None)` so the
//! pipeline can skip without treating them as failures. Only unexpected
//! I/O mid-read surfaces as an error.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::models::Extracted;

/// Extensions read directly as (lossy) UTF-8 text.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rs", "py", "js", "ts", "json", "yaml", "yml", "csv", "log", "ini",
    "cfg", "toml",
];

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Pluggable text extraction seam.
pub trait Extractor: Send + Sync {
    /// Extract text and metadata from `path`, or `None` when the file is
    /// unsupported, oversized, or unreadable in an expected way.
    fn extract(&self, path: &Path, max_bytes: u64) -> Result<Option<Extracted>>;
}

/// Binary-format extraction failure. Callers treat these as "no text".
#[derive(Debug)]
enum BinaryError {
    Pdf(String),
    Ooxml(String),
}

impl std::fmt::Display for BinaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            BinaryError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
        }
    }
}

/// Default extractor: plain-text files, PDF, and DOCX.
pub struct FileExtractor;

impl Extractor for FileExtractor {
    fn extract(&self, path: &Path, max_bytes: u64) -> Result<Option<Extracted>> {
        let Ok(meta) = std::fs::metadata(path) else {
            return Ok(None);
        };
        if !meta.is_file() || meta.len() > max_bytes {
            return Ok(None);
        }

        let ext = match path.extension().map(|e| e.to_string_lossy().to_lowercase()) {
            Some(ext) => ext,
            None => return Ok(None),
        };

        let text = if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            let bytes = std::fs::read(path)?;
            String::from_utf8_lossy(&bytes).into_owned()
        } else if ext == "pdf" {
            let bytes = std::fs::read(path)?;
            match extract_pdf(&bytes) {
                Ok(text) => text,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "unparseable pdf skipped");
                    return Ok(None);
                }
            }
        } else if ext == "docx" {
            let bytes = std::fs::read(path)?;
            match extract_docx(&bytes) {
                Ok(text) => text,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "unparseable docx skipped");
                    return Ok(None);
                }
            }
        } else {
            return Ok(None);
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("extension".to_string(), format!(".{ext}"));
        metadata.insert("size_bytes".to_string(), meta.len().to_string());

        Ok(Some(Extracted { text, metadata }))
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, BinaryError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| BinaryError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, BinaryError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| BinaryError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| BinaryError::Ooxml(e.to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| BinaryError::Ooxml(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(BinaryError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_w_t_elements(&doc_xml)
}

/// Pull the text runs (`w:t` elements) out of a DOCX document body.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, BinaryError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(BinaryError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn plain_text_extracts_with_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("note.md");
        fs::write(&path, "hello world").unwrap();

        let extracted = FileExtractor
            .extract(&path, 1024 * 1024)
            .unwrap()
            .unwrap();
        assert_eq!(extracted.text, "hello world");
        assert_eq!(extracted.metadata.get("extension").unwrap(), ".md");
        assert_eq!(extracted.metadata.get("size_bytes").unwrap(), "11");
    }

    #[test]
    fn unsupported_extension_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.bin");
        fs::write(&path, [0u8, 1, 2]).unwrap();

        assert!(FileExtractor.extract(&path, 1024).unwrap().is_none());
    }

    #[test]
    fn oversized_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.txt");
        fs::write(&path, "0123456789").unwrap();

        assert!(FileExtractor.extract(&path, 5).unwrap().is_none());
    }

    #[test]
    fn missing_path_is_none() {
        assert!(FileExtractor
            .extract(Path::new("/no/such/file.txt"), 1024)
            .unwrap()
            .is_none());
    }

    #[test]
    fn invalid_pdf_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fake.pdf");
        fs::write(&path, "not a pdf").unwrap();

        assert!(FileExtractor.extract(&path, 1024).unwrap().is_none());
    }

    #[test]
    fn invalid_docx_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fake.docx");
        fs::write(&path, "not a zip").unwrap();

        assert!(FileExtractor.extract(&path, 1024).unwrap().is_none());
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mixed.txt");
        fs::write(&path, [b'h', b'i', 0xFF, 0xFE]).unwrap();

        let extracted = FileExtractor.extract(&path, 1024).unwrap().unwrap();
        assert!(extracted.text.starts_with("hi"));
    }
}
