//! Text extraction for the supported document formats (PDF, DOCX).
//!
//! Callers supply the original filename plus raw bytes; this module returns
//! a [`Document`] with plain UTF-8 text, or a typed error the caller can skip
//! past. Format detection is by file extension, case-insensitive.

use std::io::Read;
use std::path::Path;

use crate::models::Document;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

pub const SUPPORTED_EXTENSIONS: [&str; 2] = [".pdf", ".docx"];

/// Extraction error. Never panics; ingestion skips the failed file.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedExtension(String),
    Pdf(String),
    Ooxml(String),
    Io(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedExtension(ext) => {
                write!(f, "unsupported file extension: {}", ext)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "DOCX extraction failed: {}", e),
            ExtractError::Io(e) => write!(f, "could not read file: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Lowercased extension including the dot, or empty string.
pub fn extension_of(filename: &str) -> String {
    match filename.rfind('.') {
        Some(pos) => filename[pos..].to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Whether ingestion accepts this filename at all.
pub fn is_supported(filename: &str) -> bool {
    let ext = extension_of(filename);
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Extracts a document from in-memory bytes.
///
/// `source` is recorded in metadata as-is (a path for CLI ingestion, an
/// upload label for the web panel).
pub fn extract_from_bytes(
    filename: &str,
    source: &str,
    bytes: &[u8],
) -> Result<Document, ExtractError> {
    let ext = extension_of(filename);
    let text = match ext.as_str() {
        ".pdf" => extract_pdf(bytes)?,
        ".docx" => extract_docx(bytes)?,
        _ => return Err(ExtractError::UnsupportedExtension(ext)),
    };
    Ok(Document {
        filename: filename.to_string(),
        source: source.to_string(),
        text: text.trim().to_string(),
        size: bytes.len() as u64,
        extension: ext,
        doc_type: doc_type_from_filename(filename),
    })
}

/// Reads and extracts a document from disk.
pub fn extract_from_path(path: &Path) -> Result<Document, ExtractError> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))?;
    extract_from_bytes(&filename, &path.to_string_lossy(), &bytes)
}

/// Derives a document-type tag from keywords in the filename.
///
/// Standards names commonly carry ГОСТ/СНиП/ТУ markers; contract names carry
/// ДОГОВОР/КОНТРАКТ/СОГЛАШЕНИЕ. Matching is case-insensitive and covers the
/// transliterated English forms seen in scanned uploads.
pub fn doc_type_from_filename(filename: &str) -> Option<String> {
    let upper = filename.to_uppercase();
    const TAGS: [(&[&str], &str); 6] = [
        (&["ГОСТ", "GOST"], "GOST"),
        (&["СНИП", "SNIP"], "SNIP"),
        (&["ТУ"], "TU"),
        (&["ДОГОВОР", "CONTRACT"], "contract"),
        (&["КОНТРАКТ"], "contract"),
        (&["СОГЛАШЕНИЕ", "AGREEMENT"], "agreement"),
    ];
    for (keywords, tag) in TAGS {
        if keywords.iter().any(|k| upper.contains(k)) {
            return Some(tag.to_string());
        }
    }
    None
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(ExtractError::Ooxml(
                    "word/document.xml exceeds size limit".to_string(),
                ));
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err(ExtractError::Ooxml(
            "word/document.xml not found".to_string(),
        ));
    }
    extract_paragraph_text(&doc_xml)
}

/// Collects `w:t` run text, inserting a newline at each paragraph end so the
/// chunker sees paragraph structure.
fn extract_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
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
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
