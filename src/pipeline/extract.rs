//! Text extraction: turn an upload into plain text according to its
//! [`MediaType`].
//!
//! | Media type  | Backend                          | Output                              |
//! |-------------|----------------------------------|-------------------------------------|
//! | `PlainText` | strict UTF-8 decode              | file contents                       |
//! | `Pdf`       | `lopdf` text layer, page by page | pages concatenated, no separator    |
//! | `Docx`      | `zip` + `quick-xml`              | `word/document.xml` body text       |
//!
//! Extractors only read. Deleting the staged file is the orchestrator's job.
//!
//! Output is capped: a DOCX body part or the PDF page text may not exceed
//! `max_bytes` ([`DEFAULT_MAX_EXTRACTED_BYTES`] unless given), since both
//! come out of compressed streams much larger than the upload itself.
//!
//! PDF pages are joined with no separator, so the last word of one page can
//! run into the first word of the next. Models cope with this well enough and
//! it keeps output identical to earlier releases.

use crate::config::DEFAULT_MAX_EXTRACTED_BYTES;
use crate::error::FlashcardError;
use crate::media::{self, MediaType};
use crate::output::ExtractedDocument;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;

/// Zip entry holding the main body of a Word document.
pub const DOCX_BODY_PART: &str = "word/document.xml";

/// Extract text from in-memory `content`, capped at
/// [`DEFAULT_MAX_EXTRACTED_BYTES`].
///
/// `Unsupported` fails immediately without looking at `content`.
pub fn extract(
    content: &[u8],
    media_type: &MediaType,
) -> Result<ExtractedDocument, FlashcardError> {
    extract_limited(content, media_type, DEFAULT_MAX_EXTRACTED_BYTES)
}

/// [`extract`] with an explicit ceiling on decoded bytes.
pub fn extract_limited(
    content: &[u8],
    media_type: &MediaType,
    max_bytes: u64,
) -> Result<ExtractedDocument, FlashcardError> {
    let text = match media_type {
        MediaType::PlainText => extract_plain(content)?,
        MediaType::Pdf => extract_pdf(content, max_bytes)?,
        MediaType::Docx => extract_docx(content, max_bytes)?,
        MediaType::Unsupported(mime) => return Err(unsupported(mime)),
    };
    if text.len() as u64 > max_bytes {
        return Err(too_much_text(media_type.clone(), text.len() as u64, max_bytes));
    }
    debug!("Extracted {} bytes of text from {}", text.len(), media_type);
    Ok(ExtractedDocument::new(text, media_type.clone()))
}

/// Extract text from the file at `path`.
///
/// `Unsupported` fails before the file is opened.
pub fn extract_path(
    path: &Path,
    media_type: &MediaType,
) -> Result<ExtractedDocument, FlashcardError> {
    if let MediaType::Unsupported(mime) = media_type {
        return Err(unsupported(mime));
    }
    let bytes = std::fs::read(path).map_err(|source| FlashcardError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    extract(&bytes, media_type)
}

/// Read `path`, detect its media type from content (see [`media::detect`]),
/// and extract its text.
///
/// Runs on the blocking pool: PDF and DOCX parsing are CPU-bound.
pub async fn detect_and_extract(
    path: &Path,
    declared: &str,
    sniff_window: usize,
    max_bytes: u64,
) -> Result<ExtractedDocument, FlashcardError> {
    let path = path.to_path_buf();
    let declared = declared.to_string();

    tokio::task::spawn_blocking(move || {
        let bytes = std::fs::read(&path).map_err(|source| FlashcardError::Io {
            path: path.clone(),
            source,
        })?;
        let media_type = media::detect(&bytes, &declared, sniff_window);
        extract_limited(&bytes, &media_type, max_bytes)
    })
    .await
    .map_err(|e| FlashcardError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn unsupported(mime: &str) -> FlashcardError {
    FlashcardError::UnsupportedType {
        media_type: mime.to_string(),
    }
}

fn too_much_text(media_type: MediaType, actual: u64, limit: u64) -> FlashcardError {
    FlashcardError::Extraction {
        media_type,
        detail: format!("decoded content exceeds {} bytes (got at least {})", limit, actual),
    }
}

// ── Plain text ───────────────────────────────────────────────────────────────

/// Strict UTF-8: invalid sequences are an error, never replaced.
fn extract_plain(content: &[u8]) -> Result<String, FlashcardError> {
    std::str::from_utf8(content)
        .map(str::to_owned)
        .map_err(|e| FlashcardError::Decode {
            valid_up_to: e.valid_up_to(),
        })
}

// ── PDF ──────────────────────────────────────────────────────────────────────

fn pdf_error(detail: impl Into<String>) -> FlashcardError {
    FlashcardError::Extraction {
        media_type: MediaType::Pdf,
        detail: detail.into(),
    }
}

fn extract_pdf(content: &[u8], max_bytes: u64) -> Result<String, FlashcardError> {
    let doc = lopdf::Document::load_mem(content)
        .map_err(|e| pdf_error(format!("not a readable PDF: {}", e)))?;

    // `get_pages` is keyed by 1-based page number, so iteration is file order.
    let pages = doc.get_pages();
    let mut text = String::new();
    for page_num in pages.keys() {
        let page_text = doc
            .extract_text(&[*page_num])
            .map_err(|e| pdf_error(format!("page {}: {}", page_num, e)))?;
        text.push_str(&page_text);
        if text.len() as u64 > max_bytes {
            return Err(too_much_text(MediaType::Pdf, text.len() as u64, max_bytes));
        }
    }

    debug!("PDF: {} pages, {} bytes of text", pages.len(), text.len());
    Ok(text)
}

// ── DOCX ─────────────────────────────────────────────────────────────────────

fn docx_error(detail: impl Into<String>) -> FlashcardError {
    FlashcardError::Extraction {
        media_type: MediaType::Docx,
        detail: detail.into(),
    }
}

fn extract_docx(content: &[u8], max_bytes: u64) -> Result<String, FlashcardError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(content))
        .map_err(|e| docx_error(format!("corrupt archive: {}", e)))?;

    let mut raw = Vec::new();
    {
        let part = archive.by_name(DOCX_BODY_PART).map_err(|e| match e {
            zip::result::ZipError::FileNotFound => {
                docx_error(format!("missing document part '{}'", DOCX_BODY_PART))
            }
            other => docx_error(format!("cannot open '{}': {}", DOCX_BODY_PART, other)),
        })?;
        if part.size() > max_bytes {
            return Err(too_much_text(MediaType::Docx, part.size(), max_bytes));
        }
        // The declared size may lie; never inflate more than one byte past the cap.
        part.take(max_bytes.saturating_add(1))
            .read_to_end(&mut raw)
            .map_err(|e| docx_error(format!("cannot read '{}': {}", DOCX_BODY_PART, e)))?;
    }
    if raw.len() as u64 > max_bytes {
        return Err(too_much_text(MediaType::Docx, raw.len() as u64, max_bytes));
    }

    let xml = String::from_utf8(raw)
        .map_err(|e| docx_error(format!("'{}' is not UTF-8: {}", DOCX_BODY_PART, e)))?;
    docx_body_text(&xml)
}

/// Collect the text runs (`<w:t>`) of a WordprocessingML body.
///
/// Paragraph ends and `<w:br/>`/`<w:cr/>` become `\n`, `<w:tab/>` becomes `\t`.
fn docx_body_text(xml: &str) -> Result<String, FlashcardError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut out = String::with_capacity(xml.len() / 4);
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" | b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let text = t
                    .unescape()
                    .map_err(|e| docx_error(format!("bad text in '{}': {}", DOCX_BODY_PART, e)))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(docx_error(format!(
                    "malformed XML in '{}' at byte {}: {}",
                    DOCX_BODY_PART,
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(out)
}
