//! Media-type taxonomy and content sniffing.
//!
//! The extractor is chosen from the upload's *content*, not its filename or
//! the browser-supplied `Content-Type`. A renamed `.exe` declared as
//! `text/plain` is still detected as binary and rejected. The declared type
//! is consulted only when the first few KiB cannot decide:
//!
//! | Sniffed window             | Result                                      |
//! |----------------------------|---------------------------------------------|
//! | `%PDF-`                    | [`MediaType::Pdf`]                          |
//! | zip header + `word/` entry | [`MediaType::Docx`]                         |
//! | zip header, no Word part   | declared type if DOCX, else `application/zip` |
//! | empty                      | declared type                               |
//! | no binary control bytes    | [`MediaType::PlainText`]                    |
//! | known image/archive magic  | `Unsupported(<mime>)`                       |
//! | anything else              | `Unsupported("application/octet-stream")`   |

use serde::{Deserialize, Serialize};
use std::fmt;

/// `text/plain`
pub const MIME_TEXT: &str = "text/plain";
/// `application/pdf`
pub const MIME_PDF: &str = "application/pdf";
/// Word 2007+ (`.docx`) documents.
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const MIME_ZIP: &str = "application/zip";
const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Default number of leading bytes inspected by [`sniff`].
pub const DEFAULT_SNIFF_WINDOW: usize = 4096;

/// Magic numbers of common binary uploads we recognise only to reject.
const BINARY_SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x1f\x8b", "application/gzip"),
    (b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1", "application/msword"),
    (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
];

/// Document formats the pipeline can extract text from.
///
/// `Unsupported` keeps the offending MIME type so error messages can name it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum MediaType {
    PlainText,
    Pdf,
    Docx,
    Unsupported(String),
}

impl MediaType {
    /// Map a declared content type onto the taxonomy.
    ///
    /// Parameters (`; charset=utf-8`) are ignored; the essence must match one
    /// of the three supported MIME strings exactly.
    pub fn from_mime(declared: &str) -> Self {
        let essence = declared.split(';').next().unwrap_or_default().trim();
        match essence {
            MIME_TEXT => MediaType::PlainText,
            MIME_PDF => MediaType::Pdf,
            MIME_DOCX => MediaType::Docx,
            "" => MediaType::Unsupported(MIME_OCTET_STREAM.to_string()),
            other => MediaType::Unsupported(other.to_string()),
        }
    }

    /// The wire MIME string.
    pub fn mime(&self) -> &str {
        match self {
            MediaType::PlainText => MIME_TEXT,
            MediaType::Pdf => MIME_PDF,
            MediaType::Docx => MIME_DOCX,
            MediaType::Unsupported(mime) => mime,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, MediaType::Unsupported(_))
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

impl From<MediaType> for String {
    fn from(media_type: MediaType) -> Self {
        media_type.mime().to_string()
    }
}

impl From<String> for MediaType {
    fn from(mime: String) -> Self {
        MediaType::from_mime(&mime)
    }
}

/// What the leading bytes of an upload look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Pdf,
    Docx,
    Text,
    /// A zip container whose window does not reveal a Word part.
    Zip,
    /// Nothing to inspect.
    Empty,
    /// Recognisably binary; carries the best-known MIME type.
    Binary(&'static str),
}

/// Classify the first `window` bytes of `bytes`.
pub fn sniff(bytes: &[u8], window: usize) -> Signature {
    let head = &bytes[..bytes.len().min(window)];

    if head.is_empty() {
        return Signature::Empty;
    }
    if head.starts_with(b"%PDF-") {
        return Signature::Pdf;
    }
    if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
        // The first local file headers of a .docx name its parts; Word bodies
        // live under `word/`.
        return if contains(head, b"word/") {
            Signature::Docx
        } else {
            Signature::Zip
        };
    }
    if let Some((_, mime)) = BINARY_SIGNATURES
        .iter()
        .find(|(magic, _)| head.starts_with(magic))
    {
        return Signature::Binary(*mime);
    }
    if looks_like_text(head) {
        Signature::Text
    } else {
        Signature::Binary(MIME_OCTET_STREAM)
    }
}

/// Decide the media type of an upload from its content, falling back on the
/// declared content type only when the content is ambiguous.
pub fn detect(bytes: &[u8], declared: &str, window: usize) -> MediaType {
    let signature = sniff(bytes, window);
    let media_type = match signature {
        Signature::Pdf => MediaType::Pdf,
        Signature::Docx => MediaType::Docx,
        Signature::Text => MediaType::PlainText,
        Signature::Binary(mime) => MediaType::Unsupported(mime.to_string()),
        // Ambiguous content: the declared type decides.
        Signature::Empty => MediaType::from_mime(declared),
        Signature::Zip => match MediaType::from_mime(declared) {
            MediaType::Docx => MediaType::Docx,
            _ => MediaType::Unsupported(MIME_ZIP.to_string()),
        },
    };
    tracing::debug!(
        "Sniffed {:?} (declared '{}') → {}",
        signature,
        declared,
        media_type
    );
    media_type
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// True when the window has no control bytes outside the usual whitespace
/// set (tab, LF, VT, FF, CR) and ESC. Non-UTF-8 text still counts as text;
/// the extractor reports the decode failure.
fn looks_like_text(head: &[u8]) -> bool {
    !head
        .iter()
        .any(|&b| matches!(b, 0x00..=0x08 | 0x0E..=0x1A | 0x1C..=0x1F | 0x7F))
}
