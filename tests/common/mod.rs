//! Shared fixtures for integration tests: in-memory PDF/DOCX builders and
//! stub collaborators.

#![allow(dead_code)]

use edgequake_flashcards::{
    FlashcardError, FlashcardStore, GenerativeModel, MemoryStore, PersistedFlashcard,
    StoreError, Topic, TopicRef, UserRef,
};
use futures::future::BoxFuture;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ── Document fixtures ────────────────────────────────────────────────────────

/// A PDF with one page per entry of `pages`, each showing that text.
pub fn pdf_bytes(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content stream"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(pages.len() as i64),
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(612),
            Object::Integer(792),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("serialise PDF");
    buf
}

/// A minimal .docx whose body has one paragraph per entry of `paragraphs`.
pub fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| {
            format!(
                "<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
                xml_escape(p)
            )
        })
        .collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    zip_bytes(&[
        ("[Content_Types].xml", CONTENT_TYPES),
        ("word/document.xml", &document),
    ])
}

/// A zip archive with the given `(name, contents)` entries.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, contents) in entries {
        zip.start_file(*name, options).expect("start zip entry");
        zip.write_all(contents.as_bytes()).expect("write zip entry");
    }
    zip.finish().expect("finish zip").into_inner()
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

// ── Logging ──────────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Filesystem helpers ───────────────────────────────────────────────────────

/// Number of entries in `dir`.
pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|it| it.count()).unwrap_or(0)
}

// ── Stub model ───────────────────────────────────────────────────────────────

/// A scripted [`GenerativeModel`] that records every prompt.
///
/// When `watch_dir` is set it also records how many files that directory held
/// at the moment of each call, so tests can prove the staged upload existed
/// while the model ran.
pub struct StubModel {
    reply: Result<String, String>,
    delay: Option<Duration>,
    watch_dir: Option<PathBuf>,
    pub prompts: Mutex<Vec<String>>,
    pub files_during_call: Mutex<Vec<usize>>,
}

impl StubModel {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            delay: None,
            watch_dir: None,
            prompts: Mutex::new(Vec::new()),
            files_during_call: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(detail: impl Into<String>) -> Self {
        Self {
            reply: Err(detail.into()),
            ..Self::replying("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn watching(mut self, dir: &Path) -> Self {
        self.watch_dir = Some(dir.to_path_buf());
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

impl GenerativeModel for StubModel {
    fn model_name(&self) -> &str {
        "stub-model"
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, FlashcardError>> {
        Box::pin(async move {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(ref dir) = self.watch_dir {
                let n = file_count(dir);
                self.files_during_call.lock().unwrap().push(n);
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone().map_err(|detail| FlashcardError::ModelCall {
                model: "stub-model".to_string(),
                detail,
            })
        })
    }
}

// ── Stub store ───────────────────────────────────────────────────────────────

/// A [`MemoryStore`] whose `create_flashcard` fails on the `fail_on`-th call
/// (1-based).
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn failing_on(fail_on: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FlashcardStore for FlakyStore {
    fn create_topic<'a>(
        &'a self,
        user: &'a UserRef,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Topic, StoreError>> {
        self.inner.create_topic(user, name)
    }

    fn create_flashcard<'a>(
        &'a self,
        topic: TopicRef,
        user: &'a UserRef,
        question: &'a str,
        answer: &'a str,
    ) -> BoxFuture<'a, Result<PersistedFlashcard, StoreError>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Box::pin(async {
                Err::<PersistedFlashcard, _>(StoreError::Task("simulated database outage".into()))
            });
        }
        self.inner.create_flashcard(topic, user, question, answer)
    }
}
