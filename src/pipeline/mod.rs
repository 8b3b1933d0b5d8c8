//! Pipeline stages for document-to-flashcard generation.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and swapped (e.g. a different model backend) without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──▶ staging ──▶ extract ──▶ prompt ──▶ llm ──▶ parse ──▶ store
//!          (tempfile)  (sniff +    (prompts)  (model)  (JSON)  (topic/user)
//!                       text)
//! ```
//!
//! 1. [`staging`] writes the upload to a scoped temporary file that is
//!    removed on every exit path
//! 2. [`extract`] sniffs the media type from content and pulls out plain
//!    text; runs in `spawn_blocking` because PDF and DOCX parsing are
//!    CPU-bound
//! 3. [`crate::prompts`] wraps the text in generation instructions
//! 4. [`llm`] makes the single model call; the only stage with network I/O
//! 5. [`parse`] strips an optional code fence and validates the reply
//!
//! Persistence lives in [`crate::store`]; [`crate::generate`] wires the
//! stages together.

pub mod extract;
pub mod llm;
pub mod parse;
pub mod staging;
