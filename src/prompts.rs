//! Prompt construction for flashcard generation.
//!
//! Every prompt string lives here so the instructions can be inspected in
//! unit tests without calling a model. The prompt is the only place that
//! tells the model which JSON shape [`crate::pipeline::parse`] accepts; keep
//! the two in sync.

/// Instructions placed after the document content.
///
/// The example pair is valid JSON (double quotes) so the model copies a
/// shape the parser accepts.
pub const FORMAT_INSTRUCTIONS: &str = r#"Format strictly as a JSON array of objects with exactly two keys, "question" and "answer".
Example: [{"question": "What is the capital of France?", "answer": "Paris"}]

Rules:
- Output ONLY the JSON array
- Do NOT wrap the array in ```json fences
- Do NOT add commentary or explanations
- Every object must have a non-empty "question" and a non-empty "answer"
- Ensure valid JSON formatting"#;

/// Build the model prompt for `text`.
///
/// The text is embedded verbatim between triple quotes. Empty text is not
/// rejected here; the caller decides whether an empty extraction is an error.
pub fn build_prompt(text: &str) -> String {
    format!(
        "Create flashcards in JSON format based on the following content:\n\n\"\"\"{}\"\"\"\n\n{}",
        text, FORMAT_INSTRUCTIONS
    )
}
