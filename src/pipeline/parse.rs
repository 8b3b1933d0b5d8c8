//! Reply parsing: turn the model's raw text into [`FlashcardDraft`]s.
//!
//! Models are told to answer with a bare JSON array but often wrap it in a
//! ` ```json ... ``` ` fence anyway, so the fence is stripped first. Beyond
//! that the parser is strict: no JSON repair, no key renaming, no defaults.
//! A reply that does not describe a list of non-empty question/answer pairs
//! fails the run.
//!
//! Every bad element is reported in one error (`element 0: ...; element 3:
//! ...`) so a single log line shows everything the model got wrong.

use crate::error::FlashcardError;
use crate::output::FlashcardDraft;
use serde_json::Value;

/// Characters of the raw reply kept in a [`FlashcardError::MalformedResponse`].
pub const EXCERPT_CHARS: usize = 512;

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// Strip an optional ` ```json ` fence from `raw`.
///
/// Whitespace around the reply is trimmed first. The opening marker must be
/// exactly ` ```json `; the closing ` ``` ` is removed only after the opening
/// one was checked, whether or not it was present.
pub fn strip_code_fence(raw: &str) -> &str {
    let s = raw.trim();
    let s = s.strip_prefix(FENCE_OPEN).unwrap_or(s);
    s.strip_suffix(FENCE_CLOSE).unwrap_or(s)
}

/// Parse a model reply into drafts, preserving array order.
pub fn parse_flashcards(raw: &str) -> Result<Vec<FlashcardDraft>, FlashcardError> {
    let body = strip_code_fence(raw);

    let value: Value = serde_json::from_str(body)
        .map_err(|e| malformed(format!("reply is not valid JSON: {}", e), raw))?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(malformed(
                format!("expected a JSON array, got {}", json_kind(&other)),
                raw,
            ))
        }
    };

    let mut drafts = Vec::with_capacity(items.len());
    let mut problems = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match draft_from_value(item) {
            Ok(draft) => drafts.push(draft),
            Err(problem) => problems.push(format!("element {}: {}", i, problem)),
        }
    }

    if !problems.is_empty() {
        return Err(malformed(problems.join("; "), raw));
    }
    Ok(drafts)
}

fn draft_from_value(item: &Value) -> Result<FlashcardDraft, String> {
    let obj = item
        .as_object()
        .ok_or_else(|| format!("expected an object, got {}", json_kind(item)))?;

    let field = |key: &str| -> Result<String, String> {
        match obj.get(key) {
            None => Err(format!("missing \"{}\"", key)),
            Some(Value::String(s)) if s.trim().is_empty() => Err(format!("empty \"{}\"", key)),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(format!("\"{}\" is {}, not a string", key, json_kind(other))),
        }
    };

    // Report both keys when both are wrong.
    match (field("question"), field("answer")) {
        (Ok(question), Ok(answer)) => Ok(FlashcardDraft { question, answer }),
        (Err(q), Err(a)) => Err(format!("{}, {}", q, a)),
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn malformed(reason: String, raw: &str) -> FlashcardError {
    FlashcardError::MalformedResponse {
        reason,
        excerpt: excerpt(raw),
    }
}

/// First [`EXCERPT_CHARS`] characters of `raw`, cut on a char boundary.
fn excerpt(raw: &str) -> String {
    raw.chars().take(EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason_of(err: FlashcardError) -> String {
        match err {
            FlashcardError::MalformedResponse { reason, .. } => reason,
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_strip_fences() {
        let raw = "```json\n[{\"question\": \"Q\", \"answer\": \"A\"}]\n```";
        assert_eq!(
            strip_code_fence(raw),
            "\n[{\"question\": \"Q\", \"answer\": \"A\"}]\n"
        );
    }

    #[test]
    fn test_strip_fences_trims_surrounding_whitespace() {
        assert_eq!(strip_code_fence("  \n```json[]```\n\n"), "[]");
    }

    #[test]
    fn test_no_fences_passthrough() {
        assert_eq!(strip_code_fence("[1, 2]"), "[1, 2]");
    }

    #[test]
    fn test_bare_fence_without_language_is_kept() {
        // Only the ```json marker is recognised as an opening fence.
        assert_eq!(strip_code_fence("```\n[]\n```"), "```\n[]\n");
    }

    #[test]
    fn parses_clean_array() {
        let raw = r#"[{"question": "What is the capital of France?", "answer": "Paris"}]"#;
        let drafts = parse_flashcards(raw).unwrap();
        assert_eq!(
            drafts,
            vec![FlashcardDraft::new("What is the capital of France?", "Paris")]
        );
    }

    #[test]
    fn fenced_and_clean_replies_parse_identically() {
        let clean = r#"[{"question": "Q1", "answer": "A1"}, {"question": "Q2", "answer": "A2"}]"#;
        let fenced = format!("```json\n{}\n```", clean);
        assert_eq!(parse_flashcards(clean).unwrap(), parse_flashcards(&fenced).unwrap());
    }

    #[test]
    fn preserves_order() {
        let raw = r#"[{"question":"1","answer":"a"},{"question":"2","answer":"b"},{"question":"3","answer":"c"}]"#;
        let questions: Vec<_> = parse_flashcards(raw)
            .unwrap()
            .into_iter()
            .map(|d| d.question)
            .collect();
        assert_eq!(questions, vec!["1", "2", "3"]);
    }

    #[test]
    fn empty_array_is_zero_drafts() {
        assert!(parse_flashcards("[]").unwrap().is_empty());
    }

    #[test]
    fn extra_keys_are_ignored() {
        let raw = r#"[{"question": "Q", "answer": "A", "difficulty": 3}]"#;
        assert_eq!(parse_flashcards(raw).unwrap(), vec![FlashcardDraft::new("Q", "A")]);
    }

    #[test]
    fn truncated_json_is_rejected() {
        let err = parse_flashcards(r#"[{"question": "Q", "answer": "#).unwrap_err();
        assert!(reason_of(err).contains("not valid JSON"));
    }

    #[test]
    fn non_array_is_rejected() {
        let err = parse_flashcards(r#"{"question": "Q", "answer": "A"}"#).unwrap_err();
        assert!(reason_of(err).contains("expected a JSON array, got an object"));
    }

    #[test]
    fn all_bad_elements_are_reported() {
        let raw = r#"[
            {"question": "Q0"},
            {"question": "Q1", "answer": "A1"},
            "just a string",
            {"question": "", "answer": 42}
        ]"#;
        let reason = reason_of(parse_flashcards(raw).unwrap_err());
        assert!(reason.contains("element 0: missing \"answer\""), "got: {reason}");
        assert!(!reason.contains("element 1"), "got: {reason}");
        assert!(reason.contains("element 2: expected an object, got a string"), "got: {reason}");
        assert!(
            reason.contains("element 3: empty \"question\", \"answer\" is a number, not a string"),
            "got: {reason}"
        );
    }

    #[test]
    fn whitespace_only_answer_is_rejected() {
        let err = parse_flashcards(r#"[{"question": "Q", "answer": "   "}]"#).unwrap_err();
        assert!(reason_of(err).contains("empty \"answer\""));
    }

    #[test]
    fn excerpt_is_truncated_on_char_boundary() {
        let raw = "é".repeat(EXCERPT_CHARS + 100);
        match parse_flashcards(&raw).unwrap_err() {
            FlashcardError::MalformedResponse { excerpt, .. } => {
                assert_eq!(excerpt.chars().count(), EXCERPT_CHARS);
            }
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }
}
