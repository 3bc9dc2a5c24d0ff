use log::warn;
use serde_json::Value;

use super::QuizQuestion;

/// Pulls quiz questions out of model output. Accepts a JSON array, a single
/// question object, or either wrapped in Markdown fences or surrounding prose.
/// Returns an empty list when nothing usable is found.
pub fn parse_quiz_response(raw: &str) -> Vec<QuizQuestion> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let value = serde_json::from_str::<Value>(cleaned)
        .ok()
        .or_else(|| outermost_array(cleaned).and_then(|span| serde_json::from_str(span).ok()));

    let Some(value) = value else {
        warn!("quiz response is not JSON ({} chars)", cleaned.len());
        return Vec::new();
    };

    let candidates = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => Vec::new(),
    };

    candidates
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<QuizQuestion>(item) {
            Ok(question) if question.is_well_formed() => Some(question),
            Ok(question) => {
                warn!("dropping malformed quiz question: {:?}", question.question);
                None
            }
            Err(err) => {
                warn!("dropping unreadable quiz question: {err}");
                None
            }
        })
        .collect()
}

fn outermost_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (start < end).then(|| &text[start..=end])
}
