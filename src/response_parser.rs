//! Turning raw model text into a JSON object.
//!
//! Models wrap JSON in markdown fences or prose often enough that a plain
//! `serde_json::from_str` is not sufficient. Recovery is kept
//! narrow: strip fences, then fall back to the largest balanced `{...}`
//! span. Anything else is a [`ParseError`].

use serde_json::Value;
use tracing::debug;

use crate::error::ParseError;

/// Removes a surrounding ```` ```json ```` / ```` ``` ```` fence if present.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    if !(trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() >= 6) {
        return trimmed;
    }
    let inner = &trimmed[3..trimmed.len() - 3];
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}

/// Returns the longest balanced `{...}` span in `content`, ignoring braces
/// inside JSON string literals.
pub fn largest_json_object(content: &str) -> Option<&str> {
    let bytes = content.as_bytes();
    let mut best: Option<(usize, usize)> = None;
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    let len = i + 1 - start;
                    if best.map_or(true, |(s, e)| e - s < len) {
                        best = Some((start, i + 1));
                    }
                }
            }
            _ => {}
        }
    }

    best.map(|(s, e)| &content[s..e])
}

/// Parses model output into a JSON object, with one recovery attempt.
pub fn parse_json_object(raw: &str) -> Result<Value, ParseError> {
    let content = strip_code_fences(raw);
    if content.is_empty() {
        return Err(ParseError::Empty);
    }

    let first_error = match serde_json::from_str::<Value>(content) {
        Ok(value @ Value::Object(_)) => return Ok(value),
        Ok(other) => ParseError::Shape(format!("expected a JSON object, got {}", json_kind(&other))),
        Err(e) => ParseError::Json(e),
    };

    debug!(error = %first_error, "direct JSON parse failed, looking for an embedded object");
    match largest_json_object(content) {
        Some(candidate) => match serde_json::from_str::<Value>(candidate) {
            Ok(value) => Ok(value),
            Err(e) => Err(ParseError::Json(e)),
        },
        None => match first_error {
            ParseError::Json(_) => Err(ParseError::NoJsonObject),
            other => Err(other),
        },
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_object_parses() {
        assert_eq!(parse_json_object(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn fenced_object_parses() {
        let raw = "```json\n{\"days\": []}\n```";
        assert_eq!(parse_json_object(raw).unwrap(), json!({"days": []}));
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
    }

    #[test]
    fn prose_wrapped_object_is_recovered() {
        let raw = "Claro! Aqui está o cardápio:\n{\"totalCost\": 10.5, \"days\": []}\nBom apetite.";
        assert_eq!(parse_json_object(raw).unwrap(), json!({"totalCost": 10.5, "days": []}));
    }

    #[test]
    fn largest_object_wins_and_string_braces_are_ignored() {
        let raw = r#"nota {"x": 1} e depois {"desc": "use {chaves} e }", "y": [1, 2, 3]} fim"#;
        let found = largest_json_object(raw).unwrap();
        assert_eq!(found, r#"{"desc": "use {chaves} e }", "y": [1, 2, 3]}"#);
    }

    #[test]
    fn empty_and_garbage_inputs_fail() {
        assert!(matches!(parse_json_object("   "), Err(ParseError::Empty)));
        assert!(matches!(parse_json_object("sem json aqui"), Err(ParseError::NoJsonObject)));
        assert!(matches!(parse_json_object("{\"a\": }"), Err(ParseError::Json(_))));
    }

    #[test]
    fn top_level_array_is_a_shape_error() {
        assert!(matches!(parse_json_object("[1, 2]"), Err(ParseError::Shape(_))));
    }
}
