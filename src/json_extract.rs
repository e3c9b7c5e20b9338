// src/json_extract.rs
//! Models are asked for "JSON only" but still wrap it in code fences or prose.
//! These helpers cut the payload out before handing it to serde.

/// Return the outermost JSON object or array embedded in `raw`, if any.
///
/// Handles ```` ```json ```` fences, leading chatter and trailing remarks.
pub fn extract_json(raw: &str) -> Option<&str> {
    let s = strip_code_fence(raw.trim());
    let start = s.find(['{', '['])?;
    let close = if s.as_bytes()[start] == b'{' { '}' } else { ']' };
    span(s, start, close)
}

/// Like [`extract_json`] but only an object qualifies, so bracketed prose such as
/// `Draft [v1]:` ahead of the payload is skipped.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let s = strip_code_fence(raw.trim());
    let start = s.find('{')?;
    span(s, start, '}')
}

fn span(s: &str, start: usize, close: char) -> Option<&str> {
    let end = s.rfind(close)?;
    (end > start).then(|| &s[start..=end])
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // drop the language tag line (```json)
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
