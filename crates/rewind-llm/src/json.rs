//! Forgiving JSON extraction for LLM replies.
//!
//! Models wrap JSON in code fences, prepend prose, and leave trailing
//! commas. This module digs the first JSON object out of such text rather
//! than failing the whole pipeline tick.

use serde::de::DeserializeOwned;

/// Extract and parse the first JSON object found in an LLM reply.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let candidate = extract_json_block(raw)?;
    if let Ok(parsed) = serde_json::from_str(&candidate) {
        return Some(parsed);
    }
    // Second chance: strip trailing commas before } or ]
    let relaxed = strip_trailing_commas(&candidate);
    serde_json::from_str(&relaxed).ok()
}

/// Find the text of the outermost `{...}` block, preferring fenced content.
fn extract_json_block(raw: &str) -> Option<String> {
    let trimmed = raw.trim();

    // Fenced block (```json ... ``` or bare ```), possibly surrounded by prose.
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        // Skip an optional language tag up to the first newline.
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if let Some(block) = braced_block(inner) {
                return Some(block);
            }
        }
    }

    braced_block(trimmed)
}

/// The substring from the first `{` to its matching `}`, tracking strings.
fn braced_block(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove `,` immediately before `}` or `]` outside string literals.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = text.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                // Look ahead past whitespace for a closing bracket.
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn parses_plain_json() {
        let v: Value = parse_json_response(r#"{"title": "browse", "n": 2}"#).unwrap();
        assert_eq!(v["title"], "browse");
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let raw = "Here is the result:\n\n```json\n{\"should_merge\": true}\n```\n\nDone.";
        let v: Value = parse_json_response(raw).unwrap();
        assert_eq!(v["should_merge"], true);
    }

    #[test]
    fn parses_unfenced_json_inside_prose() {
        let raw = "Analysis follows.\n{\"ok\": true, \"items\": [1, 2]}\nThat is all.";
        let v: Value = parse_json_response(raw).unwrap();
        assert_eq!(v["items"][1], 2);
    }

    #[test]
    fn tolerates_trailing_commas() {
        let raw = "{\"title\": \"docs\", \"tags\": [\"a\", \"b\",],}";
        let v: Value = parse_json_response(raw).unwrap();
        assert_eq!(v["tags"][1], "b");
    }

    #[test]
    fn parses_fenced_block_without_language_tag() {
        let raw = "```\n{\"x\": 1}\n```";
        let v: Value = parse_json_response(raw).unwrap();
        assert_eq!(v["x"], 1);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_matching() {
        let raw = r#"{"text": "a } inside", "n": 1}"#;
        let v: Value = parse_json_response(raw).unwrap();
        assert_eq!(v["n"], 1);
    }

    #[test]
    fn returns_none_for_garbage() {
        assert!(parse_json_response::<Value>("no json here").is_none());
        assert!(parse_json_response::<Value>("{unclosed").is_none());
    }
}
