//! Conversation title derivation from the first non-empty user message.

/// Clean markdown out of the text and truncate to `max_chars` with an
/// ellipsis: code fences removed, inline backticks unwrapped, leading
/// list/heading markers stripped, whitespace collapsed.
pub fn derive(text: &str, max_chars: usize) -> String {
    let cleaned = strip_code_fences(text);
    let cleaned = unwrap_inline_code(&cleaned);
    let cleaned = strip_leading_markers(&cleaned);
    let cleaned = collapse_whitespace(&cleaned);
    let cleaned = cleaned.trim_matches(|c: char| c == '-' || c == '_' || c.is_whitespace());
    truncate(cleaned, max_chars)
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    let mut out: String = chars[..max_chars.saturating_sub(1)].iter().collect();
    out = out.trim_end().to_string();
    out.push('…');
    out
}

fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push(' ');
            continue;
        }
        if !in_fence {
            out.push_str(line);
            out.push(' ');
        }
    }
    out
}

fn unwrap_inline_code(text: &str) -> String {
    text.replace('`', "")
}

fn strip_leading_markers(text: &str) -> String {
    text.trim_start_matches(|c: char| {
        c == '#' || c == '>' || c == '*' || c == '-' || c.is_whitespace()
    })
    .to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_passes_through() {
        assert_eq!(derive("Fix the login bug", 28), "Fix the login bug");
    }

    #[test]
    fn long_text_truncates_with_ellipsis() {
        let title = derive(
            "Please explain how the authentication middleware handles token refresh",
            28,
        );
        assert!(title.chars().count() <= 28);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn markdown_is_stripped() {
        let title = derive("## How do I use `serde_json`?", 28);
        assert_eq!(title, "How do I use serde_json?");
    }

    #[test]
    fn code_fences_are_dropped() {
        let title = derive("```rust\nfn main() {}\n```\nWhat does this do", 28);
        assert_eq!(title, "What does this do");
    }

    #[test]
    fn empty_input_yields_empty_title() {
        assert_eq!(derive("", 28), "");
        assert_eq!(derive("   ", 28), "");
    }
}
