//! Message search and result previews.

use crate::models::Message;

const PREVIEW_CHARS: usize = 100;
const CONTEXT_CHARS: usize = 40;

/// Messages whose content contains `term`, ignoring case. A blank term
/// matches nothing.
pub fn matching<'a>(messages: &'a [Message], term: &str) -> impl Iterator<Item = &'a Message> {
    let needle = term.trim().to_lowercase();
    messages
        .iter()
        .filter(move |m| !needle.is_empty() && m.content.to_lowercase().contains(&needle))
}

/// Short excerpt of `content` around the first occurrence of `term`.
pub fn preview(content: &str, term: &str) -> String {
    let term = term.trim();
    let chars: Vec<char> = content.chars().collect();
    let Some(index) = find_ignore_case(&chars, term) else {
        return head(&chars, PREVIEW_CHARS);
    };

    let term_len = term.chars().count();
    let start = index.saturating_sub(CONTEXT_CHARS);
    let end = (index + term_len + CONTEXT_CHARS).min(chars.len());

    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push_str("...");
    }
    out
}

fn head(chars: &[char], max: usize) -> String {
    let mut out: String = chars.iter().take(max).collect();
    if chars.len() > max {
        out.push_str("...");
    }
    out
}

/// Char index of the first case-insensitive match of `term`.
fn find_ignore_case(haystack: &[char], term: &str) -> Option<usize> {
    let needle: Vec<char> = term.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&start| {
        haystack[start..start + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(h, n)| h.to_lowercase().eq(std::iter::once(*n)))
    })
}
