//! The `@mention` token grammar
//!
//! One grammar serves autocomplete, extraction and rendering:
//!
//! - a mention starts with `@` at the start of the text or right after
//!   whitespace;
//! - the body is a word (letters, digits, `_`, with single `'`, `.` or `-`
//!   joining word characters), followed by any number of continuations made
//!   of one space and a word that starts with an uppercase letter.
//!
//! So `@Jane Doe and` names "Jane Doe", `@Sam re:` names "Sam" and
//! `@Bob!` names "Bob". `hello@j` is not a mention.

use regex::Regex;
use std::sync::OnceLock;

const MENTION_PATTERN: &str = r"@([\p{L}\p{N}_]+(?:['.\-][\p{L}\p{N}_]+)*(?: \p{Lu}[\p{L}\p{N}_]*(?:['.\-][\p{L}\p{N}_]+)*)*)";

fn mention_regex() -> &'static Regex {
    static MENTION_REGEX: OnceLock<Regex> = OnceLock::new();
    MENTION_REGEX.get_or_init(|| Regex::new(MENTION_PATTERN).unwrap())
}

/// A mention found in text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionToken {
    /// Byte offset of the `@`
    pub start: usize,
    /// Byte offset just past the name
    pub end: usize,
    /// The name, without `@`
    pub name: String,
}

/// Characters a mention name is built from
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether an `@` at byte offset `at` may open a mention
pub fn is_mention_boundary(text: &str, at: usize) -> bool {
    at == 0 || text[..at].chars().next_back().is_some_and(char::is_whitespace)
}

/// Every mention in `text`, in order
pub fn mention_tokens(text: &str) -> Vec<MentionToken> {
    mention_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            if !is_mention_boundary(text, whole.start()) {
                return None;
            }
            Some(MentionToken {
                start: whole.start(),
                end: whole.end(),
                name: name.as_str().trim().to_string(),
            })
        })
        .collect()
}

/// Byte offsets of every `@` that opens a mention
pub fn mention_starts(text: &str) -> Vec<usize> {
    text.match_indices('@')
        .map(|(at, _)| at)
        .filter(|&at| is_mention_boundary(text, at))
        .filter(|&at| text[at + 1..].chars().next().is_some_and(is_word_char))
        .collect()
}
