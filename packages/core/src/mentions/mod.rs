//! Mentions
//!
//! Everything `@name` related, on top of one shared token grammar
//! ([`grammar`]):
//!
//! - [`MentionComposer`] - autocomplete while typing
//! - [`extract_mentions`] / [`resolve_mentions`] - names in finished text
//!   and the roster people they refer to
//! - [`MentionNotifier`] - one `tagged` notification per resolved person
//! - [`render_segments`] - plain/mention segmentation for display
//!
//! Rosters are lists of [`UserSummary`]: friends, catalogue members or
//! trip-planner members depending on where the text is written.

mod composer;
pub mod grammar;
mod notifier;

pub use composer::{ActiveMention, ComposerKey, ComposerState, KeyOutcome, MentionComposer};
pub use grammar::{mention_tokens, MentionToken};
pub use notifier::{MentionNotifier, TagContext};

use crate::models::UserSummary;
use grammar::{is_word_char, mention_starts};
use std::collections::HashSet;

/// Names mentioned in `text`, in order of appearance
pub fn extract_mentions(text: &str) -> Vec<String> {
    mention_tokens(text).into_iter().map(|token| token.name).collect()
}

/// Roster people mentioned in `text`, each at most once
///
/// At every mention start the longest roster display name that follows the
/// `@` (case-insensitively, ending at a word boundary) wins, so names the
/// lexical grammar would cut short still resolve. Otherwise the lexical
/// name is compared case-insensitively against the roster. Names with no
/// match are skipped.
pub fn resolve_mentions<'a>(text: &str, roster: &'a [UserSummary]) -> Vec<&'a UserSummary> {
    let tokens = mention_tokens(text);
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for at in mention_starts(text) {
        let after = &text[at + 1..];
        let by_display_name = roster
            .iter()
            .filter(|person| !person.display_name.trim().is_empty())
            .filter_map(|person| {
                let len = prefix_len_ignore_case(after, &person.display_name)?;
                let at_boundary = after[len..].chars().next().map_or(true, |c| !is_word_char(c));
                at_boundary.then_some((person.display_name.chars().count(), person))
            })
            .max_by_key(|(name_len, _)| *name_len)
            .map(|(_, person)| person);

        let person = by_display_name.or_else(|| {
            let token = tokens.iter().find(|token| token.start == at)?;
            roster
                .iter()
                .find(|person| same_name(&person.display_name, &token.name))
        });

        match person {
            Some(person) if seen.insert(person.id.as_str()) => resolved.push(person),
            Some(_) => {}
            None => tracing::debug!("Mention at {} did not match anyone on the roster", at),
        }
    }

    resolved
}

/// A piece of rendered text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// Includes the leading `@`
    Mention(String),
}

/// Split text into plain and mention segments
///
/// Purely lexical: a mention does not need to match anyone.
pub fn render_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for token in mention_tokens(text) {
        if token.start > last {
            segments.push(Segment::Text(text[last..token.start].to_string()));
        }
        segments.push(Segment::Mention(text[token.start..token.end].to_string()));
        last = token.end;
    }
    if last < text.len() {
        segments.push(Segment::Text(text[last..].to_string()));
    }
    segments
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Byte length of `prefix` at the start of `text`, compared per character
/// ignoring case
fn prefix_len_ignore_case(text: &str, prefix: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(chars.next().map_or(text.len(), |(i, _)| i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str, name: &str) -> UserSummary {
        UserSummary {
            id: id.to_string(),
            display_name: name.to_string(),
            avatar_url: None,
        }
    }

    #[test]
    fn test_extract_mentions() {
        assert_eq!(
            extract_mentions("Great trip @Jane Doe and @Bob!"),
            vec!["Jane Doe", "Bob"]
        );
        assert!(extract_mentions("no mentions here").is_empty());
    }

    #[test]
    fn test_unknown_names_dropped() {
        let roster = vec![person("u-jane", "Jane Doe"), person("u-ana", "Ana")];
        let resolved = resolve_mentions("Great trip @Jane Doe and @Bob!", &roster);

        let ids: Vec<&str> = resolved.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["u-jane"]);
    }

    #[test]
    fn test_resolution_ignores_case_and_dedupes() {
        let roster = vec![person("u-jane", "Jane Doe")];
        let resolved = resolve_mentions("@jane doe and again @JANE DOE", &roster);
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_longest_roster_name_wins() {
        let roster = vec![
            person("u-jan", "Jan"),
            person("u-vd", "Jan van Dijk"),
            person("u-jane", "Jane"),
        ];
        let ids: Vec<&str> = resolve_mentions("met @Jan van Dijk today", &roster)
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["u-vd"]);

        let ids: Vec<&str> = resolve_mentions("met @Jane", &roster)
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["u-jane"]);
    }

    #[test]
    fn test_render_segments() {
        assert_eq!(
            render_segments("ping @Sam re: dinner"),
            vec![
                Segment::Text("ping ".to_string()),
                Segment::Mention("@Sam".to_string()),
                Segment::Text(" re: dinner".to_string()),
            ]
        );
        assert_eq!(
            render_segments("@Ana"),
            vec![Segment::Mention("@Ana".to_string())]
        );
        assert!(render_segments("").is_empty());
    }
}
