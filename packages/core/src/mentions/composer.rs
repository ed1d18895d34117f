//! Mention autocomplete state machine
//!
//! Tracks one text input. After every edit the caller reports the new text
//! and cursor with [`MentionComposer::update`]; the composer works out
//! whether the cursor sits inside an unfinished mention, filters the roster
//! and exposes the suggestion list. Key presses go through
//! [`MentionComposer::handle_key`], which says whether the caller's own
//! key handling should still run.
//!
//! Cursor positions are byte offsets into the text.

use crate::mentions::grammar::is_mention_boundary;
use crate::models::UserSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerState {
    Idle,
    ComposingMention,
    SuggestionsVisible,
}

/// Keys the composer reacts to; everything else is `Other`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerKey {
    Down,
    Up,
    Enter,
    Escape,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Consumed; the caller's handler must not see it
    Handled,
    PassThrough,
}

/// The mention the cursor is currently inside
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMention {
    /// Byte offset of the `@`
    pub start: usize,
    /// Text between the `@` and the cursor
    pub query: String,
}

/// Find the unfinished mention ending at `cursor`, if any
///
/// Scans back for the nearest `@` that opens a mention, giving up at the
/// first whitespace character.
pub fn detect_active_mention(text: &str, cursor: usize) -> Option<ActiveMention> {
    if cursor > text.len() || !text.is_char_boundary(cursor) {
        return None;
    }
    let before = &text[..cursor];
    for (at, c) in before.char_indices().rev() {
        if c.is_whitespace() {
            return None;
        }
        if c == '@' && is_mention_boundary(text, at) {
            return Some(ActiveMention {
                start: at,
                query: before[at + 1..].to_string(),
            });
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct MentionComposer {
    roster: Vec<UserSummary>,
    limit: usize,
    text: String,
    cursor: usize,
    active: Option<ActiveMention>,
    suggestions: Vec<UserSummary>,
    highlighted: usize,
}

impl MentionComposer {
    /// `limit` caps the suggestion list (at least one)
    pub fn new(roster: Vec<UserSummary>, limit: usize) -> Self {
        Self {
            roster,
            limit: limit.max(1),
            text: String::new(),
            cursor: 0,
            active: None,
            suggestions: Vec::new(),
            highlighted: 0,
        }
    }

    /// Replace the cached roster and refresh suggestions
    pub fn set_roster(&mut self, roster: Vec<UserSummary>) {
        self.roster = roster;
        self.refresh();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn active_mention(&self) -> Option<&ActiveMention> {
        self.active.as_ref()
    }

    pub fn suggestions(&self) -> &[UserSummary] {
        &self.suggestions
    }

    pub fn highlighted(&self) -> Option<&UserSummary> {
        self.suggestions.get(self.highlighted)
    }

    pub fn highlighted_index(&self) -> usize {
        self.highlighted
    }

    pub fn state(&self) -> ComposerState {
        match (&self.active, self.suggestions.is_empty()) {
            (None, _) => ComposerState::Idle,
            (Some(_), true) => ComposerState::ComposingMention,
            (Some(_), false) => ComposerState::SuggestionsVisible,
        }
    }

    /// Whether a pointer-down listener outside the input is needed
    pub fn outside_listener_active(&self) -> bool {
        self.state() == ComposerState::SuggestionsVisible
    }

    /// Report an edit or cursor move
    pub fn update(&mut self, text: impl Into<String>, cursor: usize) {
        self.text = text.into();
        self.cursor = cursor.min(self.text.len());
        self.refresh();
    }

    pub fn handle_key(&mut self, key: ComposerKey) -> KeyOutcome {
        if self.state() != ComposerState::SuggestionsVisible {
            return KeyOutcome::PassThrough;
        }
        let count = self.suggestions.len();
        match key {
            ComposerKey::Down => {
                self.highlighted = (self.highlighted + 1) % count;
                KeyOutcome::Handled
            }
            ComposerKey::Up => {
                self.highlighted = (self.highlighted + count - 1) % count;
                KeyOutcome::Handled
            }
            ComposerKey::Enter => {
                self.select(self.highlighted);
                KeyOutcome::Handled
            }
            ComposerKey::Escape => {
                self.dismiss();
                KeyOutcome::Handled
            }
            ComposerKey::Other => KeyOutcome::PassThrough,
        }
    }

    /// Commit suggestion `index`, returning who was inserted
    ///
    /// The span from `@` to the cursor becomes `@<display name> ` and the
    /// cursor lands after the trailing space.
    pub fn select(&mut self, index: usize) -> Option<UserSummary> {
        let active = self.active.clone()?;
        let person = self.suggestions.get(index)?.clone();

        let inserted = format!("@{} ", person.display_name);
        self.text.replace_range(active.start..self.cursor, &inserted);
        self.cursor = active.start + inserted.len();
        self.dismiss();
        Some(person)
    }

    /// Pointer pressed outside both the input and the list
    pub fn pointer_down_outside(&mut self) {
        if self.outside_listener_active() {
            self.dismiss();
        }
    }

    /// Hide the list without touching the text
    pub fn dismiss(&mut self) {
        self.active = None;
        self.suggestions.clear();
        self.highlighted = 0;
    }

    fn refresh(&mut self) {
        self.active = detect_active_mention(&self.text, self.cursor);
        self.highlighted = 0;
        self.suggestions = match &self.active {
            Some(active) => {
                let query = active.query.to_lowercase();
                self.roster
                    .iter()
                    .filter(|person| person.display_name.to_lowercase().contains(&query))
                    .take(self.limit)
                    .cloned()
                    .collect()
            }
            None => Vec::new(),
        };
    }
}
