//! Rose/Bud/Thorn entries attached to nodes (`rbt_entries` table).
//!
//! Entries are soft-versioned: editing inserts a new current row that
//! points at the one it supersedes, and the old row is kept with
//! `is_current = false` for history.

use crate::db::timestamp;
use crate::models::{RbtCategory, ValidationError, Visibility};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbtEntry {
    pub id: String,
    pub node_id: String,
    pub author_id: String,
    #[serde(default)]
    pub rose: Option<String>,
    #[serde(default)]
    pub bud: Option<String>,
    #[serde(default)]
    pub thorn: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default = "default_current")]
    pub is_current: bool,
    #[serde(default)]
    pub supersedes_id: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

fn default_current() -> bool {
    true
}

impl RbtEntry {
    /// Text for one category, if populated
    pub fn text(&self, category: RbtCategory) -> Option<&str> {
        let text = match category {
            RbtCategory::Rose => self.rose.as_deref(),
            RbtCategory::Bud => self.bud.as_deref(),
            RbtCategory::Thorn => self.thorn.as_deref(),
        };
        text.filter(|t| !t.trim().is_empty())
    }
}

/// Text content of an entry, any subset of the three fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RbtFields {
    #[serde(default)]
    pub rose: Option<String>,
    #[serde(default)]
    pub bud: Option<String>,
    #[serde(default)]
    pub thorn: Option<String>,
}

impl RbtFields {
    pub fn rose(mut self, text: impl Into<String>) -> Self {
        self.rose = Some(text.into());
        self
    }

    pub fn bud(mut self, text: impl Into<String>) -> Self {
        self.bud = Some(text.into());
        self
    }

    pub fn thorn(mut self, text: impl Into<String>) -> Self {
        self.thorn = Some(text.into());
        self
    }

    /// Drop blank fields; reject an entry with nothing left
    pub fn normalized(self) -> Result<Self, ValidationError> {
        fn keep(text: Option<String>) -> Option<String> {
            text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
        }
        let fields = Self {
            rose: keep(self.rose),
            bud: keep(self.bud),
            thorn: keep(self.thorn),
        };
        if fields.rose.is_none() && fields.bud.is_none() && fields.thorn.is_none() {
            return Err(ValidationError::EmptyEntry);
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_trims_and_drops_blank_fields() {
        let fields = RbtFields::default().rose("  sunsets ").bud("");
        let fields = fields.normalized().unwrap();

        assert_eq!(fields.rose.as_deref(), Some("sunsets"));
        assert!(fields.bud.is_none());
    }

    #[test]
    fn test_empty_entry_rejected() {
        let fields = RbtFields::default().thorn("   ");
        assert_eq!(fields.normalized(), Err(ValidationError::EmptyEntry));
    }
}
