//! Shared collections: catalogues of saved RBT items and collaborative
//! trip planners. Both are joined by invite code and carry a member list
//! with the same role/status shape.

use crate::db::timestamp;
use crate::models::{require_text, PlaceRef, RbtCategory, ValidationError, Visibility};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Editor,
    Viewer,
}

impl MemberRole {
    pub fn can_edit(self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Editor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Invited,
    Active,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalogue {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    pub invite_code: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// An RBT item saved into a catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogueItem {
    pub id: String,
    pub catalogue_id: String,
    pub added_by: String,
    #[serde(default)]
    pub retro_id: Option<String>,
    pub category: RbtCategory,
    pub text: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogueMember {
    pub id: String,
    pub catalogue_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub status: MemberStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlanner {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub invite_code: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlannerItem {
    pub id: String,
    pub planner_id: String,
    pub added_by: String,
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub day: Option<NaiveDate>,
    #[serde(default)]
    pub place: Option<PlaceRef>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlannerMember {
    pub id: String,
    pub planner_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub status: MemberStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a catalogue; the invite code is allocated by
/// the store
#[derive(Debug, Clone, Serialize)]
pub struct NewCatalogue {
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
}

impl NewCatalogue {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            description: None,
            visibility: Visibility::default(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)
    }
}

/// An RBT item about to be saved into a catalogue
#[derive(Debug, Clone, Serialize)]
pub struct NewCatalogueItem {
    pub category: RbtCategory,
    pub text: String,
    pub retro_id: Option<String>,
    pub note: Option<String>,
}

impl NewCatalogueItem {
    pub fn new(category: RbtCategory, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
            retro_id: None,
            note: None,
        }
    }

    pub fn from_retro(mut self, retro_id: impl Into<String>) -> Self {
        self.retro_id = Some(retro_id.into());
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("text", &self.text)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTripPlanner {
    pub owner_id: String,
    pub title: String,
    pub destination: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl NewTripPlanner {
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            title: title.into(),
            destination: None,
            start_date: None,
            end_date: None,
        }
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ValidationError::InvalidDateRange {
                    start: start.to_string(),
                    end: end.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTripPlannerItem {
    pub title: String,
    pub notes: Option<String>,
    pub day: Option<NaiveDate>,
    pub place: Option<PlaceRef>,
}

impl NewTripPlannerItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            notes: None,
            day: None,
            place: None,
        }
    }

    pub fn on(mut self, day: NaiveDate) -> Self {
        self.day = Some(day);
        self
    }

    pub fn at(mut self, place: PlaceRef) -> Self {
        self.place = Some(place);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_owner_and_editor_edit() {
        assert!(MemberRole::Owner.can_edit());
        assert!(MemberRole::Editor.can_edit());
        assert!(!MemberRole::Viewer.can_edit());
    }

    #[test]
    fn test_planner_dates_ordered() {
        let start = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        let err = NewTripPlanner::new("ana", "Crete").dates(start, end).validate();
        assert!(matches!(err, Err(ValidationError::InvalidDateRange { .. })));
        assert!(NewTripPlanner::new("ana", "Crete").dates(end, start).validate().is_ok());
    }

    #[test]
    fn test_blank_item_text_rejected() {
        assert!(NewCatalogueItem::new(RbtCategory::Bud, " ").validate().is_err());
    }
}
