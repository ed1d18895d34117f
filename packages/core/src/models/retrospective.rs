//! Retrospectives (`retrospectives` table)
//!
//! The flat model: Rose/Bud/Thorn items live as embedded arrays on the row,
//! and comments/photos are appended to an individual item rather than
//! stored as separate rows. A retrospective may have a `parent_id`,
//! allowing exactly one level of nesting.
//!
//! Stored arrays that are missing, null or malformed deserialize as empty
//! lists; a damaged row should render with no items, not fail to load.

use crate::db::timestamp;
use crate::models::{require_text, PlaceRef, RbtCategory, RbtEntry, ValidationError, Visibility};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemComment {
    pub id: String,
    pub user_id: String,
    pub text: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// One embedded Rose/Bud/Thorn item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbtItem {
    pub id: String,
    pub text: String,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub comments: Vec<ItemComment>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub photos: Vec<String>,
    #[serde(default)]
    pub place: Option<PlaceRef>,
}

impl RbtItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            tags: Vec::new(),
            comments: Vec::new(),
            photos: Vec::new(),
            place: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrospective {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub attendees: Vec<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub roses: Vec<RbtItem>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub buds: Vec<RbtItem>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub thorns: Vec<RbtItem>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_location")]
    pub location: Location,
    #[serde(default)]
    pub place: Option<PlaceRef>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Retrospective {
    pub fn items(&self, category: RbtCategory) -> &[RbtItem] {
        match category {
            RbtCategory::Rose => &self.roses,
            RbtCategory::Bud => &self.buds,
            RbtCategory::Thorn => &self.thorns,
        }
    }

    pub fn items_mut(&mut self, category: RbtCategory) -> &mut Vec<RbtItem> {
        match category {
            RbtCategory::Rose => &mut self.roses,
            RbtCategory::Bud => &mut self.buds,
            RbtCategory::Thorn => &mut self.thorns,
        }
    }

    /// Locate an item by id across all three categories
    pub fn find_item(&self, item_id: &str) -> Option<(RbtCategory, &RbtItem)> {
        RbtCategory::ALL.into_iter().find_map(|category| {
            self.items(category)
                .iter()
                .find(|item| item.id == item_id)
                .map(|item| (category, item))
        })
    }

    pub fn find_item_mut(&mut self, item_id: &str) -> Option<&mut RbtItem> {
        let (category, _) = self.find_item(item_id)?;
        self.items_mut(category)
            .iter_mut()
            .find(|item| item.id == item_id)
    }

    pub fn is_child(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// Parameters for creating a retrospective
#[derive(Debug, Clone, Serialize)]
pub struct NewRetrospective {
    pub user_id: String,
    pub title: String,
    pub event_type: Option<String>,
    pub date: Option<NaiveDate>,
    pub attendees: Vec<String>,
    pub roses: Vec<RbtItem>,
    pub buds: Vec<RbtItem>,
    pub thorns: Vec<RbtItem>,
    pub parent_id: Option<String>,
    pub location: Location,
    pub place: Option<PlaceRef>,
    pub visibility: Visibility,
}

impl NewRetrospective {
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            event_type: None,
            date: None,
            attendees: Vec::new(),
            roses: Vec::new(),
            buds: Vec::new(),
            thorns: Vec::new(),
            parent_id: None,
            location: Location::default(),
            place: None,
            visibility: Visibility::default(),
        }
    }

    pub fn child_of(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn item(mut self, category: RbtCategory, text: impl Into<String>) -> Self {
        let item = RbtItem::new(text);
        match category {
            RbtCategory::Rose => self.roses.push(item),
            RbtCategory::Bud => self.buds.push(item),
            RbtCategory::Thorn => self.thorns.push(item),
        }
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        require_text("user_id", &self.user_id)
    }
}

/// Sparse edit of a retrospective's own fields
///
/// Item arrays and `parent_id` have dedicated service operations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrospectiveUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<Option<PlaceRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

impl RetrospectiveUpdate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        Ok(())
    }
}

/// Legacy projection: normalized entries as embedded item arrays
///
/// Each populated field of each entry becomes one item, in entry order.
/// Item ids are derived from the entry id so repeated projections agree.
pub fn project_entries_to_items(entries: &[RbtEntry]) -> [Vec<RbtItem>; 3] {
    let mut projected: [Vec<RbtItem>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for entry in entries {
        for (slot, category) in RbtCategory::ALL.into_iter().enumerate() {
            if let Some(text) = entry.text(category) {
                projected[slot].push(RbtItem {
                    id: format!("{}:{}", entry.id, category),
                    text: text.to_string(),
                    tags: Vec::new(),
                    comments: Vec::new(),
                    photos: Vec::new(),
                    place: None,
                });
            }
        }
    }
    projected
}

/// Deserialize a list, treating null or any non-array shape as empty and
/// skipping elements that do not fit
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(elements) => elements
            .into_iter()
            .filter_map(|element| serde_json::from_value(element).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_location<'de, D>(deserializer: D) -> Result<Location, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}
