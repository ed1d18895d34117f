//! Node Data Structures
//!
//! Hierarchical retrospective containers (`retro_nodes` table).
//!
//! # Architecture
//!
//! - **Closed type set**: `NodeType` is a tag, not an inheritance hierarchy
//! - **Typed metadata**: `NodeMetadata` is a tagged union with one schema per
//!   node type; a mismatch is a validation error, never opaque JSON
//! - **Materialized path**: `/`-delimited ancestor ids ending with the node's
//!   own id, so subtree reads are a prefix match
//! - **Derived children**: persisted rows carry no children; see
//!   [`NodeTree`](crate::tree::NodeTree) for the in-memory view
//!
//! # Examples
//!
//! ```rust
//! use retrospace_core::models::{NewNode, NodeType};
//!
//! let trip = NewNode::new("user-1", NodeType::Trip, "Portugal 2025");
//! assert!(trip.validate().is_ok());
//! ```

use crate::db::timestamp;
use crate::models::{require_text, PlaceRef, ValidationError, Visibility};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Trip,
    Category,
    City,
    Venue,
    Event,
    Notebook,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeType::Trip => "trip",
            NodeType::Category => "category",
            NodeType::City => "city",
            NodeType::Venue => "venue",
            NodeType::Event => "event",
            NodeType::Notebook => "notebook",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TripMetadata {
    pub destination: Option<String>,
    pub companions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CategoryMetadata {
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CityMetadata {
    pub country: Option<String>,
    pub region: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VenueMetadata {
    pub address: Option<String>,
    pub place: Option<PlaceRef>,
    pub rating: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EventMetadata {
    pub starts_at: Option<String>,
    pub attendees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotebookMetadata {
    pub pinned: bool,
}

/// Type-specific extension fields, tagged by node type
///
/// Stored as `{"type": "venue", "address": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeMetadata {
    Trip(TripMetadata),
    Category(CategoryMetadata),
    City(CityMetadata),
    Venue(VenueMetadata),
    Event(EventMetadata),
    Notebook(NotebookMetadata),
}

impl NodeMetadata {
    /// Empty metadata of the right shape for `node_type`
    pub fn empty_for(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Trip => NodeMetadata::Trip(TripMetadata::default()),
            NodeType::Category => NodeMetadata::Category(CategoryMetadata::default()),
            NodeType::City => NodeMetadata::City(CityMetadata::default()),
            NodeType::Venue => NodeMetadata::Venue(VenueMetadata::default()),
            NodeType::Event => NodeMetadata::Event(EventMetadata::default()),
            NodeType::Notebook => NodeMetadata::Notebook(NotebookMetadata::default()),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeMetadata::Trip(_) => NodeType::Trip,
            NodeMetadata::Category(_) => NodeType::Category,
            NodeMetadata::City(_) => NodeType::City,
            NodeMetadata::Venue(_) => NodeType::Venue,
            NodeMetadata::Event(_) => NodeType::Event,
            NodeMetadata::Notebook(_) => NodeType::Notebook,
        }
    }

    /// Ensure this metadata belongs to a node of `node_type`
    pub fn check_type(&self, node_type: NodeType) -> Result<(), ValidationError> {
        if self.node_type() != node_type {
            return Err(ValidationError::MetadataMismatch {
                node_type: node_type.to_string(),
                metadata: self.node_type().to_string(),
            });
        }
        Ok(())
    }
}

/// A persisted node row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetroNode {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub node_type: NodeType,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub metadata: NodeMetadata,
    #[serde(default)]
    pub order_index: i64,
    pub path: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RetroNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Path a direct child with `child_id` must carry
    pub fn child_path(&self, child_id: &str) -> String {
        child_path(&self.path, child_id)
    }

    /// Number of ancestors implied by the path (roots are depth 0)
    pub fn depth(&self) -> usize {
        path_segments(&self.path).len().saturating_sub(1)
    }

    /// Check the path invariant against the parent row (or root shape)
    pub fn check_path(&self, parent: Option<&RetroNode>) -> Result<(), ValidationError> {
        let expected = match parent {
            Some(parent) => parent.child_path(&self.id),
            None => root_path(&self.id),
        };
        if self.path != expected {
            return Err(ValidationError::InvalidPath(format!(
                "{} (expected {})",
                self.path, expected
            )));
        }
        Ok(())
    }
}

/// Materialized path of a root node
pub fn root_path(id: &str) -> String {
    format!("/{}", id)
}

/// Materialized path of a child under `parent_path`
pub fn child_path(parent_path: &str, child_id: &str) -> String {
    format!("{}/{}", parent_path.trim_end_matches('/'), child_id)
}

/// Ancestor chain encoded in a path, root first, ending with the node itself
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Parameters for creating a node
///
/// `id`, `path` and `order_index` are assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub owner_id: String,
    pub parent_id: Option<String>,
    pub node_type: NodeType,
    pub title: String,
    pub subtitle: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub metadata: Option<NodeMetadata>,
    pub visibility: Visibility,
}

impl NewNode {
    pub fn new(owner_id: impl Into<String>, node_type: NodeType, title: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            parent_id: None,
            node_type,
            title: title.into(),
            subtitle: None,
            start_date: None,
            end_date: None,
            metadata: None,
            visibility: Visibility::default(),
        }
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: NodeMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_dates(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        require_text("owner_id", &self.owner_id)?;
        check_date_range(self.start_date, self.end_date)?;
        if let Some(metadata) = &self.metadata {
            metadata.check_type(self.node_type)?;
        }
        Ok(())
    }
}

/// Sparse edit of a node's user-editable fields
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NodeMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

impl NodeUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.subtitle.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.metadata.is_none()
            && self.visibility.is_none()
    }

    /// Validate the edit against the node it applies to
    pub fn validate_for(&self, node: &RetroNode) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        if let Some(metadata) = &self.metadata {
            metadata.check_type(node.node_type)?;
        }
        let start = self.start_date.unwrap_or(node.start_date);
        let end = self.end_date.unwrap_or(node.end_date);
        check_date_range(start, end)
    }
}

fn check_date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(ValidationError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
    }
    Ok(())
}
