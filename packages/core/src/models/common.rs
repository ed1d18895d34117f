//! Shared model types: visibility, RBT categories, place references and
//! the validation error raised before anything reaches the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Validation errors for model input
///
/// These are caught client-side, before a request is issued.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Entry must contain at least one of rose, bud or thorn")]
    EmptyEntry,

    #[error("Metadata of type {metadata} does not match node type {node_type}")]
    MetadataMismatch { node_type: String, metadata: String },

    #[error("Invalid materialized path: {0}")]
    InvalidPath(String),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: String, end: String },
}

impl ValidationError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }
}

/// Reject blank (empty or whitespace-only) required text
pub fn require_text(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::missing_field(field));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Friends,
    Private,
}

/// Rose (positive), Bud (opportunity) or Thorn (challenge)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RbtCategory {
    Rose,
    Bud,
    Thorn,
}

impl RbtCategory {
    pub const ALL: [RbtCategory; 3] = [RbtCategory::Rose, RbtCategory::Bud, RbtCategory::Thorn];

    /// Column holding this category's items on a retrospective row
    pub fn column(self) -> &'static str {
        match self {
            RbtCategory::Rose => "roses",
            RbtCategory::Bud => "buds",
            RbtCategory::Thorn => "thorns",
        }
    }
}

impl fmt::Display for RbtCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RbtCategory::Rose => "rose",
            RbtCategory::Bud => "bud",
            RbtCategory::Thorn => "thorn",
        };
        f.write_str(label)
    }
}

/// Place lookup fields stored alongside retrospectives and items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlaceRef {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub types: Vec<String>,
}
