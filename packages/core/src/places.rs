//! Places lookup boundary
//!
//! Place search is served by a third-party provider behind a server-side
//! proxy that holds the API key. The crate only defines the boundary and
//! the conversion into the [`PlaceRef`] stored on retrospectives, items and
//! trip-planner items.

use crate::models::PlaceRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlacesError {
    #[error("Places lookup unavailable: {0}")]
    Unavailable(String),

    #[error("Places lookup rejected the request: {0}")]
    Rejected(String),
}

/// Bias results toward a point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationBias {
    pub lat: f64,
    pub lng: f64,
    /// Metres
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub lat: f64,
    pub lng: f64,
}

/// One provider search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceResult {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub rating_count: Option<u32>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub photo_refs: Vec<String>,
}

impl From<PlaceResult> for PlaceRef {
    fn from(result: PlaceResult) -> Self {
        PlaceRef {
            place_id: result.place_id,
            name: result.name,
            address: result.address,
            lat: result.geometry.map(|g| g.lat),
            lng: result.geometry.map(|g| g.lng),
            rating: result.rating,
            types: result.types,
        }
    }
}

#[async_trait]
pub trait PlacesLookup: Send + Sync {
    async fn search_places(
        &self,
        query: &str,
        bias: Option<LocationBias>,
    ) -> Result<Vec<PlaceResult>, PlacesError>;
}
