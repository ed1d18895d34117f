//! Service Layer Error Types
//!
//! Errors for business operations on top of the store. Store failures and
//! validation failures convert in with `?`; the rest describe rule
//! violations detected by the services themselves.

use crate::db::StoreError;
use crate::models::ValidationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Backing store failed (connectivity, authorization, serialization)
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    /// Input rejected before reaching the store
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// An operation addressed a row that does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Parent reference does not resolve
    #[error("Invalid parent {entity}: {parent_id}")]
    InvalidParent { entity: String, parent_id: String },

    /// Retrospectives nest exactly one level deep
    #[error("Retrospective {parent_id} is itself a child and cannot have children")]
    NestingTooDeep { parent_id: String },

    /// The operation conflicts with existing state
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl ServiceError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn invalid_parent(entity: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self::InvalidParent {
            entity: entity.into(),
            parent_id: parent_id.into(),
        }
    }

    pub fn nesting_too_deep(parent_id: impl Into<String>) -> Self {
        Self::NestingTooDeep {
            parent_id: parent_id.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Short message suitable for a transient notice
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Store(StoreError::Unauthorized { .. }) => {
                "You don't have permission to do that".to_string()
            }
            ServiceError::Store(_) => "Something went wrong. Please try again".to_string(),
            other => other.to_string(),
        }
    }
}
