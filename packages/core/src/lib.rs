//! Retrospace Core
//!
//! Data management and domain logic for Retrospace, a social app for
//! recording Rose/Bud/Thorn retrospectives of trips and events and sharing
//! them with friends.
//!
//! # Architecture
//!
//! - **One store trait**: every table goes through [`db::DataStore`]
//!   (`MemoryStore` in-process, `LibsqlStore` on disk) with JSON rows
//! - **Canonical models**: rows become typed values at the store boundary
//! - **Pure cores**: tree assembly, aggregation and mention parsing are
//!   plain functions over model values
//! - **Live collections**: [`resource::ResourceCollection`] keeps a scoped
//!   list in sync with the store's change feed
//!
//! # Modules
//!
//! - [`db`] - store trait, query model, change feed, memory and libsql stores
//! - [`models`] - nodes, entries, retrospectives, social and shared entities
//! - [`tree`] - flat node list to forest
//! - [`aggregation`] - parent/child retrospective view with provenance
//! - [`mentions`] - `@name` grammar, composer, resolution and notification
//! - [`resource`] - generic remote resource collections
//! - [`services`] - domain services
//! - [`feedback`] - transient user notices
//! - [`config`] - environment configuration and tracing setup
//! - [`places`] - place search collaborator

pub mod aggregation;
pub mod config;
pub mod db;
pub mod feedback;
pub mod mentions;
pub mod models;
pub mod places;
pub mod resource;
pub mod services;
pub mod tree;

// Re-export commonly used types
pub use aggregation::{aggregate, AggregatedItem, AggregatedRetro, AggregatedView, ItemSource};
pub use config::AppConfig;
pub use feedback::{Notice, NoticeBoard, NoticeLevel, NoticeSink};
pub use models::*;
pub use resource::{Resource, ResourceCollection, Scope};
pub use services::*;
pub use tree::{assemble_forest, NodeTree};
