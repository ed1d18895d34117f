//! Business Services
//!
//! Domain operations on top of a [`DataStore`](crate::db::DataStore):
//!
//! - `NodeService` - hierarchical nodes, subtree fetch/delete and
//!   versioned Rose/Bud/Thorn entries
//! - `RetrospectiveService` - flat retrospectives, embedded item edits,
//!   single-level nesting and the aggregated parent/child view
//! - `FriendshipService` - profiles, friend requests and user search
//! - `CatalogueService` / `TripPlannerService` - shared collections joined
//!   by invite code
//! - `NotificationService` / `ActivityService` - the side channels the
//!   other services write to
//!
//! Services validate input before touching the store, return
//! [`ServiceError`] for anything the caller must handle, and treat
//! notifications and activity records as fire-and-forget.

pub mod activity_service;
pub mod catalogue_service;
pub mod error;
pub mod friendship_service;
mod membership;
pub mod node_service;
pub mod notification_service;
pub mod retrospective_service;
pub mod trip_planner_service;

pub use activity_service::ActivityService;
pub use catalogue_service::CatalogueService;
pub use error::ServiceError;
pub use friendship_service::{FriendshipService, DEFAULT_SEARCH_LIMIT};
pub use membership::Membership;
pub use node_service::NodeService;
pub use notification_service::NotificationService;
pub use retrospective_service::RetrospectiveService;
pub use trip_planner_service::TripPlannerService;
