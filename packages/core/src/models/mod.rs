//! Data Models
//!
//! Canonical value types for every table. Rows are converted with
//! `db::from_record` / `db::to_record` at the store boundary and nowhere
//! else.
//!
//! - [`RetroNode`] / [`RbtEntry`] - the hierarchical node model and its
//!   normalized Rose/Bud/Thorn entries
//! - [`Retrospective`] - the flat model with embedded item arrays
//! - Social graph, shared collections, notifications and activities

mod collections;
mod common;
mod node;
mod notification;
mod rbt_entry;
mod retrospective;
mod social;

pub use collections::{
    Catalogue, CatalogueItem, CatalogueMember, MemberRole, MemberStatus, NewCatalogue,
    NewCatalogueItem, NewTripPlanner, NewTripPlannerItem, TripPlanner, TripPlannerItem,
    TripPlannerMember,
};
pub use common::{require_text, PlaceRef, RbtCategory, ValidationError, Visibility};
pub use node::{
    child_path, path_segments, root_path, CategoryMetadata, CityMetadata, EventMetadata, NewNode,
    NodeMetadata, NodeType, NodeUpdate, NotebookMetadata, RetroNode, TripMetadata, VenueMetadata,
};
pub use notification::{Activity, ActivityKind, NewNotification, Notification, NotificationKind};
pub use rbt_entry::{RbtEntry, RbtFields};
pub use retrospective::{
    project_entries_to_items, ItemComment, Location, NewRetrospective, RbtItem, Retrospective,
    RetrospectiveUpdate,
};
pub use social::{Friendship, FriendshipStatus, Profile, UserSummary};
