//! Notifications and the activity feed

use crate::db::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Tagged,
    FriendRequest,
    FriendAccepted,
    CatalogueInvite,
    TripPlannerInvite,
    Comment,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NotificationKind::Tagged => "tagged",
            NotificationKind::FriendRequest => "friend_request",
            NotificationKind::FriendAccepted => "friend_accepted",
            NotificationKind::CatalogueInvite => "catalogue_invite",
            NotificationKind::TripPlannerInvite => "trip_planner_invite",
            NotificationKind::Comment => "comment",
        };
        f.write_str(label)
    }
}

/// A notification addressed to `user_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub retro_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a notification; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNotification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub retro_id: Option<String>,
    pub item_id: Option<String>,
    pub actor_id: Option<String>,
    pub is_read: bool,
}

impl NewNotification {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            retro_id: None,
            item_id: None,
            actor_id: None,
            is_read: false,
        }
    }

    pub fn retro(mut self, retro_id: impl Into<String>) -> Self {
        self.retro_id = Some(retro_id.into());
        self
    }

    pub fn item(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    RetroCreated,
    RetroShared,
    CommentAdded,
    CatalogueItemSaved,
    FriendAdded,
}

/// One entry in a user's activity feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub user_id: String,
    pub kind: ActivityKind,
    pub target_id: String,
    pub summary: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&NotificationKind::TripPlannerInvite).unwrap(),
            "\"trip_planner_invite\""
        );
        assert_eq!(NotificationKind::Tagged.to_string(), "tagged");
        assert_eq!(
            serde_json::to_string(&ActivityKind::CatalogueItemSaved).unwrap(),
            "\"catalogue_item_saved\""
        );
    }
}
