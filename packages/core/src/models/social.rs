//! Profiles and the friendship graph

use crate::db::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's public profile (`profiles` table)
///
/// `email` is stored but never returned from user search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Privacy-filtered search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl From<Profile> for UserSummary {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id,
            display_name: profile.display_name,
            avatar_url: profile.avatar_url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Declined,
}

/// A directed friendship row: `user_id` asked `friend_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friendship {
    pub id: String,
    pub user_id: String,
    pub friend_id: String,
    pub status: FriendshipStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Friendship {
    pub fn involves(&self, user_id: &str) -> bool {
        self.user_id == user_id || self.friend_id == user_id
    }

    /// The other party, seen from `user_id`
    pub fn other_party(&self, user_id: &str) -> Option<&str> {
        if self.user_id == user_id {
            Some(&self.friend_id)
        } else if self.friend_id == user_id {
            Some(&self.user_id)
        } else {
            None
        }
    }
}
