//! Friendship Service - profiles, friend requests and user search
//!
//! A friendship row is directed: `user_id` sent the request, `friend_id`
//! answers it. Once accepted the direction no longer matters.

use crate::config::AppConfig;
use crate::db::{
    from_record, to_record, DataStore, Filter, Order, RemoteProcedure, Select, StoreError,
};
use crate::feedback::NoticeSink;
use crate::mentions::MentionComposer;
use crate::models::{
    require_text, ActivityKind, Friendship, FriendshipStatus, NewNotification, NotificationKind,
    Profile, UserSummary,
};
use crate::resource::Resource;
use crate::services::{ActivityService, NotificationService, ServiceError};
use serde_json::json;
use std::sync::Arc;

/// Default number of user search results
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

#[derive(Clone)]
pub struct FriendshipService {
    store: Arc<dyn DataStore>,
    notifications: NotificationService,
    activity: ActivityService,
}

impl FriendshipService {
    pub fn new(store: Arc<dyn DataStore>, notices: Arc<dyn NoticeSink>) -> Self {
        Self {
            notifications: NotificationService::new(Arc::clone(&store), notices),
            activity: ActivityService::new(Arc::clone(&store)),
            store,
        }
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, ServiceError> {
        let rows = self
            .store
            .select(
                Profile::TABLE,
                &Select::new().filter(Filter::eq("id", user_id)).limit(1),
            )
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(from_record(row)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace a profile
    pub async fn save_profile(&self, profile: &Profile) -> Result<Profile, ServiceError> {
        require_text("display_name", &profile.display_name)?;
        let record = to_record(profile)?;
        if self.get_profile(&profile.id).await?.is_some() {
            let rows = self
                .store
                .update(Profile::TABLE, &[Filter::eq("id", profile.id.as_str())], record)
                .await?;
            let row = rows
                .into_iter()
                .next()
                .ok_or_else(|| ServiceError::not_found("Profile", &profile.id))?;
            return Ok(from_record(row)?);
        }
        let row = self.store.insert(Profile::TABLE, record).await?;
        Ok(from_record(row)?)
    }

    async fn display_name(&self, user_id: &str) -> String {
        match self.get_profile(user_id).await {
            Ok(Some(profile)) => profile.display_name,
            Ok(None) => user_id.to_string(),
            Err(e) => {
                tracing::debug!("Profile lookup for {} failed: {}", user_id, e);
                user_id.to_string()
            }
        }
    }

    /// Search other users by display name
    ///
    /// Results never carry private profile fields.
    pub async fn search_users(
        &self,
        query: &str,
        exclude_user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UserSummary>, ServiceError> {
        let value = self
            .store
            .call(RemoteProcedure::SearchUsers {
                query: query.to_string(),
                exclude_user_id: exclude_user_id.map(str::to_string),
                limit,
            })
            .await?;
        Ok(serde_json::from_value(value).map_err(StoreError::from)?)
    }

    /// The friendship between two users, in either direction
    pub async fn between(&self, a: &str, b: &str) -> Result<Option<Friendship>, ServiceError> {
        for (from, to) in [(a, b), (b, a)] {
            let rows = self
                .store
                .select(
                    Friendship::TABLE,
                    &Select::new()
                        .filter(Filter::eq("user_id", from))
                        .filter(Filter::eq("friend_id", to))
                        .limit(1),
                )
                .await?;
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(from_record(row)?));
            }
        }
        Ok(None)
    }

    async fn require(&self, friendship_id: &str) -> Result<Friendship, ServiceError> {
        let rows = self
            .store
            .select(
                Friendship::TABLE,
                &Select::new().filter(Filter::eq("id", friendship_id)).limit(1),
            )
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(from_record(row)?),
            None => Err(ServiceError::not_found("Friendship", friendship_id)),
        }
    }

    /// Ask `to_user` to be friends
    ///
    /// A previously declined request is replaced; a pending or accepted
    /// friendship in either direction is a conflict.
    pub async fn send_request(
        &self,
        from_user: &str,
        to_user: &str,
    ) -> Result<Friendship, ServiceError> {
        if from_user == to_user {
            return Err(ServiceError::conflict("cannot send a friend request to yourself"));
        }
        if let Some(existing) = self.between(from_user, to_user).await? {
            if existing.status != FriendshipStatus::Declined {
                return Err(ServiceError::conflict(format!(
                    "friendship between {} and {} already exists",
                    from_user, to_user
                )));
            }
            self.store
                .delete(Friendship::TABLE, &[Filter::eq("id", existing.id.as_str())])
                .await?;
        }

        let row = to_record(&json!({
            "user_id": from_user,
            "friend_id": to_user,
            "status": FriendshipStatus::Pending,
        }))?;
        let row = self.store.insert(Friendship::TABLE, row).await?;
        let friendship: Friendship = from_record(row)?;

        let sender = self.display_name(from_user).await;
        self.notifications
            .send_quietly(
                &NewNotification::new(
                    to_user,
                    NotificationKind::FriendRequest,
                    "New friend request",
                    format!("{} wants to be friends", sender),
                )
                .actor(from_user),
            )
            .await;
        Ok(friendship)
    }

    /// Accept a pending request; only its recipient may do so
    pub async fn accept(&self, friendship_id: &str, user_id: &str) -> Result<Friendship, ServiceError> {
        let friendship = self.answer(friendship_id, user_id, FriendshipStatus::Accepted).await?;

        let name = self.display_name(user_id).await;
        self.notifications
            .send_quietly(
                &NewNotification::new(
                    friendship.user_id.as_str(),
                    NotificationKind::FriendAccepted,
                    "Friend request accepted",
                    format!("{} accepted your friend request", name),
                )
                .actor(user_id),
            )
            .await;
        self.activity
            .record_quietly(
                user_id,
                ActivityKind::FriendAdded,
                &friendship.user_id,
                &format!("{} added a friend", name),
            )
            .await;
        Ok(friendship)
    }

    pub async fn decline(&self, friendship_id: &str, user_id: &str) -> Result<Friendship, ServiceError> {
        self.answer(friendship_id, user_id, FriendshipStatus::Declined).await
    }

    async fn answer(
        &self,
        friendship_id: &str,
        user_id: &str,
        status: FriendshipStatus,
    ) -> Result<Friendship, ServiceError> {
        let friendship = self.require(friendship_id).await?;
        if friendship.friend_id != user_id {
            return Err(ServiceError::conflict(format!(
                "{} cannot answer a request addressed to {}",
                user_id, friendship.friend_id
            )));
        }
        if friendship.status != FriendshipStatus::Pending {
            return Err(ServiceError::conflict(format!(
                "friend request {} was already answered",
                friendship_id
            )));
        }

        let rows = self
            .store
            .update(
                Friendship::TABLE,
                &[Filter::eq("id", friendship_id)],
                to_record(&json!({ "status": status }))?,
            )
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("Friendship", friendship_id))?;
        Ok(from_record(row)?)
    }

    /// End a friendship or withdraw a request; either party may do so
    pub async fn remove(&self, friendship_id: &str, user_id: &str) -> Result<bool, ServiceError> {
        let friendship = match self.require(friendship_id).await {
            Ok(friendship) => friendship,
            Err(ServiceError::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        if !friendship.involves(user_id) {
            return Err(ServiceError::conflict(format!(
                "{} is not part of friendship {}",
                user_id, friendship_id
            )));
        }
        let removed = self
            .store
            .delete(Friendship::TABLE, &[Filter::eq("id", friendship_id)])
            .await?;
        Ok(removed > 0)
    }

    async fn friendships_with(
        &self,
        user_id: &str,
        status: FriendshipStatus,
    ) -> Result<Vec<Friendship>, ServiceError> {
        let mut friendships = Vec::new();
        for column in ["user_id", "friend_id"] {
            let rows = self
                .store
                .select(
                    Friendship::TABLE,
                    &Select::new()
                        .filter(Filter::eq(column, user_id))
                        .filter(Filter::eq("status", json!(status))),
                )
                .await?;
            for row in rows {
                friendships.push(from_record::<Friendship>(row)?);
            }
        }
        Ok(friendships)
    }

    /// Accepted friends, by display name
    ///
    /// This is the roster mention autocomplete and resolution work from.
    pub async fn friends_of(&self, user_id: &str) -> Result<Vec<UserSummary>, ServiceError> {
        let ids: Vec<String> = self
            .friendships_with(user_id, FriendshipStatus::Accepted)
            .await?
            .iter()
            .filter_map(|f| f.other_party(user_id))
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .store
            .select(
                Profile::TABLE,
                &Select::new()
                    .filter(Filter::one_of("id", ids))
                    .order_by(Order::asc("display_name")),
            )
            .await?;
        rows.into_iter()
            .map(|row| {
                from_record::<Profile>(row)
                    .map(UserSummary::from)
                    .map_err(ServiceError::from)
            })
            .collect()
    }

    /// Mention composer over the user's friends, capped at the configured
    /// number of suggestions
    pub async fn mention_composer(
        &self,
        user_id: &str,
        config: &AppConfig,
    ) -> Result<MentionComposer, ServiceError> {
        let roster = self.friends_of(user_id).await?;
        Ok(MentionComposer::new(roster, config.suggestion_limit))
    }

    /// Requests waiting for `user_id` to answer, newest first
    pub async fn pending_requests(&self, user_id: &str) -> Result<Vec<Friendship>, ServiceError> {
        let rows = self
            .store
            .select(
                Friendship::TABLE,
                &Select::new()
                    .filter(Filter::eq("friend_id", user_id))
                    .filter(Filter::eq("status", json!(FriendshipStatus::Pending)))
                    .order_by(Order::desc("created_at")),
            )
            .await?;
        rows.into_iter()
            .map(|row| from_record(row).map_err(ServiceError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::feedback::NoticeBoard;
    use crate::models::Notification;

    async fn service() -> (FriendshipService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = FriendshipService::new(store.clone(), Arc::new(NoticeBoard::default()));
        for (id, name) in [("ana", "Ana Lima"), ("ben", "Ben Stone"), ("cleo", "Cleo")] {
            service
                .save_profile(&Profile {
                    id: id.to_string(),
                    display_name: name.to_string(),
                    avatar_url: None,
                    email: Some(format!("{id}@example.com")),
                })
                .await
                .unwrap();
        }
        (service, store)
    }

    async fn notifications_for(store: &MemoryStore, user_id: &str) -> Vec<Notification> {
        store
            .select("notifications", &Select::new().filter(Filter::eq("user_id", user_id)))
            .await
            .unwrap()
            .into_iter()
            .map(|row| from_record(row).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_request_accept_flow() {
        let (service, store) = service().await;
        let request = service.send_request("ana", "ben").await.unwrap();
        assert_eq!(request.status, FriendshipStatus::Pending);

        let inbox = notifications_for(&store, "ben").await;
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::FriendRequest);
        assert_eq!(inbox[0].message, "Ana Lima wants to be friends");

        assert_eq!(service.pending_requests("ben").await.unwrap().len(), 1);

        // Only the recipient answers
        let err = service.accept(&request.id, "ana").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let accepted = service.accept(&request.id, "ben").await.unwrap();
        assert_eq!(accepted.status, FriendshipStatus::Accepted);
        assert!(service.pending_requests("ben").await.unwrap().is_empty());

        let friends: Vec<String> = service
            .friends_of("ana")
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.display_name)
            .collect();
        assert_eq!(friends, vec!["Ben Stone"]);
        assert_eq!(service.friends_of("ben").await.unwrap()[0].id, "ana");

        let ana_inbox = notifications_for(&store, "ana").await;
        assert_eq!(ana_inbox[0].kind, NotificationKind::FriendAccepted);
        assert_eq!(store.row_count("activities"), 1);
    }

    #[tokio::test]
    async fn test_mention_composer_uses_configured_limit() {
        let (service, _) = service().await;
        for friend in ["ben", "cleo"] {
            let request = service.send_request("ana", friend).await.unwrap();
            service.accept(&request.id, friend).await.unwrap();
        }
        let config = AppConfig::from_env(|var| match var {
            "RETROSPACE_DB_PATH" => Some("unused.db".to_string()),
            "RETROSPACE_SUGGESTION_LIMIT" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();

        let mut composer = service.mention_composer("ana", &config).await.unwrap();
        composer.update("with @e", "with @e".len());
        let names: Vec<&str> = composer
            .suggestions()
            .iter()
            .map(|person| person.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Ben Stone"]);
    }

    #[tokio::test]
    async fn test_duplicate_and_self_requests_conflict() {
        let (service, _) = service().await;
        service.send_request("ana", "ben").await.unwrap();

        let err = service.send_request("ben", "ana").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        let err = service.send_request("ana", "ana").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_declined_request_can_be_resent() {
        let (service, store) = service().await;
        let request = service.send_request("ana", "cleo").await.unwrap();
        service.decline(&request.id, "cleo").await.unwrap();

        let again = service.send_request("ana", "cleo").await.unwrap();
        assert_ne!(again.id, request.id);
        assert_eq!(store.row_count("friendships"), 1);
    }

    #[tokio::test]
    async fn test_remove_requires_party() {
        let (service, _) = service().await;
        let request = service.send_request("ana", "ben").await.unwrap();

        let err = service.remove(&request.id, "cleo").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert!(service.remove(&request.id, "ben").await.unwrap());
        assert!(!service.remove(&request.id, "ben").await.unwrap());
    }

    #[tokio::test]
    async fn test_search_hides_email() {
        let (service, _) = service().await;
        let results = service
            .search_users("an", Some("cleo"), DEFAULT_SEARCH_LIMIT)
            .await
            .unwrap();
        let names: Vec<&str> = results.iter().map(|u| u.display_name.as_str()).collect();
        assert_eq!(names, vec!["Ana Lima"]);

        let profile = service.get_profile("ana").await.unwrap().unwrap();
        assert_eq!(profile.email.as_deref(), Some("ana@example.com"));
    }

    #[tokio::test]
    async fn test_save_profile_replaces() {
        let (service, store) = service().await;
        let mut profile = service.get_profile("cleo").await.unwrap().unwrap();
        profile.display_name = "Cleo Park".to_string();
        service.save_profile(&profile).await.unwrap();

        assert_eq!(store.row_count("profiles"), 3);
        assert_eq!(
            service.get_profile("cleo").await.unwrap().unwrap().display_name,
            "Cleo Park"
        );
    }
}
