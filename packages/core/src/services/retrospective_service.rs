//! Retrospective Service
//!
//! CRUD for the flat `retrospectives` model plus the edits of its embedded
//! Rose/Bud/Thorn arrays. Array edits read the row, change the array and
//! write the whole column back: concurrent edits of the same category are
//! last-write-wins.

use crate::aggregation::AggregatedRetro;
use crate::db::{from_record, to_record, DataStore, Filter, Order, Record, Select, StoreError};
use crate::feedback::NoticeSink;
use crate::mentions::{MentionNotifier, TagContext};
use crate::models::{
    require_text, ActivityKind, ItemComment, NewRetrospective, Notification, RbtCategory, RbtItem,
    Retrospective, RetrospectiveUpdate, UserSummary,
};
use crate::resource::{Resource, ResourceCollection, Scope};
use crate::services::{ActivityService, ServiceError};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct RetrospectiveService {
    store: Arc<dyn DataStore>,
    notices: Arc<dyn NoticeSink>,
    activity: ActivityService,
}

impl RetrospectiveService {
    pub fn new(store: Arc<dyn DataStore>, notices: Arc<dyn NoticeSink>) -> Self {
        let activity = ActivityService::new(Arc::clone(&store));
        Self {
            store,
            notices,
            activity,
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Retrospective>, ServiceError> {
        let rows = self
            .store
            .select(
                Retrospective::TABLE,
                &Select::new().filter(Filter::eq("id", id)).limit(1),
            )
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(from_record(row)?)),
            None => Ok(None),
        }
    }

    async fn require(&self, id: &str) -> Result<Retrospective, ServiceError> {
        self.get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Retrospective", id))
    }

    /// Parent must exist and must not itself be a child
    async fn check_parent(&self, parent_id: &str) -> Result<(), ServiceError> {
        let parent = self
            .get(parent_id)
            .await?
            .ok_or_else(|| ServiceError::invalid_parent("Retrospective", parent_id))?;
        if parent.is_child() {
            return Err(ServiceError::nesting_too_deep(parent_id));
        }
        Ok(())
    }

    pub async fn create(&self, params: NewRetrospective) -> Result<Retrospective, ServiceError> {
        params.validate()?;
        if let Some(parent_id) = &params.parent_id {
            self.check_parent(parent_id).await?;
        }

        let row = self
            .store
            .insert(Retrospective::TABLE, to_record(&params)?)
            .await?;
        let retro: Retrospective = from_record(row)?;

        self.activity
            .record_quietly(&retro.user_id, ActivityKind::RetroCreated, &retro.id, &retro.title)
            .await;
        tracing::debug!("Created retrospective {} ({})", retro.id, retro.title);
        Ok(retro)
    }

    /// A user's retrospectives, newest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Retrospective>, ServiceError> {
        self.select(
            Select::new()
                .filter(Filter::eq("user_id", user_id))
                .order_by(Order::desc("created_at")),
        )
        .await
    }

    /// Children of a retrospective, oldest first
    pub async fn children_of(&self, parent_id: &str) -> Result<Vec<Retrospective>, ServiceError> {
        self.select(
            Select::new()
                .filter(Filter::eq("parent_id", parent_id))
                .order_by(Order::asc("created_at")),
        )
        .await
    }

    async fn select(&self, query: Select) -> Result<Vec<Retrospective>, ServiceError> {
        let rows = self.store.select(Retrospective::TABLE, &query).await?;
        rows.into_iter()
            .map(|row| from_record(row).map_err(ServiceError::from))
            .collect()
    }

    pub async fn update(
        &self,
        id: &str,
        update: RetrospectiveUpdate,
    ) -> Result<Retrospective, ServiceError> {
        update.validate()?;
        self.write(id, to_record(&update)?).await
    }

    /// Move a retrospective under another one, or detach it with `None`
    pub async fn set_parent(
        &self,
        id: &str,
        parent_id: Option<&str>,
    ) -> Result<Retrospective, ServiceError> {
        if let Some(parent_id) = parent_id {
            if parent_id == id {
                return Err(ServiceError::invalid_parent("Retrospective", parent_id));
            }
            self.check_parent(parent_id).await?;
            if !self.children_of(id).await?.is_empty() {
                return Err(ServiceError::nesting_too_deep(id));
            }
        }
        self.write(id, to_record(&json!({ "parent_id": parent_id }))?)
            .await
    }

    /// Delete a retrospective; its children are detached, not deleted
    pub async fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        let detached = self
            .store
            .update(
                Retrospective::TABLE,
                &[Filter::eq("parent_id", id)],
                to_record(&json!({ "parent_id": null }))?,
            )
            .await?;
        if !detached.is_empty() {
            tracing::debug!("Detached {} children of {}", detached.len(), id);
        }
        let removed = self
            .store
            .delete(Retrospective::TABLE, &[Filter::eq("id", id)])
            .await?;
        Ok(removed > 0)
    }

    async fn write(&self, id: &str, patch: Record) -> Result<Retrospective, ServiceError> {
        if patch.is_empty() {
            return self.require(id).await;
        }
        let rows = self
            .store
            .update(Retrospective::TABLE, &[Filter::eq("id", id)], patch)
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("Retrospective", id))?;
        Ok(from_record(row)?)
    }

    /// Write one category's array back
    async fn write_items(
        &self,
        retro: &Retrospective,
        category: RbtCategory,
    ) -> Result<Retrospective, ServiceError> {
        let items = serde_json::to_value(retro.items(category)).map_err(StoreError::from)?;
        let mut patch = Record::new();
        patch.insert(category.column().to_string(), items);
        self.write(&retro.id, patch).await
    }

    fn locate(retro: &Retrospective, item_id: &str) -> Result<RbtCategory, ServiceError> {
        retro
            .find_item(item_id)
            .map(|(category, _)| category)
            .ok_or_else(|| ServiceError::not_found("Item", item_id))
    }

    pub async fn add_item(
        &self,
        retro_id: &str,
        category: RbtCategory,
        text: &str,
    ) -> Result<RbtItem, ServiceError> {
        require_text("text", text)?;
        let mut retro = self.require(retro_id).await?;
        let item = RbtItem::new(text.trim());
        retro.items_mut(category).push(item.clone());
        self.write_items(&retro, category).await?;
        Ok(item)
    }

    pub async fn edit_item(
        &self,
        retro_id: &str,
        item_id: &str,
        text: &str,
    ) -> Result<RbtItem, ServiceError> {
        require_text("text", text)?;
        let mut retro = self.require(retro_id).await?;
        let category = Self::locate(&retro, item_id)?;
        let edited = {
            let item = retro
                .find_item_mut(item_id)
                .ok_or_else(|| ServiceError::not_found("Item", item_id))?;
            item.text = text.trim().to_string();
            item.clone()
        };
        self.write_items(&retro, category).await?;
        Ok(edited)
    }

    pub async fn remove_item(&self, retro_id: &str, item_id: &str) -> Result<bool, ServiceError> {
        let mut retro = self.require(retro_id).await?;
        let Ok(category) = Self::locate(&retro, item_id) else {
            return Ok(false);
        };
        retro.items_mut(category).retain(|item| item.id != item_id);
        self.write_items(&retro, category).await?;
        Ok(true)
    }

    pub async fn add_comment(
        &self,
        retro_id: &str,
        item_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<ItemComment, ServiceError> {
        require_text("text", text)?;
        let mut retro = self.require(retro_id).await?;
        let category = Self::locate(&retro, item_id)?;
        let comment = ItemComment {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            text: text.trim().to_string(),
            created_at: Utc::now(),
        };
        if let Some(item) = retro.find_item_mut(item_id) {
            item.comments.push(comment.clone());
        }
        self.write_items(&retro, category).await?;

        self.activity
            .record_quietly(user_id, ActivityKind::CommentAdded, retro_id, &comment.text)
            .await;
        Ok(comment)
    }

    /// Attach a photo URL to an item
    pub async fn add_photo(
        &self,
        retro_id: &str,
        item_id: &str,
        url: &str,
    ) -> Result<RbtItem, ServiceError> {
        require_text("url", url)?;
        let mut retro = self.require(retro_id).await?;
        let category = Self::locate(&retro, item_id)?;
        let updated = {
            let item = retro
                .find_item_mut(item_id)
                .ok_or_else(|| ServiceError::not_found("Item", item_id))?;
            item.photos.push(url.to_string());
            item.clone()
        };
        self.write_items(&retro, category).await?;
        Ok(updated)
    }

    /// Notify people mentioned in an item's text
    ///
    /// Delivery failures surface as notices, never as errors.
    pub async fn tag_mentions(
        &self,
        retro: &Retrospective,
        item_id: &str,
        actor: &UserSummary,
        roster: &[UserSummary],
    ) -> Vec<Notification> {
        let Some((_, item)) = retro.find_item(item_id) else {
            tracing::debug!("Item {} not on retro {}, nothing to tag", item_id, retro.id);
            return Vec::new();
        };
        self.notify_tagged(retro, item, &item.text, actor, roster)
            .await
    }

    /// Notify people mentioned in a stored comment
    ///
    /// The retrospective is read back so a comment just returned by
    /// `add_comment` is found.
    pub async fn tag_comment_mentions(
        &self,
        retro_id: &str,
        item_id: &str,
        comment_id: &str,
        actor: &UserSummary,
        roster: &[UserSummary],
    ) -> Result<Vec<Notification>, ServiceError> {
        let retro = self.require(retro_id).await?;
        let (_, item) = retro
            .find_item(item_id)
            .ok_or_else(|| ServiceError::not_found("Item", item_id))?;
        let comment = item
            .comments
            .iter()
            .find(|comment| comment.id == comment_id)
            .ok_or_else(|| ServiceError::not_found("Comment", comment_id))?;
        Ok(self
            .notify_tagged(&retro, item, &comment.text, actor, roster)
            .await)
    }

    async fn notify_tagged(
        &self,
        retro: &Retrospective,
        item: &RbtItem,
        text: &str,
        actor: &UserSummary,
        roster: &[UserSummary],
    ) -> Vec<Notification> {
        let context = TagContext {
            actor_id: actor.id.clone(),
            actor_name: actor.display_name.clone(),
            retro_id: retro.id.clone(),
            retro_title: retro.title.clone(),
            item_id: Some(item.id.clone()),
        };
        MentionNotifier::new(Arc::clone(&self.store), Arc::clone(&self.notices))
            .notify_tagged(text, roster, &context)
            .await
    }

    /// Parent plus its children, ready for the aggregated display
    pub async fn load_aggregated(&self, parent_id: &str) -> Result<AggregatedRetro, ServiceError> {
        let parent = self.require(parent_id).await?;
        let children = self.children_of(parent_id).await?;
        Ok(AggregatedRetro::new(Some(parent), children))
    }

    /// Live list of a user's top-level retrospectives
    pub fn collection_for_user(&self, user_id: &str) -> ResourceCollection<Retrospective> {
        ResourceCollection::new(
            Arc::clone(&self.store),
            Arc::clone(&self.notices),
            Scope::eq("user_id", user_id).and(Filter::is_null("parent_id")),
        )
    }

    /// Live list of a retrospective's children
    pub fn children_collection(&self, parent_id: &str) -> ResourceCollection<Retrospective> {
        ResourceCollection::new(
            Arc::clone(&self.store),
            Arc::clone(&self.notices),
            Scope::eq("parent_id", parent_id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::feedback::NoticeBoard;
    use crate::models::NotificationKind;

    fn service() -> (RetrospectiveService, Arc<MemoryStore>, Arc<NoticeBoard>) {
        let store = Arc::new(MemoryStore::new());
        let board = Arc::new(NoticeBoard::default());
        (
            RetrospectiveService::new(store.clone(), board.clone()),
            store,
            board,
        )
    }

    fn person(id: &str, name: &str) -> UserSummary {
        UserSummary {
            id: id.to_string(),
            display_name: name.to_string(),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_records_activity() {
        let (service, store, _) = service();
        let retro = service
            .create(NewRetrospective::new("ana", "Porto weekend").item(RbtCategory::Rose, "food"))
            .await
            .unwrap();

        assert_eq!(retro.roses.len(), 1);
        assert_eq!(store.row_count("activities"), 1);
        assert_eq!(service.get(&retro.id).await.unwrap(), Some(retro));
    }

    #[tokio::test]
    async fn test_blank_title_rejected() {
        let (service, store, _) = service();
        let err = service
            .create(NewRetrospective::new("ana", "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(store.row_count("retrospectives"), 0);
    }

    #[tokio::test]
    async fn test_single_level_nesting() {
        let (service, _, _) = service();
        let trip = service.create(NewRetrospective::new("ana", "Trip")).await.unwrap();
        let day = service
            .create(NewRetrospective::new("ana", "Day 1").child_of(&trip.id))
            .await
            .unwrap();

        let err = service
            .create(NewRetrospective::new("ana", "Lunch").child_of(&day.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NestingTooDeep { .. }));

        let err = service
            .create(NewRetrospective::new("ana", "Orphan").child_of("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParent { .. }));

        // A retrospective with children cannot become a child itself
        let other = service.create(NewRetrospective::new("ana", "Other")).await.unwrap();
        let err = service.set_parent(&trip.id, Some(&other.id)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NestingTooDeep { .. }));
    }

    #[tokio::test]
    async fn test_delete_detaches_children() {
        let (service, _, _) = service();
        let trip = service.create(NewRetrospective::new("ana", "Trip")).await.unwrap();
        let day = service
            .create(NewRetrospective::new("ana", "Day 1").child_of(&trip.id))
            .await
            .unwrap();

        assert!(service.delete(&trip.id).await.unwrap());
        let day = service.get(&day.id).await.unwrap().unwrap();
        assert!(day.parent_id.is_none());
        assert!(!service.delete(&trip.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_item_edits() {
        let (service, _, _) = service();
        let retro = service.create(NewRetrospective::new("ana", "Gig")).await.unwrap();

        let item = service
            .add_item(&retro.id, RbtCategory::Thorn, " queues ")
            .await
            .unwrap();
        assert_eq!(item.text, "queues");

        service.edit_item(&retro.id, &item.id, "long queues").await.unwrap();
        service
            .add_comment(&retro.id, &item.id, "ben", "so long")
            .await
            .unwrap();
        service
            .add_photo(&retro.id, &item.id, "https://img/queue.jpg")
            .await
            .unwrap();

        let stored = service.get(&retro.id).await.unwrap().unwrap();
        let (category, stored_item) = stored.find_item(&item.id).unwrap();
        assert_eq!(category, RbtCategory::Thorn);
        assert_eq!(stored_item.text, "long queues");
        assert_eq!(stored_item.comments[0].text, "so long");
        assert_eq!(stored_item.photos, vec!["https://img/queue.jpg"]);

        assert!(service.remove_item(&retro.id, &item.id).await.unwrap());
        assert!(!service.remove_item(&retro.id, &item.id).await.unwrap());
        assert!(service.get(&retro.id).await.unwrap().unwrap().thorns.is_empty());

        let err = service.edit_item(&retro.id, "ghost", "x").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_fields() {
        let (service, _, _) = service();
        let retro = service.create(NewRetrospective::new("ana", "Draft")).await.unwrap();
        let updated = service
            .update(
                &retro.id,
                RetrospectiveUpdate {
                    title: Some("Lisbon".to_string()),
                    attendees: Some(vec!["ben".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Lisbon");
        assert_eq!(updated.attendees, vec!["ben"]);

        let unchanged = service
            .update(&retro.id, RetrospectiveUpdate::default())
            .await
            .unwrap();
        assert_eq!(unchanged.title, "Lisbon");

        let err = service
            .update(
                "missing",
                RetrospectiveUpdate {
                    title: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_aggregated() {
        let (service, _, _) = service();
        let trip = service
            .create(NewRetrospective::new("ana", "Trip").item(RbtCategory::Rose, "sun"))
            .await
            .unwrap();
        service
            .create(
                NewRetrospective::new("ana", "Day 1")
                    .child_of(&trip.id)
                    .item(RbtCategory::Rose, "beach"),
            )
            .await
            .unwrap();

        let mut aggregated = service.load_aggregated(&trip.id).await.unwrap();
        let roses: Vec<&str> = aggregated
            .view()
            .roses
            .iter()
            .map(|a| a.item.text.as_str())
            .collect();
        assert_eq!(roses, vec!["sun", "beach"]);
        assert!(aggregated.view().roses[1].source.is_child_item);

        aggregated.toggle_children();
        assert_eq!(aggregated.view().roses.len(), 1);
    }

    #[tokio::test]
    async fn test_tag_mentions_skips_actor() {
        let (service, store, _) = service();
        let retro = service
            .create(
                NewRetrospective::new("ana", "Dinner")
                    .item(RbtCategory::Rose, "cooking with @Ben Stone and @Ana"),
            )
            .await
            .unwrap();
        let roster = vec![person("ana", "Ana"), person("ben", "Ben Stone")];

        let sent = service
            .tag_mentions(&retro, &retro.roses[0].id, &roster[0], &roster)
            .await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, "ben");
        assert_eq!(sent[0].kind, NotificationKind::Tagged);
        assert_eq!(sent[0].item_id.as_deref(), Some(retro.roses[0].id.as_str()));
        assert_eq!(store.row_count("notifications"), 1);
    }

    #[tokio::test]
    async fn test_comment_mentions_are_tagged() {
        let (service, store, _) = service();
        let retro = service
            .create(NewRetrospective::new("ana", "Dinner").item(RbtCategory::Bud, "try the tasca"))
            .await
            .unwrap();
        let item_id = retro.buds[0].id.clone();
        let roster = vec![
            person("ana", "Ana"),
            person("ben", "Ben Stone"),
            person("cleo", "Cleo"),
        ];

        let comment = service
            .add_comment(&retro.id, &item_id, "ana", "next time with @Cleo")
            .await
            .unwrap();
        // Item text has no mentions
        let stored = service.get(&retro.id).await.unwrap().unwrap();
        assert!(service
            .tag_mentions(&stored, &item_id, &roster[0], &roster)
            .await
            .is_empty());

        let sent = service
            .tag_comment_mentions(&retro.id, &item_id, &comment.id, &roster[0], &roster)
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, "cleo");
        assert_eq!(sent[0].item_id.as_deref(), Some(item_id.as_str()));
        assert_eq!(store.row_count("notifications"), 1);

        let missing = service
            .tag_comment_mentions(&retro.id, &item_id, "no-such-comment", &roster[0], &roster)
            .await;
        assert!(matches!(missing, Err(ServiceError::NotFound { .. })));
    }
}
