//! Notifications addressed to a user

use crate::db::{from_record, to_record, DataStore, Filter, Order, Select};
use crate::feedback::{Notice, NoticeSink};
use crate::mentions::MentionNotifier;
use crate::models::{NewNotification, Notification};
use crate::resource::{Resource, ResourceCollection, Scope};
use crate::services::ServiceError;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn DataStore>,
    notices: Arc<dyn NoticeSink>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn DataStore>, notices: Arc<dyn NoticeSink>) -> Self {
        Self { store, notices }
    }

    pub async fn send(&self, notification: &NewNotification) -> Result<Notification, ServiceError> {
        let row = self
            .store
            .insert(Notification::TABLE, to_record(notification)?)
            .await?;
        Ok(from_record(row)?)
    }

    /// Fire-and-forget send: a failure is logged and posted as a notice
    pub async fn send_quietly(&self, notification: &NewNotification) -> Option<Notification> {
        match self.send(notification).await {
            Ok(sent) => Some(sent),
            Err(e) => {
                tracing::warn!(
                    "Failed to send {} notification to {}: {}",
                    notification.kind,
                    notification.user_id,
                    e
                );
                self.notices
                    .notify(Notice::error("Notification could not be delivered"));
                None
            }
        }
    }

    /// Newest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Notification>, ServiceError> {
        let rows = self
            .store
            .select(
                Notification::TABLE,
                &Select::new()
                    .filter(Filter::eq("user_id", user_id))
                    .order_by(Order::desc("created_at")),
            )
            .await?;
        rows.into_iter()
            .map(|row| from_record(row).map_err(ServiceError::from))
            .collect()
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<usize, ServiceError> {
        let rows = self
            .store
            .select(
                Notification::TABLE,
                &Select::new()
                    .filter(Filter::eq("user_id", user_id))
                    .filter(Filter::eq("is_read", false)),
            )
            .await?;
        Ok(rows.len())
    }

    pub async fn mark_read(&self, notification_id: &str) -> Result<(), ServiceError> {
        let updated = self
            .store
            .update(
                Notification::TABLE,
                &[Filter::eq("id", notification_id)],
                to_record(&json!({"is_read": true}))?,
            )
            .await?;
        if updated.is_empty() {
            return Err(ServiceError::not_found("Notification", notification_id));
        }
        Ok(())
    }

    /// Returns how many notifications changed
    pub async fn mark_all_read(&self, user_id: &str) -> Result<usize, ServiceError> {
        let updated = self
            .store
            .update(
                Notification::TABLE,
                &[Filter::eq("user_id", user_id), Filter::eq("is_read", false)],
                to_record(&json!({"is_read": true}))?,
            )
            .await?;
        Ok(updated.len())
    }

    pub async fn delete(&self, notification_id: &str) -> Result<bool, ServiceError> {
        let removed = self
            .store
            .delete(Notification::TABLE, &[Filter::eq("id", notification_id)])
            .await?;
        Ok(removed > 0)
    }

    /// Live notification list for `user_id`; call `load` and `subscribe`
    pub fn inbox(&self, user_id: &str) -> ResourceCollection<Notification> {
        ResourceCollection::new(
            Arc::clone(&self.store),
            Arc::clone(&self.notices),
            Scope::eq("user_id", user_id),
        )
    }

    pub fn mention_notifier(&self) -> MentionNotifier {
        MentionNotifier::new(Arc::clone(&self.store), Arc::clone(&self.notices))
    }
}
