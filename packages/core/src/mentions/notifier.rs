//! Tag notifications for mentions in finished text

use crate::db::{from_record, to_record, DataStore, StoreError};
use crate::feedback::{Notice, NoticeSink};
use crate::mentions::resolve_mentions;
use crate::models::{NewNotification, Notification, NotificationKind, UserSummary};
use std::sync::Arc;

const TAGGED_TITLE: &str = "You were tagged";

/// Where the mention was written and by whom
#[derive(Debug, Clone, PartialEq)]
pub struct TagContext {
    pub actor_id: String,
    pub actor_name: String,
    pub retro_id: String,
    pub retro_title: String,
    pub item_id: Option<String>,
}

/// Sends one `tagged` notification per person mentioned
///
/// Dispatch never fails from the caller's point of view: a failed insert
/// is logged and reported to the notice sink, and the remaining people are
/// still notified.
pub struct MentionNotifier {
    store: Arc<dyn DataStore>,
    notices: Arc<dyn NoticeSink>,
}

impl MentionNotifier {
    pub fn new(store: Arc<dyn DataStore>, notices: Arc<dyn NoticeSink>) -> Self {
        Self { store, notices }
    }

    /// Notify everyone in `roster` mentioned in `text`, except the actor
    ///
    /// Returns the notifications that were stored.
    pub async fn notify_tagged(
        &self,
        text: &str,
        roster: &[UserSummary],
        context: &TagContext,
    ) -> Vec<Notification> {
        let mut sent = Vec::new();
        for person in resolve_mentions(text, roster) {
            if person.id == context.actor_id {
                continue;
            }
            match self.send(person, context).await {
                Ok(notification) => sent.push(notification),
                Err(e) => {
                    tracing::warn!("Failed to notify {} of tag: {}", person.id, e);
                    self.notices.notify(Notice::error(format!(
                        "Could not notify {} about the mention",
                        person.display_name
                    )));
                }
            }
        }
        tracing::debug!(
            "Sent {} tag notifications for retro {}",
            sent.len(),
            context.retro_id
        );
        sent
    }

    async fn send(
        &self,
        person: &UserSummary,
        context: &TagContext,
    ) -> Result<Notification, StoreError> {
        let mut notification = NewNotification::new(
            person.id.as_str(),
            NotificationKind::Tagged,
            TAGGED_TITLE,
            format!(
                "{} tagged you in \"{}\"",
                context.actor_name, context.retro_title
            ),
        )
        .retro(context.retro_id.as_str())
        .actor(context.actor_id.as_str());
        if let Some(item_id) = &context.item_id {
            notification = notification.item(item_id.as_str());
        }

        let row = self.store.insert("notifications", to_record(&notification)?).await?;
        from_record(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Select};
    use crate::feedback::NoticeBoard;

    fn person(id: &str, name: &str) -> UserSummary {
        UserSummary {
            id: id.to_string(),
            display_name: name.to_string(),
            avatar_url: None,
        }
    }

    fn context() -> TagContext {
        TagContext {
            actor_id: "u-me".to_string(),
            actor_name: "Robin".to_string(),
            retro_id: "r1".to_string(),
            retro_title: "Lisbon".to_string(),
            item_id: Some("item-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_one_notification_per_resolved_person() {
        let store = Arc::new(MemoryStore::new());
        let board = Arc::new(NoticeBoard::default());
        let notifier = MentionNotifier::new(store.clone(), board.clone());
        let roster = vec![person("u-jane", "Jane Doe"), person("u-me", "Robin")];

        let sent = notifier
            .notify_tagged("Great trip @Jane Doe and @Bob! cc @Robin", &roster, &context())
            .await;

        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, "u-jane");
        assert_eq!(sent[0].kind, NotificationKind::Tagged);
        assert_eq!(sent[0].title, "You were tagged");
        assert_eq!(sent[0].message, "Robin tagged you in \"Lisbon\"");
        assert_eq!(sent[0].item_id.as_deref(), Some("item-1"));
        assert_eq!(sent[0].actor_id.as_deref(), Some("u-me"));

        let stored = store.select("notifications", &Select::new()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(board.is_empty());
    }

    #[tokio::test]
    async fn test_failures_become_notices() {
        let store = Arc::new(MemoryStore::new());
        store.deny_writes("notifications");
        let board = Arc::new(NoticeBoard::default());
        let notifier = MentionNotifier::new(store, board.clone());
        let roster = vec![person("u-jane", "Jane Doe"), person("u-sam", "Sam")];

        let sent = notifier
            .notify_tagged("@Jane Doe @Sam", &roster, &context())
            .await;

        assert!(sent.is_empty());
        assert_eq!(board.len(), 2);
    }
}
