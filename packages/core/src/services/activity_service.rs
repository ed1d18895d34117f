//! Activity feed

use crate::db::{from_record, to_record, DataStore, Filter, Order, Select};
use crate::models::{Activity, ActivityKind};
use crate::resource::Resource;
use crate::services::ServiceError;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct ActivityService {
    store: Arc<dyn DataStore>,
}

impl ActivityService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        user_id: &str,
        kind: ActivityKind,
        target_id: &str,
        summary: &str,
    ) -> Result<Activity, ServiceError> {
        let row = to_record(&json!({
            "user_id": user_id,
            "kind": kind,
            "target_id": target_id,
            "summary": summary,
        }))?;
        let row = self.store.insert(Activity::TABLE, row).await?;
        Ok(from_record(row)?)
    }

    /// Record without failing the surrounding operation
    pub async fn record_quietly(&self, user_id: &str, kind: ActivityKind, target_id: &str, summary: &str) {
        if let Err(e) = self.record(user_id, kind, target_id, summary).await {
            tracing::warn!("Failed to record activity for {}: {}", user_id, e);
        }
    }

    /// Latest activities by any of `user_ids`, newest first
    pub async fn feed(&self, user_ids: &[String], limit: usize) -> Result<Vec<Activity>, ServiceError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .store
            .select(
                Activity::TABLE,
                &Select::new()
                    .filter(Filter::one_of("user_id", user_ids.iter().map(String::as_str)))
                    .order_by(Order::desc("created_at"))
                    .limit(limit),
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

    #[tokio::test]
    async fn test_feed_is_newest_first_and_scoped() {
        let service = ActivityService::new(Arc::new(MemoryStore::new()));
        service
            .record("ana", ActivityKind::RetroCreated, "r1", "Ana wrote about Porto")
            .await
            .unwrap();
        service
            .record("ben", ActivityKind::FriendAdded, "ana", "Ben and Ana are friends")
            .await
            .unwrap();
        service
            .record("cleo", ActivityKind::RetroShared, "r9", "hidden")
            .await
            .unwrap();

        let feed = service
            .feed(&["ana".to_string(), "ben".to_string()], 10)
            .await
            .unwrap();
        let summaries: Vec<&str> = feed.iter().map(|a| a.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Ben and Ana are friends", "Ana wrote about Porto"]);

        assert_eq!(service.feed(&["ana".to_string()], 10).await.unwrap().len(), 1);
        assert!(service.feed(&[], 10).await.unwrap().is_empty());
    }
}
