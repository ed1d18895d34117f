//! Node Service - hierarchical nodes and their RBT entries
//!
//! Nodes live in `retro_nodes` with a materialized path; entries live in
//! `rbt_entries` keyed by `node_id`.
//!
//! # Hierarchy rules
//!
//! - A new node under a parent gets `path = parent.path + "/" + id` and
//!   `order_index = max(sibling order_index) + 1`
//! - The parent must exist at creation time
//! - Deleting a node deletes its whole subtree (prefix delete on `path`)
//!   together with the entries attached to it
//!
//! # Entry versioning
//!
//! Editing an entry never rewrites it. [`NodeService::supersede_entry`]
//! inserts a new current row pointing at the old one, then flags the old
//! row as no longer current. Default reads only return current rows.

use crate::db::{
    format_timestamp, from_record, now_timestamp, to_record, DataStore, Filter, Order, Record,
    Select,
};
use crate::models::{
    child_path, project_entries_to_items, root_path, NewNode, NodeMetadata, NodeUpdate, RbtEntry,
    RbtFields, RbtItem, RetroNode, Visibility,
};
use crate::resource::Resource;
use crate::services::ServiceError;
use crate::tree::{assemble_forest, sort_for_assembly, NodeTree};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct NodeService {
    store: Arc<dyn DataStore>,
}

impl NodeService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    pub async fn get_node(&self, id: &str) -> Result<Option<RetroNode>, ServiceError> {
        let rows = self
            .store
            .select(
                RetroNode::TABLE,
                &Select::new().filter(Filter::eq("id", id)).limit(1),
            )
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(from_record(row)?)),
            None => Ok(None),
        }
    }

    async fn require_node(&self, id: &str) -> Result<RetroNode, ServiceError> {
        self.get_node(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Node", id))
    }

    /// Create a node at the root or under an existing parent
    pub async fn create_node(&self, params: NewNode) -> Result<RetroNode, ServiceError> {
        params.validate()?;

        let id = Uuid::new_v4().to_string();
        let (path, order_index) = match &params.parent_id {
            Some(parent_id) => {
                let parent = self
                    .get_node(parent_id)
                    .await?
                    .ok_or_else(|| ServiceError::invalid_parent("Node", parent_id))?;
                let next = self.next_order_index(Some(parent_id)).await?;
                (child_path(&parent.path, &id), next)
            }
            None => {
                let next = self.next_order_index(None).await?;
                (root_path(&id), next)
            }
        };

        let metadata = params
            .metadata
            .unwrap_or_else(|| NodeMetadata::empty_for(params.node_type));

        let row = to_record(&json!({
            "id": id,
            "owner_id": params.owner_id,
            "parent_id": params.parent_id,
            "node_type": params.node_type,
            "title": params.title.trim(),
            "subtitle": params.subtitle,
            "start_date": params.start_date,
            "end_date": params.end_date,
            "metadata": metadata,
            "order_index": order_index,
            "path": path,
            "visibility": params.visibility,
        }))?;
        let row = self.store.insert(RetroNode::TABLE, row).await?;
        let node: RetroNode = from_record(row)?;

        tracing::debug!("Created {} node {} at {}", node.node_type, node.id, node.path);
        Ok(node)
    }

    /// Next sibling position: one past the largest existing `order_index`
    ///
    /// Root nodes are siblings of each other across all owners; only the
    /// relative order within one owner's list is ever shown.
    async fn next_order_index(&self, parent_id: Option<&str>) -> Result<i64, ServiceError> {
        let filter = match parent_id {
            Some(parent_id) => Filter::eq("parent_id", parent_id),
            None => Filter::is_null("parent_id"),
        };
        let last = self
            .store
            .select(
                RetroNode::TABLE,
                &Select::new()
                    .filter(filter)
                    .order_by(Order::desc("order_index"))
                    .limit(1),
            )
            .await?;
        Ok(last
            .first()
            .and_then(|row| row.get("order_index"))
            .and_then(Value::as_i64)
            .map_or(0, |max| max + 1))
    }

    pub async fn update_node(&self, id: &str, update: NodeUpdate) -> Result<RetroNode, ServiceError> {
        let node = self.require_node(id).await?;
        update.validate_for(&node)?;
        if update.is_empty() {
            return Ok(node);
        }

        let mut patch = to_record(&update)?;
        patch.insert("updated_at".to_string(), Value::String(now_timestamp()));
        let rows = self
            .store
            .update(RetroNode::TABLE, &[Filter::eq("id", id)], patch)
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("Node", id))?;
        Ok(from_record(row)?)
    }

    /// Delete a node and everything under it; returns the number of nodes
    /// removed (zero when the node does not exist)
    pub async fn delete_node(&self, id: &str) -> Result<usize, ServiceError> {
        let Some(node) = self.get_node(id).await? else {
            return Ok(0);
        };

        let subtree = self
            .store
            .select(
                RetroNode::TABLE,
                &Select::new().filter(Filter::path_prefix("path", node.path.as_str())),
            )
            .await?;
        let ids: Vec<Value> = subtree
            .iter()
            .filter_map(|row| row.get("id").cloned())
            .collect();

        // Entries first, so a failed delete cannot orphan them
        if !ids.is_empty() {
            self.store
                .delete(RbtEntry::TABLE, &[Filter::In("node_id".to_string(), ids)])
                .await?;
        }
        let removed = self
            .store
            .delete(
                RetroNode::TABLE,
                &[Filter::path_prefix("path", node.path.as_str())],
            )
            .await?;

        tracing::debug!("Deleted node {} and {} descendants", id, removed.saturating_sub(1));
        Ok(removed)
    }

    /// Flat list of an owner's nodes, by path then `order_index`
    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<RetroNode>, ServiceError> {
        self.select_nodes(Select::new().filter(Filter::eq("owner_id", owner_id)))
            .await
    }

    /// Direct children of a node, in sibling order
    pub async fn children(&self, parent_id: &str) -> Result<Vec<RetroNode>, ServiceError> {
        let mut nodes = self
            .select_nodes(Select::new().filter(Filter::eq("parent_id", parent_id)))
            .await?;
        nodes.sort_by_key(|node| node.order_index);
        Ok(nodes)
    }

    /// An owner's nodes as a forest
    pub async fn tree_for_owner(&self, owner_id: &str) -> Result<Vec<NodeTree>, ServiceError> {
        let mut nodes = self.list_for_owner(owner_id).await?;
        sort_for_assembly(&mut nodes);
        Ok(assemble_forest(nodes))
    }

    /// The subtree rooted at `root_id`, fetched with one prefix query
    pub async fn subtree(&self, root_id: &str) -> Result<Option<NodeTree>, ServiceError> {
        let Some(root) = self.get_node(root_id).await? else {
            return Ok(None);
        };
        let mut nodes = self
            .select_nodes(Select::new().filter(Filter::path_prefix("path", root.path.as_str())))
            .await?;
        sort_for_assembly(&mut nodes);

        // The root's own parent is outside the result, so it assembles as a root.
        Ok(assemble_forest(nodes)
            .into_iter()
            .find(|tree| tree.node.id == root_id))
    }

    async fn select_nodes(&self, query: Select) -> Result<Vec<RetroNode>, ServiceError> {
        let rows = self
            .store
            .select(RetroNode::TABLE, &query.order_by_all(RetroNode::default_order()))
            .await?;
        rows.into_iter()
            .map(|row| from_record(row).map_err(ServiceError::from))
            .collect()
    }

    /// Attach a new entry to a node
    pub async fn add_entry(
        &self,
        node_id: &str,
        author_id: &str,
        fields: RbtFields,
        visibility: Visibility,
    ) -> Result<RbtEntry, ServiceError> {
        let fields = fields.normalized()?;
        self.require_node(node_id).await?;

        let row = self
            .store
            .insert(RbtEntry::TABLE, entry_row(node_id, author_id, &fields, visibility, None)?)
            .await?;
        Ok(from_record(row)?)
    }

    /// Live entries of a node, oldest first
    pub async fn current_entries(&self, node_id: &str) -> Result<Vec<RbtEntry>, ServiceError> {
        self.select_entries(
            Select::new()
                .filter(Filter::eq("node_id", node_id))
                .filter(Filter::eq("is_current", true))
                .order_by(Order::asc("created_at")),
        )
        .await
    }

    /// Every version of every entry on a node, newest first
    pub async fn entry_history(&self, node_id: &str) -> Result<Vec<RbtEntry>, ServiceError> {
        self.select_entries(
            Select::new()
                .filter(Filter::eq("node_id", node_id))
                .order_by(Order::desc("created_at")),
        )
        .await
    }

    /// Replace a current entry with a new version
    ///
    /// If the old row cannot be flagged afterwards the new row is removed
    /// again, so the node never shows both versions as current.
    pub async fn supersede_entry(
        &self,
        entry_id: &str,
        author_id: &str,
        fields: RbtFields,
    ) -> Result<RbtEntry, ServiceError> {
        let fields = fields.normalized()?;
        let old = self
            .select_entries(Select::new().filter(Filter::eq("id", entry_id)).limit(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("Entry", entry_id))?;
        if !old.is_current {
            return Err(ServiceError::conflict(format!(
                "entry {} has already been superseded",
                entry_id
            )));
        }

        let row = entry_row(&old.node_id, author_id, &fields, old.visibility, Some(&old.id))?;
        let new_row = self.store.insert(RbtEntry::TABLE, row).await?;
        let new_entry: RbtEntry = from_record(new_row)?;

        let flagged = self
            .store
            .update(
                RbtEntry::TABLE,
                &[Filter::eq("id", old.id.as_str())],
                to_record(&json!({"is_current": false}))?,
            )
            .await;
        if let Err(e) = flagged {
            tracing::warn!("Failed to retire entry {}, rolling back {}: {}", old.id, new_entry.id, e);
            if let Err(cleanup) = self
                .store
                .delete(RbtEntry::TABLE, &[Filter::eq("id", new_entry.id.as_str())])
                .await
            {
                tracing::warn!("Rollback of entry {} failed: {}", new_entry.id, cleanup);
            }
            return Err(e.into());
        }

        Ok(new_entry)
    }

    pub async fn delete_entry(&self, entry_id: &str) -> Result<bool, ServiceError> {
        let removed = self
            .store
            .delete(RbtEntry::TABLE, &[Filter::eq("id", entry_id)])
            .await?;
        Ok(removed > 0)
    }

    /// A node's live entries in the embedded-array shape of retrospectives
    pub async fn legacy_items(&self, node_id: &str) -> Result<[Vec<RbtItem>; 3], ServiceError> {
        let entries = self.current_entries(node_id).await?;
        Ok(project_entries_to_items(&entries))
    }

    async fn select_entries(&self, query: Select) -> Result<Vec<RbtEntry>, ServiceError> {
        let rows = self.store.select(RbtEntry::TABLE, &query).await?;
        rows.into_iter()
            .map(|row| from_record(row).map_err(ServiceError::from))
            .collect()
    }
}

fn entry_row(
    node_id: &str,
    author_id: &str,
    fields: &RbtFields,
    visibility: Visibility,
    supersedes_id: Option<&str>,
) -> Result<Record, ServiceError> {
    Ok(to_record(&json!({
        "node_id": node_id,
        "author_id": author_id,
        "rose": fields.rose,
        "bud": fields.bud,
        "thorn": fields.thorn,
        "visibility": visibility,
        "is_current": true,
        "supersedes_id": supersedes_id,
        "created_at": format_timestamp(&Utc::now()),
    }))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NodeType, TripMetadata, ValidationError};

    fn service() -> (NodeService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (NodeService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_child_path_extends_parent() {
        let (service, _) = service();
        let trip = service
            .create_node(NewNode::new("u1", NodeType::Trip, "Portugal"))
            .await
            .unwrap();
        let city = service
            .create_node(NewNode::new("u1", NodeType::City, "Lisbon").under(&trip.id))
            .await
            .unwrap();

        assert_eq!(trip.path, format!("/{}", trip.id));
        assert_eq!(city.path, format!("{}/{}", trip.path, city.id));
        assert!(city.check_path(Some(&trip)).is_ok());
        assert_eq!(city.metadata, NodeMetadata::empty_for(NodeType::City));
    }

    #[tokio::test]
    async fn test_missing_parent_rejected() {
        let (service, _) = service();
        let err = service
            .create_node(NewNode::new("u1", NodeType::Venue, "Cafe").under("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParent { .. }));
    }

    #[tokio::test]
    async fn test_metadata_must_match_type() {
        let (service, _) = service();
        let err = service
            .create_node(
                NewNode::new("u1", NodeType::Venue, "Cafe")
                    .with_metadata(NodeMetadata::Trip(TripMetadata::default())),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::MetadataMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_siblings_get_increasing_order_index() {
        let (service, _) = service();
        let trip = service
            .create_node(NewNode::new("u1", NodeType::Trip, "Japan"))
            .await
            .unwrap();
        let mut created = Vec::new();
        for title in ["Tokyo", "Kyoto", "Osaka"] {
            let node = service
                .create_node(NewNode::new("u1", NodeType::City, title).under(&trip.id))
                .await
                .unwrap();
            created.push(node.order_index);
        }
        assert_eq!(created, vec![0, 1, 2]);

        let titles: Vec<String> = service
            .children(&trip.id)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["Tokyo", "Kyoto", "Osaka"]);
    }

    #[tokio::test]
    async fn test_update_validates_and_stamps() {
        let (service, _) = service();
        let node = service
            .create_node(NewNode::new("u1", NodeType::Notebook, "Ideas"))
            .await
            .unwrap();

        let updated = service
            .update_node(
                &node.id,
                NodeUpdate {
                    title: Some("Travel ideas".to_string()),
                    subtitle: Some(Some("2026".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Travel ideas");
        assert_eq!(updated.subtitle.as_deref(), Some("2026"));
        assert!(updated.updated_at.is_some());

        let err = service
            .update_node(
                &node.id,
                NodeUpdate {
                    title: Some("  ".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_subtree_and_entries() {
        let (service, store) = service();
        let trip = service
            .create_node(NewNode::new("u1", NodeType::Trip, "Italy"))
            .await
            .unwrap();
        let city = service
            .create_node(NewNode::new("u1", NodeType::City, "Rome").under(&trip.id))
            .await
            .unwrap();
        let venue = service
            .create_node(NewNode::new("u1", NodeType::Venue, "Trastevere").under(&city.id))
            .await
            .unwrap();
        let other = service
            .create_node(NewNode::new("u1", NodeType::Trip, "Spain"))
            .await
            .unwrap();
        service
            .add_entry(&venue.id, "u1", RbtFields::default().rose("carbonara"), Visibility::Friends)
            .await
            .unwrap();

        assert_eq!(service.delete_node(&city.id).await.unwrap(), 2);
        assert!(service.get_node(&venue.id).await.unwrap().is_none());
        assert!(service.get_node(&trip.id).await.unwrap().is_some());
        assert!(service.get_node(&other.id).await.unwrap().is_some());
        assert_eq!(store.row_count("rbt_entries"), 0);
        assert_eq!(service.delete_node(&city.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_entry_delete_keeps_nodes() {
        let (service, store) = service();
        let trip = service
            .create_node(NewNode::new("u1", NodeType::Trip, "Greece"))
            .await
            .unwrap();
        service
            .add_entry(&trip.id, "u1", RbtFields::default().thorn("ferry strike"), Visibility::Friends)
            .await
            .unwrap();

        store.deny_writes("rbt_entries");
        assert!(service.delete_node(&trip.id).await.is_err());
        assert!(service.get_node(&trip.id).await.unwrap().is_some());
        assert_eq!(store.row_count("rbt_entries"), 1);

        store.allow_writes("rbt_entries");
        assert_eq!(service.delete_node(&trip.id).await.unwrap(), 1);
        assert_eq!(store.row_count("rbt_entries"), 0);
    }

    #[tokio::test]
    async fn test_tree_for_owner() {
        let (service, _) = service();
        let trip = service
            .create_node(NewNode::new("u1", NodeType::Trip, "Peru"))
            .await
            .unwrap();
        let cusco = service
            .create_node(NewNode::new("u1", NodeType::City, "Cusco").under(&trip.id))
            .await
            .unwrap();
        service
            .create_node(NewNode::new("u1", NodeType::City, "Lima").under(&trip.id))
            .await
            .unwrap();
        service
            .create_node(NewNode::new("u1", NodeType::Event, "Inti Raymi").under(&cusco.id))
            .await
            .unwrap();
        service
            .create_node(NewNode::new("u2", NodeType::Trip, "Not mine"))
            .await
            .unwrap();

        let forest = service.tree_for_owner("u1").await.unwrap();
        assert_eq!(forest.len(), 1);
        let cities: Vec<&str> = forest[0]
            .children
            .iter()
            .map(|c| c.node.title.as_str())
            .collect();
        assert_eq!(cities, vec!["Cusco", "Lima"]);
        assert_eq!(forest[0].depth(), 3);

        let subtree = service.subtree(&cusco.id).await.unwrap().unwrap();
        assert_eq!(subtree.size(), 2);
    }

    #[tokio::test]
    async fn test_supersede_keeps_history() {
        let (service, _) = service();
        let node = service
            .create_node(NewNode::new("u1", NodeType::Event, "Festival"))
            .await
            .unwrap();
        let first = service
            .add_entry(&node.id, "u1", RbtFields::default().rose("music"), Visibility::Public)
            .await
            .unwrap();

        let second = service
            .supersede_entry(&first.id, "u1", RbtFields::default().rose("music").thorn("mud"))
            .await
            .unwrap();
        assert_eq!(second.supersedes_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(second.visibility, Visibility::Public);

        let current = service.current_entries(&node.id).await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, second.id);

        let history = service.entry_history(&node.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert!(!history[1].is_current);

        let err = service
            .supersede_entry(&first.id, "u1", RbtFields::default().bud("again"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let [roses, _, thorns] = service.legacy_items(&node.id).await.unwrap();
        assert_eq!(roses[0].text, "music");
        assert_eq!(thorns[0].text, "mud");
    }

    #[tokio::test]
    async fn test_empty_entry_rejected() {
        let (service, store) = service();
        let node = service
            .create_node(NewNode::new("u1", NodeType::Event, "Gig"))
            .await
            .unwrap();
        let err = service
            .add_entry(&node.id, "u1", RbtFields::default(), Visibility::Private)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::EmptyEntry)));
        assert_eq!(store.row_count("rbt_entries"), 0);
    }
}
