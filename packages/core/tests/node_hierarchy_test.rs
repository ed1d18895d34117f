//! Node Hierarchy Tests
//!
//! Node creation, tree fetch and subtree delete against the libsql store,
//! plus entry versioning surviving a reopen.

#[cfg(test)]
mod node_hierarchy_tests {
    use anyhow::Result;
    use retrospace_core::db::LibsqlStore;
    use retrospace_core::models::{NewNode, NodeType, RbtFields, Visibility};
    use retrospace_core::services::{NodeService, ServiceError};
    use retrospace_core::tree::flatten_preorder;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn create_service() -> Result<(NodeService, TempDir)> {
        let temp_dir = TempDir::new()?;
        let store = LibsqlStore::open(temp_dir.path().join("nodes.db")).await?;
        Ok((NodeService::new(Arc::new(store)), temp_dir))
    }

    #[tokio::test]
    async fn test_paths_extend_parents() -> Result<()> {
        let (service, _temp_dir) = create_service().await?;
        let trip = service
            .create_node(NewNode::new("ana", NodeType::Trip, "Vietnam"))
            .await?;
        let category = service
            .create_node(NewNode::new("ana", NodeType::Category, "Food").under(&trip.id))
            .await?;
        let venue = service
            .create_node(NewNode::new("ana", NodeType::Venue, "Pho stall").under(&category.id))
            .await?;

        assert!(venue.path.starts_with(&format!("{}/", category.path)));
        assert!(category.path.starts_with(&format!("{}/", trip.path)));
        assert_eq!(venue.depth(), 2);

        let err = service
            .create_node(NewNode::new("ana", NodeType::City, "Hue").under("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParent { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_tree_order_follows_order_index() -> Result<()> {
        let (service, _temp_dir) = create_service().await?;
        let trip = service
            .create_node(NewNode::new("ana", NodeType::Trip, "Chile"))
            .await?;
        let mut cities = Vec::new();
        for title in ["Santiago", "Valparaiso", "Puerto Natales"] {
            cities.push(
                service
                    .create_node(NewNode::new("ana", NodeType::City, title).under(&trip.id))
                    .await?,
            );
        }
        service
            .create_node(NewNode::new("ana", NodeType::Event, "Torres trek").under(&cities[2].id))
            .await?;
        service
            .create_node(NewNode::new("ana", NodeType::Notebook, "Packing list"))
            .await?;

        let forest = service.tree_for_owner("ana").await?;
        assert_eq!(forest.len(), 2);
        let order: Vec<&str> = flatten_preorder(&forest)
            .into_iter()
            .map(|node| node.title.as_str())
            .collect();
        assert_eq!(
            order,
            vec![
                "Chile",
                "Santiago",
                "Valparaiso",
                "Puerto Natales",
                "Torres trek",
                "Packing list"
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_subtree_delete_leaves_siblings() -> Result<()> {
        let (service, _temp_dir) = create_service().await?;
        let trip = service
            .create_node(NewNode::new("ana", NodeType::Trip, "Greece"))
            .await?;
        let athens = service
            .create_node(NewNode::new("ana", NodeType::City, "Athens").under(&trip.id))
            .await?;
        let naxos = service
            .create_node(NewNode::new("ana", NodeType::City, "Naxos").under(&trip.id))
            .await?;
        let acropolis = service
            .create_node(NewNode::new("ana", NodeType::Venue, "Acropolis").under(&athens.id))
            .await?;
        service
            .add_entry(
                &acropolis.id,
                "ana",
                RbtFields::default().rose("view").thorn("heat"),
                Visibility::Friends,
            )
            .await?;

        assert_eq!(service.delete_node(&athens.id).await?, 2);
        assert!(service.current_entries(&acropolis.id).await?.is_empty());

        let subtree = service.subtree(&trip.id).await?.expect("trip still exists");
        assert_eq!(subtree.size(), 2);
        assert_eq!(subtree.children[0].node.id, naxos.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_entry_history_persists() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("entries.db");

        let (node_id, latest_id) = {
            let service = NodeService::new(Arc::new(LibsqlStore::open(db_path.clone()).await?));
            let node = service
                .create_node(NewNode::new("ana", NodeType::Event, "Carnival"))
                .await?;
            let first = service
                .add_entry(&node.id, "ana", RbtFields::default().bud("go again"), Visibility::Public)
                .await?;
            let second = service
                .supersede_entry(&first.id, "ana", RbtFields::default().bud("go again in 2027"))
                .await?;
            (node.id, second.id)
        };

        let service = NodeService::new(Arc::new(LibsqlStore::open(db_path).await?));
        let current = service.current_entries(&node_id).await?;
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, latest_id);
        assert_eq!(current[0].bud.as_deref(), Some("go again in 2027"));
        assert_eq!(service.entry_history(&node_id).await?.len(), 2);
        Ok(())
    }
}
