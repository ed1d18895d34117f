//! Store inspector for local development
//!
//! Opens the libsql database the app is configured with and prints what a
//! user would see: their node tree and, optionally, the aggregated view of
//! one retrospective.
//!
//! # Usage
//!
//! ```bash
//! # Node tree of a user
//! cargo run --bin retro-inspect -- <user-id>
//!
//! # Plus the aggregated parent/child view of a retrospective
//! cargo run --bin retro-inspect -- <user-id> <retro-id>
//!
//! # Another database file
//! RETROSPACE_DB_PATH=/tmp/retro.db cargo run --bin retro-inspect -- <user-id>
//! ```

use anyhow::Context;
use retrospace_core::config::{init_tracing, AppConfig};
use retrospace_core::db::LibsqlStore;
use retrospace_core::feedback::NoticeBoard;
use retrospace_core::models::RbtCategory;
use retrospace_core::services::{NodeService, RetrospectiveService};
use retrospace_core::tree::NodeTree;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let user_id = args
        .next()
        .context("usage: retro-inspect <user-id> [retro-id]")?;
    let retro_id = args.next();

    let config = AppConfig::load().context("invalid configuration")?;
    tracing::info!("Opening store at {}", config.database_path.display());
    let store = LibsqlStore::open_with_capacity(config.database_path.clone(), config.event_capacity)
        .await
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let store = Arc::new(store);
    let notices = Arc::new(NoticeBoard::new(config.notice_capacity));

    let nodes = NodeService::new(store.clone());
    let forest = nodes.tree_for_owner(&user_id).await?;
    println!("Nodes of {} ({} roots)", user_id, forest.len());
    for tree in &forest {
        print_tree(tree, 1);
    }

    if let Some(retro_id) = retro_id {
        let retros = RetrospectiveService::new(store, notices.clone());
        let aggregated = retros.load_aggregated(&retro_id).await?;
        let view = aggregated.view();
        println!(
            "\nAggregated view of {} ({} children, {} items)",
            retro_id,
            aggregated.children().len(),
            view.len()
        );
        for category in RbtCategory::ALL {
            println!("  {}:", category);
            for entry in view.items(category) {
                let marker = if entry.source.is_child_item { "child" } else { "own" };
                println!("    - {} [{}: {}]", entry.item.text, marker, entry.source.retro_title);
            }
        }
    }

    for notice in notices.notices() {
        eprintln!("notice: {}", notice.message);
    }
    Ok(())
}

fn print_tree(tree: &NodeTree, depth: usize) {
    let node = &tree.node;
    println!(
        "{}{} {} ({})",
        "  ".repeat(depth),
        node.node_type,
        node.title,
        node.id
    );
    for child in &tree.children {
        print_tree(child, depth + 1);
    }
}
