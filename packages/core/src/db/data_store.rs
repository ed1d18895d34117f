//! DataStore Trait - Backing Store Abstraction
//!
//! Every service talks to persistence through this trait. It mirrors the
//! query/command surface of a hosted relational backend: table-scoped
//! select/insert/update/delete, a change-event subscription primitive, and
//! named server-side procedures.
//!
//! # Implementations
//!
//! - [`MemoryStore`](crate::db::MemoryStore) - in-process tables, used by
//!   tests and demos; supports failure injection
//! - [`LibsqlStore`](crate::db::LibsqlStore) - embedded libsql database
//!   persisting JSON rows
//!
//! # Semantics
//!
//! - Writes publish a `ChangeEvent` only after they have been applied.
//! - `insert` fills `id` and `created_at` when the caller leaves them out.
//! - `update` and `delete` report what they touched; touching nothing is
//!   not an error.
//! - No optimistic concurrency: the last write to reach the store wins.
//!
//! # Examples
//!
//! ```rust,no_run
//! use retrospace_core::db::{DataStore, Filter, MemoryStore, Order, Select};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), retrospace_core::db::StoreError> {
//! let store = MemoryStore::new();
//! let row = retrospace_core::db::to_record(&json!({"user_id": "u1", "title": "Porto"}))?;
//! store.insert("retrospectives", row).await?;
//!
//! let mine = store
//!     .select(
//!         "retrospectives",
//!         &Select::new()
//!             .filter(Filter::eq("user_id", "u1"))
//!             .order_by(Order::desc("created_at")),
//!     )
//!     .await?;
//! assert_eq!(mine.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::db::{ChangeFeed, Filter, Record, RemoteProcedure, Select, StoreError, Subscription};
use async_trait::async_trait;
use serde_json::Value;

/// Abstraction over the backing data store
///
/// Implementations must be `Send + Sync`; services hold them as
/// `Arc<dyn DataStore>` and call them from spawned tasks.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Rows of `table` matching the query, ordered and limited as requested
    async fn select(&self, table: &str, query: &Select) -> Result<Vec<Record>, StoreError>;

    /// Insert a row and return it as stored (with generated columns)
    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError>;

    /// Merge `patch` into every row matching `filters`; returns the updated rows
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Record,
    ) -> Result<Vec<Record>, StoreError>;

    /// Remove every row matching `filters`; returns how many were removed
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError>;

    /// Open a change feed scoped by table, filters and event kinds
    async fn subscribe(&self, subscription: Subscription) -> Result<ChangeFeed, StoreError>;

    /// Invoke a server-side procedure
    async fn call(&self, procedure: RemoteProcedure) -> Result<Value, StoreError>;
}
