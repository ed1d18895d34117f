//! In-Memory Store
//!
//! Process-local tables keyed by name, each a `Vec<Record>` in insertion
//! order. Used by tests, demos and the dev tooling when no database path is
//! configured.
//!
//! Failure injection mirrors the two failure classes callers must survive:
//! [`MemoryStore::set_offline`] makes every operation fail like a dropped
//! connection, and [`MemoryStore::deny_writes`] rejects writes to one table
//! like a row-level access policy would.

use crate::db::{
    apply_patch, matches_all, prepare_insert, procedures, record_id, ChangeBus, ChangeEvent,
    ChangeFeed, ChangeKind, DataStore, Filter, Record, RemoteProcedure, Select, StoreError,
    Subscription, DEFAULT_EVENT_CAPACITY,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    denied_tables: RwLock<HashSet<String>>,
    offline: AtomicBool,
    bus: ChangeBus,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            denied_tables: RwLock::new(HashSet::new()),
            offline: AtomicBool::new(false),
            bus: ChangeBus::new(capacity),
        }
    }

    /// Simulate loss of connectivity (every operation fails)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Reject inserts, updates and deletes on `table`
    pub fn deny_writes(&self, table: &str) {
        if let Ok(mut denied) = self.denied_tables.write() {
            denied.insert(table.to_string());
        }
    }

    pub fn allow_writes(&self, table: &str) {
        if let Ok(mut denied) = self.denied_tables.write() {
            denied.remove(table);
        }
    }

    /// Number of rows currently in `table`
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|tables| tables.get(table).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::backend("connection unavailable"));
        }
        Ok(())
    }

    fn check_writable(&self, table: &str) -> Result<(), StoreError> {
        self.check_online()?;
        let denied = self
            .denied_tables
            .read()
            .map_err(|_| StoreError::backend("failed to acquire policy lock"))?;
        if denied.contains(table) {
            return Err(StoreError::unauthorized(table));
        }
        Ok(())
    }

    fn lock_err() -> StoreError {
        StoreError::backend("failed to acquire table lock")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select(&self, table: &str, query: &Select) -> Result<Vec<Record>, StoreError> {
        self.check_online()?;
        let rows = {
            let tables = self.tables.read().map_err(|_| Self::lock_err())?;
            tables.get(table).cloned().unwrap_or_default()
        };
        Ok(query.apply(rows))
    }

    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError> {
        self.check_writable(table)?;
        let record = prepare_insert(record);
        {
            let mut tables = self.tables.write().map_err(|_| Self::lock_err())?;
            let rows = tables.entry(table.to_string()).or_default();
            let id = record_id(&record);
            if rows.iter().any(|row| record_id(row) == id) {
                return Err(StoreError::invalid_request(format!(
                    "duplicate id {} in {}",
                    id.unwrap_or_default(),
                    table
                )));
            }
            rows.push(record.clone());
        }
        self.bus
            .publish(ChangeEvent::new(table, ChangeKind::Insert, record.clone()));
        Ok(record)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Record,
    ) -> Result<Vec<Record>, StoreError> {
        self.check_writable(table)?;
        let updated: Vec<(Record, Record)> = {
            let mut tables = self.tables.write().map_err(|_| Self::lock_err())?;
            match tables.get_mut(table) {
                Some(rows) => rows
                    .iter_mut()
                    .filter(|row| matches_all(filters, row))
                    .map(|row| {
                        let previous = row.clone();
                        apply_patch(row, &patch);
                        (previous, row.clone())
                    })
                    .collect(),
                None => Vec::new(),
            }
        };
        let mut rows = Vec::with_capacity(updated.len());
        for (previous, row) in updated {
            self.bus
                .publish(ChangeEvent::updated(table, previous, row.clone()));
            rows.push(row);
        }
        Ok(rows)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        self.check_writable(table)?;
        let removed: Vec<Record> = {
            let mut tables = self.tables.write().map_err(|_| Self::lock_err())?;
            match tables.get_mut(table) {
                Some(rows) => {
                    let (gone, kept): (Vec<Record>, Vec<Record>) = rows
                        .drain(..)
                        .partition(|row| matches_all(filters, row));
                    *rows = kept;
                    gone
                }
                None => Vec::new(),
            }
        };
        let count = removed.len();
        for row in removed {
            self.bus.publish(ChangeEvent::new(table, ChangeKind::Delete, row));
        }
        Ok(count)
    }

    async fn subscribe(&self, subscription: Subscription) -> Result<ChangeFeed, StoreError> {
        self.check_online()?;
        Ok(self.bus.subscribe(subscription))
    }

    async fn call(&self, procedure: RemoteProcedure) -> Result<Value, StoreError> {
        self.check_online()?;
        procedures::execute(self, &procedure).await
    }
}
