//! Change Events
//!
//! Row-level change notifications emitted by every `DataStore` after a
//! write succeeds. Subscribers receive them through a `ChangeFeed`, which
//! applies the table/filter/kind scope the subscriber asked for.
//!
//! # Architecture
//!
//! Events travel on a tokio broadcast channel owned by a `ChangeBus`.
//! A slow subscriber that falls behind skips the missed events instead of
//! stalling writers; there is no replay.

use crate::db::{matches_all, Filter, Record};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Broadcast channel capacity used when none is configured.
pub const DEFAULT_EVENT_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A committed row change
///
/// For deletes, `record` holds the row as it was before removal so that
/// scoped subscribers can still match it against their filters. Updates
/// carry the row as it was before the patch in `previous`, so a row that
/// moves out of a subscriber's scope still reaches that subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record: Record,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Record>,
}

impl ChangeEvent {
    pub fn new(table: impl Into<String>, kind: ChangeKind, record: Record) -> Self {
        Self {
            table: table.into(),
            kind,
            record,
            previous: None,
        }
    }

    pub fn updated(table: impl Into<String>, previous: Record, record: Record) -> Self {
        Self {
            previous: Some(previous),
            ..Self::new(table, ChangeKind::Update, record)
        }
    }

    /// Event name in `table:kind` form, e.g. `notifications:insert`
    pub fn event_type(&self) -> String {
        let kind = match self.kind {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        };
        format!("{}:{}", self.table, kind)
    }
}

/// What a subscriber wants to hear about
#[derive(Debug, Clone)]
pub struct Subscription {
    pub table: String,
    pub filters: Vec<Filter>,
    /// Empty means every kind
    pub kinds: Vec<ChangeKind>,
}

impl Subscription {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            kinds: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn kinds(mut self, kinds: &[ChangeKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    /// Table and kind match, and the row is in scope before or after the
    /// change
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        event.table == self.table
            && (self.kinds.is_empty() || self.kinds.contains(&event.kind))
            && (matches_all(&self.filters, &event.record)
                || event
                    .previous
                    .as_ref()
                    .is_some_and(|previous| matches_all(&self.filters, previous)))
    }
}

/// Publisher side shared by store implementations
#[derive(Debug, Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a committed change
    ///
    /// Having no subscribers is normal and not an error.
    pub fn publish(&self, event: ChangeEvent) {
        tracing::debug!("Publishing change event {}", event.event_type());
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self, subscription: Subscription) -> ChangeFeed {
        ChangeFeed {
            rx: self.tx.subscribe(),
            subscription,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Receiving side of a scoped subscription
///
/// Dropping the feed unsubscribes.
pub struct ChangeFeed {
    rx: broadcast::Receiver<ChangeEvent>,
    subscription: Subscription,
}

impl ChangeFeed {
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Wait for the next event in scope
    ///
    /// Returns `None` once the publishing store is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.subscription.accepts(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        "Change feed for {} lagged, skipped {} events",
                        self.subscription.table,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Change feed for {} closed", self.subscription.table);
                    return None;
                }
            }
        }
    }
}
