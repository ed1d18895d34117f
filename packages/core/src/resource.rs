//! Remote Resources
//!
//! One generic shape for every entity list the application shows: load the
//! rows in scope, create/update/delete with local state updated once the
//! store confirms, and optionally follow the table's change feed.
//!
//! # Failure policy
//!
//! Store errors never leave a collection in a half-updated state. A failed
//! load keeps the last items that loaded successfully; a failed write
//! leaves local state untouched. Either way the error is logged, one
//! notice is posted to the [`NoticeSink`], and the error is returned so the
//! caller can react.
//!
//! # Lifecycle
//!
//! [`ResourceCollection::set_scope`] switches to a different scope (another
//! user, another parent): the generation counter moves on, the live
//! subscription is restarted and any load still in flight for the old
//! scope is discarded when it finishes. [`ResourceCollection::close`] is
//! the end of the collection's life; nothing arriving afterwards is
//! applied. Dropping the collection closes its subscription.

use crate::db::{
    from_record, matches_all, record_id, to_record, ChangeEvent, ChangeKind, DataStore, Filter,
    Order, Record, Select, Subscription,
};
use crate::feedback::{Notice, NoticeSink};
use crate::models::{
    Activity, Catalogue, CatalogueItem, CatalogueMember, Friendship, Notification, Profile,
    RbtEntry, RetroNode, Retrospective, TripPlanner, TripPlannerItem, TripPlannerMember,
};
use crate::services::ServiceError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// A row type that lives in one table
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: &'static str;

    fn id(&self) -> &str;

    /// List order when loading a collection
    fn default_order() -> Vec<Order> {
        vec![Order::desc("created_at")]
    }
}

macro_rules! impl_resource {
    ($($ty:ty => $table:literal),* $(,)?) => {
        $(
            impl Resource for $ty {
                const TABLE: &'static str = $table;

                fn id(&self) -> &str {
                    &self.id
                }
            }
        )*
    };
}

impl_resource! {
    Retrospective => "retrospectives",
    Friendship => "friendships",
    Catalogue => "catalogues",
    CatalogueItem => "catalogue_items",
    CatalogueMember => "catalogue_members",
    TripPlanner => "trip_planners",
    TripPlannerItem => "trip_planner_items",
    TripPlannerMember => "trip_planner_members",
    Notification => "notifications",
    Activity => "activities",
    RbtEntry => "rbt_entries",
}

impl Resource for RetroNode {
    const TABLE: &'static str = "retro_nodes";

    fn id(&self) -> &str {
        &self.id
    }

    fn default_order() -> Vec<Order> {
        vec![Order::asc("path"), Order::asc("order_index")]
    }
}

impl Resource for Profile {
    const TABLE: &'static str = "profiles";

    fn id(&self) -> &str {
        &self.id
    }

    fn default_order() -> Vec<Order> {
        vec![Order::asc("display_name")]
    }
}

/// Equality filters selecting the rows a collection shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    filters: Vec<Filter>,
}

impl Scope {
    /// Every row of the table
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and_eq(column, value)
    }

    pub fn and_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    /// Add an arbitrary filter
    pub fn and(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn contains(&self, record: &Record) -> bool {
        matches_all(&self.filters, record)
    }
}

/// Snapshot of a collection
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    pub items: Vec<T>,
    pub loading: bool,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
        }
    }
}

struct Shared<T> {
    state: RwLock<ResourceState<T>>,
    generation: AtomicU64,
    closed: AtomicBool,
}

impl<T> Shared<T> {
    fn is_current(&self, generation: u64) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Aborts the change-feed task when dropped
pub struct SubscriptionGuard {
    handle: JoinHandle<()>,
}

impl SubscriptionGuard {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A scoped, locally cached list of `T`
pub struct ResourceCollection<T: Resource> {
    store: Arc<dyn DataStore>,
    notices: Arc<dyn NoticeSink>,
    scope: Mutex<Scope>,
    shared: Arc<Shared<T>>,
    subscription: Mutex<Option<SubscriptionGuard>>,
}

impl<T: Resource> ResourceCollection<T> {
    pub fn new(store: Arc<dyn DataStore>, notices: Arc<dyn NoticeSink>, scope: Scope) -> Self {
        Self {
            store,
            notices,
            scope: Mutex::new(scope),
            shared: Arc::new(Shared {
                state: RwLock::new(ResourceState::default()),
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
            subscription: Mutex::new(None),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
            .lock()
            .map(|scope| scope.clone())
            .unwrap_or_default()
    }

    pub async fn state(&self) -> ResourceState<T> {
        self.shared.state.read().await.clone()
    }

    pub async fn items(&self) -> Vec<T> {
        self.shared.state.read().await.items.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.shared.state.read().await.loading
    }

    pub async fn get(&self, id: &str) -> Option<T> {
        let state = self.shared.state.read().await;
        state.items.iter().find(|item| item.id() == id).cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .map(|guard| guard.as_ref().is_some_and(|g| !g.is_finished()))
            .unwrap_or(false)
    }

    /// Fetch the rows in scope and replace the local list
    ///
    /// A result that arrives after the scope changed or the collection was
    /// closed is dropped without touching state.
    pub async fn load(&self) -> Result<(), ServiceError> {
        if self.is_closed() {
            return Ok(());
        }
        let generation = self.shared.generation.load(Ordering::SeqCst);
        let scope = self.scope();
        self.shared.state.write().await.loading = true;

        let query = Select::new()
            .filters(scope.filters().iter().cloned())
            .order_by_all(T::default_order());
        let result = self.store.select(T::TABLE, &query).await;

        if !self.shared.is_current(generation) {
            tracing::debug!("Discarding stale {} load", T::TABLE);
            return Ok(());
        }

        let mut state = self.shared.state.write().await;
        // set_scope may have run while this task waited for the lock
        if !self.shared.is_current(generation) {
            tracing::debug!("Discarding stale {} load", T::TABLE);
            return Ok(());
        }
        state.loading = false;
        match result {
            Ok(rows) => {
                state.items = rows.into_iter().filter_map(decode::<T>).collect();
                tracing::debug!("Loaded {} rows from {}", state.items.len(), T::TABLE);
                Ok(())
            }
            Err(e) => {
                drop(state);
                Err(self.report("load", e.into()))
            }
        }
    }

    /// Insert a row and add it to the front of the list
    ///
    /// A row outside the current scope is stored but not listed.
    pub async fn create<D: Serialize + Sync>(&self, draft: &D) -> Result<T, ServiceError> {
        let result = async {
            let row = self.store.insert(T::TABLE, to_record(draft)?).await?;
            let in_scope = self.scope().contains(&row);
            Ok::<_, ServiceError>((from_record::<T>(row)?, in_scope))
        }
        .await;

        match result {
            Ok((created, in_scope)) => {
                if in_scope && !self.is_closed() {
                    let mut state = self.shared.state.write().await;
                    upsert_front(&mut state.items, created.clone());
                }
                Ok(created)
            }
            Err(e) => Err(self.report("create", e)),
        }
    }

    /// Patch one row by id and replace it in place
    pub async fn update<P: Serialize + Sync>(&self, id: &str, patch: &P) -> Result<T, ServiceError> {
        let result = async {
            let rows = self
                .store
                .update(T::TABLE, &[Filter::eq("id", id)], to_record(patch)?)
                .await?;
            let row = rows
                .into_iter()
                .next()
                .ok_or_else(|| ServiceError::not_found(T::TABLE, id))?;
            let in_scope = self.scope().contains(&row);
            Ok::<_, ServiceError>((from_record::<T>(row)?, in_scope))
        }
        .await;

        match result {
            Ok((updated, in_scope)) => {
                if !self.is_closed() {
                    let mut state = self.shared.state.write().await;
                    if in_scope {
                        upsert_front(&mut state.items, updated.clone());
                    } else {
                        state.items.retain(|item| item.id() != id);
                    }
                }
                Ok(updated)
            }
            Err(e) => Err(self.report("update", e)),
        }
    }

    /// Delete one row by id; `false` when nothing matched
    pub async fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        match self.store.delete(T::TABLE, &[Filter::eq("id", id)]).await {
            Ok(removed) => {
                if !self.is_closed() {
                    let mut state = self.shared.state.write().await;
                    state.items.retain(|item| item.id() != id);
                }
                Ok(removed > 0)
            }
            Err(e) => Err(self.report("delete", e.into())),
        }
    }

    /// Follow the table's change feed for the current scope
    ///
    /// Inserts are merged at the front and deletes remove. An update
    /// replaces the row in place, adds it at the front when it moved into
    /// scope, and removes it when it moved out. Replaces any subscription
    /// already running.
    pub async fn subscribe(&self) -> Result<(), ServiceError> {
        if self.is_closed() {
            return Ok(());
        }
        self.unsubscribe();

        let generation = self.shared.generation.load(Ordering::SeqCst);
        let scope = self.scope();
        let subscription = Subscription::table(T::TABLE).filters(scope.filters().iter().cloned());
        let mut feed = match self.store.subscribe(subscription).await {
            Ok(feed) => feed,
            Err(e) => return Err(self.report("subscribe to", e.into())),
        };

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            while let Some(event) = feed.next().await {
                if !shared.is_current(generation) {
                    break;
                }
                let mut state = shared.state.write().await;
                merge_event(&mut state.items, &scope, event);
            }
            tracing::debug!("Change feed task for {} finished", T::TABLE);
        });

        if let Ok(mut slot) = self.subscription.lock() {
            *slot = Some(SubscriptionGuard { handle });
        }
        tracing::debug!("Subscribed to {} changes", T::TABLE);
        Ok(())
    }

    /// Stop following the change feed
    pub fn unsubscribe(&self) {
        if let Ok(mut slot) = self.subscription.lock() {
            slot.take();
        }
    }

    /// Switch scope, dropping state that belonged to the old one
    pub async fn set_scope(&self, scope: Scope) -> Result<(), ServiceError> {
        if self.is_closed() {
            return Ok(());
        }
        let was_subscribed = self.is_subscribed();
        self.unsubscribe();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut current) = self.scope.lock() {
            *current = scope;
        }
        {
            let mut state = self.shared.state.write().await;
            state.items.clear();
            state.loading = false;
        }

        self.load().await?;
        if was_subscribed {
            self.subscribe().await?;
        }
        Ok(())
    }

    /// End of life: later results and events are ignored
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.unsubscribe();
    }

    fn report(&self, action: &str, error: ServiceError) -> ServiceError {
        tracing::warn!("Failed to {} {}: {}", action, T::TABLE, error);
        self.notices.notify(Notice::error(format!(
            "Could not {} {}: {}",
            action,
            T::TABLE.replace('_', " "),
            error.user_message()
        )));
        error
    }
}

impl<T: Resource> Drop for ResourceCollection<T> {
    fn drop(&mut self) {
        self.close();
    }
}

fn decode<T: Resource>(row: Record) -> Option<T> {
    let id = record_id(&row).unwrap_or_default().to_string();
    match from_record::<T>(row) {
        Ok(item) => Some(item),
        Err(e) => {
            tracing::warn!("Skipping malformed {} row {}: {}", T::TABLE, id, e);
            None
        }
    }
}

fn upsert_front<T: Resource>(items: &mut Vec<T>, item: T) {
    match items.iter_mut().find(|existing| existing.id() == item.id()) {
        Some(existing) => *existing = item,
        None => items.insert(0, item),
    }
}

fn merge_event<T: Resource>(items: &mut Vec<T>, scope: &Scope, event: ChangeEvent) {
    match event.kind {
        ChangeKind::Insert => {
            if let Some(item) = decode::<T>(event.record) {
                upsert_front(items, item);
            }
        }
        ChangeKind::Update => {
            if !scope.contains(&event.record) {
                if let Some(id) = record_id(&event.record) {
                    items.retain(|item| item.id() != id);
                }
            } else if let Some(item) = decode::<T>(event.record) {
                upsert_front(items, item);
            }
        }
        ChangeKind::Delete => {
            if let Some(id) = record_id(&event.record) {
                items.retain(|item| item.id() != id);
            }
        }
    }
}
