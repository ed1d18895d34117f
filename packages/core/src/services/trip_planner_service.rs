//! Trip Planner Service
//!
//! Collaborative itineraries: a planner has dated items, optionally tied to
//! a looked-up place, and a member list shared the same way as catalogues.

use crate::db::{from_record, to_record, DataStore, Filter, Order, Select};
use crate::feedback::NoticeSink;
use crate::models::{
    MemberRole, MemberStatus, NewNotification, NewTripPlanner, NewTripPlannerItem,
    NotificationKind, TripPlanner, TripPlannerItem, TripPlannerMember,
};
use crate::resource::{Resource, ResourceCollection, Scope};
use crate::services::catalogue_service::allocate_invite_code;
use crate::services::membership;
use crate::services::{NotificationService, ServiceError};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct TripPlannerService {
    store: Arc<dyn DataStore>,
    notices: Arc<dyn NoticeSink>,
    notifications: NotificationService,
}

impl TripPlannerService {
    pub fn new(store: Arc<dyn DataStore>, notices: Arc<dyn NoticeSink>) -> Self {
        Self {
            notifications: NotificationService::new(Arc::clone(&store), Arc::clone(&notices)),
            store,
            notices,
        }
    }

    pub async fn create(&self, params: NewTripPlanner) -> Result<TripPlanner, ServiceError> {
        params.validate()?;
        let code = allocate_invite_code(self.store.as_ref()).await?;

        let mut row = to_record(&params)?;
        row.insert("invite_code".to_string(), Value::String(code));
        let row = self.store.insert(TripPlanner::TABLE, row).await?;
        let planner: TripPlanner = from_record(row)?;

        membership::add_member::<TripPlannerMember>(
            self.store.as_ref(),
            &planner.id,
            &planner.owner_id,
            MemberRole::Owner,
            MemberStatus::Active,
        )
        .await?;

        tracing::debug!("Created trip planner {} ({})", planner.id, planner.title);
        Ok(planner)
    }

    pub async fn get(&self, id: &str) -> Result<Option<TripPlanner>, ServiceError> {
        self.find_one(Filter::eq("id", id)).await
    }

    async fn find_one(&self, filter: Filter) -> Result<Option<TripPlanner>, ServiceError> {
        let rows = self
            .store
            .select(TripPlanner::TABLE, &Select::new().filter(filter).limit(1))
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(from_record(row)?)),
            None => Ok(None),
        }
    }

    async fn require(&self, id: &str) -> Result<TripPlanner, ServiceError> {
        self.get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Trip planner", id))
    }

    /// Planners the user actively belongs to, newest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<TripPlanner>, ServiceError> {
        let ids = membership::parent_ids_for::<TripPlannerMember>(
            self.store.as_ref(),
            user_id,
            MemberStatus::Active,
        )
        .await?;
        self.select_by_ids(ids).await
    }

    /// Planners the user has been invited to but not joined
    pub async fn pending_invites(&self, user_id: &str) -> Result<Vec<TripPlanner>, ServiceError> {
        let ids = membership::parent_ids_for::<TripPlannerMember>(
            self.store.as_ref(),
            user_id,
            MemberStatus::Invited,
        )
        .await?;
        self.select_by_ids(ids).await
    }

    async fn select_by_ids(&self, ids: Vec<String>) -> Result<Vec<TripPlanner>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .store
            .select(
                TripPlanner::TABLE,
                &Select::new()
                    .filter(Filter::one_of("id", ids))
                    .order_by(Order::desc("created_at")),
            )
            .await?;
        rows.into_iter()
            .map(|row| from_record(row).map_err(ServiceError::from))
            .collect()
    }

    pub async fn invite_member(
        &self,
        planner_id: &str,
        inviter_id: &str,
        invitee_id: &str,
    ) -> Result<TripPlannerMember, ServiceError> {
        let planner = self.require(planner_id).await?;
        membership::require_editor::<TripPlannerMember>(self.store.as_ref(), planner_id, inviter_id)
            .await?;

        let member = membership::add_member::<TripPlannerMember>(
            self.store.as_ref(),
            planner_id,
            invitee_id,
            MemberRole::Editor,
            MemberStatus::Invited,
        )
        .await?;

        self.notifications
            .send_quietly(
                &NewNotification::new(
                    invitee_id,
                    NotificationKind::TripPlannerInvite,
                    "Trip invitation",
                    format!("You were invited to plan \"{}\"", planner.title),
                )
                .actor(inviter_id),
            )
            .await;
        Ok(member)
    }

    pub async fn accept_invite(
        &self,
        planner_id: &str,
        user_id: &str,
    ) -> Result<TripPlannerMember, ServiceError> {
        membership::activate(self.store.as_ref(), planner_id, user_id).await
    }

    pub async fn join_by_code(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<(TripPlanner, TripPlannerMember), ServiceError> {
        let code = membership::normalize_code(code);
        let planner = self
            .find_one(Filter::eq("invite_code", code.as_str()))
            .await?
            .ok_or_else(|| ServiceError::not_found("Trip planner invite code", &code))?;
        let member = membership::join(self.store.as_ref(), &planner.id, user_id).await?;
        Ok((planner, member))
    }

    pub async fn remove_member(
        &self,
        planner_id: &str,
        acting_user: &str,
        user_id: &str,
    ) -> Result<bool, ServiceError> {
        membership::remove_by::<TripPlannerMember>(self.store.as_ref(), planner_id, acting_user, user_id)
            .await
    }

    pub async fn members(&self, planner_id: &str) -> Result<Vec<TripPlannerMember>, ServiceError> {
        membership::members_of(self.store.as_ref(), planner_id).await
    }

    pub async fn add_item(
        &self,
        planner_id: &str,
        user_id: &str,
        item: NewTripPlannerItem,
    ) -> Result<TripPlannerItem, ServiceError> {
        item.validate()?;
        self.require(planner_id).await?;
        membership::require_editor::<TripPlannerMember>(self.store.as_ref(), planner_id, user_id)
            .await?;

        let mut row = to_record(&item)?;
        row.insert("planner_id".to_string(), Value::String(planner_id.to_string()));
        row.insert("added_by".to_string(), Value::String(user_id.to_string()));
        let row = self.store.insert(TripPlannerItem::TABLE, row).await?;
        Ok(from_record(row)?)
    }

    /// Itinerary order: by day (undated first), then when added
    pub async fn items(&self, planner_id: &str) -> Result<Vec<TripPlannerItem>, ServiceError> {
        let rows = self
            .store
            .select(
                TripPlannerItem::TABLE,
                &Select::new()
                    .filter(Filter::eq("planner_id", planner_id))
                    .order_by(Order::asc("day"))
                    .order_by(Order::asc("created_at")),
            )
            .await?;
        rows.into_iter()
            .map(|row| from_record(row).map_err(ServiceError::from))
            .collect()
    }

    pub async fn remove_item(
        &self,
        planner_id: &str,
        item_id: &str,
        user_id: &str,
    ) -> Result<bool, ServiceError> {
        membership::require_editor::<TripPlannerMember>(self.store.as_ref(), planner_id, user_id)
            .await?;
        let removed = self
            .store
            .delete(
                TripPlannerItem::TABLE,
                &[Filter::eq("id", item_id), Filter::eq("planner_id", planner_id)],
            )
            .await?;
        Ok(removed > 0)
    }

    /// Delete a planner with its items and members; owner only
    pub async fn delete(&self, planner_id: &str, user_id: &str) -> Result<bool, ServiceError> {
        if self.get(planner_id).await?.is_none() {
            return Ok(false);
        }
        membership::require_owner::<TripPlannerMember>(self.store.as_ref(), planner_id, user_id)
            .await?;

        let scope = [Filter::eq("planner_id", planner_id)];
        self.store.delete(TripPlannerItem::TABLE, &scope).await?;
        self.store.delete(TripPlannerMember::TABLE, &scope).await?;
        let removed = self
            .store
            .delete(TripPlanner::TABLE, &[Filter::eq("id", planner_id)])
            .await?;
        Ok(removed > 0)
    }

    pub fn item_collection(&self, planner_id: &str) -> ResourceCollection<TripPlannerItem> {
        ResourceCollection::new(
            Arc::clone(&self.store),
            Arc::clone(&self.notices),
            Scope::eq("planner_id", planner_id),
        )
    }

    pub fn invitation_collection(&self, user_id: &str) -> ResourceCollection<TripPlannerMember> {
        ResourceCollection::new(
            Arc::clone(&self.store),
            Arc::clone(&self.notices),
            membership::invitation_scope(user_id),
        )
    }
}
