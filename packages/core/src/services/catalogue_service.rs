//! Catalogue Service
//!
//! Catalogues collect Rose/Bud/Thorn items saved from retrospectives. The
//! creator is the owner; others are invited by the owner or an editor, or
//! join with the catalogue's invite code.

use crate::db::{from_record, to_record, DataStore, Filter, Order, RemoteProcedure, Select};
use crate::feedback::NoticeSink;
use crate::models::{
    ActivityKind, Catalogue, CatalogueItem, CatalogueMember, MemberRole, MemberStatus,
    NewCatalogue, NewCatalogueItem, NewNotification, NotificationKind,
};
use crate::resource::{Resource, ResourceCollection, Scope};
use crate::services::membership;
use crate::services::{ActivityService, NotificationService, ServiceError};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct CatalogueService {
    store: Arc<dyn DataStore>,
    notices: Arc<dyn NoticeSink>,
    notifications: NotificationService,
    activity: ActivityService,
}

impl CatalogueService {
    pub fn new(store: Arc<dyn DataStore>, notices: Arc<dyn NoticeSink>) -> Self {
        Self {
            notifications: NotificationService::new(Arc::clone(&store), Arc::clone(&notices)),
            activity: ActivityService::new(Arc::clone(&store)),
            store,
            notices,
        }
    }

    /// Create a catalogue with a fresh invite code and its owner as the
    /// first member
    pub async fn create(&self, params: NewCatalogue) -> Result<Catalogue, ServiceError> {
        params.validate()?;
        let code = allocate_invite_code(self.store.as_ref()).await?;

        let mut row = to_record(&params)?;
        row.insert("invite_code".to_string(), Value::String(code));
        let row = self.store.insert(Catalogue::TABLE, row).await?;
        let catalogue: Catalogue = from_record(row)?;

        membership::add_member::<CatalogueMember>(
            self.store.as_ref(),
            &catalogue.id,
            &catalogue.owner_id,
            MemberRole::Owner,
            MemberStatus::Active,
        )
        .await?;

        tracing::debug!("Created catalogue {} ({})", catalogue.id, catalogue.name);
        Ok(catalogue)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Catalogue>, ServiceError> {
        self.find_one(Filter::eq("id", id)).await
    }

    async fn find_one(&self, filter: Filter) -> Result<Option<Catalogue>, ServiceError> {
        let rows = self
            .store
            .select(Catalogue::TABLE, &Select::new().filter(filter).limit(1))
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(from_record(row)?)),
            None => Ok(None),
        }
    }

    /// Catalogues the user actively belongs to, newest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Catalogue>, ServiceError> {
        let ids = membership::parent_ids_for::<CatalogueMember>(
            self.store.as_ref(),
            user_id,
            MemberStatus::Active,
        )
        .await?;
        self.select_by_ids(ids).await
    }

    /// Catalogues the user has been invited to but not joined
    pub async fn pending_invites(&self, user_id: &str) -> Result<Vec<Catalogue>, ServiceError> {
        let ids = membership::parent_ids_for::<CatalogueMember>(
            self.store.as_ref(),
            user_id,
            MemberStatus::Invited,
        )
        .await?;
        self.select_by_ids(ids).await
    }

    async fn select_by_ids(&self, ids: Vec<String>) -> Result<Vec<Catalogue>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .store
            .select(
                Catalogue::TABLE,
                &Select::new()
                    .filter(Filter::one_of("id", ids))
                    .order_by(Order::desc("created_at")),
            )
            .await?;
        rows.into_iter()
            .map(|row| from_record(row).map_err(ServiceError::from))
            .collect()
    }

    /// Invite someone; only owners and editors may invite
    pub async fn invite_member(
        &self,
        catalogue_id: &str,
        inviter_id: &str,
        invitee_id: &str,
        role: MemberRole,
    ) -> Result<CatalogueMember, ServiceError> {
        let catalogue = self.require(catalogue_id).await?;
        membership::require_editor::<CatalogueMember>(self.store.as_ref(), catalogue_id, inviter_id)
            .await?;
        if role == MemberRole::Owner {
            return Err(ServiceError::conflict("a catalogue has exactly one owner"));
        }

        let member = membership::add_member::<CatalogueMember>(
            self.store.as_ref(),
            catalogue_id,
            invitee_id,
            role,
            MemberStatus::Invited,
        )
        .await?;

        self.notifications
            .send_quietly(
                &NewNotification::new(
                    invitee_id,
                    NotificationKind::CatalogueInvite,
                    "Catalogue invitation",
                    format!("You were invited to \"{}\"", catalogue.name),
                )
                .actor(inviter_id),
            )
            .await;
        Ok(member)
    }

    pub async fn accept_invite(
        &self,
        catalogue_id: &str,
        user_id: &str,
    ) -> Result<CatalogueMember, ServiceError> {
        membership::activate(self.store.as_ref(), catalogue_id, user_id).await
    }

    /// Join with an invite code (case and surrounding space are ignored)
    pub async fn join_by_code(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<(Catalogue, CatalogueMember), ServiceError> {
        let code = membership::normalize_code(code);
        let catalogue = self
            .find_one(Filter::eq("invite_code", code.as_str()))
            .await?
            .ok_or_else(|| ServiceError::not_found("Catalogue invite code", &code))?;
        let member = membership::join(self.store.as_ref(), &catalogue.id, user_id).await?;
        Ok((catalogue, member))
    }

    pub async fn remove_member(
        &self,
        catalogue_id: &str,
        acting_user: &str,
        user_id: &str,
    ) -> Result<bool, ServiceError> {
        membership::remove_by::<CatalogueMember>(self.store.as_ref(), catalogue_id, acting_user, user_id)
            .await
    }

    pub async fn members(&self, catalogue_id: &str) -> Result<Vec<CatalogueMember>, ServiceError> {
        membership::members_of(self.store.as_ref(), catalogue_id).await
    }

    /// Save an item; only owners and editors may add
    pub async fn save_item(
        &self,
        catalogue_id: &str,
        user_id: &str,
        item: NewCatalogueItem,
    ) -> Result<CatalogueItem, ServiceError> {
        item.validate()?;
        let catalogue = self.require(catalogue_id).await?;
        membership::require_editor::<CatalogueMember>(self.store.as_ref(), catalogue_id, user_id)
            .await?;

        let mut row = to_record(&item)?;
        row.insert("catalogue_id".to_string(), Value::String(catalogue_id.to_string()));
        row.insert("added_by".to_string(), Value::String(user_id.to_string()));
        let row = self.store.insert(CatalogueItem::TABLE, row).await?;
        let saved: CatalogueItem = from_record(row)?;

        self.activity
            .record_quietly(
                user_id,
                ActivityKind::CatalogueItemSaved,
                catalogue_id,
                &format!("saved a {} to {}", saved.category, catalogue.name),
            )
            .await;
        Ok(saved)
    }

    /// Items of a catalogue, newest first
    pub async fn items(&self, catalogue_id: &str) -> Result<Vec<CatalogueItem>, ServiceError> {
        let rows = self
            .store
            .select(
                CatalogueItem::TABLE,
                &Select::new()
                    .filter(Filter::eq("catalogue_id", catalogue_id))
                    .order_by_all(CatalogueItem::default_order()),
            )
            .await?;
        rows.into_iter()
            .map(|row| from_record(row).map_err(ServiceError::from))
            .collect()
    }

    pub async fn remove_item(
        &self,
        catalogue_id: &str,
        item_id: &str,
        user_id: &str,
    ) -> Result<bool, ServiceError> {
        membership::require_editor::<CatalogueMember>(self.store.as_ref(), catalogue_id, user_id)
            .await?;
        let removed = self
            .store
            .delete(
                CatalogueItem::TABLE,
                &[
                    Filter::eq("id", item_id),
                    Filter::eq("catalogue_id", catalogue_id),
                ],
            )
            .await?;
        Ok(removed > 0)
    }

    /// Delete a catalogue with its items and members; owner only
    pub async fn delete(&self, catalogue_id: &str, user_id: &str) -> Result<bool, ServiceError> {
        if self.get(catalogue_id).await?.is_none() {
            return Ok(false);
        }
        membership::require_owner::<CatalogueMember>(self.store.as_ref(), catalogue_id, user_id)
            .await?;

        let scope = [Filter::eq("catalogue_id", catalogue_id)];
        self.store.delete(CatalogueItem::TABLE, &scope).await?;
        self.store.delete(CatalogueMember::TABLE, &scope).await?;
        let removed = self
            .store
            .delete(Catalogue::TABLE, &[Filter::eq("id", catalogue_id)])
            .await?;
        Ok(removed > 0)
    }

    /// Live item list of one catalogue
    pub fn item_collection(&self, catalogue_id: &str) -> ResourceCollection<CatalogueItem> {
        ResourceCollection::new(
            Arc::clone(&self.store),
            Arc::clone(&self.notices),
            Scope::eq("catalogue_id", catalogue_id),
        )
    }

    /// Live list of the catalogue invitations waiting for `user_id`
    pub fn invitation_collection(&self, user_id: &str) -> ResourceCollection<CatalogueMember> {
        ResourceCollection::new(
            Arc::clone(&self.store),
            Arc::clone(&self.notices),
            membership::invitation_scope(user_id),
        )
    }

    async fn require(&self, id: &str) -> Result<Catalogue, ServiceError> {
        self.get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Catalogue", id))
    }
}

/// Ask the store for an invite code unused by any catalogue or planner
pub(crate) async fn allocate_invite_code(store: &dyn DataStore) -> Result<String, ServiceError> {
    match store.call(RemoteProcedure::GenerateInviteCode).await? {
        Value::String(code) => Ok(code),
        other => Err(ServiceError::conflict(format!(
            "unexpected invite code response: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::feedback::NoticeBoard;
    use crate::models::RbtCategory;

    fn service() -> (CatalogueService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            CatalogueService::new(store.clone(), Arc::new(NoticeBoard::default())),
            store,
        )
    }

    #[tokio::test]
    async fn test_create_adds_owner() {
        let (service, _) = service();
        let catalogue = service
            .create(NewCatalogue::new("ana", "Best coffee").describe("worth the detour"))
            .await
            .unwrap();

        assert_eq!(catalogue.invite_code.len(), 8);
        let members = service.members(&catalogue.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, MemberRole::Owner);
        assert_eq!(service.list_for_user("ana").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invite_then_accept() {
        let (service, store) = service();
        let catalogue = service.create(NewCatalogue::new("ana", "Hikes")).await.unwrap();

        service
            .invite_member(&catalogue.id, "ana", "ben", MemberRole::Viewer)
            .await
            .unwrap();
        assert_eq!(store.row_count("notifications"), 1);
        assert!(service.list_for_user("ben").await.unwrap().is_empty());
        assert_eq!(service.pending_invites("ben").await.unwrap().len(), 1);

        service.accept_invite(&catalogue.id, "ben").await.unwrap();
        // Viewers cannot invite
        let err = service
            .invite_member(&catalogue.id, "ben", "cleo", MemberRole::Viewer)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(service.list_for_user("ben").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invitation_collection_tracks_answers() {
        let (service, _) = service();
        let hikes = service.create(NewCatalogue::new("ana", "Hikes")).await.unwrap();
        let cafes = service.create(NewCatalogue::new("cleo", "Cafes")).await.unwrap();
        service
            .invite_member(&hikes.id, "ana", "ben", MemberRole::Editor)
            .await
            .unwrap();

        let invitations = service.invitation_collection("ben");
        invitations.load().await.unwrap();
        invitations.subscribe().await.unwrap();
        assert_eq!(invitations.items().await.len(), 1);

        service
            .invite_member(&cafes.id, "cleo", "ben", MemberRole::Viewer)
            .await
            .unwrap();
        service.accept_invite(&hikes.id, "ben").await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            loop {
                let pending: Vec<String> = invitations
                    .items()
                    .await
                    .into_iter()
                    .map(|member| member.catalogue_id)
                    .collect();
                if pending == vec![cafes.id.clone()] {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("invitation list should follow invites and answers");
    }

    #[tokio::test]
    async fn test_join_by_code_and_save_item() {
        let (service, store) = service();
        let catalogue = service.create(NewCatalogue::new("ana", "Street food")).await.unwrap();

        let code = format!(" {} ", catalogue.invite_code.to_lowercase());
        let (joined, member) = service.join_by_code(&code, "ben").await.unwrap();
        assert_eq!(joined.id, catalogue.id);
        assert_eq!(member.role, MemberRole::Editor);

        let item = service
            .save_item(
                &catalogue.id,
                "ben",
                NewCatalogueItem::new(RbtCategory::Rose, "bifanas").note("Conga"),
            )
            .await
            .unwrap();
        assert_eq!(item.added_by, "ben");
        assert_eq!(service.items(&catalogue.id).await.unwrap(), vec![item.clone()]);
        assert_eq!(store.row_count("activities"), 1);

        let err = service
            .save_item(&catalogue.id, "cleo", NewCatalogueItem::new(RbtCategory::Bud, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        assert!(service.remove_item(&catalogue.id, &item.id, "ana").await.unwrap());
        assert!(service.items(&catalogue.id).await.unwrap().is_empty());

        let err = service.join_by_code("NOPE0000", "cleo").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_owner_only() {
        let (service, store) = service();
        let catalogue = service.create(NewCatalogue::new("ana", "Bars")).await.unwrap();
        service.join_by_code(&catalogue.invite_code, "ben").await.unwrap();
        service
            .save_item(&catalogue.id, "ben", NewCatalogueItem::new(RbtCategory::Rose, "rooftop"))
            .await
            .unwrap();

        assert!(service.delete(&catalogue.id, "ben").await.is_err());
        assert!(service.delete(&catalogue.id, "ana").await.unwrap());
        assert_eq!(store.row_count("catalogue_items"), 0);
        assert_eq!(store.row_count("catalogue_members"), 0);
        assert!(!service.delete(&catalogue.id, "ana").await.unwrap());
    }
}
