//! Member lists shared by catalogues and trip planners

use crate::db::{from_record, to_record, DataStore, Filter, Order, Select};
use crate::models::{CatalogueMember, MemberRole, MemberStatus, TripPlannerMember};
use crate::resource::{Resource, Scope};
use crate::services::ServiceError;
use serde_json::json;

/// A member row of some shared collection
pub trait Membership: Resource {
    /// Column holding the collection id
    const PARENT_COLUMN: &'static str;

    fn user_id(&self) -> &str;
    fn role(&self) -> MemberRole;
    fn status(&self) -> MemberStatus;

    fn is_active(&self) -> bool {
        self.status() == MemberStatus::Active
    }
}

impl Membership for CatalogueMember {
    const PARENT_COLUMN: &'static str = "catalogue_id";

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn role(&self) -> MemberRole {
        self.role
    }

    fn status(&self) -> MemberStatus {
        self.status
    }
}

impl Membership for TripPlannerMember {
    const PARENT_COLUMN: &'static str = "planner_id";

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn role(&self) -> MemberRole {
        self.role
    }

    fn status(&self) -> MemberStatus {
        self.status
    }
}

pub(crate) async fn find_member<M: Membership>(
    store: &dyn DataStore,
    parent_id: &str,
    user_id: &str,
) -> Result<Option<M>, ServiceError> {
    let rows = store
        .select(
            M::TABLE,
            &Select::new()
                .filter(Filter::eq(M::PARENT_COLUMN, parent_id))
                .filter(Filter::eq("user_id", user_id))
                .limit(1),
        )
        .await?;
    match rows.into_iter().next() {
        Some(row) => Ok(Some(from_record(row)?)),
        None => Ok(None),
    }
}

/// The acting user must be an active owner or editor
pub(crate) async fn require_editor<M: Membership>(
    store: &dyn DataStore,
    parent_id: &str,
    user_id: &str,
) -> Result<M, ServiceError> {
    match find_member::<M>(store, parent_id, user_id).await? {
        Some(member) if member.is_active() && member.role().can_edit() => Ok(member),
        _ => Err(ServiceError::conflict(format!(
            "{} cannot edit {}",
            user_id, parent_id
        ))),
    }
}

pub(crate) async fn add_member<M: Membership>(
    store: &dyn DataStore,
    parent_id: &str,
    user_id: &str,
    role: MemberRole,
    status: MemberStatus,
) -> Result<M, ServiceError> {
    if find_member::<M>(store, parent_id, user_id).await?.is_some() {
        return Err(ServiceError::conflict(format!(
            "{} is already a member of {}",
            user_id, parent_id
        )));
    }
    let mut row = to_record(&json!({
        "user_id": user_id,
        "role": role,
        "status": status,
    }))?;
    row.insert(M::PARENT_COLUMN.to_string(), json!(parent_id));
    let row = store.insert(M::TABLE, row).await?;
    Ok(from_record(row)?)
}

/// Turn an invitation into an active membership
pub(crate) async fn activate<M: Membership>(
    store: &dyn DataStore,
    parent_id: &str,
    user_id: &str,
) -> Result<M, ServiceError> {
    let rows = store
        .update(
            M::TABLE,
            &[
                Filter::eq(M::PARENT_COLUMN, parent_id),
                Filter::eq("user_id", user_id),
            ],
            to_record(&json!({"status": MemberStatus::Active}))?,
        )
        .await?;
    match rows.into_iter().next() {
        Some(row) => Ok(from_record(row)?),
        None => Err(ServiceError::not_found("Invitation", format!("{parent_id}/{user_id}"))),
    }
}

pub(crate) async fn remove_member<M: Membership>(
    store: &dyn DataStore,
    parent_id: &str,
    user_id: &str,
) -> Result<bool, ServiceError> {
    let removed = store
        .delete(
            M::TABLE,
            &[
                Filter::eq(M::PARENT_COLUMN, parent_id),
                Filter::eq("user_id", user_id),
            ],
        )
        .await?;
    Ok(removed > 0)
}

pub(crate) async fn members_of<M: Membership>(
    store: &dyn DataStore,
    parent_id: &str,
) -> Result<Vec<M>, ServiceError> {
    let rows = store
        .select(
            M::TABLE,
            &Select::new()
                .filter(Filter::eq(M::PARENT_COLUMN, parent_id))
                .order_by(Order::asc("created_at")),
        )
        .await?;
    rows.into_iter()
        .map(|row| from_record(row).map_err(ServiceError::from))
        .collect()
}

/// Collection ids where `user_id` has a membership in `status`
pub(crate) async fn parent_ids_for<M: Membership>(
    store: &dyn DataStore,
    user_id: &str,
    status: MemberStatus,
) -> Result<Vec<String>, ServiceError> {
    let rows = store
        .select(
            M::TABLE,
            &Select::new()
                .filter(Filter::eq("user_id", user_id))
                .filter(Filter::eq("status", json!(status))),
        )
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get(M::PARENT_COLUMN).and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect())
}

/// Open invitations addressed to `user_id`, for live invitation lists
pub(crate) fn invitation_scope(user_id: &str) -> Scope {
    Scope::eq("user_id", user_id).and_eq("status", json!(MemberStatus::Invited))
}

/// Join through an invite code: an open invitation is activated, anyone
/// else becomes an active editor
pub(crate) async fn join<M: Membership>(
    store: &dyn DataStore,
    parent_id: &str,
    user_id: &str,
) -> Result<M, ServiceError> {
    match find_member::<M>(store, parent_id, user_id).await? {
        Some(member) if member.is_active() => Err(ServiceError::conflict(format!(
            "{} is already a member of {}",
            user_id, parent_id
        ))),
        Some(_) => activate(store, parent_id, user_id).await,
        None => add_member(store, parent_id, user_id, MemberRole::Editor, MemberStatus::Active).await,
    }
}

/// Remove `user_id`; the owner may remove anyone but themselves, other
/// members only themselves
pub(crate) async fn remove_by<M: Membership>(
    store: &dyn DataStore,
    parent_id: &str,
    acting_user: &str,
    user_id: &str,
) -> Result<bool, ServiceError> {
    let Some(target) = find_member::<M>(store, parent_id, user_id).await? else {
        return Ok(false);
    };
    if target.role() == MemberRole::Owner {
        return Err(ServiceError::conflict(format!(
            "the owner cannot leave {}",
            parent_id
        )));
    }
    if acting_user != user_id {
        let acting_is_owner = find_member::<M>(store, parent_id, acting_user)
            .await?
            .is_some_and(|member| member.role() == MemberRole::Owner);
        if !acting_is_owner {
            return Err(ServiceError::conflict(format!(
                "{} cannot remove members of {}",
                acting_user, parent_id
            )));
        }
    }
    remove_member::<M>(store, parent_id, user_id).await
}

/// The acting user must be the active owner
pub(crate) async fn require_owner<M: Membership>(
    store: &dyn DataStore,
    parent_id: &str,
    user_id: &str,
) -> Result<M, ServiceError> {
    match find_member::<M>(store, parent_id, user_id).await? {
        Some(member) if member.role() == MemberRole::Owner => Ok(member),
        _ => Err(ServiceError::conflict(format!(
            "{} does not own {}",
            user_id, parent_id
        ))),
    }
}

/// Normalize user-typed invite codes
pub(crate) fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn test_join_activates_invitation() {
        let store = MemoryStore::new();
        add_member::<CatalogueMember>(&store, "c1", "ben", MemberRole::Viewer, MemberStatus::Invited)
            .await
            .unwrap();

        let member = join::<CatalogueMember>(&store, "c1", "ben").await.unwrap();
        assert!(member.is_active());
        assert_eq!(member.role, MemberRole::Viewer);

        let err = join::<CatalogueMember>(&store, "c1", "ben").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let fresh = join::<CatalogueMember>(&store, "c1", "cleo").await.unwrap();
        assert_eq!(fresh.role, MemberRole::Editor);
        assert_eq!(members_of::<CatalogueMember>(&store, "c1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_rules() {
        let store = MemoryStore::new();
        add_member::<TripPlannerMember>(&store, "p1", "ana", MemberRole::Owner, MemberStatus::Active)
            .await
            .unwrap();
        add_member::<TripPlannerMember>(&store, "p1", "ben", MemberRole::Editor, MemberStatus::Active)
            .await
            .unwrap();
        add_member::<TripPlannerMember>(&store, "p1", "cleo", MemberRole::Editor, MemberStatus::Active)
            .await
            .unwrap();

        assert!(remove_by::<TripPlannerMember>(&store, "p1", "ben", "cleo").await.is_err());
        assert!(remove_by::<TripPlannerMember>(&store, "p1", "ana", "ana").await.is_err());
        assert!(remove_by::<TripPlannerMember>(&store, "p1", "ben", "ben").await.unwrap());
        assert!(remove_by::<TripPlannerMember>(&store, "p1", "ana", "cleo").await.unwrap());
        assert!(!remove_by::<TripPlannerMember>(&store, "p1", "ana", "cleo").await.unwrap());
        assert_eq!(
            parent_ids_for::<TripPlannerMember>(&store, "ana", MemberStatus::Active)
                .await
                .unwrap(),
            vec!["p1".to_string()]
        );
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  ab12cd34 "), "AB12CD34");
    }
}
