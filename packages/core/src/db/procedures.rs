//! Server-Side Procedures
//!
//! The two procedures the application relies on:
//!
//! - `GenerateInviteCode` - short code, unique across catalogues and trip
//!   planners, used to join shared collections
//! - `SearchUsers` - friend discovery over `profiles` that only ever returns
//!   `id`, `display_name` and `avatar_url` (never email)
//!
//! Both bundled stores execute them through [`execute`], which only uses the
//! store's own `select`, so behaviour is identical across backends.

use crate::db::{DataStore, Filter, Order, Select, StoreError};
use serde_json::{json, Value};
use uuid::Uuid;

/// Length of generated invite codes
pub const INVITE_CODE_LENGTH: usize = 8;

/// Tables whose `invite_code` column must stay unique
const INVITE_CODE_TABLES: [&str; 2] = ["catalogues", "trip_planners"];

const MAX_INVITE_CODE_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteProcedure {
    GenerateInviteCode,
    SearchUsers {
        query: String,
        exclude_user_id: Option<String>,
        limit: usize,
    },
}

impl RemoteProcedure {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteProcedure::GenerateInviteCode => "generate_invite_code",
            RemoteProcedure::SearchUsers { .. } => "search_users",
        }
    }
}

/// Run a procedure against `store`
pub async fn execute<S>(store: &S, procedure: &RemoteProcedure) -> Result<Value, StoreError>
where
    S: DataStore + ?Sized,
{
    tracing::debug!("Executing remote procedure {}", procedure.name());
    match procedure {
        RemoteProcedure::GenerateInviteCode => generate_invite_code(store).await.map(Value::String),
        RemoteProcedure::SearchUsers {
            query,
            exclude_user_id,
            limit,
        } => search_users(store, query, exclude_user_id.as_deref(), *limit).await,
    }
}

async fn generate_invite_code<S>(store: &S) -> Result<String, StoreError>
where
    S: DataStore + ?Sized,
{
    for _ in 0..MAX_INVITE_CODE_ATTEMPTS {
        let code: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(INVITE_CODE_LENGTH)
            .collect::<String>()
            .to_uppercase();

        let mut taken = false;
        for table in INVITE_CODE_TABLES {
            let existing = store
                .select(
                    table,
                    &Select::new().filter(Filter::eq("invite_code", code.as_str())).limit(1),
                )
                .await?;
            if !existing.is_empty() {
                taken = true;
                break;
            }
        }

        if !taken {
            return Ok(code);
        }
        tracing::debug!("Invite code collision on {}, retrying", code);
    }

    Err(StoreError::backend("could not allocate a unique invite code"))
}

async fn search_users<S>(
    store: &S,
    query: &str,
    exclude_user_id: Option<&str>,
    limit: usize,
) -> Result<Value, StoreError>
where
    S: DataStore + ?Sized,
{
    let query = query.trim();
    if query.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }

    let mut select = Select::new()
        .filter(Filter::contains("display_name", query))
        .order_by(Order::asc("display_name"))
        .limit(limit);
    if let Some(excluded) = exclude_user_id {
        select = select.filter(Filter::neq("id", excluded));
    }

    let rows = store.select("profiles", &select).await?;
    let results = rows
        .into_iter()
        .map(|row| {
            json!({
                "id": row.get("id").cloned().unwrap_or(Value::Null),
                "display_name": row.get("display_name").cloned().unwrap_or(Value::Null),
                "avatar_url": row.get("avatar_url").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();

    Ok(Value::Array(results))
}
