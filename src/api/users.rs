//! User lookup and self-service routes.
//!
//! Routes:
//! - GET /users/me - The caller's account
//! - PUT /users/me/password - Change the caller's password
//! - POST /users/displaynames - Display names for a set of users
//! - GET /users/search - Prefix/role search over users
//! - GET /users/roles - Custom role definitions

use std::collections::{HashMap, HashSet};

use axum::extract::{Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::Bearer;
use crate::models::{AuthUser, CustomRole, Role, UserName};
use crate::storage::UserSearchSpec;
use crate::{AppState, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/me/password", put(change_password))
        .route("/displaynames", post(display_names))
        .route("/search", get(search))
        .route("/roles", get(custom_roles))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    pub id: Uuid,
    pub provider: String,
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: String,
    pub display_name: String,
    pub email: Option<String>,
    pub roles: Vec<&'static str>,
    pub custom_roles: Vec<String>,
    pub local: bool,
    pub disabled: bool,
    pub created: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub identities: Vec<IdentityResponse>,
}

impl From<AuthUser> for UserResponse {
    fn from(user: AuthUser) -> Self {
        let mut roles: Vec<&'static str> = user.roles.iter().map(Role::as_str).collect();
        roles.sort_unstable();
        let mut custom_roles: Vec<String> = user.custom_roles.into_iter().collect();
        custom_roles.sort_unstable();
        let mut identities: Vec<IdentityResponse> = user
            .identities
            .into_iter()
            .map(|i| IdentityResponse {
                id: i.local_id,
                provider: i.identity.id.provider,
                username: i.identity.details.username,
            })
            .collect();
        identities.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            user: user.user_name.to_string(),
            display_name: user.display_name.to_string(),
            email: user.email.as_str().map(String::from),
            roles,
            custom_roles,
            local: user.local,
            disabled: user.disabled.is_disabled(),
            created: user.created,
            last_login: user.last_login,
            identities,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub user_name: String,
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct DisplayNamesRequest {
    pub users: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub prefix: Option<String>,
    /// Comma-separated built-in role names.
    pub roles: Option<String>,
    /// Comma-separated custom role ids.
    pub custom_roles: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

#[axum::debug_handler]
async fn me(State(state): State<AppState>, Bearer(token): Bearer) -> Result<Json<UserResponse>> {
    let user = state.users.get_user(&token, &[]).await?;
    Ok(Json(user.into()))
}

/// Password change authenticates by credentials rather than token so
/// forced resets work for users who cannot log in yet.
#[axum::debug_handler]
async fn change_password(
    State(state): State<AppState>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<Value>> {
    let user_name = if request.user_name == UserName::root().as_str() {
        UserName::root()
    } else {
        UserName::new(&request.user_name)?
    };
    let mut old_password = request.old_password;
    let mut new_password = request.new_password;
    state
        .local
        .change_password(&user_name, &mut old_password, &mut new_password)
        .await?;
    Ok(Json(json!({ "changed": true })))
}

#[axum::debug_handler]
async fn display_names(
    State(state): State<AppState>,
    Bearer(token): Bearer,
    Json(request): Json<DisplayNamesRequest>,
) -> Result<Json<HashMap<String, String>>> {
    let names: HashSet<UserName> = request
        .users
        .iter()
        .map(|n| UserName::new(n))
        .collect::<Result<_>>()?;
    let display = state.users.get_display_names(&token, names).await?;
    Ok(Json(
        display
            .into_iter()
            .map(|(name, display)| (name.to_string(), display.to_string()))
            .collect(),
    ))
}

#[axum::debug_handler]
async fn search(
    State(state): State<AppState>,
    Bearer(token): Bearer,
    Query(query): Query<SearchQuery>,
) -> Result<Json<HashMap<String, String>>> {
    let roles = query
        .roles
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| Role::from_str(s.trim()))
        .collect::<Result<HashSet<Role>>>()?;
    let custom_roles: HashSet<String> = query
        .custom_roles
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().to_string())
        .collect();

    let spec = UserSearchSpec {
        prefix: query.prefix,
        roles,
        custom_roles,
    };
    let display = state.users.search_display_names(&token, spec).await?;
    Ok(Json(
        display
            .into_iter()
            .map(|(name, display)| (name.to_string(), display.to_string()))
            .collect(),
    ))
}

#[axum::debug_handler]
async fn custom_roles(
    State(state): State<AppState>,
    Bearer(token): Bearer,
) -> Result<Json<Vec<CustomRole>>> {
    Ok(Json(state.users.list_custom_roles(&token).await?))
}
