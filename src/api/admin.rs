//! Administration routes.
//!
//! Routes:
//! - POST /admin/localuser - Create a local user (temp password returned)
//! - PUT /admin/user/:name/password - Reset a user's password
//! - PUT /admin/user/:name/forcereset - Force a password reset
//! - PUT /admin/forcereset - Force a global password reset
//! - PUT /admin/user/:name/disable - Disable or enable an account
//! - PUT /admin/user/:name/roles - Add/remove built-in roles
//! - PUT /admin/user/:name/customroles - Add/remove custom roles
//! - POST /admin/customroles - Create or update a custom role
//! - DELETE /admin/customroles/:id - Delete a custom role
//! - DELETE /admin/user/:name/tokens - Revoke a user's tokens
//! - DELETE /admin/user/:name/tokens/:id - Revoke one token of a user
//! - DELETE /admin/tokens - Revoke every token in the system
//! - PUT /admin/settings - Update server auth settings

use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::routing::{delete, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::Bearer;
use crate::models::{
    AuthSettingsUpdate, CustomRole, DisplayName, EmailAddress, Role, UserName,
};
use crate::{AppState, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/localuser", post(create_local_user))
        .route("/user/:name/password", put(reset_password))
        .route("/user/:name/forcereset", put(force_reset))
        .route("/forcereset", put(force_reset_all))
        .route("/user/:name/disable", put(set_disabled))
        .route("/user/:name/roles", put(update_roles))
        .route("/user/:name/customroles", put(update_custom_roles))
        .route("/customroles", post(set_custom_role))
        .route("/customroles/:id", delete(delete_custom_role))
        .route("/user/:name/tokens", delete(revoke_user_tokens))
        .route("/user/:name/tokens/:id", delete(revoke_user_token))
        .route("/tokens", delete(revoke_all_tokens))
        .route("/settings", put(update_settings))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateLocalUserRequest {
    pub user_name: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Carries the generated password for out-of-band delivery.
#[derive(Debug, Serialize)]
pub struct TempPasswordResponse {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    pub disable: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RolesRequest {
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomRoleRequest {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    #[serde(flatten)]
    pub update: AuthSettingsUpdate,
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

fn default_true() -> bool {
    true
}

fn parse_target(name: &str) -> Result<UserName> {
    if name == UserName::root().as_str() {
        Ok(UserName::root())
    } else {
        UserName::new(name)
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[axum::debug_handler]
async fn create_local_user(
    State(state): State<AppState>,
    Bearer(token): Bearer,
    Json(request): Json<CreateLocalUserRequest>,
) -> Result<Json<TempPasswordResponse>> {
    let email = match request.email.as_deref() {
        Some(email) => EmailAddress::new(email)?,
        None => EmailAddress::Unknown,
    };
    let user_name = UserName::new(&request.user_name)?;
    let password = state
        .local
        .create_local_user(
            &token,
            user_name.clone(),
            DisplayName::new(&request.display_name)?,
            email,
        )
        .await?;
    Ok(Json(TempPasswordResponse {
        user: user_name.to_string(),
        password,
    }))
}

#[axum::debug_handler]
async fn reset_password(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Bearer(token): Bearer,
) -> Result<Json<TempPasswordResponse>> {
    let user_name = parse_target(&name)?;
    let password = state.local.reset_password(&token, &user_name).await?;
    Ok(Json(TempPasswordResponse {
        user: user_name.to_string(),
        password,
    }))
}

#[axum::debug_handler]
async fn force_reset(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Bearer(token): Bearer,
) -> Result<Json<Value>> {
    state.local.force_reset(&token, &parse_target(&name)?).await?;
    Ok(Json(json!({ "reset": true })))
}

#[axum::debug_handler]
async fn force_reset_all(
    State(state): State<AppState>,
    Bearer(token): Bearer,
) -> Result<Json<Value>> {
    state.local.force_reset_all(&token).await?;
    Ok(Json(json!({ "reset": true })))
}

#[axum::debug_handler]
async fn set_disabled(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Bearer(token): Bearer,
    Json(request): Json<DisableRequest>,
) -> Result<Json<Value>> {
    state
        .users
        .set_user_disabled(&token, &parse_target(&name)?, request.disable, request.reason)
        .await?;
    Ok(Json(json!({ "disabled": request.disable })))
}

#[axum::debug_handler]
async fn update_roles(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Bearer(token): Bearer,
    Json(request): Json<RolesRequest>,
) -> Result<Json<Value>> {
    let add = request
        .add
        .iter()
        .map(|r| Role::from_str(r))
        .collect::<Result<HashSet<Role>>>()?;
    let remove = request
        .remove
        .iter()
        .map(|r| Role::from_str(r))
        .collect::<Result<HashSet<Role>>>()?;
    state
        .users
        .update_roles(&token, &parse_target(&name)?, add, remove)
        .await?;
    Ok(Json(json!({ "updated": true })))
}

#[axum::debug_handler]
async fn update_custom_roles(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Bearer(token): Bearer,
    Json(request): Json<RolesRequest>,
) -> Result<Json<Value>> {
    let add: HashSet<String> = request.add.into_iter().collect();
    let remove: HashSet<String> = request.remove.into_iter().collect();
    state
        .users
        .update_custom_roles(&token, &parse_target(&name)?, add, remove)
        .await?;
    Ok(Json(json!({ "updated": true })))
}

#[axum::debug_handler]
async fn set_custom_role(
    State(state): State<AppState>,
    Bearer(token): Bearer,
    Json(request): Json<CustomRoleRequest>,
) -> Result<Json<Value>> {
    let role = CustomRole::new(&request.id, &request.description)?;
    state.users.set_custom_role(&token, role).await?;
    Ok(Json(json!({ "set": true })))
}

#[axum::debug_handler]
async fn delete_custom_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Bearer(token): Bearer,
) -> Result<Json<Value>> {
    state.users.delete_custom_role(&token, &id).await?;
    Ok(Json(json!({ "deleted": true })))
}

#[axum::debug_handler]
async fn revoke_user_tokens(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Bearer(token): Bearer,
) -> Result<Json<Value>> {
    state
        .tokens
        .revoke_all_user(&token, &parse_target(&name)?)
        .await?;
    Ok(Json(json!({ "revoked": true })))
}

#[axum::debug_handler]
async fn revoke_user_token(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, Uuid)>,
    Bearer(token): Bearer,
) -> Result<Json<Value>> {
    state
        .tokens
        .revoke_user_token(&token, &parse_target(&name)?, id)
        .await?;
    Ok(Json(json!({ "revoked": true })))
}

#[axum::debug_handler]
async fn revoke_all_tokens(
    State(state): State<AppState>,
    Bearer(token): Bearer,
) -> Result<Json<Value>> {
    state.tokens.revoke_all_global(&token).await?;
    Ok(Json(json!({ "revoked": true })))
}

/// Update the stored auth settings. Admin only; the settings cache
/// refreshes immediately.
#[axum::debug_handler]
async fn update_settings(
    State(state): State<AppState>,
    Bearer(token): Bearer,
    Json(request): Json<SettingsRequest>,
) -> Result<Json<Value>> {
    state.users.get_user(&token, &[Role::Admin]).await?;
    state.settings.update(&request.update, request.overwrite).await?;
    Ok(Json(json!({ "updated": true })))
}
