//! Token management routes.
//!
//! Routes:
//! - GET /tokens - List the caller's live tokens
//! - POST /tokens - Create an extended-lifetime token
//! - DELETE /tokens/current - Revoke the presented token
//! - DELETE /tokens/:id - Revoke one of the caller's tokens
//! - DELETE /tokens - Revoke all of the caller's tokens

use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::Bearer;
use crate::models::{HashedToken, NewToken, TokenName, TokenType};
use crate::{AppState, Error, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tokens).post(create_token).delete(revoke_all))
        .route("/current", delete(revoke_current))
        .route("/:id", delete(revoke))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A freshly issued token. The `token` field is shown exactly once.
#[derive(Debug, Serialize)]
pub struct NewTokenResponse {
    pub token: String,
    pub id: Uuid,
    pub token_type: TokenType,
    pub user: String,
    pub expires: DateTime<Utc>,
}

impl From<NewToken> for NewTokenResponse {
    fn from(new: NewToken) -> Self {
        Self {
            token: new.token,
            id: new.stored.id,
            token_type: new.stored.token_type,
            user: new.stored.user_name.to_string(),
            expires: new.stored.expires,
        }
    }
}

/// A stored token, without its hash.
#[derive(Debug, Serialize)]
pub struct TokenInfo {
    pub id: Uuid,
    pub token_type: TokenType,
    pub name: Option<String>,
    pub user: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl From<HashedToken> for TokenInfo {
    fn from(token: HashedToken) -> Self {
        Self {
            id: token.id,
            token_type: token.token_type,
            name: token.name.map(|n| n.as_str().to_string()),
            user: token.user_name.to_string(),
            created: token.created,
            expires: token.expires,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
    /// "dev" or "serv".
    pub token_type: String,
}

// ============================================================================
// Handlers
// ============================================================================

#[axum::debug_handler]
async fn list_tokens(
    State(state): State<AppState>,
    Bearer(token): Bearer,
) -> Result<Json<Vec<TokenInfo>>> {
    let tokens = state.tokens.list_tokens(&token).await?;
    Ok(Json(tokens.into_iter().map(TokenInfo::from).collect()))
}

#[axum::debug_handler]
async fn create_token(
    State(state): State<AppState>,
    Bearer(token): Bearer,
    Json(request): Json<CreateTokenRequest>,
) -> Result<Json<NewTokenResponse>> {
    let server = match request.token_type.as_str() {
        "serv" => true,
        "dev" => false,
        other => {
            return Err(Error::IllegalParameter(format!(
                "Unknown token type: {}",
                other
            )))
        }
    };
    let name = TokenName::new(&request.name)?;
    let new = state.tokens.create_extended_token(&token, name, server).await?;
    Ok(Json(new.into()))
}

#[axum::debug_handler]
async fn revoke(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Bearer(token): Bearer,
) -> Result<Json<Value>> {
    state.tokens.revoke(&token, id).await?;
    Ok(Json(json!({ "revoked": true })))
}

#[axum::debug_handler]
async fn revoke_current(
    State(state): State<AppState>,
    Bearer(token): Bearer,
) -> Result<Json<Value>> {
    state.tokens.revoke_current(&token).await?;
    Ok(Json(json!({ "revoked": true })))
}

#[axum::debug_handler]
async fn revoke_all(
    State(state): State<AppState>,
    Bearer(token): Bearer,
) -> Result<Json<Value>> {
    state.tokens.revoke_all(&token).await?;
    Ok(Json(json!({ "revoked": true })))
}
