//! Identity-link routes.
//!
//! Routes:
//! - GET /link/:provider/start - Provider redirect URL for a link
//! - POST /link/complete - Exchange an authcode; link or defer
//! - POST /link/choice - Candidates behind a deferred link
//! - POST /link/pick - Commit a chosen candidate
//! - DELETE /link/identity/:id - Unlink an identity from the caller

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::Bearer;
use crate::models::IncomingToken;
use crate::services::{LinkResult, LinkState};
use crate::{AppState, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:provider/start", get(start))
        .route("/complete", post(complete))
        .route("/choice", post(choice))
        .route("/pick", post(pick))
        .route("/identity/:id", delete(unlink))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub provider: String,
    pub authcode: String,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice_expires: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceRequest {
    pub choice_token: String,
}

#[derive(Debug, Deserialize)]
pub struct PickRequest {
    pub choice_token: String,
    pub identity_id: Uuid,
}

// ============================================================================
// Handlers
// ============================================================================

#[axum::debug_handler]
async fn start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Json<StartResponse>> {
    let oauth_state = state.login.mint_state();
    let url = state.link.link_redirect_url(&provider, &oauth_state).await?;
    Ok(Json(StartResponse {
        url: url.to_string(),
        state: oauth_state,
    }))
}

#[axum::debug_handler]
async fn complete(
    State(state): State<AppState>,
    Bearer(token): Bearer,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<LinkResponse>> {
    let result = state
        .link
        .link(&token, &request.provider, &request.authcode)
        .await?;
    Ok(Json(match result {
        LinkResult::Linked => LinkResponse {
            linked: true,
            choice_token: None,
            choice_expires: None,
        },
        LinkResult::Deferred(temp) => LinkResponse {
            linked: false,
            choice_token: Some(temp.token.clone()),
            choice_expires: Some(temp.expires),
        },
    }))
}

#[axum::debug_handler]
async fn choice(
    State(state): State<AppState>,
    Bearer(token): Bearer,
    Json(request): Json<ChoiceRequest>,
) -> Result<Json<LinkState>> {
    let link_token = IncomingToken::new(&request.choice_token)?;
    Ok(Json(state.link.link_state(&token, &link_token).await?))
}

#[axum::debug_handler]
async fn pick(
    State(state): State<AppState>,
    Bearer(token): Bearer,
    Json(request): Json<PickRequest>,
) -> Result<Json<Value>> {
    let link_token = IncomingToken::new(&request.choice_token)?;
    state
        .link
        .pick_link(&token, &link_token, request.identity_id)
        .await?;
    Ok(Json(json!({ "linked": true })))
}

#[axum::debug_handler]
async fn unlink(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Bearer(token): Bearer,
) -> Result<Json<Value>> {
    state.link.unlink(&token, id).await?;
    Ok(Json(json!({ "unlinked": true })))
}
