//! Login routes.
//!
//! Routes:
//! - GET /login/providers - Providers available for login
//! - GET /login/:provider/start - Provider redirect URL for a login
//! - POST /login/complete - Exchange an authcode for a token or choice
//! - GET /login/choice - State of a deferred login (temp token)
//! - POST /login/pick - Complete a deferred login with an identity
//! - POST /login/create - Create an account from a deferred login
//! - GET /login/suggestname/:name - Suggest an available user name
//! - POST /login/local - Local password login

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::tokens::NewTokenResponse;
use crate::api::Bearer;
use crate::models::{DisplayName, EmailAddress, UserName};
use crate::services::{LocalLoginResult, LoginResult, LoginState, ProviderInfo};
use crate::{AppState, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/providers", get(providers))
        .route("/:provider/start", get(start))
        .route("/complete", post(complete))
        .route("/choice", get(choice))
        .route("/pick", post(pick))
        .route("/create", post(create))
        .route("/suggestname/:name", get(suggest_name))
        .route("/local", post(local_login))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub url: String,
    /// Opaque state the front end must carry through the redirect.
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub provider: String,
    pub authcode: String,
}

/// Either a completed login or a deferred choice.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<NewTokenResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice_expires: Option<DateTime<Utc>>,
}

impl From<LoginResult> for LoginResponse {
    fn from(result: LoginResult) -> Self {
        match result {
            LoginResult::LoggedIn(token) => Self {
                token: Some(token.into()),
                choice_token: None,
                choice_expires: None,
            },
            LoginResult::Deferred(temp) => Self {
                token: None,
                choice_token: Some(temp.token.clone()),
                choice_expires: Some(temp.expires),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PickRequest {
    pub identity_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub identity_id: Uuid,
    pub user_name: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestNameResponse {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LocalLoginRequest {
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LocalLoginResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<NewTokenResponse>,
    pub reset_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

#[axum::debug_handler]
async fn providers(State(state): State<AppState>) -> Result<Json<Vec<ProviderInfo>>> {
    Ok(Json(state.login.providers().await?))
}

#[axum::debug_handler]
async fn start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Json<StartResponse>> {
    let oauth_state = state.login.mint_state();
    let url = state.login.login_redirect_url(&provider, &oauth_state).await?;
    Ok(Json(StartResponse {
        url: url.to_string(),
        state: oauth_state,
    }))
}

#[axum::debug_handler]
async fn complete(
    State(state): State<AppState>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<LoginResponse>> {
    let result = state.login.login(&request.provider, &request.authcode).await?;
    Ok(Json(result.into()))
}

#[axum::debug_handler]
async fn choice(State(state): State<AppState>, Bearer(token): Bearer) -> Result<Json<LoginState>> {
    Ok(Json(state.login.login_state(&token).await?))
}

#[axum::debug_handler]
async fn pick(
    State(state): State<AppState>,
    Bearer(token): Bearer,
    Json(request): Json<PickRequest>,
) -> Result<Json<NewTokenResponse>> {
    let new = state
        .login
        .complete_login(&token, request.identity_id)
        .await?;
    Ok(Json(new.into()))
}

#[axum::debug_handler]
async fn create(
    State(state): State<AppState>,
    Bearer(token): Bearer,
    Json(request): Json<CreateRequest>,
) -> Result<Json<NewTokenResponse>> {
    let email = match request.email.as_deref() {
        Some(email) => EmailAddress::new(email)?,
        None => EmailAddress::Unknown,
    };
    let new = state
        .login
        .create_user(
            &token,
            request.identity_id,
            UserName::new(&request.user_name)?,
            DisplayName::new(&request.display_name)?,
            email,
        )
        .await?;
    Ok(Json(new.into()))
}

#[axum::debug_handler]
async fn suggest_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SuggestNameResponse>> {
    let suggestion = state.login.suggest_username(&name).await?;
    Ok(Json(SuggestNameResponse {
        name: suggestion.map(|n| n.as_str().to_string()),
    }))
}

#[axum::debug_handler]
async fn local_login(
    State(state): State<AppState>,
    Json(request): Json<LocalLoginRequest>,
) -> Result<Json<LocalLoginResponse>> {
    let user_name = if request.user_name == UserName::root().as_str() {
        UserName::root()
    } else {
        UserName::new(&request.user_name)?
    };
    let mut password = request.password;
    let result = state.local.login(&user_name, &mut password).await?;

    Ok(Json(match result {
        LocalLoginResult::LoggedIn(token) => LocalLoginResponse {
            token: Some(token.into()),
            reset_required: false,
            user: None,
        },
        LocalLoginResult::ResetRequired(name) => LocalLoginResponse {
            token: None,
            reset_required: true,
            user: Some(name.to_string()),
        },
    }))
}
