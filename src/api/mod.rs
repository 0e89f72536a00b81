//! API routes for Gatehouse.
//!
//! Thin axum handlers over the engine services, organized by domain:
//! - /login/* - OAuth2 and local login flows (public + temp tokens)
//! - /link/* - identity linking (user token)
//! - /tokens/* - token management (user token)
//! - /users/* - lookups and self-service (user token)
//! - /admin/* - administration (admin roles)
//! - /status - health check (public)

mod admin;
mod link;
mod login;
mod status;
mod tokens;
mod users;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Router;

use crate::models::IncomingToken;
use crate::{AppState, Error};

/// Build the complete API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(status::routes())
        .nest("/login", login::routes())
        .nest("/link", link::routes())
        .nest("/tokens", tokens::routes())
        .nest("/users", users::routes())
        .nest("/admin", admin::routes())
}

/// Extractor for the bearer token on a request.
///
/// Accepts `Authorization: Bearer <token>` (the scheme prefix is
/// optional); surrounding whitespace is stripped and a blank value is
/// rejected.
pub struct Bearer(pub IncomingToken);

#[async_trait]
impl<S> FromRequestParts<S> for Bearer
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(Error::NoTokenProvided)?
            .to_str()
            .map_err(|_| Error::NoTokenProvided)?;
        let token = header.strip_prefix("Bearer ").unwrap_or(header);
        Ok(Bearer(IncomingToken::new(token)?))
    }
}
