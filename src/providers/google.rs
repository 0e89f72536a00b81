//! Google identity provider.
//!
//! A Google login proves ownership of exactly one identity, reported
//! by the userinfo endpoint. Google takes the client credentials in
//! the token-exchange body rather than a Basic auth header.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::models::{RemoteIdentity, RemoteIdentityDetails, RemoteIdentityId};
use crate::providers::{build_authorize_url, IdentityProvider, ProviderConfig};

pub const PROVIDER_NAME: &str = "Google";

const SCOPES: &[&str] = &["profile", "email"];

#[derive(Debug)]
pub struct GoogleProvider {
    config: ProviderConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

impl GoogleProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.name != PROVIDER_NAME {
            return Err(Error::IllegalParameter(format!(
                "Bad config name: {}",
                config.name
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Ok(Self { config, client })
    }

    fn retrieval_err(&self, message: impl Into<String>) -> Error {
        Error::IdentityRetrieval {
            provider: PROVIDER_NAME.to_string(),
            message: message.into(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.config.api_base_url.as_str().trim_end_matches('/'),
            path
        )
    }

    async fn exchange_code(&self, authcode: &str, redirect: &Url) -> Result<String> {
        let response = self
            .client
            .post(self.api_url("/oauth2/v4/token"))
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("code", authcode),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect.as_str().trim_end_matches('/')),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
            ])
            .send()
            .await
            .map_err(|e| self.retrieval_err(format!("Token exchange request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.retrieval_err(format!(
                "Token exchange returned HTTP {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| self.retrieval_err(format!("Unparseable token response: {}", e)))?;

        match token.access_token {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(self.retrieval_err(format!(
                "No access token was returned by {}",
                PROVIDER_NAME
            ))),
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn image_uri(&self) -> &str {
        &self.config.image_uri
    }

    fn login_url(&self, state: &str, link: bool) -> Result<Url> {
        let redirect = if link {
            &self.config.link_redirect_url
        } else {
            &self.config.login_redirect_url
        };
        build_authorize_url(
            &self.config.login_base_url,
            "/o/oauth2/v2/auth",
            SCOPES,
            state,
            redirect,
            &self.config.client_id,
        )
    }

    async fn get_identities(&self, authcode: &str, link: bool) -> Result<HashSet<RemoteIdentity>> {
        let authcode = authcode.trim();
        if authcode.is_empty() {
            return Err(Error::IllegalParameter(
                "authcode cannot be null or empty".to_string(),
            ));
        }

        let redirect = if link {
            &self.config.link_redirect_url
        } else {
            &self.config.login_redirect_url
        };
        let access_token = self.exchange_code(authcode, redirect).await?;

        let response = self
            .client
            .get(self.api_url("/oauth2/v3/userinfo"))
            .bearer_auth(&access_token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.retrieval_err(format!("Userinfo request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.retrieval_err(format!(
                "Userinfo returned HTTP {}",
                response.status()
            )));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| self.retrieval_err(format!("Unparseable userinfo response: {}", e)))?;

        let sub = match info.sub {
            Some(sub) if !sub.trim().is_empty() => sub,
            _ => {
                return Err(self.retrieval_err(format!(
                    "No ID provided in response from {}",
                    PROVIDER_NAME
                )))
            }
        };

        Ok([RemoteIdentity::new(
            RemoteIdentityId::new(PROVIDER_NAME, &sub),
            RemoteIdentityDetails::new(
                info.email.as_deref(),
                info.name.as_deref(),
                info.email.as_deref(),
            ),
        )]
        .into_iter()
        .collect())
    }
}
