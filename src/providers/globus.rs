//! Globus identity provider.
//!
//! Implements the Globus Auth OAuth2 flow: authorize redirect, token
//! exchange, token introspection, and hydration of secondary linked
//! identities. One Globus login can prove ownership of several
//! identities; all of them are returned.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::models::{RemoteIdentity, RemoteIdentityDetails, RemoteIdentityId};
use crate::providers::{build_authorize_url, IdentityProvider, ProviderConfig};

pub const PROVIDER_NAME: &str = "Globus";

const SCOPES: &[&str] = &[
    "urn:globus:auth:scope:auth.globus.org:view_identities",
    "email",
];

/// Custom config key suppressing the secondary-identity fetch.
const IGNORE_SECONDARY_IDENTITIES: &str = "ignore-secondary-identities";

#[derive(Debug)]
pub struct GlobusProvider {
    config: ProviderConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IntrospectResponse {
    #[serde(default)]
    aud: Vec<String>,
    sub: String,
    username: Option<String>,
    name: Option<String>,
    email: Option<String>,
    #[serde(default)]
    identities_set: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SecondaryIdentities {
    identities: Vec<SecondaryIdentity>,
}

#[derive(Debug, Deserialize)]
struct SecondaryIdentity {
    id: String,
    username: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

impl GlobusProvider {
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

    /// Exchange an authorization code for an access token.
    async fn exchange_code(&self, authcode: &str, redirect: &Url) -> Result<String> {
        let response = self
            .client
            .post(self.api_url("/v2/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("code", authcode),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect.as_str().trim_end_matches('/')),
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

    /// Introspect the access token for the primary identity and the
    /// set of identity ids it covers.
    async fn introspect(&self, access_token: &str) -> Result<IntrospectResponse> {
        let response = self
            .client
            .post(self.api_url("/v2/oauth2/token/introspect"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(header::ACCEPT, "application/json")
            .form(&[("include", "identities_set"), ("token", access_token)])
            .send()
            .await
            .map_err(|e| self.retrieval_err(format!("Introspect request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.retrieval_err(format!(
                "Introspect returned HTTP {}",
                response.status()
            )));
        }

        let introspect: IntrospectResponse = response
            .json()
            .await
            .map_err(|e| self.retrieval_err(format!("Unparseable introspect response: {}", e)))?;

        if !introspect.aud.iter().any(|a| a == &self.config.client_id) {
            return Err(self.retrieval_err(format!(
                "Client ID {} is not in the audience for the {} token",
                self.config.client_id, PROVIDER_NAME
            )));
        }

        Ok(introspect)
    }

    /// Hydrate secondary identities by id.
    async fn fetch_secondary(
        &self,
        access_token: &str,
        ids: &[String],
    ) -> Result<Vec<RemoteIdentity>> {
        let response = self
            .client
            .get(self.api_url("/v2/api/identities"))
            .query(&[("ids", ids.join(","))])
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.retrieval_err(format!("Identities request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.retrieval_err(format!(
                "Identities endpoint returned HTTP {}",
                response.status()
            )));
        }

        let secondary: SecondaryIdentities = response
            .json()
            .await
            .map_err(|e| self.retrieval_err(format!("Unparseable identities response: {}", e)))?;

        Ok(secondary
            .identities
            .into_iter()
            .map(|ident| {
                RemoteIdentity::new(
                    RemoteIdentityId::new(PROVIDER_NAME, &ident.id),
                    RemoteIdentityDetails::new(
                        ident.username.as_deref(),
                        ident.name.as_deref(),
                        ident.email.as_deref(),
                    ),
                )
            })
            .collect())
    }
}

#[async_trait]
impl IdentityProvider for GlobusProvider {
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
            "/v2/oauth2/authorize",
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
        let introspect = self.introspect(&access_token).await?;

        let mut identities = HashSet::new();
        identities.insert(RemoteIdentity::new(
            RemoteIdentityId::new(PROVIDER_NAME, &introspect.sub),
            RemoteIdentityDetails::new(
                introspect.username.as_deref(),
                introspect.name.as_deref(),
                introspect.email.as_deref(),
            ),
        ));

        let mut secondary_ids: Vec<String> = introspect
            .identities_set
            .into_iter()
            .filter(|id| id != &introspect.sub && !id.trim().is_empty())
            .collect();
        secondary_ids.sort();
        secondary_ids.dedup();

        if !secondary_ids.is_empty() && !self.config.custom_flag(IGNORE_SECONDARY_IDENTITIES) {
            identities.extend(self.fetch_secondary(&access_token, &secondary_ids).await?);
        }

        debug!(
            count = identities.len(),
            "Retrieved identities from Globus"
        );
        Ok(identities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_config;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(base: &str) -> GlobusProvider {
        GlobusProvider::new(test_config("Globus", base)).unwrap()
    }

    #[test]
    fn test_login_url() {
        let provider = provider_for("https://login.com");
        let url = provider.login_url("foo2", false).unwrap();
        assert_eq!(
            url.as_str(),
            "https://login.com/v2/oauth2/authorize?scope=urn%3Aglobus%3Aauth%3Ascope%3Aauth.globus.org%3Aview_identities+email&state=foo2&redirect_uri=https%3A%2F%2Floginredir.com&response_type=code&client_id=foo"
        );
    }

    #[test]
    fn test_login_url_link_mode() {
        let provider = provider_for("https://login.com");
        let url = provider.login_url("foo3", true).unwrap();
        assert_eq!(
            url.as_str(),
            "https://login.com/v2/oauth2/authorize?scope=urn%3Aglobus%3Aauth%3Ascope%3Aauth.globus.org%3Aview_identities+email&state=foo3&redirect_uri=https%3A%2F%2Flinkredir.com&response_type=code&client_id=foo"
        );
    }

    #[test]
    fn test_bad_config_name() {
        let err = GlobusProvider::new(test_config("foo", "https://login.com")).unwrap_err();
        assert!(matches!(err, Error::IllegalParameter(msg) if msg == "Bad config name: foo"));
    }

    #[tokio::test]
    async fn test_blank_authcode() {
        let provider = provider_for("https://login.com");
        for code in ["", "   ", "\t\n"] {
            let err = provider.get_identities(code, false).await.unwrap_err();
            assert!(
                matches!(err, Error::IllegalParameter(msg) if msg == "authcode cannot be null or empty")
            );
        }
    }

    #[tokio::test]
    async fn test_no_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": null })),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        let err = provider.get_identities("authcode3", false).await.unwrap_err();
        match err {
            Error::IdentityRetrieval { provider, message } => {
                assert_eq!(provider, "Globus");
                assert_eq!(message, "No access token was returned by Globus");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_identities_with_secondaries() {
        let server = MockServer::start().await;

        // Basic base64("foo:bar")
        Mock::given(method("POST"))
            .and(path("/v2/oauth2/token"))
            .and(header("Authorization", "Basic Zm9vOmJhcg=="))
            .and(body_string_contains("code=authcode"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "footoken" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2/oauth2/token/introspect"))
            .and(body_string_contains("include=identities_set"))
            .and(body_string_contains("token=footoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "aud": ["foo"],
                "sub": "anID",
                "username": "aUsername",
                "name": "fullname",
                "email": "anEmail",
                "identities_set": ["ident1", "anID", "ident2"],
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/api/identities"))
            .and(query_param("ids", "ident1,ident2"))
            .and(header("Authorization", "Bearer footoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "identities": [
                    { "id": "id1", "username": "user1", "name": "name1", "email": null },
                    { "id": "id2", "username": "user2", "name": null, "email": "email2" },
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        let identities = provider.get_identities("authcode", false).await.unwrap();

        let expected: HashSet<RemoteIdentity> = [
            RemoteIdentity::new(
                RemoteIdentityId::new("Globus", "anID"),
                RemoteIdentityDetails::new(Some("aUsername"), Some("fullname"), Some("anEmail")),
            ),
            RemoteIdentity::new(
                RemoteIdentityId::new("Globus", "id1"),
                RemoteIdentityDetails::new(Some("user1"), Some("name1"), None),
            ),
            RemoteIdentity::new(
                RemoteIdentityId::new("Globus", "id2"),
                RemoteIdentityDetails::new(Some("user2"), None, Some("email2")),
            ),
        ]
        .into_iter()
        .collect();

        assert_eq!(identities, expected);
    }

    #[tokio::test]
    async fn test_identities_without_secondaries() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "footoken" })),
            )
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2/oauth2/token/introspect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "aud": ["foo"],
                "sub": "anID2",
                "username": "aUsername2",
                "name": null,
                "email": null,
                "identities_set": ["anID2"],
            })))
            .mount(&server)
            .await;

        // The secondaries endpoint must not be called.
        Mock::given(method("GET"))
            .and(path("/v2/api/identities"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        let identities = provider.get_identities("authcode", false).await.unwrap();

        let expected: HashSet<RemoteIdentity> = [RemoteIdentity::new(
            RemoteIdentityId::new("Globus", "anID2"),
            RemoteIdentityDetails::new(Some("aUsername2"), None, None),
        )]
        .into_iter()
        .collect();
        assert_eq!(identities, expected);
    }

    #[tokio::test]
    async fn test_secondaries_suppressed_by_config() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "footoken" })),
            )
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2/oauth2/token/introspect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "aud": ["foo"],
                "sub": "anID",
                "username": "aUsername",
                "identities_set": ["ident1", "anID"],
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/api/identities"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = test_config("Globus", &server.uri());
        config
            .custom
            .insert("ignore-secondary-identities".to_string(), "true".to_string());
        let provider = GlobusProvider::new(config).unwrap();

        let identities = provider.get_identities("authcode", false).await.unwrap();
        assert_eq!(identities.len(), 1);
    }

    #[tokio::test]
    async fn test_audience_mismatch_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "footoken" })),
            )
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2/oauth2/token/introspect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "aud": ["someoneelse"],
                "sub": "anID",
                "identities_set": [],
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        let err = provider.get_identities("authcode", false).await.unwrap_err();
        assert!(
            matches!(err, Error::IdentityRetrieval { message, .. } if message.contains("audience"))
        );
    }

    #[tokio::test]
    async fn test_upstream_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth2/token"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        let err = provider.get_identities("authcode", false).await.unwrap_err();
        assert!(matches!(err, Error::IdentityRetrieval { .. }));
    }

    #[tokio::test]
    async fn test_link_mode_uses_link_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth2/token"))
            .and(body_string_contains("redirect_uri=https%3A%2F%2Flinkredir.com"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "footoken" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth2/token/introspect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "aud": ["foo"],
                "sub": "anID",
                "identities_set": [],
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        provider.get_identities("authcode", true).await.unwrap();
    }
}
