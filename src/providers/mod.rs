//! Identity provider abstraction.
//!
//! Each OAuth2 identity provider implements the [`IdentityProvider`]
//! trait, which defines the two operations the login and link flows
//! need: building the provider's authorize redirect URL, and turning
//! an authorization code into the set of remote identities it proves
//! ownership of.

mod globus;
mod google;

pub use globus::GlobusProvider;
pub use google::GoogleProvider;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::models::RemoteIdentity;

/// Static configuration for one identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Provider name; must match the implementation's declared name
    /// (case-sensitive).
    pub name: String,
    /// Base URL for the human-facing authorize endpoint.
    pub login_base_url: Url,
    /// Base URL for the provider's API (token exchange, identity fetch).
    pub api_base_url: Url,
    pub client_id: String,
    pub client_secret: String,
    /// Image shown next to the provider in login UIs.
    pub image_uri: String,
    /// Redirect target for login flows.
    pub login_redirect_url: Url,
    /// Redirect target for link flows.
    pub link_redirect_url: Url,
    /// Provider-specific key/value options.
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

impl ProviderConfig {
    /// A custom option interpreted as a boolean flag.
    pub fn custom_flag(&self, key: &str) -> bool {
        self.custom
            .get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

/// Core trait for OAuth2 identity providers.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Unique, case-sensitive provider name (e.g. "Globus").
    fn name(&self) -> &str;

    /// Image URI for login UIs.
    fn image_uri(&self) -> &str;

    /// Build the authorize redirect URL carrying the opaque `state`.
    /// `link` selects the link redirect target over the login one.
    fn login_url(&self, state: &str, link: bool) -> Result<Url>;

    /// Exchange an authorization code for the set of remote identities
    /// it authenticates.
    async fn get_identities(&self, authcode: &str, link: bool) -> Result<HashSet<RemoteIdentity>>;
}

/// Registry of configured identity providers, frozen after construction.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Build a registry from provider configurations, dispatching on
    /// the configured name.
    pub fn from_configs(configs: Vec<ProviderConfig>) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            let provider: Arc<dyn IdentityProvider> = match config.name.as_str() {
                globus::PROVIDER_NAME => Arc::new(GlobusProvider::new(config)?),
                google::PROVIDER_NAME => Arc::new(GoogleProvider::new(config)?),
                other => {
                    return Err(Error::ConfigMapping(format!(
                        "No identity provider implementation for {}",
                        other
                    )))
                }
            };
            registry.register(provider)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn IdentityProvider>) -> Result<()> {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            return Err(Error::ConfigMapping(format!(
                "Duplicate identity provider: {}",
                name
            )));
        }
        self.providers.insert(name, provider);
        Ok(())
    }

    /// Look up a provider by exact name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn IdentityProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoSuchProvider(name.to_string()))
    }

    /// All registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an authorize URL of the common OAuth2 shape shared by the
/// provider implementations. Parameter order is fixed; scopes are
/// individually percent-encoded and joined with `+`.
fn build_authorize_url(
    base: &Url,
    path: &str,
    scopes: &[&str],
    state: &str,
    redirect: &Url,
    client_id: &str,
) -> Result<Url> {
    let scope = scopes
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("+");
    let raw = format!(
        "{}{}?scope={}&state={}&redirect_uri={}&response_type=code&client_id={}",
        base.as_str().trim_end_matches('/'),
        path,
        scope,
        urlencoding::encode(state),
        urlencoding::encode(redirect.as_str().trim_end_matches('/')),
        urlencoding::encode(client_id),
    );
    Url::parse(&raw).map_err(|e| Error::Internal(format!("constructed invalid URL {}: {}", raw, e)))
}

#[cfg(test)]
pub(crate) fn test_config(name: &str, base: &str) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        login_base_url: Url::parse(base).unwrap(),
        api_base_url: Url::parse(base).unwrap(),
        client_id: "foo".to_string(),
        client_secret: "bar".to_string(),
        image_uri: "/img/provider.png".to_string(),
        login_redirect_url: Url::parse("https://loginredir.com").unwrap(),
        link_redirect_url: Url::parse("https://linkredir.com").unwrap(),
        custom: HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let mut registry = ProviderRegistry::new();
        let provider =
            GlobusProvider::new(test_config("Globus", "https://login.com")).unwrap();
        registry.register(Arc::new(provider)).unwrap();

        assert!(registry.get("Globus").is_ok());
        assert!(matches!(
            registry.get("globus"),
            Err(Error::NoSuchProvider(_))
        ));
        assert_eq!(registry.names(), vec!["Globus".to_string()]);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = ProviderRegistry::new();
        let make = || {
            Arc::new(GlobusProvider::new(test_config("Globus", "https://login.com")).unwrap())
        };
        registry.register(make()).unwrap();
        assert!(registry.register(make()).is_err());
    }

    #[test]
    fn test_from_configs_unknown_provider() {
        let err =
            ProviderRegistry::from_configs(vec![test_config("Mystery", "https://x.com")])
                .unwrap_err();
        assert!(matches!(err, Error::ConfigMapping(_)));
    }

    #[test]
    fn test_custom_flag() {
        let mut config = test_config("Globus", "https://login.com");
        assert!(!config.custom_flag("ignore-secondary-identities"));
        config
            .custom
            .insert("ignore-secondary-identities".to_string(), "True".to_string());
        assert!(config.custom_flag("ignore-secondary-identities"));
    }
}
