//! Server-wide authentication settings.
//!
//! These are the mutable policy knobs stored alongside the user data:
//! whether non-admin login is allowed at all, per-provider switches,
//! and token lifetimes. The engine reads them through the settings
//! cache rather than hitting storage on every request.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Token lifetime classes, in milliseconds when looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenLifetime {
    Login,
    Dev,
    Serv,
    ExtCache,
}

impl TokenLifetime {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenLifetime::Login => "LOGIN",
            TokenLifetime::Dev => "DEV",
            TokenLifetime::Serv => "SERV",
            TokenLifetime::ExtCache => "EXT_CACHE",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "LOGIN" => Ok(TokenLifetime::Login),
            "DEV" => Ok(TokenLifetime::Dev),
            "SERV" => Ok(TokenLifetime::Serv),
            "EXT_CACHE" => Ok(TokenLifetime::ExtCache),
            _ => Err(Error::Internal(format!("unknown token lifetime: {}", s))),
        }
    }

    /// Default lifetime in milliseconds.
    pub fn default_ms(&self) -> u64 {
        const DAY: u64 = 24 * 60 * 60 * 1000;
        match self {
            TokenLifetime::Login => 14 * DAY,
            TokenLifetime::Dev => 90 * DAY,
            TokenLifetime::Serv => 100_000 * DAY,
            TokenLifetime::ExtCache => 5 * 60 * 1000,
        }
    }

    pub fn all() -> &'static [TokenLifetime] {
        &[
            TokenLifetime::Login,
            TokenLifetime::Dev,
            TokenLifetime::Serv,
            TokenLifetime::ExtCache,
        ]
    }
}

/// Per-provider policy switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Whether the provider is available to external callers.
    pub enabled: bool,
    /// Always defer login completion to a user choice, even when
    /// exactly one account matches.
    pub force_login_choice: bool,
    /// Always defer link completion to a user choice, even when
    /// exactly one candidate identity remains.
    pub force_link_choice: bool,
}

/// The full stored settings set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Whether non-administrators may log in or create accounts.
    pub login_allowed: bool,
    pub providers: HashMap<String, ProviderSettings>,
    pub lifetimes: HashMap<TokenLifetime, u64>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        let lifetimes = TokenLifetime::all()
            .iter()
            .map(|lt| (*lt, lt.default_ms()))
            .collect();
        Self {
            // An admin must enable general login explicitly.
            login_allowed: false,
            providers: HashMap::new(),
            lifetimes,
        }
    }
}

impl AuthSettings {
    /// Lifetime for a token class, falling back to the built-in default.
    pub fn lifetime_ms(&self, lifetime: TokenLifetime) -> u64 {
        self.lifetimes
            .get(&lifetime)
            .copied()
            .unwrap_or_else(|| lifetime.default_ms())
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.get(name)
    }

    /// Whether a provider exists in the settings and is enabled.
    pub fn provider_enabled(&self, name: &str) -> bool {
        self.provider(name).map(|p| p.enabled).unwrap_or(false)
    }

    /// Convert to an update writing every field.
    pub fn as_update(&self) -> AuthSettingsUpdate {
        AuthSettingsUpdate {
            login_allowed: Some(self.login_allowed),
            providers: self.providers.clone(),
            lifetimes: self.lifetimes.clone(),
        }
    }
}

/// A partial settings write. Fields left unset are not touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettingsUpdate {
    pub login_allowed: Option<bool>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
    #[serde(default)]
    pub lifetimes: HashMap<TokenLifetime, u64>,
}
