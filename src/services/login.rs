//! OAuth2 login state machine.
//!
//! A login starts with a redirect to the provider and comes back as an
//! authorization code. When the code resolves to exactly one linked,
//! loginable account the flow completes immediately with a login
//! token. Every other case (unlinked identities, several accounts,
//! login disabled, disabled account) is deferred: the identity set is
//! parked in storage under a short-lived temporary token and re-raised
//! once the UI controls the flow.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    AuthUser, DisplayName, EmailAddress, IncomingToken, LinkedIdentity, NewToken, RemoteIdentity,
    TemporaryToken, UserDisabledState, UserName, MAX_NAME_LENGTH,
};
use crate::providers::{IdentityProvider, ProviderRegistry};
use crate::services::{Crypto, SettingsCache, TokenService};
use crate::storage::Storage;

/// Lifetime of a deferred login continuation.
const LOGIN_TEMP_LIFETIME_MS: u64 = 30 * 60 * 1000;

/// Outcome of presenting an authorization code.
#[derive(Debug)]
pub enum LoginResult {
    LoggedIn(NewToken),
    /// The flow needs a user choice; the temporary token continues it.
    Deferred(TemporaryToken),
}

/// One identity in a deferred login, classified for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct LoginStateIdentity {
    pub local_id: Uuid,
    pub provider_username: Option<String>,
    /// The account this identity is linked to, if any. `None` means
    /// the identity is available for account creation.
    pub user: Option<UserName>,
}

/// The state of a deferred login, for rendering the choice UI.
#[derive(Debug, Clone, Serialize)]
pub struct LoginState {
    pub provider: String,
    pub login_allowed: bool,
    pub identities: Vec<LoginStateIdentity>,
}

/// A provider entry for login UIs.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub image_uri: String,
}

#[derive(Clone)]
pub struct LoginService {
    storage: Arc<dyn Storage>,
    settings: SettingsCache,
    tokens: TokenService,
    registry: Arc<ProviderRegistry>,
    crypto: Crypto,
}

impl LoginService {
    pub fn new(
        storage: Arc<dyn Storage>,
        settings: SettingsCache,
        tokens: TokenService,
        registry: Arc<ProviderRegistry>,
        crypto: Crypto,
    ) -> Self {
        Self {
            storage,
            settings,
            tokens,
            registry,
            crypto,
        }
    }

    /// Resolve a provider, treating disabled providers as unknown.
    pub(crate) async fn provider(&self, name: &str) -> Result<Arc<dyn IdentityProvider>> {
        let settings = self.settings.get().await?;
        if !settings.provider_enabled(name) {
            return Err(Error::NoSuchProvider(name.to_string()));
        }
        self.registry.get(name)
    }

    /// Build the provider redirect URL that starts a login.
    pub async fn login_redirect_url(&self, provider_name: &str, state: &str) -> Result<url::Url> {
        self.provider(provider_name).await?.login_url(state, false)
    }

    /// Mint an opaque state value for a new OAuth2 flow.
    pub fn mint_state(&self) -> String {
        self.crypto.generate_token()
    }

    /// The providers currently available for login.
    pub async fn providers(&self) -> Result<Vec<ProviderInfo>> {
        let settings = self.settings.get().await?;
        let mut list = Vec::new();
        for name in self.registry.names() {
            if settings.provider_enabled(&name) {
                let provider = self.registry.get(&name)?;
                list.push(ProviderInfo {
                    name,
                    image_uri: provider.image_uri().to_string(),
                });
            }
        }
        Ok(list)
    }

    /// Process the authorization code returned by a provider.
    pub async fn login(&self, provider_name: &str, authcode: &str) -> Result<LoginResult> {
        let provider = self.provider(provider_name).await?;
        let authcode = authcode.trim();
        if authcode.is_empty() {
            return Err(Error::MissingParameter("authorization code".to_string()));
        }

        let identities = provider.get_identities(authcode, false).await?;
        let settings = self.settings.get().await?;

        // Partition into identities with and without a linked account.
        let mut unlinked: Vec<RemoteIdentity> = Vec::new();
        let mut linked: Vec<LinkedIdentity> = Vec::new();
        let mut users: HashMap<UserName, AuthUser> = HashMap::new();
        for identity in identities {
            match self.storage.get_user_by_identity(&identity.id).await? {
                Some(user) => {
                    let stored = user
                        .identities
                        .iter()
                        .find(|i| i.identity.id == identity.id)
                        .cloned()
                        .ok_or_else(|| {
                            Error::Internal(format!(
                                "User {} lost identity {:?} mid-lookup",
                                user.user_name, identity.id
                            ))
                        })?;
                    linked.push(stored);
                    users.insert(user.user_name.clone(), user);
                }
                None => unlinked.push(identity),
            }
        }

        let force_choice = settings
            .provider(provider_name)
            .map(|p| p.force_login_choice)
            .unwrap_or(false);

        if users.len() == 1 && unlinked.is_empty() && !force_choice {
            let user = users.into_values().next().expect("exactly one user");
            if (settings.login_allowed || user.is_admin()) && !user.is_disabled() {
                let token = self.tokens.create_login_token(&user.user_name).await?;
                return Ok(LoginResult::LoggedIn(token));
            }
        }

        // Defer: park the identity set under a temporary token. Fresh
        // UUIDs are minted for unlinked identities; linked ones keep
        // their stored UUIDs.
        let mut stored: Vec<LinkedIdentity> = unlinked
            .into_iter()
            .map(RemoteIdentity::with_local_id)
            .collect();
        stored.extend(linked);

        let temp = TemporaryToken::new(self.crypto.generate_token(), LOGIN_TEMP_LIFETIME_MS);
        self.storage
            .store_temporary_identities(&temp.hash(), provider_name, &stored, temp.expires)
            .await?;
        debug!(provider = provider_name, identities = stored.len(), "Deferred login");
        Ok(LoginResult::Deferred(temp))
    }

    /// Classify the identities behind a deferred login for the UI.
    pub async fn login_state(&self, token: &IncomingToken) -> Result<LoginState> {
        let stored = self.storage.get_temporary_identities(&token.hash()).await?;
        let settings = self.settings.get().await?;

        let mut identities = Vec::with_capacity(stored.identities.len());
        for linked in stored.identities {
            let user = self
                .storage
                .get_user_by_identity(&linked.identity.id)
                .await?;
            identities.push(LoginStateIdentity {
                local_id: linked.local_id,
                provider_username: linked.identity.details.username.clone(),
                user: user.map(|u| u.user_name),
            });
        }

        Ok(LoginState {
            provider: stored.provider,
            login_allowed: settings.login_allowed,
            identities,
        })
    }

    /// Create an account linked to one identity of a deferred login
    /// and complete the login.
    pub async fn create_user(
        &self,
        token: &IncomingToken,
        identity_id: Uuid,
        user_name: UserName,
        display_name: DisplayName,
        email: EmailAddress,
    ) -> Result<NewToken> {
        let settings = self.settings.get().await?;
        if !settings.login_allowed {
            return Err(Error::Unauthorized("Account creation is disabled".to_string()));
        }
        if user_name.is_root() {
            return Err(Error::Unauthorized("Cannot create ROOT user".to_string()));
        }

        let stored = self.storage.get_temporary_identities(&token.hash()).await?;
        let identity = stored
            .identities
            .into_iter()
            .find(|i| i.local_id == identity_id)
            .ok_or_else(|| {
                Error::Unauthorized(
                    "Not authorized to create a user linked to the provided identity ID"
                        .to_string(),
                )
            })?;

        if self
            .storage
            .get_user_by_identity(&identity.identity.id)
            .await?
            .is_some()
        {
            return Err(Error::Unauthorized(
                "The provided identity is already linked to a user".to_string(),
            ));
        }

        let user = AuthUser {
            user_name: user_name.clone(),
            email,
            display_name,
            roles: HashSet::new(),
            custom_roles: HashSet::new(),
            policy_ids: HashSet::new(),
            created: chrono::Utc::now(),
            last_login: None,
            disabled: UserDisabledState::Enabled,
            identities: [identity].into_iter().collect(),
            local: false,
        };
        self.storage.create_user(&user).await?;

        info!(user = %user_name, provider = %stored.provider, "Created user from login flow");
        self.tokens.create_login_token(&user_name).await
    }

    /// Complete a deferred login with a chosen identity.
    ///
    /// Policy is re-checked here: roles, enablement, and the global
    /// login switch may all have changed while the flow waited.
    pub async fn complete_login(
        &self,
        token: &IncomingToken,
        identity_id: Uuid,
    ) -> Result<NewToken> {
        let stored = self.storage.get_temporary_identities(&token.hash()).await?;
        let identity = stored
            .identities
            .into_iter()
            .find(|i| i.local_id == identity_id)
            .ok_or_else(|| {
                Error::Unauthorized(
                    "Not authorized to login with the provided identity ID".to_string(),
                )
            })?;

        let user = self
            .storage
            .get_user_by_identity(&identity.identity.id)
            .await?
            .ok_or_else(|| {
                Error::AuthenticationFailed(
                    "There is no account linked to the provided identity ID".to_string(),
                )
            })?;

        let settings = self.settings.get().await?;
        if !settings.login_allowed && !user.is_admin() {
            return Err(Error::Unauthorized("Non-admin login is disabled".to_string()));
        }
        if user.is_disabled() {
            return Err(Error::Disabled(user.user_name.to_string()));
        }

        self.tokens.create_login_token(&user.user_name).await
    }

    /// Suggest an available user name based on raw input.
    ///
    /// The input is sanitized (falling back to `user`), trailing
    /// digits are stripped to a stem, and the first free numeric
    /// suffix above the largest taken one is appended when the bare
    /// suggestion is taken. Returns None when no legal name fits.
    pub async fn suggest_username(&self, suggestion: &str) -> Result<Option<UserName>> {
        let name = UserName::sanitize(suggestion)
            .unwrap_or_else(|| UserName::sanitize("user").expect("static name sanitizes"));

        let stem = name.as_str().trim_end_matches(|c: char| c.is_ascii_digit());
        let digits_stripped = stem.len() != name.as_str().len();

        let existing = self.storage.user_names_with_stem(stem).await?;
        let taken = existing.iter().any(|n| n == &name);

        if !taken && !digits_stripped {
            return Ok(Some(name));
        }

        let largest = existing
            .iter()
            .map(|n| {
                let suffix = &n.as_str()[stem.len()..];
                if suffix.is_empty() {
                    0
                } else {
                    suffix.parse::<u64>().unwrap_or(u64::MAX)
                }
            })
            .max()
            .unwrap_or(0);

        let candidate = format!("{}{}", stem, largest.saturating_add(1));
        if candidate.len() > MAX_NAME_LENGTH {
            return Ok(None);
        }
        Ok(UserName::sanitize(&candidate))
    }
}

#[cfg(test)]
pub(crate) mod test_provider {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// An in-memory provider returning a preset identity set.
    pub struct TestProvider {
        pub name: String,
        pub identities: Mutex<HashSet<RemoteIdentity>>,
    }

    impl TestProvider {
        pub fn new(name: &str, identities: impl IntoIterator<Item = RemoteIdentity>) -> Self {
            Self {
                name: name.to_string(),
                identities: Mutex::new(identities.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for TestProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn image_uri(&self) -> &str {
            "/img/test.png"
        }

        fn login_url(&self, state: &str, _link: bool) -> Result<url::Url> {
            Ok(url::Url::parse(&format!("https://test.example.com/auth?state={}", state)).unwrap())
        }

        async fn get_identities(
            &self,
            authcode: &str,
            _link: bool,
        ) -> Result<HashSet<RemoteIdentity>> {
            if authcode.trim().is_empty() {
                return Err(Error::IllegalParameter(
                    "authcode cannot be null or empty".to_string(),
                ));
            }
            Ok(self.identities.lock().unwrap().clone())
        }
    }
}
