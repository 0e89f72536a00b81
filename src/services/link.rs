//! OAuth2 identity linking.
//!
//! Adds remote identities to an existing (non-local) account. Like
//! login, the flow defers to a user choice through a temporary token
//! whenever the result is ambiguous, and the choice is re-validated
//! when it lands since another account may have claimed an identity
//! in the meantime.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    AuthUser, IncomingToken, LinkedIdentity, RemoteIdentity, TemporaryToken, UserName,
};
use crate::providers::{IdentityProvider, ProviderRegistry};
use crate::services::{resolve_user, Crypto, SettingsCache};
use crate::storage::Storage;

/// Lifetime of a deferred link continuation.
const LINK_TEMP_LIFETIME_MS: u64 = 10 * 60 * 1000;

/// Outcome of presenting an authorization code in link mode.
#[derive(Debug)]
pub enum LinkResult {
    /// A single candidate was linked immediately.
    Linked,
    /// A choice (or an "everything is already linked" notice) is
    /// pending behind the temporary token.
    Deferred(TemporaryToken),
}

/// One linkable identity for the choice UI.
#[derive(Debug, Clone, Serialize)]
pub struct LinkCandidate {
    pub local_id: Uuid,
    pub provider_username: Option<String>,
}

/// The state of a deferred link.
#[derive(Debug, Clone, Serialize)]
pub struct LinkState {
    pub provider: String,
    pub user: UserName,
    pub identities: Vec<LinkCandidate>,
}

#[derive(Clone)]
pub struct LinkService {
    storage: Arc<dyn Storage>,
    settings: SettingsCache,
    registry: Arc<ProviderRegistry>,
    crypto: Crypto,
}

impl LinkService {
    pub fn new(
        storage: Arc<dyn Storage>,
        settings: SettingsCache,
        registry: Arc<ProviderRegistry>,
        crypto: Crypto,
    ) -> Self {
        Self {
            storage,
            settings,
            registry,
            crypto,
        }
    }

    async fn provider(&self, name: &str) -> Result<Arc<dyn IdentityProvider>> {
        let settings = self.settings.get().await?;
        if !settings.provider_enabled(name) {
            return Err(Error::NoSuchProvider(name.to_string()));
        }
        self.registry.get(name)
    }

    /// Build the provider redirect URL that starts a link flow.
    pub async fn link_redirect_url(&self, provider_name: &str, state: &str) -> Result<url::Url> {
        self.provider(provider_name).await?.login_url(state, true)
    }

    async fn linkable_user(&self, token: &IncomingToken) -> Result<AuthUser> {
        let (_, user) = resolve_user(&self.storage, token).await?;
        if user.is_local() {
            return Err(Error::LinkFailed(
                "Cannot link identities to a local user".to_string(),
            ));
        }
        Ok(user)
    }

    /// Process an authorization code in link mode.
    pub async fn link(
        &self,
        token: &IncomingToken,
        provider_name: &str,
        authcode: &str,
    ) -> Result<LinkResult> {
        let user = self.linkable_user(token).await?;
        let provider = self.provider(provider_name).await?;
        let authcode = authcode.trim();
        if authcode.is_empty() {
            return Err(Error::MissingParameter("authorization code".to_string()));
        }

        let identities = provider.get_identities(authcode, true).await?;

        // Drop identities that are linked to any account already.
        let mut candidates: Vec<RemoteIdentity> = Vec::new();
        for identity in identities {
            if self
                .storage
                .get_user_by_identity(&identity.id)
                .await?
                .is_none()
            {
                candidates.push(identity);
            }
        }

        let force_choice = self
            .settings
            .get()
            .await?
            .provider(provider_name)
            .map(|p| p.force_link_choice)
            .unwrap_or(false);

        if candidates.len() == 1 && !force_choice {
            let identity = candidates
                .into_iter()
                .next()
                .expect("exactly one candidate")
                .with_local_id();
            self.storage
                .link_identity(&user.user_name, &identity)
                .await?;
            info!(user = %user.user_name, provider = provider_name, "Linked identity");
            return Ok(LinkResult::Linked);
        }

        // Defer, including the zero-candidate case so the UI can
        // surface "already linked".
        let stored: Vec<LinkedIdentity> = candidates
            .into_iter()
            .map(RemoteIdentity::with_local_id)
            .collect();
        let temp = TemporaryToken::new(self.crypto.generate_token(), LINK_TEMP_LIFETIME_MS);
        self.storage
            .store_temporary_identities(&temp.hash(), provider_name, &stored, temp.expires)
            .await?;
        debug!(
            user = %user.user_name,
            provider = provider_name,
            candidates = stored.len(),
            "Deferred link"
        );
        Ok(LinkResult::Deferred(temp))
    }

    /// The candidates behind a deferred link.
    pub async fn link_state(
        &self,
        token: &IncomingToken,
        link_token: &IncomingToken,
    ) -> Result<LinkState> {
        let user = self.linkable_user(token).await?;
        let stored = self
            .storage
            .get_temporary_identities(&link_token.hash())
            .await?;

        // Candidates may have been claimed since the flow deferred.
        let mut identities = Vec::new();
        for linked in stored.identities {
            if self
                .storage
                .get_user_by_identity(&linked.identity.id)
                .await?
                .is_none()
            {
                identities.push(LinkCandidate {
                    local_id: linked.local_id,
                    provider_username: linked.identity.details.username.clone(),
                });
            }
        }

        if identities.is_empty() {
            return Err(Error::LinkFailed(
                "All provided identities are already linked".to_string(),
            ));
        }

        Ok(LinkState {
            provider: stored.provider,
            user: user.user_name,
            identities,
        })
    }

    /// Commit one chosen candidate from a deferred link.
    pub async fn pick_link(
        &self,
        token: &IncomingToken,
        link_token: &IncomingToken,
        identity_id: Uuid,
    ) -> Result<()> {
        let user = self.linkable_user(token).await?;
        let stored = self
            .storage
            .get_temporary_identities(&link_token.hash())
            .await?;

        let identity = stored
            .identities
            .into_iter()
            .find(|i| i.local_id == identity_id)
            .ok_or_else(|| {
                Error::Unauthorized(
                    "Not authorized to link the provided identity ID".to_string(),
                )
            })?;

        self.storage.link_identity(&user.user_name, &identity).await?;
        info!(user = %user.user_name, provider = %stored.provider, "Linked chosen identity");
        Ok(())
    }

    /// Remove a linked identity from the presenting user.
    pub async fn unlink(&self, token: &IncomingToken, identity_id: Uuid) -> Result<()> {
        let (_, user) = resolve_user(&self.storage, token).await?;
        if user.is_local() {
            return Err(Error::UnlinkFailed(
                "Local users have no remote identities".to_string(),
            ));
        }
        self.storage.unlink_identity(&user.user_name, identity_id).await?;
        info!(user = %user.user_name, "Unlinked identity");
        Ok(())
    }
}
