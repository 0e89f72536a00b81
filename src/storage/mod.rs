//! Persistence contract for the authentication engine.
//!
//! The engine consumes storage through the [`Storage`] trait and holds
//! no user state of its own across requests. Each method is atomic on
//! its own; the engine assumes no cross-operation transactions.
//!
//! Token and temporary-token lookups always take the SHA-256 hash of
//! the plaintext, never the plaintext itself.

mod sqlite;

pub use sqlite::SqliteStorage;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AuthSettings, AuthSettingsUpdate, AuthUser, CustomRole, DisplayName, HashedToken,
    LinkedIdentity, LocalUser, RemoteIdentityId, Role, UserDisabledState, UserName,
};

/// Search criteria for display-name queries.
#[derive(Debug, Clone, Default)]
pub struct UserSearchSpec {
    /// Case-insensitive prefix on user name or display name.
    pub prefix: Option<String>,
    /// Restrict to users holding any of these roles.
    pub roles: HashSet<Role>,
    /// Restrict to users holding any of these custom roles.
    pub custom_roles: HashSet<String>,
}

impl UserSearchSpec {
    pub fn has_role_filters(&self) -> bool {
        !self.roles.is_empty() || !self.custom_roles.is_empty()
    }
}

/// Identities parked under a temporary token while a login or link
/// flow waits for a user choice.
#[derive(Debug, Clone)]
pub struct TemporaryIdentities {
    pub provider: String,
    pub identities: Vec<LinkedIdentity>,
    pub expires: DateTime<Utc>,
}

/// The persistence operations the engine requires.
#[async_trait]
pub trait Storage: Send + Sync {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Create a standard (identity-linked) user.
    ///
    /// Fails with `UserExists` if the name is taken and with
    /// `IdentityLinked` if any of the user's identities is already
    /// linked to another account.
    async fn create_user(&self, user: &AuthUser) -> Result<()>;

    /// Create a local (password) user. Fails with `UserExists` if the
    /// name is taken.
    async fn create_local_user(&self, user: &LocalUser) -> Result<()>;

    async fn get_user(&self, name: &UserName) -> Result<AuthUser>;

    /// Fetch a local user including credentials. Fails with
    /// `NoSuchLocalUser` for standard users.
    async fn get_local_user(&self, name: &UserName) -> Result<LocalUser>;

    /// Look up the user linked to a remote identity, if any.
    async fn get_user_by_identity(&self, id: &RemoteIdentityId) -> Result<Option<AuthUser>>;

    async fn set_last_login(&self, name: &UserName, when: DateTime<Utc>) -> Result<()>;

    // ------------------------------------------------------------------
    // Passwords
    // ------------------------------------------------------------------

    /// Replace a local user's credentials and force-reset flag, and
    /// record the reset time.
    async fn change_password(
        &self,
        name: &UserName,
        password_hash: &[u8],
        salt: &[u8],
        force_reset: bool,
    ) -> Result<()>;

    async fn force_password_reset(&self, name: &UserName) -> Result<()>;

    /// Force a reset for every local user.
    async fn force_password_reset_all(&self) -> Result<()>;

    // ------------------------------------------------------------------
    // Account state
    // ------------------------------------------------------------------

    async fn set_user_disabled_state(
        &self,
        name: &UserName,
        state: &UserDisabledState,
    ) -> Result<()>;

    // ------------------------------------------------------------------
    // Remote identities
    // ------------------------------------------------------------------

    /// Link an identity to a standard user.
    ///
    /// Fails with `IdentityLinked` if the identity is linked to any
    /// account and `LinkFailed` for local users.
    async fn link_identity(&self, name: &UserName, identity: &LinkedIdentity) -> Result<()>;

    /// Remove an identity from a user.
    ///
    /// Refuses with `UnlinkFailed` to leave a standard user with zero
    /// identities; fails with `NoSuchIdentity` if the user does not
    /// have the identity.
    async fn unlink_identity(&self, name: &UserName, id: Uuid) -> Result<()>;

    // ------------------------------------------------------------------
    // Display names
    // ------------------------------------------------------------------

    /// Resolve display names for the given users, silently dropping
    /// names that do not exist.
    async fn get_display_names(
        &self,
        names: &HashSet<UserName>,
    ) -> Result<HashMap<UserName, DisplayName>>;

    /// Search users by spec, capped at `limit` results.
    async fn search_display_names(
        &self,
        spec: &UserSearchSpec,
        limit: usize,
    ) -> Result<HashMap<UserName, DisplayName>>;

    /// All user names consisting of the given stem followed only by
    /// digits (used for username suggestion).
    async fn user_names_with_stem(&self, stem: &str) -> Result<Vec<UserName>>;

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    async fn update_roles(
        &self,
        name: &UserName,
        add: &HashSet<Role>,
        remove: &HashSet<Role>,
    ) -> Result<()>;

    /// Create or update a custom role definition.
    async fn set_custom_role(&self, role: &CustomRole) -> Result<()>;

    /// Delete a custom role and remove it from every user holding it.
    async fn delete_custom_role(&self, id: &str) -> Result<()>;

    async fn get_custom_roles(&self) -> Result<Vec<CustomRole>>;

    /// Add/remove custom roles on a user. Unknown role ids fail with
    /// `NoSuchRole`.
    async fn update_custom_roles(
        &self,
        name: &UserName,
        add: &HashSet<String>,
        remove: &HashSet<String>,
    ) -> Result<()>;

    // ------------------------------------------------------------------
    // Tokens
    // ------------------------------------------------------------------

    async fn store_token(&self, token: &HashedToken) -> Result<()>;

    /// Look up a live token by hash. Expired or missing tokens fail
    /// with `NoSuchToken`.
    async fn get_token(&self, token_hash: &str) -> Result<HashedToken>;

    async fn get_tokens(&self, name: &UserName) -> Result<Vec<HashedToken>>;

    /// Delete one of a user's tokens by id.
    async fn delete_token(&self, name: &UserName, id: Uuid) -> Result<()>;

    /// Delete all of a user's tokens.
    async fn delete_tokens(&self, name: &UserName) -> Result<()>;

    /// Delete every token in the system.
    async fn delete_all_tokens(&self) -> Result<()>;

    // ------------------------------------------------------------------
    // Temporary login/link state
    // ------------------------------------------------------------------

    async fn store_temporary_identities(
        &self,
        token_hash: &str,
        provider: &str,
        identities: &[LinkedIdentity],
        expires: DateTime<Utc>,
    ) -> Result<()>;

    /// Look up a live temporary session by token hash. Expired or
    /// missing sessions fail with `InvalidToken`.
    async fn get_temporary_identities(&self, token_hash: &str) -> Result<TemporaryIdentities>;

    async fn delete_temporary_identities(&self, token_hash: &str) -> Result<()>;

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    async fn get_settings(&self) -> Result<AuthSettings>;

    /// Apply a settings update. With `overwrite` false only keys with
    /// no stored value are written (used to seed defaults); with
    /// `overwrite` true the provided keys replace stored values.
    async fn update_settings(&self, update: &AuthSettingsUpdate, overwrite: bool) -> Result<()>;
}
