//! Local (password) account management.
//!
//! Covers the root account bootstrap, admin-created local users with
//! forced first-login resets, password login, and password changes.
//! Plaintext password buffers are zeroized on every exit path; unknown
//! users and wrong passwords are deliberately indistinguishable to
//! callers.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::models::{
    AuthUser, DisplayName, EmailAddress, IncomingToken, LocalUser, NewToken, Role,
    UserDisabledState, UserName,
};
use crate::services::{resolve_user, Crypto, SettingsCache, TokenService};
use crate::storage::Storage;

const TEMPORARY_PASSWORD_LENGTH: usize = 10;

const MISMATCH: &str = "Username / password mismatch";

/// Outcome of a password login.
#[derive(Debug)]
pub enum LocalLoginResult {
    /// Login succeeded; the token plaintext is in the result.
    LoggedIn(NewToken),
    /// The credentials were valid but the password must be changed
    /// before a token is issued.
    ResetRequired(UserName),
}

#[derive(Clone)]
pub struct LocalAccountService {
    storage: Arc<dyn Storage>,
    settings: SettingsCache,
    tokens: TokenService,
    crypto: Crypto,
}

impl LocalAccountService {
    pub fn new(
        storage: Arc<dyn Storage>,
        settings: SettingsCache,
        tokens: TokenService,
        crypto: Crypto,
    ) -> Self {
        Self {
            storage,
            settings,
            tokens,
            crypto,
        }
    }

    /// Create the root account, or reset its password if it already
    /// exists (re-enabling it if it was disabled).
    ///
    /// The insert is attempted first and the update only runs on a
    /// `UserExists` failure, so concurrent bootstraps cannot race a
    /// check against an act.
    pub async fn create_root(&self, password: &mut String) -> Result<()> {
        let result = self.create_root_inner(password.as_bytes()).await;
        password.zeroize();
        result
    }

    async fn create_root_inner(&self, password: &[u8]) -> Result<()> {
        let salt = self.crypto.generate_salt();
        let mut hash = self.crypto.derive_password(password, &salt);

        let root = LocalUser {
            user: AuthUser {
                user_name: UserName::root(),
                email: EmailAddress::Unknown,
                display_name: DisplayName::new("root").expect("static display name is valid"),
                roles: [Role::Root].into_iter().collect(),
                custom_roles: HashSet::new(),
                policy_ids: HashSet::new(),
                created: Utc::now(),
                last_login: None,
                disabled: UserDisabledState::Enabled,
                identities: HashSet::new(),
                local: true,
            },
            password_hash: hash.clone(),
            salt: salt.clone(),
            force_reset: false,
            last_reset: None,
        };

        let result = match self.storage.create_local_user(&root).await {
            Ok(()) => {
                info!("Created root account");
                Ok(())
            }
            Err(Error::UserExists(_)) => self.reset_existing_root(&hash, &salt).await,
            Err(e) => Err(e),
        };

        hash.zeroize();
        result
    }

    async fn reset_existing_root(&self, hash: &[u8], salt: &[u8]) -> Result<()> {
        self.storage
            .change_password(&UserName::root(), hash, salt, false)
            .await?;
        let user = self.storage.get_user(&UserName::root()).await?;
        if user.is_disabled() {
            self.storage
                .set_user_disabled_state(&UserName::root(), &UserDisabledState::Enabled)
                .await?;
        }
        info!("Reset root account password");
        Ok(())
    }

    /// Create a local user with a generated temporary password, which
    /// is returned for out-of-band delivery. The user must change it
    /// on first login.
    pub async fn create_local_user(
        &self,
        admin_token: &IncomingToken,
        user_name: UserName,
        display_name: DisplayName,
        email: EmailAddress,
    ) -> Result<String> {
        let (_, admin) = resolve_user(&self.storage, admin_token).await?;
        if !admin.is_admin() {
            return Err(Error::Unauthorized(format!(
                "{} is not authorized to create local users",
                admin.user_name
            )));
        }
        if user_name.is_root() {
            return Err(Error::Unauthorized("Cannot create ROOT user".to_string()));
        }

        let password = self.crypto.temporary_password(TEMPORARY_PASSWORD_LENGTH);
        let salt = self.crypto.generate_salt();
        let mut hash = self.crypto.derive_password(password.as_bytes(), &salt);

        let user = LocalUser {
            user: AuthUser {
                user_name: user_name.clone(),
                email,
                display_name,
                roles: HashSet::new(),
                custom_roles: HashSet::new(),
                policy_ids: HashSet::new(),
                created: Utc::now(),
                last_login: None,
                disabled: UserDisabledState::Enabled,
                identities: HashSet::new(),
                local: true,
            },
            password_hash: hash.clone(),
            salt,
            force_reset: true,
            last_reset: None,
        };

        let result = self.storage.create_local_user(&user).await;
        hash.zeroize();
        result?;

        info!(admin = %admin.user_name, user = %user_name, "Created local user");
        Ok(password)
    }

    /// Authenticate a local user by password.
    pub async fn login(
        &self,
        user_name: &UserName,
        password: &mut String,
    ) -> Result<LocalLoginResult> {
        let result = self.login_inner(user_name, password.as_bytes()).await;
        password.zeroize();
        result
    }

    async fn login_inner(
        &self,
        user_name: &UserName,
        password: &[u8],
    ) -> Result<LocalLoginResult> {
        let user = self.authenticate(user_name, password).await?;

        let settings = self.settings.get().await?;
        if !settings.login_allowed && !user.user.is_admin() {
            return Err(Error::Unauthorized("Non-admin login is disabled".to_string()));
        }
        if user.user.is_disabled() {
            return Err(Error::Disabled(user.user.user_name.to_string()));
        }
        if user.force_reset {
            return Ok(LocalLoginResult::ResetRequired(user.user.user_name));
        }

        let token = self.tokens.create_login_token(&user.user.user_name).await?;
        Ok(LocalLoginResult::LoggedIn(token))
    }

    /// Change a local user's password, clearing any forced reset.
    pub async fn change_password(
        &self,
        user_name: &UserName,
        old_password: &mut String,
        new_password: &mut String,
    ) -> Result<()> {
        let result = self
            .change_password_inner(user_name, old_password.as_bytes(), new_password.as_bytes())
            .await;
        old_password.zeroize();
        new_password.zeroize();
        result
    }

    async fn change_password_inner(
        &self,
        user_name: &UserName,
        old_password: &[u8],
        new_password: &[u8],
    ) -> Result<()> {
        if new_password.is_empty() {
            return Err(Error::MissingParameter("new password".to_string()));
        }

        let user = self.authenticate(user_name, old_password).await?;

        let settings = self.settings.get().await?;
        if !settings.login_allowed && !user.user.is_admin() {
            return Err(Error::Unauthorized("Non-admin login is disabled".to_string()));
        }
        if user.user.is_disabled() {
            return Err(Error::Disabled(user.user.user_name.to_string()));
        }

        let salt = self.crypto.generate_salt();
        let mut hash = self.crypto.derive_password(new_password, &salt);
        let result = self
            .storage
            .change_password(&user.user.user_name, &hash, &salt, false)
            .await;
        hash.zeroize();
        result?;

        info!(user = %user_name, "Password changed");
        Ok(())
    }

    /// Regenerate a user's password and force a reset. Admin only.
    /// Returns the new temporary password.
    pub async fn reset_password(
        &self,
        admin_token: &IncomingToken,
        user_name: &UserName,
    ) -> Result<String> {
        let admin = self.require_admin(admin_token).await?;

        let password = self.crypto.temporary_password(TEMPORARY_PASSWORD_LENGTH);
        let salt = self.crypto.generate_salt();
        let mut hash = self.crypto.derive_password(password.as_bytes(), &salt);
        let result = self
            .storage
            .change_password(user_name, &hash, &salt, true)
            .await;
        hash.zeroize();
        result?;

        info!(admin = %admin, user = %user_name, "Admin reset password");
        Ok(password)
    }

    /// Mark a user's password as requiring reset. Admin only.
    pub async fn force_reset(
        &self,
        admin_token: &IncomingToken,
        user_name: &UserName,
    ) -> Result<()> {
        let admin = self.require_admin(admin_token).await?;
        self.storage.force_password_reset(user_name).await?;
        info!(admin = %admin, user = %user_name, "Admin forced password reset");
        Ok(())
    }

    /// Mark every local user's password as requiring reset. Admin only.
    pub async fn force_reset_all(&self, admin_token: &IncomingToken) -> Result<()> {
        let admin = self.require_admin(admin_token).await?;
        self.storage.force_password_reset_all().await?;
        info!(admin = %admin, "Admin forced global password reset");
        Ok(())
    }

    /// Fetch and verify credentials. Unknown users and bad passwords
    /// produce the identical error.
    async fn authenticate(&self, user_name: &UserName, password: &[u8]) -> Result<LocalUser> {
        let user = match self.storage.get_local_user(user_name).await {
            Ok(user) => user,
            Err(Error::NoSuchUser(_)) | Err(Error::NoSuchLocalUser(_)) => {
                return Err(Error::AuthenticationFailed(MISMATCH.to_string()))
            }
            Err(e) => return Err(e),
        };

        if !self
            .crypto
            .verify_password(password, &user.password_hash, &user.salt)
        {
            return Err(Error::AuthenticationFailed(MISMATCH.to_string()));
        }

        Ok(user)
    }

    async fn require_admin(&self, token: &IncomingToken) -> Result<UserName> {
        let (_, user) = resolve_user(&self.storage, token).await?;
        if !user.included_roles().contains(&Role::Admin) {
            return Err(Error::Unauthorized(format!(
                "{} is not authorized to administrate local accounts",
                user.user_name
            )));
        }
        Ok(user.user_name)
    }
}
