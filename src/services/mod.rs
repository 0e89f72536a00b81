//! Service layer for Gatehouse.
//!
//! The authentication engine proper:
//! - Crypto (password KDF, salts, token values)
//! - SettingsCache (periodic-refresh server settings)
//! - TokenService (issuance, lookup, revocation)
//! - LocalAccountService (root bootstrap, password accounts)
//! - LoginService (OAuth2 login state machine)
//! - LinkService (OAuth2 identity linking)
//! - UserService (authorization, roles, admin operations)

mod crypto;
mod link;
mod local;
mod login;
mod settings;
mod tokens;
mod users;

pub use crypto::Crypto;
pub use link::{LinkResult, LinkService, LinkState};
pub use local::{LocalAccountService, LocalLoginResult};
pub use login::{LoginResult, LoginService, LoginState, LoginStateIdentity, ProviderInfo};
pub use settings::SettingsCache;
pub use tokens::TokenService;
pub use users::UserService;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{AuthUser, HashedToken, IncomingToken};
use crate::storage::Storage;

/// Resolve an incoming token to its record and user.
///
/// A token referencing a disabled user triggers deletion of all of
/// that user's tokens; a token referencing a missing user is a broken
/// invariant and surfaces as an internal error.
pub(crate) async fn resolve_user(
    storage: &Arc<dyn Storage>,
    token: &IncomingToken,
) -> Result<(HashedToken, AuthUser)> {
    let hashed = match storage.get_token(&token.hash()).await {
        Ok(t) => t,
        Err(Error::NoSuchToken) => return Err(Error::InvalidToken),
        Err(e) => return Err(e),
    };

    let user = match storage.get_user(&hashed.user_name).await {
        Ok(u) => u,
        Err(Error::NoSuchUser(name)) => {
            return Err(Error::Internal(format!(
                "Token {} refers to nonexistent user {}",
                hashed.id, name
            )))
        }
        Err(e) => return Err(e),
    };

    if user.is_disabled() {
        storage.delete_tokens(&user.user_name).await?;
        return Err(Error::Disabled(user.user_name.to_string()));
    }

    Ok((hashed, user))
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::Utc;

    use crate::models::{
        AuthUser, DisplayName, EmailAddress, LocalUser, RemoteIdentity, RemoteIdentityDetails,
        RemoteIdentityId, Role, UserDisabledState, UserName,
    };
    use crate::storage::{SqliteStorage, Storage};

    pub async fn storage() -> Arc<dyn Storage> {
        Arc::new(SqliteStorage::connect(":memory:").await.unwrap())
    }

    pub fn standard_user(name: &str, provider_id: &str, roles: &[Role]) -> AuthUser {
        let identity = RemoteIdentity::new(
            RemoteIdentityId::new("Globus", provider_id),
            RemoteIdentityDetails::new(Some("remote"), None, None),
        )
        .with_local_id();
        AuthUser {
            user_name: UserName::new(name).unwrap(),
            email: EmailAddress::new("u@example.com").unwrap(),
            display_name: DisplayName::new("Test User").unwrap(),
            roles: roles.iter().copied().collect(),
            custom_roles: HashSet::new(),
            policy_ids: HashSet::new(),
            created: Utc::now(),
            last_login: None,
            disabled: UserDisabledState::Enabled,
            identities: [identity].into_iter().collect(),
            local: false,
        }
    }

    pub fn local_user(name: &str, roles: &[Role], hash: Vec<u8>, salt: Vec<u8>) -> LocalUser {
        LocalUser {
            user: AuthUser {
                user_name: UserName::new(name).unwrap(),
                email: EmailAddress::Unknown,
                display_name: DisplayName::new("Local User").unwrap(),
                roles: roles.iter().copied().collect(),
                custom_roles: HashSet::new(),
                policy_ids: HashSet::new(),
                created: Utc::now(),
                last_login: None,
                disabled: UserDisabledState::Enabled,
                identities: HashSet::new(),
                local: true,
            },
            password_hash: hash,
            salt,
            force_reset: false,
            last_reset: None,
        }
    }

    pub async fn disable(storage: &Arc<dyn Storage>, name: &UserName) {
        storage
            .set_user_disabled_state(
                name,
                &UserDisabledState::Disabled {
                    reason: "test".to_string(),
                    admin: UserName::new("someadmin").unwrap(),
                    time: Utc::now(),
                },
            )
            .await
            .unwrap();
    }
}
