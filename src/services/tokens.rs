//! Token issuance, lookup, and revocation.
//!
//! Login tokens are minted by the login flows; extended-lifetime
//! developer and server tokens can only be created from a login token
//! by users holding the matching role. Plaintext token values are
//! returned to the caller exactly once and never stored.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    HashedToken, IncomingToken, NewToken, Role, TokenLifetime, TokenName, TokenType, UserName,
};
use crate::services::{resolve_user, Crypto, SettingsCache};
use crate::storage::Storage;

#[derive(Clone)]
pub struct TokenService {
    storage: Arc<dyn Storage>,
    settings: SettingsCache,
    crypto: Crypto,
}

impl TokenService {
    pub fn new(storage: Arc<dyn Storage>, settings: SettingsCache, crypto: Crypto) -> Self {
        Self {
            storage,
            settings,
            crypto,
        }
    }

    /// Issue a login token for a user and record the login time.
    pub async fn create_login_token(&self, name: &UserName) -> Result<NewToken> {
        let lifetime = self.settings.get().await?.lifetime_ms(TokenLifetime::Login);
        let token = NewToken::new(
            self.crypto.generate_token(),
            TokenType::Login,
            None,
            name.clone(),
            lifetime,
        );
        self.storage.store_token(&token.stored).await?;
        self.storage.set_last_login(name, Utc::now()).await?;
        info!(user = %name, "Issued login token");
        Ok(token)
    }

    /// Create an extended-lifetime token.
    ///
    /// Requires a login token and the serv-token or dev-token role.
    pub async fn create_extended_token(
        &self,
        token: &IncomingToken,
        name: TokenName,
        server: bool,
    ) -> Result<NewToken> {
        let (hashed, user) = resolve_user(&self.storage, token).await?;

        if hashed.token_type != TokenType::Login {
            return Err(Error::Unauthorized(
                "Only login tokens may be used to create a token".to_string(),
            ));
        }

        let required = if server { Role::ServToken } else { Role::DevToken };
        if !user.included_roles().contains(&required) {
            return Err(Error::Unauthorized(format!(
                "{} is not authorized to create this token type",
                user.user_name
            )));
        }

        let (token_type, lifetime_key) = if server {
            (TokenType::Serv, TokenLifetime::Serv)
        } else {
            (TokenType::Dev, TokenLifetime::Dev)
        };
        let lifetime = self.settings.get().await?.lifetime_ms(lifetime_key);

        let new = NewToken::new(
            self.crypto.generate_token(),
            token_type,
            Some(name),
            user.user_name.clone(),
            lifetime,
        );
        self.storage.store_token(&new.stored).await?;
        info!(user = %new.stored.user_name, token_type = token_type.as_str(), "Issued extended token");
        Ok(new)
    }

    /// Look up the record for a presented token.
    pub async fn get_token(&self, token: &IncomingToken) -> Result<HashedToken> {
        match self.storage.get_token(&token.hash()).await {
            Err(Error::NoSuchToken) => Err(Error::InvalidToken),
            other => other,
        }
    }

    /// All live tokens belonging to the presenting user.
    pub async fn list_tokens(&self, token: &IncomingToken) -> Result<Vec<HashedToken>> {
        let (_, user) = resolve_user(&self.storage, token).await?;
        self.storage.get_tokens(&user.user_name).await
    }

    /// Revoke one of the presenting user's own tokens by id.
    pub async fn revoke(&self, token: &IncomingToken, id: Uuid) -> Result<()> {
        let (_, user) = resolve_user(&self.storage, token).await?;
        self.storage.delete_token(&user.user_name, id).await
    }

    /// Revoke the presented token itself.
    pub async fn revoke_current(&self, token: &IncomingToken) -> Result<()> {
        let hashed = self.get_token(token).await?;
        self.storage.delete_token(&hashed.user_name, hashed.id).await
    }

    /// Revoke all of the presenting user's tokens.
    pub async fn revoke_all(&self, token: &IncomingToken) -> Result<()> {
        let (_, user) = resolve_user(&self.storage, token).await?;
        self.storage.delete_tokens(&user.user_name).await
    }

    /// Revoke one token of another user. Admin only.
    pub async fn revoke_user_token(
        &self,
        admin_token: &IncomingToken,
        user_name: &UserName,
        id: Uuid,
    ) -> Result<()> {
        let admin = self.require_token_admin(admin_token).await?;
        self.storage.delete_token(user_name, id).await?;
        info!(admin = %admin, user = %user_name, "Admin revoked token");
        Ok(())
    }

    /// Revoke all tokens of another user. Admin only.
    pub async fn revoke_all_user(
        &self,
        admin_token: &IncomingToken,
        user_name: &UserName,
    ) -> Result<()> {
        let admin = self.require_token_admin(admin_token).await?;
        self.storage.delete_tokens(user_name).await?;
        info!(admin = %admin, user = %user_name, "Admin revoked all tokens for user");
        Ok(())
    }

    /// Revoke every token in the system. Admin only.
    pub async fn revoke_all_global(&self, admin_token: &IncomingToken) -> Result<()> {
        let admin = self.require_token_admin(admin_token).await?;
        self.storage.delete_all_tokens().await?;
        info!(admin = %admin, "Admin revoked all tokens globally");
        Ok(())
    }

    async fn require_token_admin(&self, token: &IncomingToken) -> Result<UserName> {
        let (_, user) = resolve_user(&self.storage, token).await?;
        if !user.included_roles().contains(&Role::Admin) {
            return Err(Error::Unauthorized(format!(
                "{} is not authorized to administrate tokens",
                user.user_name
            )));
        }
        Ok(user.user_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testutil;

    async fn service() -> (Arc<dyn Storage>, TokenService) {
        let storage = testutil::storage().await;
        let settings = SettingsCache::new(storage.clone()).await.unwrap();
        let service = TokenService::new(storage.clone(), settings, Crypto::new());
        (storage, service)
    }

    #[tokio::test]
    async fn test_login_token_round_trip() {
        let (storage, service) = service().await;
        let user = testutil::standard_user("foo", "id1", &[]);
        storage.create_user(&user).await.unwrap();

        let new = service.create_login_token(&user.user_name).await.unwrap();
        assert_eq!(new.stored.token_type, TokenType::Login);

        let incoming = IncomingToken::new(&new.token).unwrap();
        let fetched = service.get_token(&incoming).await.unwrap();
        assert_eq!(fetched.user_name, user.user_name);
        assert_eq!(fetched.id, new.stored.id);

        // Login time was recorded.
        let fetched_user = storage.get_user(&user.user_name).await.unwrap();
        assert!(fetched_user.last_login.is_some());
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid() {
        let (_storage, service) = service().await;
        let incoming = IncomingToken::new("nosuchtoken").unwrap();
        assert!(matches!(
            service.get_token(&incoming).await.unwrap_err(),
            Error::InvalidToken
        ));
    }

    #[tokio::test]
    async fn test_extended_token_requires_role() {
        let (storage, service) = service().await;
        let user = testutil::standard_user("foo", "id1", &[]);
        storage.create_user(&user).await.unwrap();

        let login = service.create_login_token(&user.user_name).await.unwrap();
        let incoming = IncomingToken::new(&login.token).unwrap();

        let err = service
            .create_extended_token(&incoming, TokenName::new("t").unwrap(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_extended_token_dev_and_serv() {
        let (storage, service) = service().await;
        let user = testutil::standard_user("foo", "id1", &[Role::Admin]);
        storage.create_user(&user).await.unwrap();

        let login = service.create_login_token(&user.user_name).await.unwrap();
        let incoming = IncomingToken::new(&login.token).unwrap();

        let dev = service
            .create_extended_token(&incoming, TokenName::new("devtok").unwrap(), false)
            .await
            .unwrap();
        assert_eq!(dev.stored.token_type, TokenType::Dev);
        assert_eq!(dev.stored.name.as_ref().unwrap().as_str(), "devtok");

        let serv = service
            .create_extended_token(&incoming, TokenName::new("servtok").unwrap(), true)
            .await
            .unwrap();
        assert_eq!(serv.stored.token_type, TokenType::Serv);
        // Serv lifetime is much longer than dev.
        assert!(serv.stored.expires > dev.stored.expires);
    }

    #[tokio::test]
    async fn test_extended_token_refused_from_non_login_token() {
        let (storage, service) = service().await;
        let user = testutil::standard_user("foo", "id1", &[Role::Admin]);
        storage.create_user(&user).await.unwrap();

        let login = service.create_login_token(&user.user_name).await.unwrap();
        let incoming = IncomingToken::new(&login.token).unwrap();
        let dev = service
            .create_extended_token(&incoming, TokenName::new("devtok").unwrap(), false)
            .await
            .unwrap();

        let dev_incoming = IncomingToken::new(&dev.token).unwrap();
        let err = service
            .create_extended_token(&dev_incoming, TokenName::new("another").unwrap(), false)
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::Unauthorized(msg) if msg == "Only login tokens may be used to create a token")
        );
    }

    #[tokio::test]
    async fn test_revoke_by_id() {
        let (storage, service) = service().await;
        let user = testutil::standard_user("foo", "id1", &[]);
        storage.create_user(&user).await.unwrap();

        let new = service.create_login_token(&user.user_name).await.unwrap();
        let incoming = IncomingToken::new(&new.token).unwrap();

        service.revoke(&incoming, new.stored.id).await.unwrap();
        assert!(matches!(
            service.get_token(&incoming).await.unwrap_err(),
            Error::InvalidToken
        ));
    }

    #[tokio::test]
    async fn test_revoke_current_and_all() {
        let (storage, service) = service().await;
        let user = testutil::standard_user("foo", "id1", &[]);
        storage.create_user(&user).await.unwrap();

        let t1 = service.create_login_token(&user.user_name).await.unwrap();
        let t2 = service.create_login_token(&user.user_name).await.unwrap();

        let i1 = IncomingToken::new(&t1.token).unwrap();
        service.revoke_current(&i1).await.unwrap();
        assert!(service.get_token(&i1).await.is_err());

        let i2 = IncomingToken::new(&t2.token).unwrap();
        assert!(service.get_token(&i2).await.is_ok());
        service.revoke_all(&i2).await.unwrap();
        assert!(service.get_token(&i2).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_revocation() {
        let (storage, service) = service().await;
        let admin = testutil::standard_user("adminguy", "id1", &[Role::Admin]);
        let user = testutil::standard_user("plain", "id2", &[]);
        storage.create_user(&admin).await.unwrap();
        storage.create_user(&user).await.unwrap();

        let admin_token = service.create_login_token(&admin.user_name).await.unwrap();
        let user_token = service.create_login_token(&user.user_name).await.unwrap();
        let admin_incoming = IncomingToken::new(&admin_token.token).unwrap();
        let user_incoming = IncomingToken::new(&user_token.token).unwrap();

        // Non-admins cannot revoke other users' tokens.
        let err = service
            .revoke_all_user(&user_incoming, &admin.user_name)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        service
            .revoke_all_user(&admin_incoming, &user.user_name)
            .await
            .unwrap();
        assert!(service.get_token(&user_incoming).await.is_err());

        service.revoke_all_global(&admin_incoming).await.unwrap();
        assert!(service.get_token(&admin_incoming).await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_user_tokens_purged() {
        let (storage, service) = service().await;
        let user = testutil::standard_user("foo", "id1", &[]);
        storage.create_user(&user).await.unwrap();

        let new = service.create_login_token(&user.user_name).await.unwrap();
        let incoming = IncomingToken::new(&new.token).unwrap();

        testutil::disable(&storage, &user.user_name).await;

        let err = service.list_tokens(&incoming).await.unwrap_err();
        assert!(matches!(err, Error::Disabled(_)));
        // All tokens were deleted on discovery.
        assert!(storage.get_tokens(&user.user_name).await.unwrap().is_empty());
    }
}
