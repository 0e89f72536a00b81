//! Application state for Gatehouse.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use crate::config;
use crate::models::{AuthSettingsUpdate, ProviderSettings};
use crate::providers::ProviderRegistry;
use crate::services::{
    Crypto, LinkService, LocalAccountService, LoginService, SettingsCache, TokenService,
    UserService,
};
use crate::storage::{SqliteStorage, Storage};
use crate::Result;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Concrete storage handle, for background maintenance.
    pub sqlite: SqliteStorage,
    /// Storage as the engine sees it.
    pub storage: Arc<dyn Storage>,
    /// Cached server settings.
    pub settings: SettingsCache,
    /// Token issuance and revocation.
    pub tokens: TokenService,
    /// Local (password) accounts.
    pub local: LocalAccountService,
    /// OAuth2 login flows.
    pub login: LoginService,
    /// OAuth2 identity linking.
    pub link: LinkService,
    /// Authorization and user administration.
    pub users: UserService,
}

impl AppState {
    /// Create a new application state, initializing all services.
    pub async fn new() -> Result<Self> {
        let config = config::config();

        let sqlite = SqliteStorage::connect(&config.database.path).await?;
        let storage: Arc<dyn Storage> = Arc::new(sqlite.clone());

        let settings = SettingsCache::new(storage.clone()).await?;

        // Configured providers get settings rows so admins can flip
        // them on; newly seen providers start disabled.
        let provider_seed = AuthSettingsUpdate {
            providers: config
                .providers
                .iter()
                .map(|p| (p.name.clone(), ProviderSettings::default()))
                .collect(),
            ..Default::default()
        };
        settings.update(&provider_seed, false).await?;

        let registry = Arc::new(ProviderRegistry::from_configs(config.providers.clone())?);
        let crypto = Crypto::new();

        let tokens = TokenService::new(storage.clone(), settings.clone(), crypto.clone());
        let local = LocalAccountService::new(
            storage.clone(),
            settings.clone(),
            tokens.clone(),
            crypto.clone(),
        );
        let login = LoginService::new(
            storage.clone(),
            settings.clone(),
            tokens.clone(),
            registry.clone(),
            crypto.clone(),
        );
        let link = LinkService::new(storage.clone(), settings.clone(), registry, crypto);
        let users = UserService::new(storage.clone());

        Ok(Self {
            sqlite,
            storage,
            settings,
            tokens,
            local,
            login,
            link,
            users,
        })
    }
}
