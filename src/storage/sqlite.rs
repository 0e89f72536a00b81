//! SQLite implementation of the [`Storage`] contract.
//!
//! Timestamps are stored as fixed-width RFC 3339 text in UTC (millis,
//! `Z` suffix) so lexicographic SQL comparisons order correctly. Role
//! and policy sets are JSON arrays in TEXT columns.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::FromRow;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    AuthSettings, AuthSettingsUpdate, AuthUser, CustomRole, DisplayName, EmailAddress, HashedToken,
    LinkedIdentity, LocalUser, ProviderSettings, RemoteIdentity, RemoteIdentityDetails,
    RemoteIdentityId, Role, TokenLifetime, TokenName, TokenType, UserDisabledState, UserName,
};
use crate::storage::{Storage, TemporaryIdentities, UserSearchSpec};

/// Type alias for the SQLite connection pool.
pub type DbPool = sqlx::SqlitePool;

/// SQLite-backed storage.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: DbPool,
}

// ============================================================================
// Time / value helpers
// ============================================================================

fn fmt_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("invalid stored timestamp {}: {}", s, e)))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Storage(format!("invalid stored UUID {}: {}", s, e)))
}

fn roles_to_json(roles: &HashSet<Role>) -> String {
    let mut names: Vec<&str> = roles.iter().map(Role::as_str).collect();
    names.sort_unstable();
    serde_json::to_string(&names).expect("role list serializes")
}

fn roles_from_json(json: &str) -> Result<HashSet<Role>> {
    let names: Vec<String> =
        serde_json::from_str(json).map_err(|e| Error::Storage(format!("bad role list: {}", e)))?;
    names.iter().map(|n| Role::from_str(n)).collect()
}

fn strings_to_json(values: &HashSet<String>) -> String {
    let mut values: Vec<&String> = values.iter().collect();
    values.sort_unstable();
    serde_json::to_string(&values).expect("string list serializes")
}

fn strings_from_json(json: &str) -> Result<HashSet<String>> {
    serde_json::from_str(json).map_err(|e| Error::Storage(format!("bad string list: {}", e)))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Escape LIKE wildcards in user-supplied prefixes.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct UserRow {
    user_name: String,
    display_name: String,
    email: Option<String>,
    is_local: bool,
    roles: String,
    custom_roles: String,
    policy_ids: String,
    created: String,
    last_login: Option<String>,
    disabled: bool,
    disabled_reason: Option<String>,
    disabled_admin: Option<String>,
    disabled_time: Option<String>,
    password_hash: Option<Vec<u8>>,
    salt: Option<Vec<u8>>,
    force_reset: bool,
    last_reset: Option<String>,
}

#[derive(Debug, FromRow)]
struct IdentityRow {
    provider: String,
    provider_id: String,
    local_id: String,
    remote_username: Option<String>,
    remote_full_name: Option<String>,
    remote_email: Option<String>,
}

impl IdentityRow {
    fn into_linked(self) -> Result<LinkedIdentity> {
        Ok(LinkedIdentity {
            local_id: parse_uuid(&self.local_id)?,
            identity: RemoteIdentity {
                id: RemoteIdentityId {
                    provider: self.provider,
                    provider_id: self.provider_id,
                },
                details: RemoteIdentityDetails {
                    username: self.remote_username,
                    full_name: self.remote_full_name,
                    email: self.remote_email,
                },
            },
        })
    }
}

#[derive(Debug, FromRow)]
struct TokenRow {
    id: String,
    token_hash: String,
    token_type: String,
    name: Option<String>,
    user_name: String,
    created: String,
    expires: String,
}

impl TokenRow {
    fn into_token(self) -> Result<HashedToken> {
        Ok(HashedToken {
            id: parse_uuid(&self.id)?,
            token_type: TokenType::from_str(&self.token_type)?,
            name: self.name.as_deref().map(TokenName::new).transpose()?,
            user_name: UserName::from_storage(self.user_name),
            created: parse_time(&self.created)?,
            expires: parse_time(&self.expires)?,
            token_hash: self.token_hash,
        })
    }
}

fn user_from_row(row: UserRow, identities: Vec<LinkedIdentity>) -> Result<AuthUser> {
    let disabled = if row.disabled {
        UserDisabledState::Disabled {
            reason: row.disabled_reason.unwrap_or_default(),
            admin: UserName::from_storage(row.disabled_admin.unwrap_or_default()),
            time: parse_time(row.disabled_time.as_deref().unwrap_or("1970-01-01T00:00:00.000Z"))?,
        }
    } else {
        UserDisabledState::Enabled
    };

    Ok(AuthUser {
        user_name: UserName::from_storage(row.user_name),
        email: match row.email {
            Some(addr) => EmailAddress::Address(addr),
            None => EmailAddress::Unknown,
        },
        display_name: DisplayName::new(&row.display_name)?,
        roles: roles_from_json(&row.roles)?,
        custom_roles: strings_from_json(&row.custom_roles)?,
        policy_ids: strings_from_json(&row.policy_ids)?,
        created: parse_time(&row.created)?,
        last_login: row.last_login.as_deref().map(parse_time).transpose()?,
        disabled,
        identities: identities.into_iter().collect(),
        local: row.is_local,
    })
}

// ============================================================================
// Construction
// ============================================================================

impl SqliteStorage {
    /// Open (or create) the database at `path` and apply the schema.
    /// Pass `:memory:` for an ephemeral database.
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| Error::Storage(format!("invalid database path {}: {}", path, e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        info!("Database initialized: {}", path);
        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<()> {
        let schema = include_str!("../../schema.sql");

        for statement in schema.split(';') {
            let clean: String = statement
                .lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            let clean = clean.trim();
            if clean.is_empty() {
                continue;
            }
            sqlx::query(clean).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Remove expired tokens and temporary sessions.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let now = fmt_time(Utc::now());
        let tokens = sqlx::query("DELETE FROM tokens WHERE expires <= ?")
            .bind(&now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        let sessions = sqlx::query("DELETE FROM temp_sessions WHERE expires <= ?")
            .bind(&now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if tokens + sessions > 0 {
            debug!(tokens, sessions, "Cleaned up expired rows");
        }
        Ok(tokens + sessions)
    }

    async fn fetch_user_row(&self, name: &UserName) -> Result<UserRow> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_name = ?")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NoSuchUser(name.to_string()))
    }

    async fn fetch_identities(&self, name: &UserName) -> Result<Vec<LinkedIdentity>> {
        let rows = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT provider, provider_id, local_id,
                   remote_username, remote_full_name, remote_email
            FROM identities
            WHERE user_name = ?
            "#,
        )
        .bind(name.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(IdentityRow::into_linked).collect()
    }

    async fn insert_user_row(&self, user: &AuthUser) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (
                user_name, display_name, email, is_local, roles, custom_roles,
                policy_ids, created, last_login, disabled
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(user.user_name.as_str())
        .bind(user.display_name.as_str())
        .bind(user.email.as_str())
        .bind(user.local)
        .bind(roles_to_json(&user.roles))
        .bind(strings_to_json(&user.custom_roles))
        .bind(strings_to_json(&user.policy_ids))
        .bind(fmt_time(user.created))
        .bind(user.last_login.map(fmt_time))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::UserExists(user.user_name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_identity(&self, name: &UserName, identity: &LinkedIdentity) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO identities (
                provider, provider_id, local_id, user_name,
                remote_username, remote_full_name, remote_email
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&identity.identity.id.provider)
        .bind(&identity.identity.id.provider_id)
        .bind(identity.local_id.to_string())
        .bind(name.as_str())
        .bind(&identity.identity.details.username)
        .bind(&identity.identity.details.full_name)
        .bind(&identity.identity.details.email)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::IdentityLinked),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Storage implementation
// ============================================================================

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_user(&self, user: &AuthUser) -> Result<()> {
        // Identity conflicts are checked before the user row is written
        // so a failed create does not leave a partial account.
        for identity in &user.identities {
            if self
                .get_user_by_identity(&identity.identity.id)
                .await?
                .is_some()
            {
                return Err(Error::IdentityLinked);
            }
        }

        self.insert_user_row(user).await?;

        for identity in &user.identities {
            if let Err(e) = self.insert_identity(&user.user_name, identity).await {
                // Lost the race on an identity; drop the fresh account.
                sqlx::query("DELETE FROM users WHERE user_name = ?")
                    .bind(user.user_name.as_str())
                    .execute(&self.pool)
                    .await?;
                return Err(e);
            }
        }

        Ok(())
    }

    async fn create_local_user(&self, user: &LocalUser) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (
                user_name, display_name, email, is_local, roles, custom_roles,
                policy_ids, created, last_login, disabled,
                password_hash, salt, force_reset, last_reset
            ) VALUES (?, ?, ?, 1, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
            "#,
        )
        .bind(user.user.user_name.as_str())
        .bind(user.user.display_name.as_str())
        .bind(user.user.email.as_str())
        .bind(roles_to_json(&user.user.roles))
        .bind(strings_to_json(&user.user.custom_roles))
        .bind(strings_to_json(&user.user.policy_ids))
        .bind(fmt_time(user.user.created))
        .bind(user.user.last_login.map(fmt_time))
        .bind(&user.password_hash)
        .bind(&user.salt)
        .bind(user.force_reset)
        .bind(user.last_reset.map(fmt_time))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(Error::UserExists(user.user.user_name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user(&self, name: &UserName) -> Result<AuthUser> {
        let row = self.fetch_user_row(name).await?;
        let identities = self.fetch_identities(name).await?;
        user_from_row(row, identities)
    }

    async fn get_local_user(&self, name: &UserName) -> Result<LocalUser> {
        let row = self.fetch_user_row(name).await?;
        if !row.is_local {
            return Err(Error::NoSuchLocalUser(name.to_string()));
        }
        let password_hash = row
            .password_hash
            .clone()
            .ok_or_else(|| Error::Storage(format!("local user {} has no password hash", name)))?;
        let salt = row
            .salt
            .clone()
            .ok_or_else(|| Error::Storage(format!("local user {} has no salt", name)))?;
        let force_reset = row.force_reset;
        let last_reset = row.last_reset.as_deref().map(parse_time).transpose()?;
        let user = user_from_row(row, Vec::new())?;
        Ok(LocalUser {
            user,
            password_hash,
            salt,
            force_reset,
            last_reset,
        })
    }

    async fn get_user_by_identity(&self, id: &RemoteIdentityId) -> Result<Option<AuthUser>> {
        let name: Option<(String,)> = sqlx::query_as(
            "SELECT user_name FROM identities WHERE provider = ? AND provider_id = ?",
        )
        .bind(&id.provider)
        .bind(&id.provider_id)
        .fetch_optional(&self.pool)
        .await?;

        match name {
            Some((name,)) => Ok(Some(self.get_user(&UserName::from_storage(name)).await?)),
            None => Ok(None),
        }
    }

    async fn set_last_login(&self, name: &UserName, when: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE user_name = ?")
            .bind(fmt_time(when))
            .bind(name.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn change_password(
        &self,
        name: &UserName,
        password_hash: &[u8],
        salt: &[u8],
        force_reset: bool,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, salt = ?, force_reset = ?, last_reset = ?
            WHERE user_name = ? AND is_local = 1
            "#,
        )
        .bind(password_hash)
        .bind(salt)
        .bind(force_reset)
        .bind(fmt_time(Utc::now()))
        .bind(name.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NoSuchLocalUser(name.to_string()));
        }
        Ok(())
    }

    async fn force_password_reset(&self, name: &UserName) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET force_reset = 1 WHERE user_name = ? AND is_local = 1",
        )
        .bind(name.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NoSuchLocalUser(name.to_string()));
        }
        Ok(())
    }

    async fn force_password_reset_all(&self) -> Result<()> {
        sqlx::query("UPDATE users SET force_reset = 1 WHERE is_local = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_user_disabled_state(
        &self,
        name: &UserName,
        state: &UserDisabledState,
    ) -> Result<()> {
        let result = match state {
            UserDisabledState::Enabled => {
                sqlx::query(
                    r#"
                    UPDATE users
                    SET disabled = 0, disabled_reason = NULL,
                        disabled_admin = NULL, disabled_time = NULL
                    WHERE user_name = ?
                    "#,
                )
                .bind(name.as_str())
                .execute(&self.pool)
                .await?
            }
            UserDisabledState::Disabled {
                reason,
                admin,
                time,
            } => {
                sqlx::query(
                    r#"
                    UPDATE users
                    SET disabled = 1, disabled_reason = ?,
                        disabled_admin = ?, disabled_time = ?
                    WHERE user_name = ?
                    "#,
                )
                .bind(reason)
                .bind(admin.as_str())
                .bind(fmt_time(*time))
                .bind(name.as_str())
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(Error::NoSuchUser(name.to_string()));
        }
        Ok(())
    }

    async fn link_identity(&self, name: &UserName, identity: &LinkedIdentity) -> Result<()> {
        let row = self.fetch_user_row(name).await?;
        if row.is_local {
            return Err(Error::LinkFailed(
                "Cannot link identities to a local user".to_string(),
            ));
        }
        self.insert_identity(name, identity).await
    }

    async fn unlink_identity(&self, name: &UserName, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let owned: Option<(String,)> = sqlx::query_as(
            "SELECT local_id FROM identities WHERE user_name = ? AND local_id = ?",
        )
        .bind(name.as_str())
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
        if owned.is_none() {
            return Err(Error::NoSuchIdentity(id.to_string()));
        }

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM identities WHERE user_name = ?")
                .bind(name.as_str())
                .fetch_one(&mut *tx)
                .await?;

        if count.0 <= 1 {
            return Err(Error::UnlinkFailed(
                "A user must have at least one identity".to_string(),
            ));
        }

        sqlx::query("DELETE FROM identities WHERE user_name = ? AND local_id = ?")
            .bind(name.as_str())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_display_names(
        &self,
        names: &HashSet<UserName>,
    ) -> Result<HashMap<UserName, DisplayName>> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; names.len()].join(", ");
        let query = format!(
            "SELECT user_name, display_name FROM users WHERE user_name IN ({})",
            placeholders
        );

        let mut q = sqlx::query_as::<_, (String, String)>(&query);
        for name in names {
            q = q.bind(name.as_str().to_string());
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(name, display)| {
                Ok((UserName::from_storage(name), DisplayName::new(&display)?))
            })
            .collect()
    }

    async fn search_display_names(
        &self,
        spec: &UserSearchSpec,
        limit: usize,
    ) -> Result<HashMap<UserName, DisplayName>> {
        let rows: Vec<(String, String, String, String)> = match &spec.prefix {
            Some(prefix) => {
                let pattern = format!("{}%", escape_like(&prefix.to_lowercase()));
                sqlx::query_as(
                    r#"
                    SELECT user_name, display_name, roles, custom_roles
                    FROM users
                    WHERE user_name LIKE ? ESCAPE '\'
                       OR LOWER(display_name) LIKE ? ESCAPE '\'
                    "#,
                )
                .bind(&pattern)
                .bind(&pattern)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT user_name, display_name, roles, custom_roles FROM users",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut results = HashMap::new();
        for (name, display, roles, custom_roles) in rows {
            if results.len() >= limit {
                break;
            }
            if !spec.roles.is_empty() {
                let user_roles = roles_from_json(&roles)?;
                if spec.roles.is_disjoint(&user_roles) {
                    continue;
                }
            }
            if !spec.custom_roles.is_empty() {
                let user_custom = strings_from_json(&custom_roles)?;
                if spec.custom_roles.is_disjoint(&user_custom) {
                    continue;
                }
            }
            results.insert(UserName::from_storage(name), DisplayName::new(&display)?);
        }

        Ok(results)
    }

    async fn user_names_with_stem(&self, stem: &str) -> Result<Vec<UserName>> {
        let pattern = format!("{}%", escape_like(stem));
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT user_name FROM users WHERE user_name LIKE ? ESCAPE '\\'")
                .bind(&pattern)
                .fetch_all(&self.pool)
                .await?;

        let matcher = regex::Regex::new(&format!("^{}\\d*$", regex::escape(stem)))
            .map_err(|e| Error::Internal(format!("bad stem regex: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(name,)| name)
            .filter(|name| matcher.is_match(name))
            .map(UserName::from_storage)
            .collect())
    }

    async fn update_roles(
        &self,
        name: &UserName,
        add: &HashSet<Role>,
        remove: &HashSet<Role>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let stored: Option<(String,)> =
            sqlx::query_as("SELECT roles FROM users WHERE user_name = ?")
                .bind(name.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        let (stored,) = stored.ok_or_else(|| Error::NoSuchUser(name.to_string()))?;

        let mut roles = roles_from_json(&stored)?;
        roles.extend(add.iter().copied());
        roles.retain(|r| !remove.contains(r));

        sqlx::query("UPDATE users SET roles = ? WHERE user_name = ?")
            .bind(roles_to_json(&roles))
            .bind(name.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn set_custom_role(&self, role: &CustomRole) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO custom_roles (id, description) VALUES (?, ?)
            ON CONFLICT (id) DO UPDATE SET description = excluded.description
            "#,
        )
        .bind(&role.id)
        .bind(&role.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_custom_role(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM custom_roles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NoSuchRole(id.to_string()));
        }

        // Strip the deleted role from every user holding it.
        let pattern = format!("%\"{}\"%", id);
        let holders: Vec<(String, String)> =
            sqlx::query_as("SELECT user_name, custom_roles FROM users WHERE custom_roles LIKE ?")
                .bind(&pattern)
                .fetch_all(&self.pool)
                .await?;

        for (name, custom_roles) in holders {
            let mut roles = strings_from_json(&custom_roles)?;
            if roles.remove(id) {
                sqlx::query("UPDATE users SET custom_roles = ? WHERE user_name = ?")
                    .bind(strings_to_json(&roles))
                    .bind(&name)
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(())
    }

    async fn get_custom_roles(&self) -> Result<Vec<CustomRole>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, description FROM custom_roles ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, description)| CustomRole { id, description })
            .collect())
    }

    async fn update_custom_roles(
        &self,
        name: &UserName,
        add: &HashSet<String>,
        remove: &HashSet<String>,
    ) -> Result<()> {
        let known: HashSet<String> = self
            .get_custom_roles()
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        for id in add.iter().chain(remove.iter()) {
            if !known.contains(id) {
                return Err(Error::NoSuchRole(id.clone()));
            }
        }

        let mut tx = self.pool.begin().await?;

        let stored: Option<(String,)> =
            sqlx::query_as("SELECT custom_roles FROM users WHERE user_name = ?")
                .bind(name.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        let (stored,) = stored.ok_or_else(|| Error::NoSuchUser(name.to_string()))?;

        let mut roles = strings_from_json(&stored)?;
        roles.extend(add.iter().cloned());
        roles.retain(|r| !remove.contains(r));

        sqlx::query("UPDATE users SET custom_roles = ? WHERE user_name = ?")
            .bind(strings_to_json(&roles))
            .bind(name.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn store_token(&self, token: &HashedToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (id, token_hash, token_type, name, user_name, created, expires)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(token.id.to_string())
        .bind(&token.token_hash)
        .bind(token.token_type.as_str())
        .bind(token.name.as_ref().map(|n| n.as_str().to_string()))
        .bind(token.user_name.as_str())
        .bind(fmt_time(token.created))
        .bind(fmt_time(token.expires))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_token(&self, token_hash: &str) -> Result<HashedToken> {
        let row: Option<TokenRow> =
            sqlx::query_as("SELECT * FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;

        let token = row.ok_or(Error::NoSuchToken)?.into_token()?;
        if token.is_expired() {
            sqlx::query("DELETE FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .execute(&self.pool)
                .await?;
            return Err(Error::NoSuchToken);
        }
        Ok(token)
    }

    async fn get_tokens(&self, name: &UserName) -> Result<Vec<HashedToken>> {
        let rows: Vec<TokenRow> = sqlx::query_as(
            "SELECT * FROM tokens WHERE user_name = ? AND expires > ? ORDER BY created",
        )
        .bind(name.as_str())
        .bind(fmt_time(Utc::now()))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TokenRow::into_token).collect()
    }

    async fn delete_token(&self, name: &UserName, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM tokens WHERE user_name = ? AND id = ?")
            .bind(name.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NoSuchToken);
        }
        Ok(())
    }

    async fn delete_tokens(&self, name: &UserName) -> Result<()> {
        sqlx::query("DELETE FROM tokens WHERE user_name = ?")
            .bind(name.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all_tokens(&self) -> Result<()> {
        sqlx::query("DELETE FROM tokens").execute(&self.pool).await?;
        Ok(())
    }

    async fn store_temporary_identities(
        &self,
        token_hash: &str,
        provider: &str,
        identities: &[LinkedIdentity],
        expires: DateTime<Utc>,
    ) -> Result<()> {
        let identities_json = serde_json::to_string(identities)?;
        sqlx::query(
            r#"
            INSERT INTO temp_sessions (token_hash, provider, identities, expires)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(token_hash)
        .bind(provider)
        .bind(&identities_json)
        .bind(fmt_time(expires))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_temporary_identities(&self, token_hash: &str) -> Result<TemporaryIdentities> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT provider, identities, expires FROM temp_sessions WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        let (provider, identities_json, expires) = row.ok_or(Error::InvalidToken)?;
        let expires = parse_time(&expires)?;
        if expires < Utc::now() {
            self.delete_temporary_identities(token_hash).await?;
            return Err(Error::InvalidToken);
        }

        let identities: Vec<LinkedIdentity> = serde_json::from_str(&identities_json)
            .map_err(|e| Error::Storage(format!("bad stored identity set: {}", e)))?;

        Ok(TemporaryIdentities {
            provider,
            identities,
            expires,
        })
    }

    async fn delete_temporary_identities(&self, token_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM temp_sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_settings(&self) -> Result<AuthSettings> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM settings")
                .fetch_all(&self.pool)
                .await?;

        let mut settings = AuthSettings {
            login_allowed: false,
            providers: HashMap::new(),
            lifetimes: HashMap::new(),
        };

        for (key, value) in rows {
            if key == "login_allowed" {
                settings.login_allowed = serde_json::from_str(&value)
                    .map_err(|e| Error::ConfigMapping(format!("bad login_allowed value: {}", e)))?;
            } else if let Some(name) = key.strip_prefix("provider/") {
                let provider: ProviderSettings = serde_json::from_str(&value).map_err(|e| {
                    Error::ConfigMapping(format!("bad provider settings for {}: {}", name, e))
                })?;
                settings.providers.insert(name.to_string(), provider);
            } else if let Some(name) = key.strip_prefix("lifetime/") {
                let lifetime = TokenLifetime::from_str(name)
                    .map_err(|_| Error::ConfigMapping(format!("unknown lifetime key: {}", name)))?;
                let ms: u64 = serde_json::from_str(&value).map_err(|e| {
                    Error::ConfigMapping(format!("bad lifetime value for {}: {}", name, e))
                })?;
                settings.lifetimes.insert(lifetime, ms);
            }
        }

        // Missing lifetime rows fall back to the defaults.
        for lifetime in TokenLifetime::all() {
            settings
                .lifetimes
                .entry(*lifetime)
                .or_insert_with(|| lifetime.default_ms());
        }

        Ok(settings)
    }

    async fn update_settings(&self, update: &AuthSettingsUpdate, overwrite: bool) -> Result<()> {
        let mut entries: Vec<(String, String)> = Vec::new();
        if let Some(login_allowed) = update.login_allowed {
            entries.push(("login_allowed".to_string(), login_allowed.to_string()));
        }
        for (name, provider) in &update.providers {
            entries.push((
                format!("provider/{}", name),
                serde_json::to_string(provider)?,
            ));
        }
        for (lifetime, ms) in &update.lifetimes {
            entries.push((format!("lifetime/{}", lifetime.as_str()), ms.to_string()));
        }

        let query = if overwrite {
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#
        } else {
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT (key) DO NOTHING
            "#
        };

        for (key, value) in entries {
            sqlx::query(query)
                .bind(&key)
                .bind(&value)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteIdentityDetails;

    async fn setup() -> SqliteStorage {
        SqliteStorage::connect(":memory:").await.unwrap()
    }

    fn standard_user(name: &str, provider_id: &str) -> AuthUser {
        let identity = RemoteIdentity::new(
            RemoteIdentityId::new("Globus", provider_id),
            RemoteIdentityDetails::new(Some("remoteuser"), Some("Remote User"), None),
        )
        .with_local_id();
        AuthUser {
            user_name: UserName::new(name).unwrap(),
            email: EmailAddress::new("u@example.com").unwrap(),
            display_name: DisplayName::new("A User").unwrap(),
            roles: HashSet::new(),
            custom_roles: HashSet::new(),
            policy_ids: HashSet::new(),
            created: Utc::now(),
            last_login: None,
            disabled: UserDisabledState::Enabled,
            identities: [identity].into_iter().collect(),
            local: false,
        }
    }

    fn local_user(name: &str) -> LocalUser {
        LocalUser {
            user: AuthUser {
                user_name: UserName::new(name).unwrap(),
                email: EmailAddress::Unknown,
                display_name: DisplayName::new("Local User").unwrap(),
                roles: HashSet::new(),
                custom_roles: HashSet::new(),
                policy_ids: HashSet::new(),
                created: Utc::now(),
                last_login: None,
                disabled: UserDisabledState::Enabled,
                identities: HashSet::new(),
                local: true,
            },
            password_hash: vec![1u8; 32],
            salt: vec![2u8; 8],
            force_reset: false,
            last_reset: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let storage = setup().await;
        let user = standard_user("foo", "id1");
        storage.create_user(&user).await.unwrap();

        let fetched = storage.get_user(&user.user_name).await.unwrap();
        assert_eq!(fetched.user_name, user.user_name);
        assert_eq!(fetched.identities, user.identities);
        assert!(!fetched.is_local());
        assert!(!fetched.is_disabled());
    }

    #[tokio::test]
    async fn test_create_user_duplicate_name() {
        let storage = setup().await;
        storage.create_user(&standard_user("foo", "id1")).await.unwrap();
        let err = storage
            .create_user(&standard_user("foo", "id2"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UserExists(_)));
    }

    #[tokio::test]
    async fn test_create_user_duplicate_identity() {
        let storage = setup().await;
        storage.create_user(&standard_user("foo", "id1")).await.unwrap();
        let err = storage
            .create_user(&standard_user("bar", "id1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IdentityLinked));
        // The conflicting account must not be half-created.
        let err = storage
            .get_user(&UserName::new("bar").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchUser(_)));
    }

    #[tokio::test]
    async fn test_get_user_by_identity() {
        let storage = setup().await;
        let user = standard_user("foo", "id1");
        storage.create_user(&user).await.unwrap();

        let found = storage
            .get_user_by_identity(&RemoteIdentityId::new("Globus", "id1"))
            .await
            .unwrap();
        assert_eq!(found.unwrap().user_name, user.user_name);

        let missing = storage
            .get_user_by_identity(&RemoteIdentityId::new("Globus", "other"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_local_user_round_trip() {
        let storage = setup().await;
        let user = local_user("localguy");
        storage.create_local_user(&user).await.unwrap();

        let fetched = storage.get_local_user(&user.user.user_name).await.unwrap();
        assert_eq!(fetched.password_hash, user.password_hash);
        assert_eq!(fetched.salt, user.salt);
        assert!(!fetched.force_reset);
        assert!(fetched.user.is_local());
    }

    #[tokio::test]
    async fn test_get_local_user_rejects_standard_user() {
        let storage = setup().await;
        let user = standard_user("foo", "id1");
        storage.create_user(&user).await.unwrap();
        let err = storage.get_local_user(&user.user_name).await.unwrap_err();
        assert!(matches!(err, Error::NoSuchLocalUser(_)));
    }

    #[tokio::test]
    async fn test_change_password_and_force_reset() {
        let storage = setup().await;
        let user = local_user("localguy");
        storage.create_local_user(&user).await.unwrap();

        storage
            .change_password(&user.user.user_name, &[9u8; 32], &[8u8; 8], false)
            .await
            .unwrap();
        let fetched = storage.get_local_user(&user.user.user_name).await.unwrap();
        assert_eq!(fetched.password_hash, vec![9u8; 32]);
        assert!(fetched.last_reset.is_some());

        storage
            .force_password_reset(&user.user.user_name)
            .await
            .unwrap();
        let fetched = storage.get_local_user(&user.user.user_name).await.unwrap();
        assert!(fetched.force_reset);
    }

    #[tokio::test]
    async fn test_disable_enable() {
        let storage = setup().await;
        let user = standard_user("foo", "id1");
        storage.create_user(&user).await.unwrap();

        storage
            .set_user_disabled_state(
                &user.user_name,
                &UserDisabledState::Disabled {
                    reason: "bad actor".to_string(),
                    admin: UserName::new("admin1").unwrap(),
                    time: Utc::now(),
                },
            )
            .await
            .unwrap();
        let fetched = storage.get_user(&user.user_name).await.unwrap();
        assert!(fetched.is_disabled());

        storage
            .set_user_disabled_state(&user.user_name, &UserDisabledState::Enabled)
            .await
            .unwrap();
        let fetched = storage.get_user(&user.user_name).await.unwrap();
        assert!(!fetched.is_disabled());
    }

    #[tokio::test]
    async fn test_link_unlink() {
        let storage = setup().await;
        let user = standard_user("foo", "id1");
        storage.create_user(&user).await.unwrap();

        let second = RemoteIdentity::new(
            RemoteIdentityId::new("Globus", "id2"),
            RemoteIdentityDetails::default(),
        )
        .with_local_id();
        storage.link_identity(&user.user_name, &second).await.unwrap();

        let fetched = storage.get_user(&user.user_name).await.unwrap();
        assert_eq!(fetched.identities.len(), 2);

        storage
            .unlink_identity(&user.user_name, second.local_id)
            .await
            .unwrap();
        let fetched = storage.get_user(&user.user_name).await.unwrap();
        assert_eq!(fetched.identities.len(), 1);

        // Removing the last identity is refused.
        let last = fetched.identities.iter().next().unwrap().local_id;
        let err = storage
            .unlink_identity(&user.user_name, last)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnlinkFailed(_)));
    }

    #[tokio::test]
    async fn test_link_rejects_local_user_and_duplicates() {
        let storage = setup().await;
        storage.create_local_user(&local_user("localguy")).await.unwrap();
        let user = standard_user("foo", "id1");
        storage.create_user(&user).await.unwrap();

        let ident = RemoteIdentity::new(
            RemoteIdentityId::new("Globus", "id1"),
            RemoteIdentityDetails::default(),
        )
        .with_local_id();

        let err = storage
            .link_identity(&UserName::new("localguy").unwrap(), &ident)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LinkFailed(_)));

        // Already linked to foo.
        let other = standard_user("bar", "id3");
        storage.create_user(&other).await.unwrap();
        let err = storage
            .link_identity(&other.user_name, &ident)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IdentityLinked));
    }

    #[tokio::test]
    async fn test_display_names() {
        let storage = setup().await;
        storage.create_user(&standard_user("foo", "id1")).await.unwrap();
        storage.create_user(&standard_user("bar", "id2")).await.unwrap();

        let names: HashSet<UserName> = [
            UserName::new("foo").unwrap(),
            UserName::new("bar").unwrap(),
            UserName::new("missing").unwrap(),
        ]
        .into_iter()
        .collect();

        let display = storage.get_display_names(&names).await.unwrap();
        assert_eq!(display.len(), 2);
        assert!(display.contains_key(&UserName::new("foo").unwrap()));
        assert!(!display.contains_key(&UserName::new("missing").unwrap()));
    }

    #[tokio::test]
    async fn test_search_display_names() {
        let storage = setup().await;
        let mut admin = standard_user("adminuser", "id1");
        admin.roles.insert(Role::Admin);
        storage.create_user(&admin).await.unwrap();
        storage.create_user(&standard_user("plainuser", "id2")).await.unwrap();

        let spec = UserSearchSpec {
            prefix: Some("admin".to_string()),
            ..Default::default()
        };
        let found = storage.search_display_names(&spec, 100).await.unwrap();
        assert_eq!(found.len(), 1);

        let spec = UserSearchSpec {
            roles: [Role::Admin].into_iter().collect(),
            ..Default::default()
        };
        let found = storage.search_display_names(&spec, 100).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&UserName::new("adminuser").unwrap()));
    }

    #[tokio::test]
    async fn test_user_names_with_stem() {
        let storage = setup().await;
        for (name, id) in [("user", "a"), ("user1", "b"), ("user25", "c"), ("userx", "d")] {
            storage.create_user(&standard_user(name, id)).await.unwrap();
        }

        let names = storage.user_names_with_stem("user").await.unwrap();
        let names: HashSet<String> =
            names.into_iter().map(|n| n.as_str().to_string()).collect();
        assert_eq!(
            names,
            ["user", "user1", "user25"]
                .into_iter()
                .map(String::from)
                .collect()
        );
    }

    #[tokio::test]
    async fn test_update_roles() {
        let storage = setup().await;
        let user = standard_user("foo", "id1");
        storage.create_user(&user).await.unwrap();

        storage
            .update_roles(
                &user.user_name,
                &[Role::Admin, Role::DevToken].into_iter().collect(),
                &HashSet::new(),
            )
            .await
            .unwrap();
        let fetched = storage.get_user(&user.user_name).await.unwrap();
        assert!(fetched.has_role(Role::Admin));

        storage
            .update_roles(
                &user.user_name,
                &HashSet::new(),
                &[Role::Admin].into_iter().collect(),
            )
            .await
            .unwrap();
        let fetched = storage.get_user(&user.user_name).await.unwrap();
        assert!(!fetched.has_role(Role::Admin));
        assert!(fetched.has_role(Role::DevToken));
    }

    #[tokio::test]
    async fn test_custom_roles() {
        let storage = setup().await;
        let user = standard_user("foo", "id1");
        storage.create_user(&user).await.unwrap();

        let role = CustomRole::new("myrole", "a role").unwrap();
        storage.set_custom_role(&role).await.unwrap();
        assert_eq!(storage.get_custom_roles().await.unwrap().len(), 1);

        storage
            .update_custom_roles(
                &user.user_name,
                &["myrole".to_string()].into_iter().collect(),
                &HashSet::new(),
            )
            .await
            .unwrap();
        let fetched = storage.get_user(&user.user_name).await.unwrap();
        assert!(fetched.custom_roles.contains("myrole"));

        // Unknown role ids are rejected.
        let err = storage
            .update_custom_roles(
                &user.user_name,
                &["nope".to_string()].into_iter().collect(),
                &HashSet::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchRole(_)));

        // Deleting the role definition strips it from holders.
        storage.delete_custom_role("myrole").await.unwrap();
        let fetched = storage.get_user(&user.user_name).await.unwrap();
        assert!(fetched.custom_roles.is_empty());
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let storage = setup().await;
        let name = UserName::new("foo").unwrap();
        let token = crate::models::NewToken::new(
            "plaintext".to_string(),
            TokenType::Login,
            None,
            name.clone(),
            60_000,
        );
        storage.store_token(&token.stored).await.unwrap();

        let fetched = storage.get_token(&token.stored.token_hash).await.unwrap();
        assert_eq!(fetched.id, token.stored.id);
        assert_eq!(fetched.user_name, name);

        storage.delete_token(&name, token.stored.id).await.unwrap();
        let err = storage.get_token(&token.stored.token_hash).await.unwrap_err();
        assert!(matches!(err, Error::NoSuchToken));
    }

    #[tokio::test]
    async fn test_expired_token_is_absent() {
        let storage = setup().await;
        let name = UserName::new("foo").unwrap();
        let mut token = crate::models::NewToken::new(
            "plaintext".to_string(),
            TokenType::Login,
            None,
            name.clone(),
            60_000,
        );
        token.stored.expires = Utc::now() - chrono::Duration::seconds(1);
        storage.store_token(&token.stored).await.unwrap();

        let err = storage.get_token(&token.stored.token_hash).await.unwrap_err();
        assert!(matches!(err, Error::NoSuchToken));
        assert!(storage.get_tokens(&name).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_tokens_scopes() {
        let storage = setup().await;
        let foo = UserName::new("foo").unwrap();
        let bar = UserName::new("bar").unwrap();
        for (user, plain) in [(&foo, "t1"), (&foo, "t2"), (&bar, "t3")] {
            let token = crate::models::NewToken::new(
                plain.to_string(),
                TokenType::Login,
                None,
                user.clone(),
                60_000,
            );
            storage.store_token(&token.stored).await.unwrap();
        }

        storage.delete_tokens(&foo).await.unwrap();
        assert!(storage.get_tokens(&foo).await.unwrap().is_empty());
        assert_eq!(storage.get_tokens(&bar).await.unwrap().len(), 1);

        storage.delete_all_tokens().await.unwrap();
        assert!(storage.get_tokens(&bar).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_temporary_identities() {
        let storage = setup().await;
        let ident = RemoteIdentity::new(
            RemoteIdentityId::new("Globus", "id1"),
            RemoteIdentityDetails::default(),
        )
        .with_local_id();

        storage
            .store_temporary_identities(
                "hash1",
                "Globus",
                &[ident.clone()],
                Utc::now() + chrono::Duration::minutes(30),
            )
            .await
            .unwrap();

        let stored = storage.get_temporary_identities("hash1").await.unwrap();
        assert_eq!(stored.provider, "Globus");
        assert_eq!(stored.identities, vec![ident]);

        storage.delete_temporary_identities("hash1").await.unwrap();
        let err = storage.get_temporary_identities("hash1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidToken));
    }

    #[tokio::test]
    async fn test_expired_temporary_identities_absent() {
        let storage = setup().await;
        storage
            .store_temporary_identities(
                "hash1",
                "Globus",
                &[],
                Utc::now() - chrono::Duration::seconds(1),
            )
            .await
            .unwrap();
        let err = storage.get_temporary_identities("hash1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidToken));
    }

    #[tokio::test]
    async fn test_settings_defaults_and_merge() {
        let storage = setup().await;
        let settings = storage.get_settings().await.unwrap();
        assert!(!settings.login_allowed);
        assert_eq!(
            settings.lifetime_ms(TokenLifetime::Login),
            TokenLifetime::Login.default_ms()
        );

        // Seed defaults (merge), then confirm a later merge does not
        // clobber an admin overwrite.
        storage
            .update_settings(&AuthSettings::default().as_update(), false)
            .await
            .unwrap();
        storage
            .update_settings(
                &AuthSettingsUpdate {
                    login_allowed: Some(true),
                    ..Default::default()
                },
                true,
            )
            .await
            .unwrap();
        storage
            .update_settings(&AuthSettings::default().as_update(), false)
            .await
            .unwrap();

        let settings = storage.get_settings().await.unwrap();
        assert!(settings.login_allowed);
    }

    #[tokio::test]
    async fn test_provider_settings_round_trip() {
        let storage = setup().await;
        let update = AuthSettingsUpdate {
            providers: [(
                "Globus".to_string(),
                ProviderSettings {
                    enabled: true,
                    force_login_choice: true,
                    force_link_choice: false,
                },
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        storage.update_settings(&update, true).await.unwrap();

        let settings = storage.get_settings().await.unwrap();
        let globus = settings.provider("Globus").unwrap();
        assert!(globus.enabled);
        assert!(globus.force_login_choice);
        assert!(!globus.force_link_choice);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let storage = setup().await;
        storage
            .store_temporary_identities(
                "hash1",
                "Globus",
                &[],
                Utc::now() - chrono::Duration::seconds(1),
            )
            .await
            .unwrap();
        let removed = storage.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
    }
}
