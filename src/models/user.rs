//! User, name, and role domain types.
//!
//! All name-like types validate on construction so the rest of the
//! engine can pass them around without re-checking.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::identity::{LinkedIdentity, RemoteIdentityId};

/// Maximum length for user names, display names, and role ids.
pub const MAX_NAME_LENGTH: usize = 100;

/// Reserved account name for the root account.
const ROOT_NAME: &str = "***ROOT***";

// ============================================================================
// UserName
// ============================================================================

/// A normalized user identifier.
///
/// Valid names are lowercase ASCII, start with a letter, contain only
/// letters and digits, and are at most [`MAX_NAME_LENGTH`] characters.
/// The root account uses a reserved name that cannot be constructed
/// through [`UserName::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserName(String);

impl UserName {
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        if name == ROOT_NAME {
            return Err(Error::IllegalParameter(format!(
                "{} is a reserved user name",
                ROOT_NAME
            )));
        }
        if name.is_empty() {
            return Err(Error::MissingParameter("user name".to_string()));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(Error::IllegalParameter(format!(
                "user name exceeds maximum length of {}",
                MAX_NAME_LENGTH
            )));
        }
        if !name.chars().next().unwrap().is_ascii_lowercase() {
            return Err(Error::IllegalParameter(format!(
                "Username {} must start with a letter",
                name
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(Error::IllegalParameter(format!(
                "Illegal character in user name {}: only lowercase ASCII letters and digits are allowed",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// The reserved root account name.
    pub fn root() -> Self {
        Self(ROOT_NAME.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_NAME
    }

    /// Map arbitrary input to a valid user name, or None if nothing
    /// usable remains: lowercase, drop illegal characters, drop leading
    /// digits, truncate.
    pub fn sanitize(input: &str) -> Option<Self> {
        let lowered: String = input
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .collect();
        let stripped = lowered.trim_start_matches(|c: char| c.is_ascii_digit());
        if stripped.is_empty() {
            return None;
        }
        let truncated: String = stripped.chars().take(MAX_NAME_LENGTH).collect();
        Some(Self(truncated))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_storage(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// DisplayName / EmailAddress
// ============================================================================

/// A user's display name: free text without control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::MissingParameter("display name".to_string()));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(Error::IllegalParameter(format!(
                "display name exceeds maximum length of {}",
                MAX_NAME_LENGTH
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(Error::IllegalParameter(
                "display name contains control characters".to_string(),
            ));
        }
        Ok(Self(name.to_string()))
    }

    /// Sentinel for identities that did not report a name.
    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An email address, or the unknown sentinel for accounts created
/// without one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmailAddress {
    Unknown,
    Address(String),
}

impl EmailAddress {
    pub fn new(addr: &str) -> Result<Self> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(Error::MissingParameter("email address".to_string()));
        }
        if addr.len() > 1000 {
            return Err(Error::IllegalParameter(
                "email address exceeds maximum length of 1000".to_string(),
            ));
        }
        if addr.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(Error::IllegalParameter(format!(
                "Illegal email address: {}",
                addr
            )));
        }
        let mut parts = addr.splitn(2, '@');
        let local = parts.next().unwrap_or("");
        let domain = parts.next().unwrap_or("");
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(Error::IllegalParameter(format!(
                "Illegal email address: {}",
                addr
            )));
        }
        Ok(Self::Address(addr.to_string()))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Unknown => None,
            Self::Address(a) => Some(a),
        }
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Built-in authorization roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Root,
    CreateAdmin,
    Admin,
    ServToken,
    DevToken,
}

impl Role {
    /// Roles this role implicitly grants, including itself.
    pub fn included(&self) -> &'static [Role] {
        match self {
            Role::Root => &[Role::Root],
            Role::CreateAdmin => &[Role::CreateAdmin],
            Role::Admin => &[Role::Admin, Role::DevToken, Role::ServToken],
            Role::ServToken => &[Role::ServToken, Role::DevToken],
            Role::DevToken => &[Role::DevToken],
        }
    }

    /// Roles this role is permitted to grant to other users.
    ///
    /// Hierarchy: root grants create-admin, create-admin grants admin,
    /// admin grants the token-creation roles.
    pub fn grantable(&self) -> &'static [Role] {
        match self {
            Role::Root => &[Role::CreateAdmin],
            Role::CreateAdmin => &[Role::Admin],
            Role::Admin => &[Role::DevToken, Role::ServToken],
            Role::ServToken | Role::DevToken => &[],
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Role::Root => "Root",
            Role::CreateAdmin => "Create administrator",
            Role::Admin => "Administrator",
            Role::ServToken => "Create server tokens",
            Role::DevToken => "Create developer tokens",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Root => "ROOT",
            Role::CreateAdmin => "CREATE_ADMIN",
            Role::Admin => "ADMIN",
            Role::ServToken => "SERV_TOKEN",
            Role::DevToken => "DEV_TOKEN",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "ROOT" => Ok(Role::Root),
            "CREATE_ADMIN" => Ok(Role::CreateAdmin),
            "ADMIN" => Ok(Role::Admin),
            "SERV_TOKEN" => Ok(Role::ServToken),
            "DEV_TOKEN" => Ok(Role::DevToken),
            _ => Err(Error::NoSuchRole(s.to_string())),
        }
    }

    /// Roles that mark a user as an administrator.
    pub fn admin_roles() -> &'static [Role] {
        &[Role::Root, Role::CreateAdmin, Role::Admin]
    }
}

/// A user-defined role, independent of the built-in roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRole {
    pub id: String,
    pub description: String,
}

impl CustomRole {
    pub fn new(id: &str, description: &str) -> Result<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::MissingParameter("custom role id".to_string()));
        }
        if id.len() > MAX_NAME_LENGTH {
            return Err(Error::IllegalParameter(format!(
                "custom role id exceeds maximum length of {}",
                MAX_NAME_LENGTH
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(Error::IllegalParameter(format!(
                "Illegal character in custom role id {}: only lowercase ASCII letters and digits are allowed",
                id
            )));
        }
        let description = description.trim();
        if description.is_empty() {
            return Err(Error::MissingParameter("custom role description".to_string()));
        }
        Ok(Self {
            id: id.to_string(),
            description: description.to_string(),
        })
    }
}

// ============================================================================
// Users
// ============================================================================

/// Whether an account is enabled, and if not, why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UserDisabledState {
    Enabled,
    Disabled {
        reason: String,
        admin: UserName,
        time: DateTime<Utc>,
    },
}

impl UserDisabledState {
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled { .. })
    }
}

/// An authenticated user account.
///
/// A local user authenticates by password and has no linked identities;
/// a standard user authenticates via at least one linked remote
/// identity and has no password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_name: UserName,
    pub email: EmailAddress,
    pub display_name: DisplayName,
    pub roles: HashSet<Role>,
    pub custom_roles: HashSet<String>,
    pub policy_ids: HashSet<String>,
    pub created: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub disabled: UserDisabledState,
    pub identities: HashSet<LinkedIdentity>,
    pub local: bool,
}

impl AuthUser {
    pub fn is_disabled(&self) -> bool {
        self.disabled.is_disabled()
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn is_root(&self) -> bool {
        self.user_name.is_root()
    }

    /// Check whether the user holds any administrative role.
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| Role::admin_roles().contains(r))
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// The full set of roles this user effectively holds, expanding
    /// each held role into its included set.
    pub fn included_roles(&self) -> HashSet<Role> {
        self.roles
            .iter()
            .flat_map(|r| r.included().iter().copied())
            .collect()
    }

    /// The set of roles this user may grant to others.
    pub fn grantable_roles(&self) -> HashSet<Role> {
        self.roles
            .iter()
            .flat_map(|r| r.grantable().iter().copied())
            .collect()
    }

    /// Look up a linked identity by its local UUID.
    pub fn identity(&self, id: Uuid) -> Option<&LinkedIdentity> {
        self.identities.iter().find(|i| i.local_id == id)
    }

    /// Whether this user is linked to the given remote identity.
    pub fn has_remote_identity(&self, id: &RemoteIdentityId) -> bool {
        self.identities.iter().any(|i| &i.identity.id == id)
    }
}

/// A password-authenticated user.
#[derive(Debug, Clone)]
pub struct LocalUser {
    pub user: AuthUser,
    pub password_hash: Vec<u8>,
    pub salt: Vec<u8>,
    pub force_reset: bool,
    pub last_reset: Option<DateTime<Utc>>,
}
