//! Bearer token types.
//!
//! Plaintext token values exist only in [`IncomingToken`], [`NewToken`],
//! and [`TemporaryToken`]; everything persisted stores a SHA-256 hash.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::user::{UserName, MAX_NAME_LENGTH};

/// Hash a plaintext token for storage or lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

// ============================================================================
// IncomingToken
// ============================================================================

/// A plaintext bearer token presented by a client.
///
/// Never persisted; storage lookups use the hash.
#[derive(Clone, PartialEq, Eq)]
pub struct IncomingToken(String);

impl IncomingToken {
    pub fn new(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::NoTokenProvided);
        }
        Ok(Self(token.to_string()))
    }

    pub fn hash(&self) -> String {
        hash_token(&self.0)
    }
}

// Keeps token values out of logs.
impl fmt::Debug for IncomingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IncomingToken(<redacted>)")
    }
}

// ============================================================================
// Token types and names
// ============================================================================

/// The kind of a bearer token.
///
/// Login tokens come from login flows; dev and serv tokens are the
/// extended-lifetime tokens created by developers and services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    Login,
    Dev,
    Serv,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Login => "LOGIN",
            TokenType::Dev => "DEV",
            TokenType::Serv => "SERV",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "LOGIN" => Ok(TokenType::Login),
            "DEV" => Ok(TokenType::Dev),
            "SERV" => Ok(TokenType::Serv),
            _ => Err(Error::Internal(format!("unknown token type: {}", s))),
        }
    }
}

/// An optional user-assigned token name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenName(String);

impl TokenName {
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::MissingParameter("token name".to_string()));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(Error::IllegalParameter(format!(
                "token name exceeds maximum length of {}",
                MAX_NAME_LENGTH
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(Error::IllegalParameter(
                "token name contains control characters".to_string(),
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Stored tokens
// ============================================================================

/// The server-side record of a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashedToken {
    pub id: Uuid,
    pub token_type: TokenType,
    pub name: Option<TokenName>,
    pub user_name: UserName,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub token_hash: String,
}

impl HashedToken {
    pub fn is_expired(&self) -> bool {
        self.expires < Utc::now()
    }
}

/// A freshly issued token: the plaintext to hand to the caller exactly
/// once, plus the record to persist.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub token: String,
    pub stored: HashedToken,
}

impl NewToken {
    pub fn new(
        token: String,
        token_type: TokenType,
        name: Option<TokenName>,
        user_name: UserName,
        lifetime_ms: u64,
    ) -> Self {
        let now = Utc::now();
        let stored = HashedToken {
            id: Uuid::new_v4(),
            token_type,
            name,
            user_name,
            created: now,
            expires: now + Duration::milliseconds(lifetime_ms as i64),
            token_hash: hash_token(&token),
        };
        Self { token, stored }
    }
}

// ============================================================================
// Temporary tokens
// ============================================================================

/// A short-lived token carrying deferred login or link state.
#[derive(Clone)]
pub struct TemporaryToken {
    pub token: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl TemporaryToken {
    pub fn new(token: String, lifetime_ms: u64) -> Self {
        let now = Utc::now();
        Self {
            token,
            created: now,
            expires: now + Duration::milliseconds(lifetime_ms as i64),
        }
    }

    pub fn hash(&self) -> String {
        hash_token(&self.token)
    }
}

impl fmt::Debug for TemporaryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryToken")
            .field("token", &"<redacted>")
            .field("expires", &self.expires)
            .finish()
    }
}
