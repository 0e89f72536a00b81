//! Remote identity types.
//!
//! A remote identity is an account at a third-party identity provider.
//! Once the server has seen an identity it assigns a local UUID, which
//! is what clients reference when choosing between identities in the
//! login and link flows.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies an account at a provider: (provider name, provider-local id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteIdentityId {
    pub provider: String,
    pub provider_id: String,
}

impl RemoteIdentityId {
    pub fn new(provider: &str, provider_id: &str) -> Self {
        Self {
            provider: provider.to_string(),
            provider_id: provider_id.to_string(),
        }
    }
}

/// Display details reported by the provider; any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteIdentityDetails {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

impl RemoteIdentityDetails {
    pub fn new(
        username: Option<&str>,
        full_name: Option<&str>,
        email: Option<&str>,
    ) -> Self {
        let clean = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        Self {
            username: clean(username),
            full_name: clean(full_name),
            email: clean(email),
        }
    }
}

/// A remote identity as returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub id: RemoteIdentityId,
    pub details: RemoteIdentityDetails,
}

impl RemoteIdentity {
    pub fn new(id: RemoteIdentityId, details: RemoteIdentityDetails) -> Self {
        Self { id, details }
    }

    /// Attach a freshly minted local UUID to this identity.
    pub fn with_local_id(self) -> LinkedIdentity {
        LinkedIdentity {
            local_id: Uuid::new_v4(),
            identity: self,
        }
    }
}

/// A remote identity with its locally assigned UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedIdentity {
    pub local_id: Uuid,
    pub identity: RemoteIdentity,
}
