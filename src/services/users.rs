//! Authorization and user administration.
//!
//! Central token-to-user resolution with role gating, role and
//! custom-role mutation under the grant hierarchy, account
//! disable/enable, and display-name lookup/search.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{
    AuthUser, CustomRole, DisplayName, IncomingToken, Role, UserDisabledState, UserName,
};
use crate::services::resolve_user;
use crate::storage::{Storage, UserSearchSpec};

/// Hard cap on display-name query inputs and search results.
const MAX_DISPLAY_NAME_QUERY: usize = 10_000;

#[derive(Clone)]
pub struct UserService {
    storage: Arc<dyn Storage>,
}

impl UserService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Resolve a token to its user, requiring any of the given roles
    /// when `required` is non-empty.
    ///
    /// Presenting a token for a disabled user deletes all of that
    /// user's tokens.
    pub async fn get_user(&self, token: &IncomingToken, required: &[Role]) -> Result<AuthUser> {
        let (_, user) = resolve_user(&self.storage, token).await?;

        if !required.is_empty() {
            let held = user.included_roles();
            if !required.iter().any(|r| held.contains(r)) {
                return Err(Error::Unauthorized(format!(
                    "{} is not authorized for this operation",
                    user.user_name
                )));
            }
        }

        Ok(user)
    }

    /// Add and remove built-in roles on a user.
    ///
    /// The acting user may only grant roles in their grantable set,
    /// and may only remove roles from *another* user with the same
    /// grant authority. Users may always remove their own roles.
    pub async fn update_roles(
        &self,
        admin_token: &IncomingToken,
        user_name: &UserName,
        add: HashSet<Role>,
        remove: HashSet<Role>,
    ) -> Result<()> {
        let both: Vec<&Role> = add.intersection(&remove).collect();
        if !both.is_empty() {
            let mut names: Vec<&str> = both.iter().map(|r| r.description()).collect();
            names.sort_unstable();
            return Err(Error::IllegalParameter(format!(
                "One or more roles is both added and removed: {}",
                names.join(", ")
            )));
        }
        if user_name.is_root() {
            return Err(Error::Unauthorized("Cannot change ROOT roles".to_string()));
        }

        let (_, acting) = resolve_user(&self.storage, admin_token).await?;
        let grantable = acting.grantable_roles();

        let ungrantable: Vec<&Role> = add.iter().filter(|r| !grantable.contains(*r)).collect();
        if !ungrantable.is_empty() {
            let mut names: Vec<&str> = ungrantable.iter().map(|r| r.description()).collect();
            names.sort_unstable();
            return Err(Error::Unauthorized(format!(
                "Not authorized to grant role(s): {}",
                names.join(", ")
            )));
        }

        if &acting.user_name != user_name {
            let unremovable: Vec<&Role> =
                remove.iter().filter(|r| !grantable.contains(*r)).collect();
            if !unremovable.is_empty() {
                let mut names: Vec<&str> = unremovable.iter().map(|r| r.description()).collect();
                names.sort_unstable();
                return Err(Error::Unauthorized(format!(
                    "Not authorized to remove role(s): {}",
                    names.join(", ")
                )));
            }
        }

        self.storage.update_roles(user_name, &add, &remove).await?;
        info!(
            acting = %acting.user_name,
            user = %user_name,
            "Updated roles"
        );
        Ok(())
    }

    /// Add and remove custom roles on a user. Admin only; there is no
    /// self-service exception since custom roles are admin-assigned
    /// tags.
    pub async fn update_custom_roles(
        &self,
        admin_token: &IncomingToken,
        user_name: &UserName,
        add: HashSet<String>,
        remove: HashSet<String>,
    ) -> Result<()> {
        let both: Vec<&String> = add.intersection(&remove).collect();
        if !both.is_empty() {
            let mut names: Vec<&str> = both.iter().map(|s| s.as_str()).collect();
            names.sort_unstable();
            return Err(Error::IllegalParameter(format!(
                "One or more roles is both added and removed: {}",
                names.join(", ")
            )));
        }

        let acting = self.get_user(admin_token, &[Role::Admin]).await?;
        self.storage
            .update_custom_roles(user_name, &add, &remove)
            .await?;
        info!(
            acting = %acting.user_name,
            user = %user_name,
            "Updated custom roles"
        );
        Ok(())
    }

    /// Create or update a custom role definition. Admin only.
    pub async fn set_custom_role(
        &self,
        admin_token: &IncomingToken,
        role: CustomRole,
    ) -> Result<()> {
        let acting = self.get_user(admin_token, &[Role::Admin]).await?;
        self.storage.set_custom_role(&role).await?;
        info!(acting = %acting.user_name, role = %role.id, "Set custom role");
        Ok(())
    }

    /// Delete a custom role definition, removing it from all holders.
    /// Admin only.
    pub async fn delete_custom_role(&self, admin_token: &IncomingToken, id: &str) -> Result<()> {
        let acting = self.get_user(admin_token, &[Role::Admin]).await?;
        self.storage.delete_custom_role(id).await?;
        info!(acting = %acting.user_name, role = %id, "Deleted custom role");
        Ok(())
    }

    /// List custom role definitions. Any authenticated user.
    pub async fn list_custom_roles(&self, token: &IncomingToken) -> Result<Vec<CustomRole>> {
        self.get_user(token, &[]).await?;
        self.storage.get_custom_roles().await
    }

    /// Disable or enable an account.
    ///
    /// Requires an administrative role. Only root may disable root;
    /// nobody may enable root through this path. Disabling purges the
    /// target's tokens both before and after the state write to
    /// narrow the window for an in-flight login.
    pub async fn set_user_disabled(
        &self,
        admin_token: &IncomingToken,
        user_name: &UserName,
        disable: bool,
        reason: Option<String>,
    ) -> Result<()> {
        let (_, acting) = resolve_user(&self.storage, admin_token).await?;
        if !acting.is_admin() {
            return Err(Error::Unauthorized(format!(
                "{} is not authorized to disable accounts",
                acting.user_name
            )));
        }

        if user_name.is_root() {
            if !disable {
                return Err(Error::Unauthorized(
                    "Cannot enable the ROOT account".to_string(),
                ));
            }
            if !acting.has_role(Role::Root) {
                return Err(Error::Unauthorized(
                    "Only ROOT may disable the ROOT account".to_string(),
                ));
            }
        }

        if disable {
            let reason = reason.map(|r| r.trim().to_string()).unwrap_or_default();
            if reason.is_empty() {
                return Err(Error::MissingParameter("reason".to_string()));
            }

            self.storage.delete_tokens(user_name).await?;
            self.storage
                .set_user_disabled_state(
                    user_name,
                    &UserDisabledState::Disabled {
                        reason,
                        admin: acting.user_name.clone(),
                        time: Utc::now(),
                    },
                )
                .await?;
            // A login racing the disable may have issued a token
            // between the first purge and the state write.
            self.storage.delete_tokens(user_name).await?;
            warn!(acting = %acting.user_name, user = %user_name, "Disabled account");
        } else {
            self.storage
                .set_user_disabled_state(user_name, &UserDisabledState::Enabled)
                .await?;
            info!(acting = %acting.user_name, user = %user_name, "Enabled account");
        }

        Ok(())
    }

    /// Resolve display names for a set of users, dropping names that
    /// do not exist. Input capped at 10 000.
    pub async fn get_display_names(
        &self,
        token: &IncomingToken,
        names: HashSet<UserName>,
    ) -> Result<std::collections::HashMap<UserName, DisplayName>> {
        self.get_user(token, &[]).await?;
        if names.len() > MAX_DISPLAY_NAME_QUERY {
            return Err(Error::IllegalParameter(format!(
                "User count exceeds maximum of {}",
                MAX_DISPLAY_NAME_QUERY
            )));
        }
        self.storage.get_display_names(&names).await
    }

    /// Search users by spec. Non-admins may only run prefix-scoped
    /// searches without role filters. Results capped at 10 000.
    pub async fn search_display_names(
        &self,
        token: &IncomingToken,
        spec: UserSearchSpec,
    ) -> Result<std::collections::HashMap<UserName, DisplayName>> {
        let acting = self.get_user(token, &[]).await?;

        if !acting.is_admin() {
            if spec.prefix.as_deref().map(str::trim).unwrap_or("").is_empty() {
                return Err(Error::Unauthorized(
                    "Non-admin users may only search with a prefix".to_string(),
                ));
            }
            if spec.has_role_filters() {
                return Err(Error::Unauthorized(
                    "Non-admin users may not search by role".to_string(),
                ));
            }
        }

        self.storage
            .search_display_names(&spec, MAX_DISPLAY_NAME_QUERY)
            .await
    }
}
