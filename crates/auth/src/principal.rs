use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use siteops_core::UserId;

use crate::Role;

/// A resolved caller: who they are and what role they act in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Identity/role lookup collaborator.
///
/// The reconciliation engine never decides who a caller is; it asks a
/// resolver, backed by whatever session or directory the host application uses.
pub trait RoleResolver: Send + Sync {
    fn resolve(&self, user_id: UserId) -> Option<Principal>;
}

impl<R> RoleResolver for std::sync::Arc<R>
where
    R: RoleResolver + ?Sized,
{
    fn resolve(&self, user_id: UserId) -> Option<Principal> {
        (**self).resolve(user_id)
    }
}

/// In-memory resolver for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRoleResolver {
    roles: RwLock<HashMap<UserId, Role>>,
}

impl InMemoryRoleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a user's role.
    pub fn assign(&self, user_id: UserId, role: Role) {
        if let Ok(mut roles) = self.roles.write() {
            roles.insert(user_id, role);
        }
    }

    /// Create a fresh user holding `role`.
    pub fn user(&self, role: Role) -> UserId {
        let user_id = UserId::new();
        self.assign(user_id, role);
        user_id
    }
}

impl RoleResolver for InMemoryRoleResolver {
    fn resolve(&self, user_id: UserId) -> Option<Principal> {
        let roles = self.roles.read().ok()?;
        roles
            .get(&user_id)
            .map(|role| Principal::new(user_id, *role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_assigned_users_only() {
        let resolver = InMemoryRoleResolver::new();
        let guard = resolver.user(Role::Security);

        assert_eq!(
            resolver.resolve(guard),
            Some(Principal::new(guard, Role::Security))
        );
        assert_eq!(resolver.resolve(UserId::new()), None);
    }

    #[test]
    fn reassignment_replaces_role() {
        let resolver = InMemoryRoleResolver::new();
        let user = resolver.user(Role::Accounts);
        resolver.assign(user, Role::AccountsManager);
        assert_eq!(resolver.resolve(user).map(|p| p.role), Some(Role::AccountsManager));
    }
}
