use thiserror::Error;

use siteops_core::DomainError;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role {role} lacks permission '{permission}'")]
    Forbidden { role: Role, permission: String },

    #[error("forbidden: role {role} may not perform {action}")]
    RoleNotAllowed { role: Role, action: &'static str },
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::unauthorized(value.to_string())
    }
}

/// Authorize a principal for a permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal.role.permissions();
    if granted
        .iter()
        .any(|p| p.is_wildcard() || p.as_str() == required.as_str())
    {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role: principal.role,
            permission: required.as_str().to_string(),
        })
    }
}

/// Role-list check for actions whose policy is phrased in roles rather than
/// permissions. `Admin` always passes.
pub fn require_any_role(
    principal: &Principal,
    allowed: &[Role],
    action: &'static str,
) -> Result<(), AuthzError> {
    if principal.role == Role::Admin || allowed.contains(&principal.role) {
        Ok(())
    } else {
        Err(AuthzError::RoleNotAllowed {
            role: principal.role,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteops_core::UserId;

    fn principal(role: Role) -> Principal {
        Principal::new(UserId::new(), role)
    }

    #[test]
    fn admin_wildcard_grants_everything() {
        let admin = principal(Role::Admin);
        assert!(authorize(&admin, &Permission::GRN_VERIFY).is_ok());
        assert!(authorize(&admin, &Permission::DISPATCH_HAND_OUT).is_ok());
        assert!(authorize(&admin, &Permission::new("anything.at_all")).is_ok());
    }

    #[test]
    fn accounts_may_verify_but_not_hand_out() {
        let accounts = principal(Role::Accounts);
        assert!(authorize(&accounts, &Permission::GRN_VERIFY).is_ok());

        let err = authorize(&accounts, &Permission::DISPATCH_HAND_OUT).unwrap_err();
        assert_eq!(
            err,
            AuthzError::Forbidden {
                role: Role::Accounts,
                permission: "dispatch.hand_out".to_string(),
            }
        );
    }

    #[test]
    fn security_hands_out_but_cannot_verify() {
        let guard = principal(Role::Security);
        assert!(authorize(&guard, &Permission::DISPATCH_HAND_OUT).is_ok());
        assert!(authorize(&guard, &Permission::GRN_VERIFY).is_err());
    }

    #[test]
    fn role_list_check_admits_admin() {
        let admin = principal(Role::Admin);
        let driver = principal(Role::Driver);
        assert!(require_any_role(&admin, &[Role::Security], "hand out").is_ok());
        assert!(require_any_role(&driver, &[Role::Security], "hand out").is_err());
    }

    #[test]
    fn converts_into_domain_unauthorized() {
        let err: DomainError = authorize(&principal(Role::Driver), &Permission::GRN_VERIFY)
            .unwrap_err()
            .into();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }
}
