use serde::{Deserialize, Serialize};

use crate::Permission;

/// Staff role used for RBAC.
///
/// Each role maps to a fixed permission set (see [`Role::permissions`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Director,
    AccountsManager,
    Accounts,
    Procurement,
    ProjectManager,
    SiteEngineer,
    Security,
    Driver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Director => "DIRECTOR",
            Role::AccountsManager => "ACCOUNTS_MANAGER",
            Role::Accounts => "ACCOUNTS",
            Role::Procurement => "PROCUREMENT",
            Role::ProjectManager => "PROJECT_MANAGER",
            Role::SiteEngineer => "SITE_ENGINEER",
            Role::Security => "SECURITY",
            Role::Driver => "DRIVER",
        }
    }

    /// Accounts staff of any seniority.
    pub fn is_accounts_family(&self) -> bool {
        matches!(self, Role::Accounts | Role::AccountsManager)
    }

    /// Permissions granted by this role.
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::Admin => ADMIN,
            Role::Director => DIRECTOR,
            Role::AccountsManager => ACCOUNTS_MANAGER,
            Role::Accounts => ACCOUNTS,
            Role::Procurement => PROCUREMENT,
            Role::ProjectManager => PROJECT_MANAGER,
            Role::SiteEngineer => SITE_ENGINEER,
            Role::Security => SECURITY,
            Role::Driver => DRIVER,
        }
    }
}

const ADMIN: &[Permission] = &[Permission::WILDCARD];

const DIRECTOR: &[Permission] = &[
    Permission::PURCHASE_ORDER_APPROVE,
    Permission::PURCHASE_ORDER_REJECT,
    Permission::DISPATCH_APPROVE,
    Permission::VARIANCE_VIEW,
];

const ACCOUNTS_MANAGER: &[Permission] = &[
    Permission::PURCHASE_ORDER_APPROVE,
    Permission::PURCHASE_ORDER_REJECT,
    Permission::GRN_VERIFY,
    Permission::VARIANCE_VIEW,
];

const ACCOUNTS: &[Permission] = &[Permission::GRN_VERIFY];

const PROCUREMENT: &[Permission] = &[
    Permission::REQUISITION_SUBMIT,
    Permission::PURCHASE_ORDER_CREATE,
    Permission::PURCHASE_ORDER_PLACE,
    Permission::SITE_PURCHASE_RECORD,
    Permission::GOODS_RECEIVE,
    Permission::DISPATCH_CREATE,
    Permission::DISPATCH_SUBMIT,
    Permission::DISPATCH_RETURN,
];

const PROJECT_MANAGER: &[Permission] = &[
    Permission::REQUISITION_SUBMIT,
    Permission::DISPATCH_CREATE,
    Permission::DISPATCH_SUBMIT,
    Permission::DISPATCH_APPROVE,
    Permission::DISPATCH_RETURN,
];

const SITE_ENGINEER: &[Permission] = &[
    Permission::REQUISITION_SUBMIT,
    Permission::DISPATCH_CREATE,
    Permission::DISPATCH_SUBMIT,
    Permission::DISPATCH_RETURN,
];

const SECURITY: &[Permission] = &[Permission::GOODS_RECEIVE, Permission::DISPATCH_HAND_OUT];

const DRIVER: &[Permission] = &[Permission::DISPATCH_TRANSIT, Permission::DISPATCH_ACKNOWLEDGE];

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
