use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "grn.verify"). The special
/// wildcard permission `"*"` grants everything and is held by admins only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission::from_static("*");

    pub const REQUISITION_SUBMIT: Permission = Permission::from_static("requisition.submit");
    pub const PURCHASE_ORDER_CREATE: Permission = Permission::from_static("purchase_order.create");
    pub const PURCHASE_ORDER_APPROVE: Permission =
        Permission::from_static("purchase_order.approve");
    pub const PURCHASE_ORDER_REJECT: Permission = Permission::from_static("purchase_order.reject");
    pub const PURCHASE_ORDER_PLACE: Permission = Permission::from_static("purchase_order.place");
    pub const SITE_PURCHASE_RECORD: Permission = Permission::from_static("site_purchase.record");
    pub const GOODS_RECEIVE: Permission = Permission::from_static("goods.receive");
    pub const GRN_VERIFY: Permission = Permission::from_static("grn.verify");
    pub const VARIANCE_VIEW: Permission = Permission::from_static("variance.view");

    pub const DISPATCH_CREATE: Permission = Permission::from_static("dispatch.create");
    pub const DISPATCH_SUBMIT: Permission = Permission::from_static("dispatch.submit");
    pub const DISPATCH_APPROVE: Permission = Permission::from_static("dispatch.approve");
    pub const DISPATCH_HAND_OUT: Permission = Permission::from_static("dispatch.hand_out");
    pub const DISPATCH_TRANSIT: Permission = Permission::from_static("dispatch.transit");
    pub const DISPATCH_ACKNOWLEDGE: Permission = Permission::from_static("dispatch.acknowledge");
    pub const DISPATCH_RETURN: Permission = Permission::from_static("dispatch.return");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
