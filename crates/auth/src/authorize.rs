use std::collections::HashSet;

use thiserror::Error;

use ledgerdesk_core::TenantId;

use crate::{Permission, PrincipalId, TenantMembership};

/// A fully resolved principal for authorization decisions.
///
/// Construction is decoupled from storage and transport: the API derives
/// memberships from verified claims plus the role→permission policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked at the command boundary).
///
/// Implemented by commands that require permissions; the API layer enforces
/// the requirements before dispatching.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal within its active tenant context.
///
/// Pure policy check: no IO, no panics, no business logic.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let perms: HashSet<&str> = principal
        .membership
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn principal(tenant: TenantId, membership_tenant: TenantId, perms: Vec<&'static str>) -> Principal {
        Principal {
            principal_id: PrincipalId::new(),
            active_tenant_id: tenant,
            membership: TenantMembership {
                tenant_id: membership_tenant,
                roles: vec![Role::new("accountant")],
                permissions: perms.into_iter().map(Permission::new).collect(),
            },
        }
    }

    #[test]
    fn wildcard_grants_everything() {
        let t = TenantId::new();
        let p = principal(t, t, vec!["*"]);
        assert!(authorize(&p, &Permission::new("accounting.voucher.post")).is_ok());
    }

    #[test]
    fn explicit_permission_grants_only_itself() {
        let t = TenantId::new();
        let p = principal(t, t, vec!["crm.customer.read"]);
        assert!(authorize(&p, &Permission::new("crm.customer.read")).is_ok());
        assert_eq!(
            authorize(&p, &Permission::new("crm.customer.write")),
            Err(AuthzError::Forbidden("crm.customer.write".to_string()))
        );
    }

    #[test]
    fn cross_tenant_membership_is_rejected() {
        let p = principal(TenantId::new(), TenantId::new(), vec!["*"]);
        assert_eq!(
            authorize(&p, &Permission::new("crm.customer.read")),
            Err(AuthzError::TenantMismatch)
        );
    }
}
