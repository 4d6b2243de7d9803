//! API-side authorization guards.
//!
//! Authorization happens at the HTTP boundary (before dispatch and before
//! read-model lookups), keeping domain aggregates and infra auth-agnostic.

use ledgerdesk_auth::{
    AuthzError, CommandAuthorization, Permission, Principal, Role, TenantMembership, authorize,
};

use crate::context::{PrincipalContext, TenantContext};

/// Check authorization for a command in the current request context.
///
/// Intended to be called **before** dispatching.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = build_principal(tenant, principal);

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

/// Check a single permission in the current request context (read guards).
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<(), AuthzError> {
    let principal = build_principal(tenant, principal);
    authorize(&principal, permission)
}

fn build_principal(tenant: &TenantContext, principal: &PrincipalContext) -> Principal {
    let membership = TenantMembership {
        tenant_id: tenant.tenant_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    };

    Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership,
    }
}

/// Static role→permission policy.
///
/// - `admin`: everything in the tenant
/// - `accountant`: chart of accounts, fiscal calendar, vouchers, reports
/// - `registrar`: customers and addresses
/// - `viewer`: read access everywhere
pub fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    let mut perms: Vec<&'static str> = Vec::new();

    for role in roles {
        match role.as_str() {
            "admin" => return vec![Permission::new("*")],
            "accountant" => perms.extend([
                "accounting.accounts.read",
                "accounting.accounts.write",
                "accounting.fiscal.read",
                "accounting.fiscal.write",
                "accounting.vouchers.read",
                "accounting.vouchers.write",
                "reports.read",
            ]),
            "registrar" => perms.extend([
                "crm.customers.read",
                "crm.customers.write",
                "crm.addresses.read",
                "crm.addresses.write",
            ]),
            "viewer" => perms.extend([
                "crm.customers.read",
                "crm.addresses.read",
                "accounting.accounts.read",
                "accounting.fiscal.read",
                "accounting.vouchers.read",
                "reports.read",
            ]),
            _ => {}
        }
    }

    perms.sort_unstable();
    perms.dedup();
    perms.into_iter().map(Permission::new).collect()
}
