//! `ledgerdesk-auth` — authentication/authorization boundary (zero-trust).
//!
//! Pure claims + policy checks, plus the HS256 token validator. No HTTP or
//! storage concerns; the API layer owns transport.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod token;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use permissions::Permission;
pub use principal::{PrincipalId, TenantMembership};
pub use roles::Role;
pub use token::{Hs256JwtValidator, JwtValidator, TokenError};
