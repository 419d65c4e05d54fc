pub mod auth;
pub mod rbac;
pub mod security;

pub use auth::{auth_middleware, require_authenticated};
pub use rbac::make_permission_middleware;
pub use security::{rate_limit_middleware, with_hardening_headers, SecurityPolicy};
