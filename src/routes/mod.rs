/// Router Module Index
///
/// Routing split by access level. Access control is applied per module with
/// axum layers, so a handler's exposure is decided by where it is mounted.

/// Routes open to anonymous requests. Handlers that serve more to signed-in
/// users take an `Option<AuthUser>`.
pub mod public;

/// Routes behind the `AuthUser` extractor middleware.
pub mod authenticated;

/// The admin console, gated on `Permission::Admin`.
pub mod admin;
