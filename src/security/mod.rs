//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → user.rs (AUTH-ID/AUTH-TOKEN → User, or 401)
//!     → access.rs (CheckAuth per namespace/model/action, or 403)
//!     → execute
//!     → cors.rs (allow-list headers on the way out)
//! ```
//!
//! # Design Decisions
//! - Fail closed: unknown credentials never fall back to anonymous
//! - Models deny by default; namespaces permit by default
//! - Superusers bypass predicates

pub mod access;
pub mod cors;
pub mod user;

pub use access::{ActionAuth, AuthContext, CheckAuth};
pub use user::{AnonymousAuthenticator, Authenticator, StaticAuthenticator, User};
