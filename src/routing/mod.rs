//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! Request (verb token, uri, headers, data)
//!     → parse verb, split uri, enforce multi-uri-max
//!     → Catalog::lookup (namespace / model / action)
//!     → OPTIONS answered here, before version and auth
//!     → CINP-VERSION check
//!     → checks.rs (verb vs element, ids, data)
//!     → not-allowed verbs, MULTI-OBJECT
//!     → Authenticator → User
//!     → describe / Model::invoke / Model::invoke_action
//!     → Response + Cinp-Version (+ CORS)
//! ```
//!
//! # Design Decisions
//! - Synchronous: transactions may block, the HTTP layer moves dispatch
//!   onto the blocking pool
//! - Every failure is a `ProtocolError` rendered in one place (`respond`)

pub mod checks;
pub mod dispatcher;

pub use dispatcher::{DispatchSettings, Dispatcher};
