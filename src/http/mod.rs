//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → transport.rs (headers, verb, body → protocol Request)
//!     → routing::Dispatcher
//!     → transport.rs (protocol Response → status, headers, body)
//!     → Send to client
//! ```

pub mod request;
pub mod server;
pub mod transport;

pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;
