//! Protocol message subsystem.
//!
//! # Data Flow
//! ```text
//! transport (http/transport.rs)
//!     → Request (verb token, uri, canonical headers, decoded body)
//!     → uri.rs splits the uri into namespace/model/action/ids
//!     → routing::Dispatcher resolves and executes
//!     → Response (status, headers, JSON body)
//!     → transport serializes
//!
//! Failures anywhere:
//!     → ProtocolError (error.rs)
//!     → Response with {"kind", "message"[, "detail"]}
//! ```
//!
//! # Design Decisions
//! - Messages are plain data; no behaviour depends on the transport
//! - Header maps are ordered so serialized responses are stable
//! - Verbs are parsed late so the dispatcher can report unknown tokens

pub mod error;
pub mod request;
pub mod response;
pub mod uri;
pub mod verb;

pub use error::ProtocolError;
pub use request::{HeaderMap, Request, PROTOCOL_HEADERS};
pub use response::Response;
pub use uri::{Uri, UriError, UriParts};
pub use verb::{UnknownVerb, Verb};

/// Protocol version spoken by this server.
pub const PROTOCOL_VERSION: &str = "0.9";

/// Default ceiling on the number of ids a single URI may address.
pub const DEFAULT_MULTI_URI_MAX: usize = 100;

/// Render a flag the way protocol headers spell booleans.
pub(crate) fn header_flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Parse a boolean protocol header value, case-insensitively.
pub(crate) fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "t" | "1" | "yes")
}
