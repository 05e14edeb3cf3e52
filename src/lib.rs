//! Resource protocol (CInP) server library.
//!
//! Exposes typed, introspectable models under hierarchical namespaces over
//! HTTP. Each model supports DESCRIBE/GET/LIST/CREATE/UPDATE/DELETE plus
//! named actions invoked with CALL.

// Protocol core
pub mod protocol;
pub mod registry;
pub mod routing;
pub mod transaction;

// Transport
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub mod demo;

use std::sync::Arc;

pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use registry::{Catalog, Registry};
pub use routing::{DispatchSettings, Dispatcher};

use crate::security::StaticAuthenticator;

/// Build a dispatcher for `catalog` with the settings and static users of
/// `config`.
pub fn dispatcher(config: &ServerConfig, catalog: Catalog) -> Dispatcher {
    Dispatcher::new(
        catalog,
        Arc::new(StaticAuthenticator::from_config(&config.auth)),
        DispatchSettings::from_config(&config.protocol),
    )
}
