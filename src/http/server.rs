//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the protocol handler
//! - Wire up middleware (tracing, request ID, timeout, body limit)
//! - Bind server to listener
//! - Hand each exchange to the transport adapter and dispatcher
//! - Observability (metrics, correlation IDs)

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::http::transport::{build_request, encode, Environ};
use crate::observability::metrics;
use crate::protocol::{self, ProtocolError};
use crate::routing::Dispatcher;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub max_body_size: usize,
}

/// HTTP server for the protocol.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server serving `dispatcher`.
    pub fn new(config: &ServerConfig, dispatcher: Dispatcher) -> Self {
        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            max_body_size: config.security.max_body_size,
        };

        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let max_body_size = state.max_body_size;
        Router::new()
            .route("/{*path}", any(protocol_handler))
            .route("/", any(protocol_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The configured router, for embedding.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Translate the exchange, dispatch on the blocking pool, translate back.
async fn protocol_handler(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let request_id = request.headers().request_id().to_string();
    let (parts, body) = request.into_parts();

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        "Protocol request"
    );

    let dispatcher = state.dispatcher.clone();
    let body = match to_bytes(body, state.max_body_size).await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(request_id = %request_id, error = %err, "Failed to read request body");
            let response = dispatcher.respond(Err(ProtocolError::bad_request("Unable to read request body")));
            metrics::record_request(parts.method.as_str(), response.status, start);
            return into_http(&response);
        }
    };

    let environ = Environ {
        method: parts.method.as_str().to_string(),
        path: parts.uri.path().to_string(),
        vars: parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect(),
        body: body.to_vec(),
    };

    let outcome = tokio::task::spawn_blocking(move || match build_request(environ) {
        Ok(request) => {
            let verb = request.verb.clone();
            (verb, dispatcher.handle(request))
        }
        Err(err) => (String::from("INVALID"), dispatcher.respond(Err(err))),
    })
    .await;

    let (verb, response) = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(request_id = %request_id, error = %err, "Dispatch task failed");
            metrics::record_request(parts.method.as_str(), 500, start);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Dispatch failed").into_response();
        }
    };

    tracing::info!(
        request_id = %request_id,
        verb = %verb,
        path = %parts.uri.path(),
        status = response.status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );
    metrics::record_request(&verb, response.status, start);

    into_http(&response)
}

fn into_http(response: &protocol::Response) -> Response {
    let encoded = match encode(response) {
        Ok(encoded) => encoded,
        Err(err) => {
            tracing::error!(error = %err, "Failed to encode response");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Unable to encode response").into_response();
        }
    };

    let mut builder = axum::http::Response::builder().status(encoded.status);
    for (name, value) in &encoded.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder.body(Body::from(encoded.body)).unwrap_or_else(|err| {
        tracing::error!(error = %err, "Invalid response headers");
        (StatusCode::INTERNAL_SERVER_ERROR, "Invalid response headers").into_response()
    })
}
