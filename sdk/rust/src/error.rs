//! Client error taxonomy.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The client was constructed with an unusable host or root path.
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// The request was rejected before being sent.
    #[error("invalid request: {0}")]
    Request(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// 401: the credentials did not resolve to a user.
    #[error("Invalid Session")]
    InvalidSession,

    /// 403: not authorized or verb not allowed.
    #[error("Not Authorized: {0}")]
    NotAuthorized(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    /// 400 with the server's message and per-field detail.
    #[error("Invalid Request: {message}")]
    InvalidRequest {
        message: String,
        detail: Option<Value>,
    },

    #[error("Server Error: {0}")]
    Server(String),

    /// The response did not have the expected status or shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}
