//! Protocol error taxonomy.
//!
//! Every failure during dispatch is a [`ProtocolError`]; each variant maps to
//! one HTTP status and is rendered as `{"kind", "message"[, "detail"]}`.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::response::Response;
use crate::protocol::verb::Verb;
use crate::transaction::TransactionError;

/// Message shown in place of store failures outside debug mode.
const HIDDEN_MESSAGE: &str = "Internal Server Error";

/// Errors raised while dispatching a request.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The request is structurally invalid.
    #[error("{message}")]
    BadRequest { message: String },

    /// One or more values failed validation.
    #[error("{message}")]
    InvalidRequest {
        message: String,
        /// Per field or parameter error messages.
        detail: Map<String, Value>,
    },

    #[error("Invalid Filter Name \"{name}\"")]
    UnknownFilter { name: String },

    /// Credentials were supplied but did not resolve to a user.
    #[error("Invalid Session")]
    InvalidSession,

    #[error("Not Authorized")]
    Authorization,

    /// The verb is disabled on the addressed model.
    #[error("Verb \"{verb}\" not allowed")]
    VerbNotAllowed { verb: Verb },

    #[error("path not found \"{uri}\"")]
    NotFound { uri: String },

    #[error("Object \"{object_id}\" not found in \"{model_path}\"")]
    ObjectNotFound {
        model_path: String,
        object_id: String,
    },

    #[error("Action \"{name}\" not found")]
    ActionNotFound { name: String },

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Failure inside server code, such as an action function.
    #[error("{message}")]
    Server { message: String },
}

impl ProtocolError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn invalid(detail: Map<String, Value>) -> Self {
        Self::InvalidRequest {
            message: "Invalid Request".to_string(),
            detail,
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// HTTP status code for this error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } | Self::InvalidRequest { .. } | Self::UnknownFilter { .. } => 400,
            Self::InvalidSession => 401,
            Self::Authorization | Self::VerbNotAllowed { .. } => 403,
            Self::NotFound { .. } | Self::ObjectNotFound { .. } | Self::ActionNotFound { .. } => 404,
            Self::Transaction(TransactionError::Invalid { .. }) => 400,
            Self::Transaction(_) | Self::Server { .. } => 500,
        }
    }

    /// Stable error kind used in the response body.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "BadRequest",
            Self::InvalidRequest { .. } => "InvalidRequest",
            Self::UnknownFilter { .. } => "UnknownFilter",
            Self::InvalidSession => "InvalidSession",
            Self::Authorization => "Authorization",
            Self::VerbNotAllowed { .. } => "VerbNotAllowed",
            Self::NotFound { .. } => "NotFound",
            Self::ObjectNotFound { .. } => "ObjectNotFound",
            Self::ActionNotFound { .. } => "ActionNotFound",
            Self::Transaction(TransactionError::State { .. }) => "TransactionState",
            Self::Transaction(TransactionError::Invalid { .. }) => "InvalidRequest",
            Self::Transaction(TransactionError::Backend { .. }) => "Store",
            Self::Server { .. } => "Server",
        }
    }

    /// Render the error as a response. Store and state failures only show
    /// their message when `debug` is set.
    #[must_use]
    pub fn into_response(self, debug: bool) -> Response {
        let status = self.status();
        let mut body = Map::new();
        body.insert("kind".into(), Value::from(self.kind()));

        let message = match &self {
            Self::Transaction(TransactionError::State { .. } | TransactionError::Backend { .. })
                if !debug =>
            {
                HIDDEN_MESSAGE.to_string()
            }
            other => other.to_string(),
        };
        body.insert("message".into(), Value::from(message));

        match self {
            Self::InvalidRequest { detail, .. } => {
                body.insert("detail".into(), Value::Object(detail));
            }
            Self::Transaction(TransactionError::Invalid {
                detail: Some(detail),
                ..
            }) => {
                body.insert("detail".into(), detail);
            }
            Self::ObjectNotFound {
                model_path,
                object_id,
            } => {
                let mut detail = Map::new();
                detail.insert("model_path".into(), Value::from(model_path));
                detail.insert("object_id".into(), Value::from(object_id));
                body.insert("detail".into(), Value::Object(detail));
            }
            _ => {}
        }

        Response::new(status).with_data(Value::Object(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionState;
    use serde_json::json;

    #[test]
    fn status_codes() {
        assert_eq!(ProtocolError::bad_request("x").status(), 400);
        assert_eq!(ProtocolError::UnknownFilter { name: "f".into() }.status(), 400);
        assert_eq!(ProtocolError::InvalidSession.status(), 401);
        assert_eq!(ProtocolError::VerbNotAllowed { verb: Verb::Get }.status(), 403);
        assert_eq!(ProtocolError::NotFound { uri: "/x".into() }.status(), 404);
        assert_eq!(ProtocolError::server("boom").status(), 500);

        let invalid = TransactionError::Invalid {
            message: "duplicate".into(),
            detail: None,
        };
        assert_eq!(ProtocolError::from(invalid).status(), 400);
    }

    #[test]
    fn renders_kind_message_and_detail() {
        let mut detail = Map::new();
        detail.insert("title".into(), json!("Required Field"));
        let response = ProtocolError::invalid(detail).into_response(false);

        assert_eq!(response.status, 400);
        assert_eq!(
            response.data,
            Some(json!({
                "kind": "InvalidRequest",
                "message": "Invalid Request",
                "detail": {"title": "Required Field"}
            }))
        );
    }

    #[test]
    fn object_not_found_names_the_object() {
        let response = ProtocolError::ObjectNotFound {
            model_path: "/api/ns/model".into(),
            object_id: "42".into(),
        }
        .into_response(false);

        assert_eq!(response.status, 404);
        let data = response.data.clone().unwrap();
        assert_eq!(data["detail"], json!({"model_path": "/api/ns/model", "object_id": "42"}));
    }

    #[test]
    fn store_messages_hidden_unless_debug() {
        let backend = || {
            ProtocolError::from(TransactionError::Backend {
                message: "connection refused to db01".into(),
            })
        };

        let hidden = backend().into_response(false).data.clone().unwrap();
        assert_eq!(hidden["kind"], json!("Store"));
        assert_eq!(hidden["message"], json!("Internal Server Error"));

        let shown = backend().into_response(true).data.clone().unwrap();
        assert_eq!(shown["message"], json!("store error: connection refused to db01"));

        let state = ProtocolError::from(TransactionError::State {
            operation: "commit",
            state: TransactionState::Created,
        });
        assert_eq!(state.kind(), "TransactionState");
        assert_eq!(state.status(), 500);
    }
}
