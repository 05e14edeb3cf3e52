//! Transaction subsystem: the contract between models and backing stores.
//!
//! # Data Flow
//! ```text
//! Model::invoke
//!     → TransactionFactory::open()          (one session per request)
//!     → TransactionGuard (guard.rs)         created → started
//!     → get / list / create / update / delete
//!     → commit on success, abort on error   → committed | aborted
//!     → guard dropped while started         → abort
//! ```
//!
//! # Design Decisions
//! - Backends implement the plain [`Transaction`] trait; the lifecycle is
//!   enforced once, by the guard, not by every backend
//! - Objects are JSON maps; conversion to native values happens in the
//!   registry's converter
//! - Ids are strings on the wire and in the contract

pub mod guard;
pub mod memory;
pub mod null;

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

pub use guard::TransactionGuard;
pub use memory::{MemoryStore, MemoryTransaction};
pub use null::{NullStore, NullTransaction};

/// A stored object as exchanged with a backend.
pub type Object = Map<String, Value>;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Created,
    Started,
    Committed,
    Aborted,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        })
    }
}

/// Errors raised by transactions and their backends.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransactionError {
    /// An operation was attempted in the wrong lifecycle state.
    #[error("cannot {operation} a transaction that is {state}")]
    State {
        operation: &'static str,
        state: TransactionState,
    },

    /// The backend rejected the values, e.g. a constraint violation.
    #[error("{message}")]
    Invalid {
        message: String,
        detail: Option<Value>,
    },

    /// The backend failed.
    #[error("store error: {message}")]
    Backend { message: String },
}

impl TransactionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
            detail: None,
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Paging and filtering for a LIST.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListQuery {
    /// Name of the list filter, `None` for all objects.
    pub filter: Option<String>,
    /// Converted filter parameter values.
    pub filter_values: Object,
    pub position: usize,
    pub count: usize,
}

/// One page of ids returned by a LIST.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListPage {
    pub ids: Vec<String>,
    pub position: usize,
    /// Number of matching objects across all pages.
    pub total: usize,
}

/// A backing-store session scoped to one request.
///
/// The `model` argument is the path of the model being operated on, for
/// example `/api/library/book`.
pub trait Transaction: Send {
    fn start(&mut self) -> Result<(), TransactionError> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), TransactionError> {
        Ok(())
    }

    fn abort(&mut self) -> Result<(), TransactionError> {
        Ok(())
    }

    fn get(&mut self, model: &str, object_id: &str) -> Result<Option<Object>, TransactionError>;

    /// Store a new object, returning its id and stored form.
    fn create(&mut self, model: &str, values: Object) -> Result<(String, Object), TransactionError>;

    /// Apply `values` to an object. `None` when the object does not exist.
    fn update(
        &mut self,
        model: &str,
        object_id: &str,
        values: Object,
    ) -> Result<Option<Object>, TransactionError>;

    fn list(&mut self, model: &str, query: &ListQuery) -> Result<ListPage, TransactionError>;

    /// Remove an object. `false` when the object does not exist.
    fn delete(&mut self, model: &str, object_id: &str) -> Result<bool, TransactionError>;
}

/// Opens a fresh transaction for each request.
pub trait TransactionFactory: Send + Sync {
    fn open(&self) -> Box<dyn Transaction>;
}

impl<F> TransactionFactory for F
where
    F: Fn() -> Box<dyn Transaction> + Send + Sync,
{
    fn open(&self) -> Box<dyn Transaction> {
        self()
    }
}
