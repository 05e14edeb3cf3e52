//! Lifecycle enforcement around a backend transaction.

use crate::transaction::{
    ListPage, ListQuery, Object, Transaction, TransactionError, TransactionState,
};

/// Wraps a backend [`Transaction`] and enforces
/// `created → started → {committed | aborted}`.
///
/// CRUD calls are only accepted while started. Dropping a started guard
/// aborts the backend session.
pub struct TransactionGuard {
    inner: Box<dyn Transaction>,
    state: TransactionState,
}

impl TransactionGuard {
    pub fn new(inner: Box<dyn Transaction>) -> Self {
        Self {
            inner,
            state: TransactionState::Created,
        }
    }

    #[must_use]
    pub const fn state(&self) -> TransactionState {
        self.state
    }

    pub fn start(&mut self) -> Result<(), TransactionError> {
        self.expect_state("start", TransactionState::Created)?;
        self.inner.start()?;
        self.state = TransactionState::Started;
        Ok(())
    }

    /// Commit the session. A failed commit leaves the guard aborted.
    pub fn commit(&mut self) -> Result<(), TransactionError> {
        self.expect_state("commit", TransactionState::Started)?;
        if let Err(err) = self.inner.commit() {
            self.state = TransactionState::Aborted;
            if let Err(abort_err) = self.inner.abort() {
                tracing::warn!(error = %abort_err, "Abort after failed commit also failed");
            }
            return Err(err);
        }
        self.state = TransactionState::Committed;
        Ok(())
    }

    pub fn abort(&mut self) -> Result<(), TransactionError> {
        self.expect_state("abort", TransactionState::Started)?;
        self.state = TransactionState::Aborted;
        self.inner.abort()
    }

    /// Start, run `op`, then commit on success or abort on error.
    pub fn scoped<T, E, F>(mut self, op: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<TransactionError>,
    {
        self.start()?;
        match op(&mut self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = self.abort() {
                    tracing::warn!(error = %abort_err, "Transaction abort failed");
                }
                Err(err)
            }
        }
    }

    pub fn get(&mut self, model: &str, object_id: &str) -> Result<Option<Object>, TransactionError> {
        self.expect_state("get from", TransactionState::Started)?;
        self.inner.get(model, object_id)
    }

    pub fn create(&mut self, model: &str, values: Object) -> Result<(String, Object), TransactionError> {
        self.expect_state("create in", TransactionState::Started)?;
        self.inner.create(model, values)
    }

    pub fn update(
        &mut self,
        model: &str,
        object_id: &str,
        values: Object,
    ) -> Result<Option<Object>, TransactionError> {
        self.expect_state("update in", TransactionState::Started)?;
        self.inner.update(model, object_id, values)
    }

    pub fn list(&mut self, model: &str, query: &ListQuery) -> Result<ListPage, TransactionError> {
        self.expect_state("list from", TransactionState::Started)?;
        self.inner.list(model, query)
    }

    pub fn delete(&mut self, model: &str, object_id: &str) -> Result<bool, TransactionError> {
        self.expect_state("delete from", TransactionState::Started)?;
        self.inner.delete(model, object_id)
    }

    fn expect_state(
        &self,
        operation: &'static str,
        expected: TransactionState,
    ) -> Result<(), TransactionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TransactionError::State {
                operation,
                state: self.state,
            })
        }
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if self.state == TransactionState::Started {
            self.state = TransactionState::Aborted;
            if let Err(err) = self.inner.abort() {
                tracing::warn!(error = %err, "Abort of dropped transaction failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{MemoryStore, NullTransaction, TransactionFactory};
    use serde_json::json;

    fn guard() -> TransactionGuard {
        TransactionGuard::new(Box::new(NullTransaction))
    }

    fn object(value: serde_json::Value) -> Object {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn crud_requires_started() {
        let mut tx = guard();
        let err = tx.get("/api/model", "1").unwrap_err();
        assert_eq!(
            err,
            TransactionError::State {
                operation: "get from",
                state: TransactionState::Created
            }
        );

        tx.start().unwrap();
        assert_eq!(tx.get("/api/model", "1").unwrap(), None);
        tx.commit().unwrap();
        assert!(tx.list("/api/model", &ListQuery::default()).is_err());
    }

    #[test]
    fn crud_after_abort_is_rejected() {
        let store = MemoryStore::new();
        let mut tx = TransactionGuard::new(store.open());
        tx.start().unwrap();
        tx.create("/api/model", object(json!({"name": "a"}))).unwrap();
        tx.abort().unwrap();

        let aborted = |operation| TransactionError::State {
            operation,
            state: TransactionState::Aborted,
        };
        assert_eq!(tx.get("/api/model", "1").unwrap_err(), aborted("get from"));
        assert_eq!(
            tx.create("/api/model", Object::new()).unwrap_err(),
            aborted("create in")
        );
        assert_eq!(
            tx.update("/api/model", "1", Object::new()).unwrap_err(),
            aborted("update in")
        );
        assert_eq!(
            tx.list("/api/model", &ListQuery::default()).unwrap_err(),
            aborted("list from")
        );
        assert_eq!(tx.delete("/api/model", "1").unwrap_err(), aborted("delete from"));
        assert_eq!(store.len("/api/model"), 0);
    }

    #[test]
    fn start_only_once_and_single_terminal_state() {
        let mut tx = guard();
        assert!(tx.commit().is_err());
        assert!(tx.abort().is_err());

        tx.start().unwrap();
        assert!(tx.start().is_err());
        tx.abort().unwrap();
        assert_eq!(tx.state(), TransactionState::Aborted);
        assert!(tx.commit().is_err());
        assert!(tx.abort().is_err());
    }

    #[test]
    fn scoped_commits_on_success() {
        let store = MemoryStore::new();
        let id = TransactionGuard::new(store.open())
            .scoped(|tx| {
                tx.create("/api/model", object(json!({"name": "a"})))
                    .map(|(id, _)| id)
            })
            .unwrap();

        assert_eq!(store.object("/api/model", &id), Some(object(json!({"name": "a"}))));
    }

    #[test]
    fn scoped_aborts_on_error() {
        let store = MemoryStore::new();
        let result: Result<(), TransactionError> =
            TransactionGuard::new(store.open()).scoped(|tx| {
                tx.create("/api/model", object(json!({"name": "a"})))?;
                Err(TransactionError::invalid("rejected"))
            });

        assert!(result.is_err());
        assert_eq!(store.len("/api/model"), 0);
    }

    #[test]
    fn drop_while_started_discards_writes() {
        let store = MemoryStore::new();
        {
            let mut tx = TransactionGuard::new(store.open());
            tx.start().unwrap();
            tx.create("/api/model", Object::new()).unwrap();
        }
        assert_eq!(store.len("/api/model"), 0);
    }
}
