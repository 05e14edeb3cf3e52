//! A transaction that stores nothing.

use crate::transaction::{
    ListPage, ListQuery, Object, Transaction, TransactionError, TransactionFactory,
};

/// Reads come back empty and writes are discarded.
///
/// Used for models that only carry actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransaction;

impl Transaction for NullTransaction {
    fn get(&mut self, _model: &str, _object_id: &str) -> Result<Option<Object>, TransactionError> {
        Ok(None)
    }

    fn create(&mut self, _model: &str, values: Object) -> Result<(String, Object), TransactionError> {
        Ok((String::new(), values))
    }

    fn update(
        &mut self,
        _model: &str,
        _object_id: &str,
        _values: Object,
    ) -> Result<Option<Object>, TransactionError> {
        Ok(None)
    }

    fn list(&mut self, _model: &str, query: &ListQuery) -> Result<ListPage, TransactionError> {
        Ok(ListPage {
            ids: Vec::new(),
            position: query.position,
            total: 0,
        })
    }

    fn delete(&mut self, _model: &str, _object_id: &str) -> Result<bool, TransactionError> {
        Ok(false)
    }
}

/// Factory for [`NullTransaction`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl TransactionFactory for NullStore {
    fn open(&self) -> Box<dyn Transaction> {
        Box::new(NullTransaction)
    }
}
