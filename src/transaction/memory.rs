//! In-memory store with buffered writes.
//!
//! # Design Decisions
//! - Writes are buffered per transaction and applied on commit; abort
//!   drops the buffer
//! - Reads inside a transaction see its own buffered writes
//! - Ids are allocated from a shared counter at create time, so aborted
//!   creates leave gaps
//! - Objects of a model are kept in id order (string ordering)

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::transaction::{
    ListPage, ListQuery, Object, Transaction, TransactionError, TransactionFactory,
};

/// Predicate deciding whether an object matches a list filter, given the
/// converted filter values.
pub type ListFilterFn = Arc<dyn Fn(&Object, &Object) -> bool + Send + Sync>;

#[derive(Default)]
struct StoreData {
    tables: HashMap<String, BTreeMap<String, Object>>,
    filters: HashMap<(String, String), ListFilterFn>,
    next_id: u64,
}

/// Shared in-memory backing store. Cloning shares the data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<StoreData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the predicate behind list filter `name` of `model`.
    #[must_use]
    pub fn with_filter<F>(self, model: &str, name: &str, filter: F) -> Self
    where
        F: Fn(&Object, &Object) -> bool + Send + Sync + 'static,
    {
        self.register_filter(model, name, filter);
        self
    }

    pub fn register_filter<F>(&self, model: &str, name: &str, filter: F)
    where
        F: Fn(&Object, &Object) -> bool + Send + Sync + 'static,
    {
        self.lock()
            .filters
            .insert((model.to_string(), name.to_string()), Arc::new(filter));
    }

    /// Insert or replace an object outside of any transaction.
    pub fn insert(&self, model: &str, object_id: &str, object: Object) {
        self.lock()
            .tables
            .entry(model.to_string())
            .or_default()
            .insert(object_id.to_string(), object);
    }

    /// Committed state of one object.
    #[must_use]
    pub fn object(&self, model: &str, object_id: &str) -> Option<Object> {
        self.lock()
            .tables
            .get(model)
            .and_then(|table| table.get(object_id))
            .cloned()
    }

    /// Number of committed objects of `model`.
    #[must_use]
    pub fn len(&self, model: &str) -> usize {
        self.lock().tables.get(model).map_or(0, BTreeMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_id(&self, model: &str) -> String {
        let mut data = self.lock();
        loop {
            data.next_id += 1;
            let candidate = data.next_id.to_string();
            let taken = data
                .tables
                .get(model)
                .is_some_and(|table| table.contains_key(&candidate));
            if !taken {
                return candidate;
            }
        }
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.lock();
        f.debug_struct("MemoryStore")
            .field("models", &data.tables.keys().collect::<Vec<_>>())
            .field("filters", &data.filters.len())
            .finish()
    }
}

impl TransactionFactory for MemoryStore {
    fn open(&self) -> Box<dyn Transaction> {
        Box::new(MemoryTransaction::new(self.clone()))
    }
}

#[derive(Debug, Clone)]
enum Write {
    Put {
        model: String,
        object_id: String,
        object: Object,
    },
    Remove {
        model: String,
        object_id: String,
    },
}

impl Write {
    fn target(&self) -> (&str, &str) {
        match self {
            Write::Put { model, object_id, .. } | Write::Remove { model, object_id } => {
                (model.as_str(), object_id.as_str())
            }
        }
    }
}

/// Transaction over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    store: MemoryStore,
    writes: Vec<Write>,
}

impl MemoryTransaction {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            writes: Vec::new(),
        }
    }

    /// Committed table of `model` with this transaction's writes applied.
    fn view(&self, model: &str) -> BTreeMap<String, Object> {
        let mut table = self
            .store
            .lock()
            .tables
            .get(model)
            .cloned()
            .unwrap_or_default();

        for write in self.writes.iter().filter(|w| w.target().0 == model) {
            match write {
                Write::Put { object_id, object, .. } => {
                    table.insert(object_id.clone(), object.clone());
                }
                Write::Remove { object_id, .. } => {
                    table.remove(object_id);
                }
            }
        }
        table
    }
}

impl Transaction for MemoryTransaction {
    fn commit(&mut self) -> Result<(), TransactionError> {
        let mut data = self.store.lock();
        for write in self.writes.drain(..) {
            match write {
                Write::Put {
                    model,
                    object_id,
                    object,
                } => {
                    data.tables.entry(model).or_default().insert(object_id, object);
                }
                Write::Remove { model, object_id } => {
                    if let Some(table) = data.tables.get_mut(&model) {
                        table.remove(&object_id);
                    }
                }
            }
        }
        Ok(())
    }

    fn abort(&mut self) -> Result<(), TransactionError> {
        self.writes.clear();
        Ok(())
    }

    fn get(&mut self, model: &str, object_id: &str) -> Result<Option<Object>, TransactionError> {
        for write in self.writes.iter().rev() {
            if write.target() == (model, object_id) {
                return Ok(match write {
                    Write::Put { object, .. } => Some(object.clone()),
                    Write::Remove { .. } => None,
                });
            }
        }
        Ok(self.store.object(model, object_id))
    }

    fn create(&mut self, model: &str, values: Object) -> Result<(String, Object), TransactionError> {
        let object_id = self.store.allocate_id(model);
        self.writes.push(Write::Put {
            model: model.to_string(),
            object_id: object_id.clone(),
            object: values.clone(),
        });
        Ok((object_id, values))
    }

    fn update(
        &mut self,
        model: &str,
        object_id: &str,
        values: Object,
    ) -> Result<Option<Object>, TransactionError> {
        let Some(mut object) = self.get(model, object_id)? else {
            return Ok(None);
        };
        object.extend(values);
        self.writes.push(Write::Put {
            model: model.to_string(),
            object_id: object_id.to_string(),
            object: object.clone(),
        });
        Ok(Some(object))
    }

    fn list(&mut self, model: &str, query: &ListQuery) -> Result<ListPage, TransactionError> {
        let filter = match &query.filter {
            Some(name) => {
                let key = (model.to_string(), name.clone());
                let filter = self.store.lock().filters.get(&key).cloned();
                Some(filter.ok_or_else(|| {
                    TransactionError::invalid(format!("No list filter \"{name}\" for \"{model}\""))
                })?)
            }
            None => None,
        };

        let matching: Vec<String> = self
            .view(model)
            .into_iter()
            .filter(|(_, object)| filter.as_ref().map_or(true, |f| (**f)(object, &query.filter_values)))
            .map(|(object_id, _)| object_id)
            .collect();

        Ok(ListPage {
            total: matching.len(),
            ids: matching
                .into_iter()
                .skip(query.position)
                .take(query.count)
                .collect(),
            position: query.position,
        })
    }

    fn delete(&mut self, model: &str, object_id: &str) -> Result<bool, TransactionError> {
        if self.get(model, object_id)?.is_none() {
            return Ok(false);
        }
        self.writes.push(Write::Remove {
            model: model.to_string(),
            object_id: object_id.to_string(),
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const BOOK: &str = "/api/library/book";

    fn object(value: Value) -> Object {
        value.as_object().cloned().unwrap()
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new().with_filter(BOOK, "author", |object, values| {
            object.get("author") == values.get("author")
        });
        store.insert(BOOK, "a", object(json!({"title": "Dune", "author": "Herbert"})));
        store.insert(BOOK, "b", object(json!({"title": "Emma", "author": "Austen"})));
        store.insert(BOOK, "c", object(json!({"title": "Persuasion", "author": "Austen"})));
        store
    }

    fn query(filter: Option<&str>, values: Value, position: usize, count: usize) -> ListQuery {
        ListQuery {
            filter: filter.map(str::to_string),
            filter_values: object(values),
            position,
            count,
        }
    }

    #[test]
    fn writes_invisible_until_commit() {
        let store = seeded();
        let mut tx = store.open();
        let (id, _) = tx.create(BOOK, object(json!({"title": "Ulysses"}))).unwrap();

        assert!(tx.get(BOOK, &id).unwrap().is_some());
        assert_eq!(store.object(BOOK, &id), None);

        tx.commit().unwrap();
        assert_eq!(store.object(BOOK, &id), Some(object(json!({"title": "Ulysses"}))));
    }

    #[test]
    fn abort_discards_update_and_delete() {
        let store = seeded();
        let mut tx = store.open();
        tx.update(BOOK, "a", object(json!({"title": "Children of Dune"}))).unwrap();
        assert!(tx.delete(BOOK, "b").unwrap());
        assert_eq!(tx.get(BOOK, "b").unwrap(), None);
        tx.abort().unwrap();
        tx.commit().unwrap();

        assert_eq!(store.object(BOOK, "a").unwrap()["title"], json!("Dune"));
        assert!(store.object(BOOK, "b").is_some());
    }

    #[test]
    fn update_merges_and_missing_is_none() {
        let store = seeded();
        let mut tx = store.open();
        let updated = tx.update(BOOK, "a", object(json!({"title": "Dune Messiah"}))).unwrap();
        assert_eq!(
            updated,
            Some(object(json!({"title": "Dune Messiah", "author": "Herbert"})))
        );
        assert_eq!(tx.update(BOOK, "zz", Object::new()).unwrap(), None);
        assert!(!tx.delete(BOOK, "zz").unwrap());
    }

    #[test]
    fn list_pages_and_filters() {
        let store = seeded();
        let mut tx = store.open();

        let page = tx.list(BOOK, &query(None, json!({}), 1, 10)).unwrap();
        assert_eq!(page, ListPage { ids: vec!["b".into(), "c".into()], position: 1, total: 3 });

        let page = tx
            .list(BOOK, &query(Some("author"), json!({"author": "Austen"}), 0, 1))
            .unwrap();
        assert_eq!(page, ListPage { ids: vec!["b".into()], position: 0, total: 2 });

        let err = tx.list(BOOK, &query(Some("year"), json!({}), 0, 10)).unwrap_err();
        assert!(matches!(err, TransactionError::Invalid { .. }));
    }

    #[test]
    fn allocated_ids_skip_existing_keys() {
        let store = MemoryStore::new();
        store.insert(BOOK, "1", Object::new());
        let mut tx = store.open();
        let (id, _) = tx.create(BOOK, Object::new()).unwrap();
        assert_eq!(id, "2");
    }
}
