//! Local store and error store abstractions with in-memory implementations.

use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use tablesync_protocol::{Document, TableOperationError};

/// The local document store the push engine reads payloads from and
/// writes remote results into.
pub trait LocalStore: Send + Sync {
    /// Looks up an item by table and id.
    fn lookup(
        &self,
        table_name: &str,
        id: &str,
    ) -> impl Future<Output = StoreResult<Option<Document>>> + Send;

    /// Inserts or replaces an item. The document's `id` property is its key.
    fn upsert(
        &self,
        table_name: &str,
        document: Document,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Durable storage for structured conflict records.
pub trait ErrorStore: Send + Sync {
    /// Persists a record.
    fn add_error(&self, error: &TableOperationError)
        -> impl Future<Output = StoreResult<()>> + Send;

    /// Loads all persisted records in insertion order.
    fn load_errors(&self) -> impl Future<Output = StoreResult<Vec<TableOperationError>>> + Send;

    /// Deletes the given records.
    fn delete_errors(
        &self,
        errors: &[TableOperationError],
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Returns the `id` property of a document as a string.
pub fn document_id(document: &Document) -> Option<String> {
    match document.get("id")? {
        serde_json::Value::String(id) => Some(id.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// An in-memory local store.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    tables: RwLock<HashMap<String, BTreeMap<String, Document>>>,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document directly, bypassing the async interface.
    pub fn put(&self, table_name: &str, id: impl Into<String>, document: Document) {
        self.tables
            .write()
            .entry(table_name.to_string())
            .or_default()
            .insert(id.into(), document);
    }

    /// Reads a document directly.
    pub fn get(&self, table_name: &str, id: &str) -> Option<Document> {
        self.tables.read().get(table_name)?.get(id).cloned()
    }

    /// Number of documents in a table.
    pub fn table_len(&self, table_name: &str) -> usize {
        self.tables
            .read()
            .get(table_name)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

impl LocalStore for MemoryLocalStore {
    async fn lookup(&self, table_name: &str, id: &str) -> StoreResult<Option<Document>> {
        Ok(self.get(table_name, id))
    }

    async fn upsert(&self, table_name: &str, document: Document) -> StoreResult<()> {
        let id =
            document_id(&document).ok_or_else(|| StoreError::MissingId(table_name.into()))?;
        self.put(table_name, id, document);
        Ok(())
    }
}

/// An in-memory error store keeping records as JSON rows.
#[derive(Debug, Default)]
pub struct MemoryErrorStore {
    rows: RwLock<Vec<(String, String)>>,
}

impl MemoryErrorStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Stores a raw row, used to simulate corrupted persisted data.
    pub fn put_raw(&self, id: impl Into<String>, row: impl Into<String>) {
        self.rows.write().push((id.into(), row.into()));
    }
}

impl ErrorStore for MemoryErrorStore {
    async fn add_error(&self, error: &TableOperationError) -> StoreResult<()> {
        let row = serde_json::to_string(error)?;
        let mut rows = self.rows.write();
        match rows.iter_mut().find(|(id, _)| *id == error.id) {
            Some(existing) => existing.1 = row,
            None => rows.push((error.id.clone(), row)),
        }
        Ok(())
    }

    async fn load_errors(&self) -> StoreResult<Vec<TableOperationError>> {
        self.rows
            .read()
            .iter()
            .map(|(_, row)| serde_json::from_str(row).map_err(Into::into))
            .collect()
    }

    async fn delete_errors(&self, errors: &[TableOperationError]) -> StoreResult<()> {
        self.rows
            .write()
            .retain(|(id, _)| !errors.iter().any(|e| e.id == *id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tablesync_protocol::Operation;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn local_store_upsert_and_lookup() {
        let store = MemoryLocalStore::new();
        assert!(store.lookup("todo", "1").await.unwrap().is_none());

        store
            .upsert("todo", doc(json!({"id": "1", "text": "milk"})))
            .await
            .unwrap();
        store
            .upsert("todo", doc(json!({"id": "1", "text": "eggs"})))
            .await
            .unwrap();

        let item = store.lookup("todo", "1").await.unwrap().unwrap();
        assert_eq!(item["text"], "eggs");
        assert_eq!(store.table_len("todo"), 1);
        assert_eq!(store.table_len("notes"), 0);
    }

    #[tokio::test]
    async fn upsert_without_id_is_rejected() {
        let store = MemoryLocalStore::new();
        let err = store
            .upsert("todo", doc(json!({"text": "no id"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingId(table) if table == "todo"));
        assert_eq!(store.table_len("todo"), 0);
    }

    #[test]
    fn document_id_accepts_strings_and_numbers() {
        assert_eq!(document_id(&doc(json!({"id": "a"}))).as_deref(), Some("a"));
        assert_eq!(document_id(&doc(json!({"id": 7}))).as_deref(), Some("7"));
        assert!(document_id(&doc(json!({"name": "x"}))).is_none());
    }

    #[tokio::test]
    async fn error_store_round_trip_and_delete() {
        let store = MemoryErrorStore::new();
        let op = Operation::insert("todo", "1");
        let first = TableOperationError::from_operation(&op, Some(409), Some("{}".into()));
        let second = TableOperationError::from_operation(&op, Some(412), None);

        store.add_error(&first).await.unwrap();
        store.add_error(&second).await.unwrap();

        let loaded = store.load_errors().await.unwrap();
        assert_eq!(loaded, vec![first.clone(), second.clone()]);

        store.delete_errors(&[first]).await.unwrap();
        let loaded = store.load_errors().await.unwrap();
        assert_eq!(loaded, vec![second]);
    }

    #[tokio::test]
    async fn corrupted_row_fails_to_load() {
        let store = MemoryErrorStore::new();
        store.put_raw("bad", "{not json");

        let err = store.load_errors().await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
