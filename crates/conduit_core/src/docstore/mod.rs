//! Embedded document store.
//!
//! # Responsibility
//! - Hold named collections of JSON object documents in process memory.
//! - Enforce declared unique indexes over one or more document fields.
//! - Provide multi-document sessions that commit all writes or none.
//!
//! # Invariants
//! - Every committed write bumps the document version; a session commit
//!   fails with `WriteConflict` when any document it touched was changed by
//!   another commit after the session read it.
//! - Unique index keys are sparse: documents missing any indexed field (or
//!   holding `null`) are not indexed.
//! - Declared references hold after every commit: a referencing field names
//!   an existing target document. Deleting a target either cascades to the
//!   referencing documents or fails the commit.
//! - Standalone operations on `DocumentDb` run as single-write sessions.
//!
//! # See also
//! - `session.rs` for read-your-writes and commit validation.

mod filter;
mod session;

pub use filter::{compare_values, lookup, Filter, FindOptions, SortOrder};
pub use session::Session;

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

pub type DocResult<T> = Result<T, DocError>;

#[derive(Debug, Error)]
pub enum DocError {
    #[error("duplicate key in collection `{collection}` for unique index `{index}`")]
    DuplicateKey { collection: String, index: String },
    #[error("write conflict in collection `{collection}`")]
    WriteConflict { collection: String },
    #[error("unknown collection `{0}`")]
    UnknownCollection(String),
    #[error("dangling reference in collection `{collection}` through `{field}`")]
    DanglingReference { collection: String, field: String },
    #[error("documents must be JSON objects")]
    NotAnObject,
    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("document store lock poisoned")]
    Poisoned,
}

/// Unique index declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<String>,
}

impl IndexSpec {
    pub fn unique(name: &str, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            fields: fields.iter().map(|field| field.to_string()).collect(),
        }
    }

    /// Index key for `doc`, or `None` when any indexed field is absent.
    pub(crate) fn key_of(&self, doc: &Value) -> Option<String> {
        let mut parts = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match lookup(doc, field) {
                None | Some(Value::Null) => return None,
                Some(value) => parts.push(value.clone()),
            }
        }
        Some(Value::Array(parts).to_string())
    }
}

/// Reference from a document field to a field of another collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpec {
    pub field: String,
    pub target: String,
    pub target_field: String,
    /// Deleting the target removes the referencing document instead of
    /// failing the commit.
    pub cascade: bool,
}

impl ReferenceSpec {
    pub fn new(field: &str, target: &str, target_field: &str) -> Self {
        Self {
            field: field.to_string(),
            target: target.to_string(),
            target_field: target_field.to_string(),
            cascade: false,
        }
    }

    pub fn on_delete_cascade(mut self) -> Self {
        self.cascade = true;
        self
    }

    /// Comparable reference value of `doc`, or `None` when unset.
    pub(crate) fn value_of(doc: &Value, field: &str) -> Option<String> {
        match lookup(doc, field) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.to_string()),
        }
    }
}

pub(crate) type DocKey = u64;

#[derive(Debug, Clone)]
pub(crate) struct StoredDoc {
    pub(crate) version: u64,
    pub(crate) body: Value,
}

#[derive(Debug, Default)]
pub(crate) struct Collection {
    pub(crate) docs: BTreeMap<DocKey, StoredDoc>,
    pub(crate) indexes: Vec<IndexSpec>,
    pub(crate) references: Vec<ReferenceSpec>,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) collections: HashMap<String, Collection>,
    pub(crate) commit_seq: u64,
}

impl State {
    pub(crate) fn collection(&self, name: &str) -> DocResult<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| DocError::UnknownCollection(name.to_string()))
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<State>,
    next_key: AtomicU64,
}

/// Shared handle to one in-process document database. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct DocumentDb {
    inner: Arc<Inner>,
}

impl DocumentDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `name` if missing and adds any index not yet declared.
    ///
    /// # Errors
    /// - `DuplicateKey` when existing documents already violate a new index.
    pub fn create_collection(&self, name: &str, indexes: &[IndexSpec]) -> DocResult<()> {
        let mut state = self.write()?;
        let collection = state.collections.entry(name.to_string()).or_default();
        for index in indexes {
            if collection.indexes.iter().any(|known| known.name == index.name) {
                continue;
            }
            let mut seen = std::collections::HashSet::new();
            for stored in collection.docs.values() {
                if let Some(key) = index.key_of(&stored.body) {
                    if !seen.insert(key) {
                        return Err(DocError::DuplicateKey {
                            collection: name.to_string(),
                            index: index.name.clone(),
                        });
                    }
                }
            }
            collection.indexes.push(index.clone());
        }
        Ok(())
    }

    /// Declares a reference from `collection` to another collection.
    ///
    /// Applies to commits made after the declaration; declaring the same
    /// reference twice is a no-op.
    pub fn add_reference(&self, collection: &str, reference: ReferenceSpec) -> DocResult<()> {
        let mut state = self.write()?;
        state.collection(&reference.target)?;
        let stored = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| DocError::UnknownCollection(collection.to_string()))?;
        if !stored.references.contains(&reference) {
            stored.references.push(reference);
        }
        Ok(())
    }

    pub fn collection_names(&self) -> DocResult<Vec<String>> {
        let state = self.read()?;
        let mut names: Vec<String> = state.collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn start_session(&self) -> Session {
        Session::new(self.clone())
    }

    pub fn insert_one(&self, collection: &str, doc: Value) -> DocResult<()> {
        let mut session = self.start_session();
        session.insert_one(collection, doc)?;
        session.commit()
    }

    pub fn insert_many(&self, collection: &str, docs: Vec<Value>) -> DocResult<()> {
        let mut session = self.start_session();
        session.insert_many(collection, docs)?;
        session.commit()
    }

    pub fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocResult<Vec<Value>> {
        self.start_session().find(collection, filter, options)
    }

    pub fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        set: Map<String, Value>,
    ) -> DocResult<usize> {
        let mut session = self.start_session();
        let updated = session.update_many(collection, filter, set)?;
        session.commit()?;
        Ok(updated)
    }

    pub fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        set: Map<String, Value>,
    ) -> DocResult<bool> {
        let mut session = self.start_session();
        let updated = session.update_one(collection, filter, set)?;
        session.commit()?;
        Ok(updated)
    }

    pub fn delete_one(&self, collection: &str, filter: &Filter) -> DocResult<bool> {
        let mut session = self.start_session();
        let deleted = session.delete_one(collection, filter)?;
        session.commit()?;
        Ok(deleted)
    }

    pub fn delete_many(&self, collection: &str, filter: &Filter) -> DocResult<usize> {
        let mut session = self.start_session();
        let deleted = session.delete_many(collection, filter)?;
        session.commit()?;
        Ok(deleted)
    }

    pub fn count_by(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
    ) -> DocResult<Vec<(Value, u64)>> {
        self.start_session().count_by(collection, filter, field)
    }

    pub(crate) fn read(&self) -> DocResult<RwLockReadGuard<'_, State>> {
        self.inner.state.read().map_err(|_| DocError::Poisoned)
    }

    pub(crate) fn write(&self) -> DocResult<RwLockWriteGuard<'_, State>> {
        self.inner.state.write().map_err(|_| DocError::Poisoned)
    }

    pub(crate) fn allocate_key(&self) -> DocKey {
        self.inner.next_key.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::{DocError, DocumentDb, Filter, FindOptions, IndexSpec, ReferenceSpec, SortOrder};
    use serde_json::{json, Map};

    fn db_with_tags() -> DocumentDb {
        let db = DocumentDb::new();
        db.create_collection("tags", &[IndexSpec::unique("name", &["name"])])
            .unwrap();
        db
    }

    #[test]
    fn unique_index_rejects_duplicates() {
        let db = db_with_tags();
        db.insert_one("tags", json!({"name": "go"})).unwrap();
        let err = db.insert_one("tags", json!({"name": "go"})).unwrap_err();
        assert!(matches!(err, DocError::DuplicateKey { .. }));
    }

    #[test]
    fn insert_many_rejects_duplicates_within_the_batch() {
        let db = db_with_tags();
        let err = db
            .insert_many("tags", vec![json!({"name": "a"}), json!({"name": "a"})])
            .unwrap_err();
        assert!(matches!(err, DocError::DuplicateKey { .. }));
        let all = db.find("tags", &Filter::all(), &FindOptions::new()).unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn sparse_index_skips_missing_fields() {
        let db = db_with_tags();
        db.insert_one("tags", json!({"other": 1})).unwrap();
        db.insert_one("tags", json!({"other": 2})).unwrap();
        assert_eq!(
            db.find("tags", &Filter::all(), &FindOptions::new())
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn unknown_collection_is_reported() {
        let db = DocumentDb::new();
        let err = db.insert_one("missing", json!({"a": 1})).unwrap_err();
        assert!(matches!(err, DocError::UnknownCollection(_)));
    }

    #[test]
    fn non_object_documents_are_rejected() {
        let db = db_with_tags();
        let err = db.insert_one("tags", json!("go")).unwrap_err();
        assert!(matches!(err, DocError::NotAnObject));
    }

    #[test]
    fn update_merges_fields_and_respects_indexes() {
        let db = db_with_tags();
        db.insert_many("tags", vec![json!({"name": "a", "n": 1}), json!({"name": "b", "n": 2})])
            .unwrap();

        let mut set = Map::new();
        set.insert("n".to_string(), json!(10));
        let updated = db
            .update_many("tags", &Filter::all().eq("name", "a"), set)
            .unwrap();
        assert_eq!(updated, 1);

        let mut clash = Map::new();
        clash.insert("name".to_string(), json!("b"));
        let err = db
            .update_many("tags", &Filter::all().eq("name", "a"), clash)
            .unwrap_err();
        assert!(matches!(err, DocError::DuplicateKey { .. }));

        let docs = db
            .find(
                "tags",
                &Filter::all(),
                &FindOptions::new().sort("name", SortOrder::Asc),
            )
            .unwrap();
        assert_eq!(docs[0], json!({"name": "a", "n": 10}));
    }

    #[test]
    fn count_by_groups_matching_documents() {
        let db = DocumentDb::new();
        db.create_collection("favorites", &[]).unwrap();
        db.insert_many(
            "favorites",
            vec![
                json!({"article": "x", "user": "1"}),
                json!({"article": "x", "user": "2"}),
                json!({"article": "y", "user": "1"}),
            ],
        )
        .unwrap();
        let counts = db
            .count_by("favorites", &Filter::all(), "article")
            .unwrap();
        assert_eq!(counts, vec![(json!("x"), 2), (json!("y"), 1)]);
    }

    #[test]
    fn create_collection_is_idempotent() {
        let db = db_with_tags();
        db.create_collection("tags", &[IndexSpec::unique("name", &["name"])])
            .unwrap();
        assert_eq!(db.collection_names().unwrap(), vec!["tags"]);
    }

    #[test]
    fn references_require_a_declared_target() {
        let db = db_with_tags();
        db.create_collection("links", &[]).unwrap();
        let err = db
            .add_reference("links", ReferenceSpec::new("tag", "missing", "name"))
            .unwrap_err();
        assert!(matches!(err, DocError::UnknownCollection(_)));

        db.add_reference("links", ReferenceSpec::new("tag", "tags", "name"))
            .unwrap();
        db.add_reference("links", ReferenceSpec::new("tag", "tags", "name"))
            .unwrap();
        db.insert_one("tags", json!({"name": "go"})).unwrap();
        db.insert_one("links", json!({"tag": "go"})).unwrap();
        let err = db.insert_one("links", json!({"tag": "zig"})).unwrap_err();
        assert!(matches!(err, DocError::DanglingReference { .. }));
    }
}
