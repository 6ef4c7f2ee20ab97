//! Multi-document sessions with optimistic commit.
//!
//! A session buffers writes privately and reads through them, so a caller
//! observes its own uncommitted changes. Commit validates versions and
//! unique indexes under the store's write lock, then applies every buffered
//! write or none. Dropping a session without committing discards it.
//!
//! References are checked twice: eagerly against the session's own view
//! when a document is inserted, and again at commit against the committed
//! state, where deletes of referenced documents cascade or fail.

use super::{
    Collection, DocError, DocKey, DocResult, DocumentDb, Filter, FindOptions, ReferenceSpec, State,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone)]
struct PendingWrite {
    /// Committed version the write was based on; `None` for inserts.
    base_version: Option<u64>,
    /// New body; `None` deletes the document.
    body: Option<Value>,
}

type PendingWrites = BTreeMap<DocKey, PendingWrite>;

#[derive(Debug)]
pub struct Session {
    db: DocumentDb,
    pending: HashMap<String, PendingWrites>,
}

impl Session {
    pub(crate) fn new(db: DocumentDb) -> Self {
        Self {
            db,
            pending: HashMap::new(),
        }
    }

    /// Whether the session holds uncommitted writes.
    pub fn is_dirty(&self) -> bool {
        self.pending.values().any(|writes| !writes.is_empty())
    }

    pub fn insert_one(&mut self, collection: &str, doc: Value) -> DocResult<()> {
        self.insert_many(collection, vec![doc])
    }

    /// Inserts every document or none of them.
    pub fn insert_many(&mut self, collection: &str, docs: Vec<Value>) -> DocResult<()> {
        if docs.iter().any(|doc| !doc.is_object()) {
            return Err(DocError::NotAnObject);
        }
        {
            let state = self.db.read()?;
            let stored = state.collection(collection)?;
            let visible = self.visible(collection, stored);
            for index in &stored.indexes {
                let mut taken: HashSet<String> = visible
                    .iter()
                    .filter_map(|(_, body)| index.key_of(body))
                    .collect();
                for doc in &docs {
                    if let Some(key) = index.key_of(doc) {
                        if !taken.insert(key) {
                            return Err(duplicate(collection, &index.name));
                        }
                    }
                }
            }
            for reference in &stored.references {
                let target = state.collection(&reference.target)?;
                let present = reference_targets(reference, &self.visible(&reference.target, target));
                let dangling = docs
                    .iter()
                    .filter_map(|doc| ReferenceSpec::value_of(doc, &reference.field))
                    .any(|value| !present.contains(&value));
                if dangling {
                    return Err(dangling_reference(collection, &reference.field));
                }
            }
        }

        for doc in docs {
            let key = self.db.allocate_key();
            self.pending.entry(collection.to_string()).or_default().insert(
                key,
                PendingWrite {
                    base_version: None,
                    body: Some(doc),
                },
            );
        }
        Ok(())
    }

    pub fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocResult<Vec<Value>> {
        let state = self.db.read()?;
        let stored = state.collection(collection)?;
        let matched = self
            .visible(collection, stored)
            .into_iter()
            .filter(|(_, body)| filter.matches(body))
            .map(|(_, body)| body.clone())
            .collect();
        Ok(options.apply(matched))
    }

    pub fn find_one(&self, collection: &str, filter: &Filter) -> DocResult<Option<Value>> {
        let mut found = self.find(collection, filter, &FindOptions::new().limit(1))?;
        Ok(found.pop())
    }

    /// Merges `set` into every matching document and returns the match count.
    pub fn update_many(
        &mut self,
        collection: &str,
        filter: &Filter,
        set: Map<String, Value>,
    ) -> DocResult<usize> {
        self.update_matching(collection, filter, set, usize::MAX)
    }

    /// Merges `set` into the first matching document, if any.
    pub fn update_one(
        &mut self,
        collection: &str,
        filter: &Filter,
        set: Map<String, Value>,
    ) -> DocResult<bool> {
        Ok(self.update_matching(collection, filter, set, 1)? == 1)
    }

    /// Deletes every matching document and returns how many were removed.
    pub fn delete_many(&mut self, collection: &str, filter: &Filter) -> DocResult<usize> {
        self.delete_matching(collection, filter, usize::MAX)
    }

    pub fn delete_one(&mut self, collection: &str, filter: &Filter) -> DocResult<bool> {
        Ok(self.delete_matching(collection, filter, 1)? == 1)
    }

    fn update_matching(
        &mut self,
        collection: &str,
        filter: &Filter,
        set: Map<String, Value>,
        limit: usize,
    ) -> DocResult<usize> {
        let staged = {
            let state = self.db.read()?;
            let stored = state.collection(collection)?;
            let visible = self.visible(collection, stored);

            let mut staged = Vec::new();
            let matched = visible
                .iter()
                .filter(|(_, body)| filter.matches(body))
                .take(limit);
            for (key, body) in matched {
                let mut next = (*body).clone();
                if let Value::Object(fields) = &mut next {
                    for (field, value) in &set {
                        fields.insert(field.clone(), value.clone());
                    }
                }
                staged.push((*key, self.base_version(collection, stored, *key), next));
            }

            let staged_keys: HashSet<DocKey> = staged.iter().map(|(key, _, _)| *key).collect();
            for index in &stored.indexes {
                let mut taken: HashSet<String> = visible
                    .iter()
                    .filter(|(key, _)| !staged_keys.contains(key))
                    .filter_map(|(_, body)| index.key_of(body))
                    .collect();
                for (_, _, body) in &staged {
                    if let Some(key) = index.key_of(body) {
                        if !taken.insert(key) {
                            return Err(duplicate(collection, &index.name));
                        }
                    }
                }
            }
            staged
        };

        let updated = staged.len();
        let writes = self.pending.entry(collection.to_string()).or_default();
        for (key, base_version, body) in staged {
            writes.insert(
                key,
                PendingWrite {
                    base_version,
                    body: Some(body),
                },
            );
        }
        Ok(updated)
    }

    fn delete_matching(
        &mut self,
        collection: &str,
        filter: &Filter,
        limit: usize,
    ) -> DocResult<usize> {
        let staged: Vec<(DocKey, Option<u64>)> = {
            let state = self.db.read()?;
            let stored = state.collection(collection)?;
            self.visible(collection, stored)
                .into_iter()
                .filter(|(_, body)| filter.matches(body))
                .take(limit)
                .map(|(key, _)| (key, self.base_version(collection, stored, key)))
                .collect()
        };

        let deleted = staged.len();
        let writes = self.pending.entry(collection.to_string()).or_default();
        for (key, base_version) in staged {
            match base_version {
                // Never committed: forgetting the insert is enough.
                None => {
                    writes.remove(&key);
                }
                Some(_) => {
                    writes.insert(
                        key,
                        PendingWrite {
                            base_version,
                            body: None,
                        },
                    );
                }
            }
        }
        Ok(deleted)
    }

    /// Counts matching documents grouped by the value of `field`.
    ///
    /// Documents without the field are skipped. Groups are ordered by value.
    pub fn count_by(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
    ) -> DocResult<Vec<(Value, u64)>> {
        let docs = self.find(collection, filter, &FindOptions::new())?;
        let mut groups: BTreeMap<String, (Value, u64)> = BTreeMap::new();
        for doc in &docs {
            let Some(value) = super::lookup(doc, field) else {
                continue;
            };
            groups
                .entry(value.to_string())
                .or_insert_with(|| (value.clone(), 0))
                .1 += 1;
        }
        let mut counts: Vec<(Value, u64)> = groups.into_values().collect();
        counts.sort_by(|left, right| super::compare_values(&left.0, &right.0));
        Ok(counts)
    }

    /// Applies every buffered write atomically.
    ///
    /// # Errors
    /// - `WriteConflict` when a touched document changed since it was read.
    /// - `DanglingReference` when a written document names a missing target
    ///   or a delete would orphan a restricting reference.
    /// - `DuplicateKey` when the combined result violates a unique index.
    pub fn commit(self) -> DocResult<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        let Session { db, mut pending } = self;
        let mut state = db.write()?;

        for (name, writes) in &pending {
            let stored = state.collection(name)?;
            for (key, write) in writes {
                let current = stored.docs.get(key).map(|doc| doc.version);
                if current != write.base_version {
                    return Err(DocError::WriteConflict {
                        collection: name.clone(),
                    });
                }
            }
        }
        cascade_deletes(&state, &mut pending)?;
        check_references(&state, &pending)?;
        for (name, writes) in &pending {
            check_unique_after(name, state.collection(name)?, writes)?;
        }

        apply(&mut state, pending);
        Ok(())
    }

    /// Discards every buffered write.
    pub fn abort(self) {}

    fn visible<'a>(&'a self, name: &str, stored: &'a Collection) -> Vec<(DocKey, &'a Value)> {
        visible_in(stored, self.pending.get(name))
    }

    fn base_version(&self, name: &str, stored: &Collection, key: DocKey) -> Option<u64> {
        match self.pending.get(name).and_then(|writes| writes.get(&key)) {
            Some(write) => write.base_version,
            None => stored.docs.get(&key).map(|doc| doc.version),
        }
    }
}

/// Documents of `stored` as they look once `writes` are applied.
fn visible_in<'a>(
    stored: &'a Collection,
    writes: Option<&'a PendingWrites>,
) -> Vec<(DocKey, &'a Value)> {
    let mut out = Vec::with_capacity(stored.docs.len());
    for (key, doc) in &stored.docs {
        match writes.and_then(|writes| writes.get(key)) {
            Some(write) => {
                if let Some(body) = &write.body {
                    out.push((*key, body));
                }
            }
            None => out.push((*key, &doc.body)),
        }
    }
    if let Some(writes) = writes {
        for (key, write) in writes {
            if write.base_version.is_none() {
                if let Some(body) = &write.body {
                    out.push((*key, body));
                }
            }
        }
    }
    out
}

fn reference_targets(reference: &ReferenceSpec, targets: &[(DocKey, &Value)]) -> HashSet<String> {
    targets
        .iter()
        .filter_map(|(_, body)| ReferenceSpec::value_of(body, &reference.target_field))
        .collect()
}

/// Target values this commit removes from `reference.target`.
fn removed_targets(
    state: &State,
    pending: &HashMap<String, PendingWrites>,
    reference: &ReferenceSpec,
) -> DocResult<HashSet<String>> {
    let Some(writes) = pending.get(&reference.target) else {
        return Ok(HashSet::new());
    };
    let stored = state.collection(&reference.target)?;
    let mut removed = HashSet::new();
    for (key, write) in writes {
        let Some(previous) = stored.docs.get(key) else {
            continue;
        };
        let Some(old) = ReferenceSpec::value_of(&previous.body, &reference.target_field) else {
            continue;
        };
        let next = write
            .body
            .as_ref()
            .and_then(|body| ReferenceSpec::value_of(body, &reference.target_field));
        if next.as_ref() != Some(&old) {
            removed.insert(old);
        }
    }
    if !removed.is_empty() {
        let still_present = reference_targets(reference, &visible_in(stored, Some(writes)));
        removed.retain(|value| !still_present.contains(value));
    }
    Ok(removed)
}

/// Stages deletes for documents whose cascading references lose their
/// target, repeating until no further document is affected.
///
/// # Errors
/// - `DanglingReference` when a non-cascading reference loses its target.
fn cascade_deletes(state: &State, pending: &mut HashMap<String, PendingWrites>) -> DocResult<()> {
    let references: Vec<(String, ReferenceSpec)> = state
        .collections
        .iter()
        .flat_map(|(name, stored)| {
            stored
                .references
                .iter()
                .map(move |reference| (name.clone(), reference.clone()))
        })
        .collect();

    loop {
        let mut staged: Vec<(String, DocKey)> = Vec::new();
        for (name, reference) in &references {
            let removed = removed_targets(state, pending, reference)?;
            if removed.is_empty() {
                continue;
            }
            let stored = state.collection(name)?;
            let orphans: Vec<DocKey> = visible_in(stored, pending.get(name))
                .into_iter()
                .filter(|(_, body)| {
                    ReferenceSpec::value_of(body, &reference.field)
                        .is_some_and(|value| removed.contains(&value))
                })
                .map(|(key, _)| key)
                .collect();
            if orphans.is_empty() {
                continue;
            }
            if !reference.cascade {
                return Err(dangling_reference(name, &reference.field));
            }
            staged.extend(orphans.into_iter().map(|key| (name.clone(), key)));
        }
        if staged.is_empty() {
            return Ok(());
        }

        for (name, key) in staged {
            let stored = state.collection(&name)?;
            let writes = pending.entry(name).or_default();
            match writes.get(&key).map(|write| write.base_version) {
                Some(None) => {
                    writes.remove(&key);
                }
                Some(base_version) => {
                    writes.insert(key, PendingWrite { base_version, body: None });
                }
                None => {
                    let base_version = stored.docs.get(&key).map(|doc| doc.version);
                    writes.insert(key, PendingWrite { base_version, body: None });
                }
            }
        }
    }
}

/// Every written document must reference an existing target.
fn check_references(state: &State, pending: &HashMap<String, PendingWrites>) -> DocResult<()> {
    for (name, writes) in pending {
        let stored = state.collection(name)?;
        for reference in &stored.references {
            let wanted: Vec<String> = writes
                .values()
                .filter_map(|write| write.body.as_ref())
                .filter_map(|body| ReferenceSpec::value_of(body, &reference.field))
                .collect();
            if wanted.is_empty() {
                continue;
            }
            let target = state.collection(&reference.target)?;
            let present = reference_targets(
                reference,
                &visible_in(target, pending.get(&reference.target)),
            );
            if wanted.iter().any(|value| !present.contains(value)) {
                return Err(dangling_reference(name, &reference.field));
            }
        }
    }
    Ok(())
}

fn check_unique_after(name: &str, stored: &Collection, writes: &PendingWrites) -> DocResult<()> {
    for index in &stored.indexes {
        let written: HashSet<String> = writes
            .values()
            .filter_map(|write| write.body.as_ref())
            .filter_map(|body| index.key_of(body))
            .collect();
        if written.is_empty() {
            continue;
        }
        let untouched = stored
            .docs
            .iter()
            .filter(|(key, _)| !writes.contains_key(key))
            .map(|(_, doc)| &doc.body);
        let rewritten = writes.values().filter_map(|write| write.body.as_ref());

        let mut seen = HashSet::new();
        for body in untouched.chain(rewritten) {
            if let Some(key) = index.key_of(body) {
                if written.contains(&key) && !seen.insert(key) {
                    return Err(duplicate(name, &index.name));
                }
            }
        }
    }
    Ok(())
}

fn apply(state: &mut State, pending: HashMap<String, PendingWrites>) {
    state.commit_seq += 1;
    let version = state.commit_seq;
    for (name, writes) in pending {
        let Some(stored) = state.collections.get_mut(&name) else {
            continue;
        };
        for (key, write) in writes {
            match write.body {
                Some(body) => {
                    stored.docs.insert(key, super::StoredDoc { version, body });
                }
                None => {
                    stored.docs.remove(&key);
                }
            }
        }
    }
}

fn dangling_reference(collection: &str, field: &str) -> DocError {
    DocError::DanglingReference {
        collection: collection.to_string(),
        field: field.to_string(),
    }
}

fn duplicate(collection: &str, index: &str) -> DocError {
    DocError::DuplicateKey {
        collection: collection.to_string(),
        index: index.to_string(),
    }
}
