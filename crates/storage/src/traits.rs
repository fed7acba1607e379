use std::fmt;

use reconcile_core::{
    ids::RecordId,
    query::MatchQuery,
    record::{Record, ID_KEY},
};
use serde_json::Value;

use crate::error::StorageError;

/// A backend-owned reference to one stored record, or to a record that has
/// been allocated by [`Backend::create`] but not persisted yet.
#[derive(Debug, Clone)]
pub struct RecordHandle {
    id: RecordId,
    collection: String,
    data: Record,
    persisted: bool,
}

impl RecordHandle {
    pub fn new(collection: &str) -> Self {
        Self {
            id: RecordId::new(),
            collection: collection.to_string(),
            data: Record::new(),
            persisted: false,
        }
    }

    pub fn loaded(collection: &str, id: RecordId, data: Record) -> Self {
        Self {
            id,
            collection: collection.to_string(),
            data,
            persisted: true,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn is_new(&self) -> bool {
        !self.persisted
    }

    pub fn data(&self) -> &Record {
        &self.data
    }

    /// Snapshot as a plain record. Persisted records expose their identity
    /// under `id`.
    pub fn to_record(&self) -> Record {
        let mut out = self.data.clone();
        if self.persisted {
            out.insert(ID_KEY.to_string(), Value::String(self.id.to_string()));
        }
        out
    }

    pub fn mark_persisted(&mut self, data: Record) {
        self.data = data;
        self.persisted = true;
    }
}

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.persisted {
            write!(f, "<{} {}>", self.collection, self.id)
        } else {
            write!(f, "<{} (new)>", self.collection)
        }
    }
}

/// Lookup result: the matching handles (bounded by the query limit) and the
/// total number of matches.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub items: Vec<RecordHandle>,
    pub total: usize,
}

impl Collection {
    /// Filter candidates with `query`, honouring its limit.
    pub fn select<I>(candidates: I, query: &MatchQuery) -> Self
    where
        I: IntoIterator<Item = RecordHandle>,
    {
        let mut items = Vec::new();
        let mut total = 0;
        for handle in candidates {
            if !query.matches(&handle.to_record()) {
                continue;
            }
            total += 1;
            if query.limit().is_none_or(|limit| items.len() < limit) {
                items.push(handle);
            }
        }
        Self { items, total }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordHandle> {
        self.items.iter()
    }
}

impl IntoIterator for Collection {
    type Item = RecordHandle;
    type IntoIter = std::vec::IntoIter<RecordHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Storage contract shared by every adapter. The reconciliation engine only
/// talks to storage through this trait.
pub trait Backend {
    /// Qualified collection name (`namespace.name`), used for logs.
    fn name(&self) -> &str;

    fn get_collection(&self, query: &MatchQuery) -> Result<Collection, StorageError>;

    /// Allocate an empty handle. Nothing is written until [`Backend::persist`].
    fn create(&self) -> RecordHandle {
        RecordHandle::new(self.name())
    }

    /// Write `data` as the full content of the handle's record. Any `id`
    /// field in `data` is ignored: the backend owns identity.
    fn persist(&mut self, handle: &mut RecordHandle, data: &Record) -> Result<(), StorageError>;

    fn delete(&mut self, handle: &RecordHandle) -> Result<(), StorageError>;

    fn drop_collection(&mut self) -> Result<(), StorageError>;

    /// Release whatever the backend holds for this collection.
    fn unregister(&mut self) -> Result<(), StorageError>;
}

/// Strip the identity field before writing.
pub(crate) fn storable(data: &Record) -> Record {
    let mut body = data.clone();
    body.remove(ID_KEY);
    body
}
