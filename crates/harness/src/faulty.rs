use reconcile_core::{query::MatchQuery, record::Record};
use reconcile_storage::{Backend, Collection, DocumentStore, RecordHandle, StorageError};

/// Document store whose writes can be made to fail.
pub struct FaultyBackend {
    inner: DocumentStore,
    pub fail_persist: bool,
    pub fail_delete: bool,
}

impl FaultyBackend {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            inner: DocumentStore::open_in_memory("test", "faulty")?,
            fail_persist: false,
            fail_delete: false,
        })
    }

    pub fn inner(&self) -> &DocumentStore {
        &self.inner
    }
}

impl Backend for FaultyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get_collection(&self, query: &MatchQuery) -> Result<Collection, StorageError> {
        self.inner.get_collection(query)
    }

    fn persist(&mut self, handle: &mut RecordHandle, data: &Record) -> Result<(), StorageError> {
        if self.fail_persist {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.inner.persist(handle, data)
    }

    fn delete(&mut self, handle: &RecordHandle) -> Result<(), StorageError> {
        if self.fail_delete {
            return Err(StorageError::Io(std::io::Error::other("read-only collection")));
        }
        self.inner.delete(handle)
    }

    fn drop_collection(&mut self) -> Result<(), StorageError> {
        self.inner.drop_collection()
    }

    fn unregister(&mut self) -> Result<(), StorageError> {
        self.inner.unregister()
    }
}
