use reconcile_core::{dotted::get_path, query::MatchQuery, record::Record};
use reconcile_engine::{Collaborators, EngineError, OperationConfig, Outcome, Processor, RunSummary};
use reconcile_storage::{Backend, CsvStore, DocumentStore, StorageError};
use serde_json::Value;
use tempfile::TempDir;

/// Build a record from a JSON object literal.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Build records from a JSON array of objects.
pub fn records(value: Value) -> Vec<Record> {
    match value {
        Value::Array(items) => items.into_iter().map(record).collect(),
        other => panic!("expected a JSON array, got {other}"),
    }
}

/// A stored leaf as text. CSV cells always read back as text, so scenarios
/// shared by every backend compare through this.
pub fn field_text(row: &Record, path: &str) -> Option<String> {
    get_path(row, path).map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Documents,
    Csv,
}

/// One collection on a throwaway backend, plus helpers to drive a
/// processor against it.
pub struct TestStore {
    pub kind: StoreKind,
    pub backend: Box<dyn Backend>,
    _dir: TempDir,
}

impl TestStore {
    pub fn new(kind: StoreKind) -> Result<Self, StorageError> {
        let dir = tempfile::tempdir()?;
        let backend: Box<dyn Backend> = match kind {
            StoreKind::Documents => Box::new(DocumentStore::open(&dir.path().join("docs.db"), "test", "items")?),
            StoreKind::Csv => Box::new(CsvStore::open(dir.path(), "test", "items.csv", true)?),
        };
        Ok(Self { kind, backend, _dir: dir })
    }

    pub fn documents() -> Result<Self, StorageError> {
        Self::new(StoreKind::Documents)
    }

    pub fn csv() -> Result<Self, StorageError> {
        Self::new(StoreKind::Csv)
    }

    /// A fresh store of every kind, for scenarios that must behave the same
    /// on all backends.
    pub fn all_kinds() -> Result<Vec<Self>, StorageError> {
        Ok(vec![Self::documents()?, Self::csv()?])
    }

    /// Store records directly, bypassing the engine.
    pub fn seed(&mut self, rows: Vec<Record>) -> Result<(), StorageError> {
        for row in rows {
            let mut handle = self.backend.create();
            self.backend.persist(&mut handle, &row)?;
        }
        Ok(())
    }

    pub fn processor(&mut self, config: Value) -> Result<Processor<'_>, EngineError> {
        self.processor_with(config, Collaborators::default())
    }

    pub fn processor_with(
        &mut self,
        config: Value,
        collaborators: Collaborators,
    ) -> Result<Processor<'_>, EngineError> {
        let config = OperationConfig::from_map(&record(config))?;
        Processor::with_collaborators(config, self.backend.as_mut(), collaborators)
    }

    /// Process a single record under `config`.
    pub fn process(&mut self, config: Value, data: Value) -> Result<Outcome, EngineError> {
        self.processor(config)?.process(record(data))
    }

    pub fn run(&mut self, config: Value, data: Value) -> Result<RunSummary, EngineError> {
        self.processor(config)?.process_many(records(data))
    }

    /// Snapshots of every stored record, newest first on the document store.
    pub fn all(&self) -> Result<Vec<Record>, StorageError> {
        Ok(self
            .backend
            .get_collection(&MatchQuery::new())?
            .iter()
            .map(|handle| handle.to_record())
            .collect())
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        Ok(self.backend.get_collection(&MatchQuery::new())?.total)
    }

    /// Stored records whose `path` holds `value` as text.
    pub fn find(&self, path: &str, value: &str) -> Result<Vec<Record>, StorageError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|row| field_text(row, path).as_deref() == Some(value))
            .collect())
    }
}
