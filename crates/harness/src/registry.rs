use reconcile_core::record::Record;
use reconcile_engine::{resolve_backend, Collaborators, EngineError, OperationConfig, Processor, RunSummary};
use reconcile_storage::{Registry, StorageError, StoreSettings};
use serde_json::Value;
use tempfile::TempDir;

use crate::store::{record, records};

/// A registry whose stores live in a temporary directory, driven the way the
/// command-line runner drives it.
pub struct TestRegistry {
    pub registry: Registry,
    pub settings: StoreSettings,
    _dir: TempDir,
}

impl TestRegistry {
    pub fn new() -> Result<Self, StorageError> {
        let dir = tempfile::tempdir()?;
        let settings = StoreSettings {
            csv_root: dir.path().join("csv"),
            document_db: Some(dir.path().join("docs.db")),
        };
        Ok(Self {
            registry: Registry::new(),
            settings,
            _dir: dir,
        })
    }

    /// Resolve the configured collection and run every record through it.
    pub fn run(&mut self, config: Value, data: Value) -> Result<RunSummary, EngineError> {
        self.run_with_job_log(config, data, Record::new())
    }

    pub fn run_with_job_log(&mut self, config: Value, data: Value, job_log: Record) -> Result<RunSummary, EngineError> {
        let config = OperationConfig::from_map(&record(config))?;
        let backend = resolve_backend(&mut self.registry, &config, &self.settings)?;
        Processor::with_collaborators(config, backend, Collaborators::default())?
            .with_job_log(job_log)
            .process_many(records(data))
    }
}
