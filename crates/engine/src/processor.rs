use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::{debug, info, warn};

use reconcile_core::{
    query::MatchQuery,
    record::{is_empty_value, take_object, Record, ID_KEY, LOGS_KEY, LOG_KEY, ORIGINAL_ID_KEY, SOURCE_KEY},
};
use reconcile_storage::{Backend, Collection, RecordHandle};

use crate::diagnostics::{diff, log_diff, LogFormat};
use crate::error::EngineError;
use crate::extra::add_extra;
use crate::merge::{update_with, MergeOptions};
use crate::params::{Operation, OperationConfig};
use crate::provenance::{SourceConsolidator, StrategyTable};
use crate::query::{build_query, static_query};
use crate::transform::{Normalizer, TextNormalizer, Transformer};

/// Log entry and provenance taken off an incoming record before merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeMeta {
    pub log: Record,
    pub source: Value,
}

/// Pluggable pieces a processor calls into.
pub struct Collaborators {
    transformers: BTreeMap<String, Box<dyn Transformer>>,
    normalizer: Box<dyn Normalizer>,
    consolidator: Box<dyn SourceConsolidator>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            transformers: BTreeMap::new(),
            normalizer: Box::new(TextNormalizer),
            consolidator: Box::new(StrategyTable),
        }
    }
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transformer under the name the `transformer` option uses.
    pub fn with_transformer(mut self, name: &str, transformer: impl Transformer + 'static) -> Self {
        self.transformers.insert(name.to_string(), Box::new(transformer));
        self
    }

    pub fn with_normalizer(mut self, normalizer: impl Normalizer + 'static) -> Self {
        self.normalizer = Box::new(normalizer);
        self
    }

    pub fn with_consolidator(mut self, consolidator: impl SourceConsolidator + 'static) -> Self {
        self.consolidator = Box::new(consolidator);
        self
    }

    pub(crate) fn transformer(&self, name: &str) -> Option<&dyn Transformer> {
        self.transformers.get(name).map(Box::as_ref)
    }

    pub(crate) fn normalizer(&self) -> &dyn Normalizer {
        self.normalizer.as_ref()
    }
}

/// What `process` did with one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `None` when there was nothing to save.
    Created(Option<Record>),
    Skipped { query: MatchQuery },
    Updated { query: MatchQuery, records: Vec<Record> },
    NotFound { query: MatchQuery },
    Deleted { query: MatchQuery, snapshots: Vec<Record> },
}

/// Per-run counters of [`Processor::process_many`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Created(_) => self.created += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Updated { records, .. } => self.updated += records.len(),
            Outcome::NotFound { .. } => self.not_found += 1,
            Outcome::Deleted { snapshots, .. } => self.deleted += snapshots.len(),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} created={} updated={} deleted={} skipped={} not_found={} failed={}",
            self.processed, self.created, self.updated, self.deleted, self.skipped, self.not_found, self.failed
        )
    }
}

/// Reconciles incoming records against one backend collection.
pub struct Processor<'b> {
    pub(crate) config: OperationConfig,
    pub(crate) backend: &'b mut dyn Backend,
    pub(crate) collaborators: Collaborators,
    pub(crate) format: LogFormat,
    job_log: Record,
}

impl<'b> Processor<'b> {
    pub fn new(config: OperationConfig, backend: &'b mut dyn Backend) -> Result<Self, EngineError> {
        Self::with_collaborators(config, backend, Collaborators::default())
    }

    pub fn with_collaborators(
        config: OperationConfig,
        backend: &'b mut dyn Backend,
        collaborators: Collaborators,
    ) -> Result<Self, EngineError> {
        if let Some(transformer) = &config.transformer {
            if collaborators.transformer(&transformer.name).is_none() {
                return Err(EngineError::invalid(
                    "transformer",
                    format!("no transformer registered as `{}`", transformer.name),
                ));
            }
        }
        if let Some(mode) = &config.source_consolidation_mode {
            let modes = collaborators.consolidator.modes();
            if !modes.iter().any(|known| *known == mode.as_str()) {
                return Err(EngineError::invalid(
                    "source_consolidation_mode",
                    format!("unknown mode `{mode}`, choices are: {}", modes.join(", ")),
                ));
            }
        }

        let format = LogFormat::from_config(&config);
        Ok(Self {
            config,
            backend,
            collaborators,
            format,
            job_log: Record::new(),
        })
    }

    /// Run-wide log entry merged into every record's `log`; its keys win.
    pub fn with_job_log(mut self, job_log: Record) -> Self {
        self.job_log = job_log;
        self
    }

    pub fn config(&self) -> &OperationConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn Backend {
        &*self.backend
    }

    /// Process records one at a time. Failures of single records are
    /// counted and skipped unless `fail_on_error` is set; configuration
    /// errors always abort.
    pub fn process_many<I>(&mut self, records: I) -> Result<RunSummary, EngineError>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut summary = RunSummary::default();
        for data in records {
            summary.processed += 1;
            match self.process(data) {
                Ok(outcome) => summary.record(&outcome),
                Err(e) if !self.config.fail_on_error && !e.is_configuration() => {
                    summary.failed += 1;
                    warn!(error = %e, record = summary.processed, "SKIP record");
                }
                Err(e) => return Err(e),
            }
        }
        info!(collection = %self.backend.name(), dry_run = self.config.dry_run, "{summary}");
        Ok(summary)
    }

    pub fn process(&mut self, data: Record) -> Result<Outcome, EngineError> {
        let data = add_extra(data, &self.config.extra, &self.config.extra_options);

        match self.config.op {
            Operation::Create => self.create(data),
            Operation::Update => {
                let (query, objects) = self.find(&data)?;
                if objects.is_empty() {
                    self.log_not_found(&query, &data);
                    return Ok(Outcome::NotFound { query });
                }
                let records = self.update_objects(&query, objects, data)?;
                Ok(Outcome::Updated { query, records })
            }
            Operation::Upsert => {
                let (query, objects) = self.find(&data)?;
                if objects.is_empty() {
                    return self.create(data);
                }
                let records = self.update_objects(&query, objects, data)?;
                Ok(Outcome::Updated { query, records })
            }
            Operation::Delete => {
                let (query, objects) = self.find(&data)?;
                if objects.is_empty() {
                    self.log_not_found(&query, &data);
                    return Ok(Outcome::NotFound { query });
                }
                let mut snapshots = Vec::with_capacity(objects.len());
                for handle in objects.iter() {
                    snapshots.push(self.delete(handle)?);
                }
                debug!(
                    "DELETED {} objects by:\n{}",
                    snapshots.len(),
                    self.format.query(format!("{:?}", self.config.op_params))
                );
                Ok(Outcome::Deleted { query, snapshots })
            }
        }
    }

    fn create(&mut self, mut data: Record) -> Result<Outcome, EngineError> {
        if let Some(skip_by) = &self.config.skip_by {
            let query = build_query(&data, skip_by, &self.format)?.with_limit(1);
            let existing = self.backend.get_collection(&query)?;
            if existing.total > 0 {
                debug!(count = existing.total, "SKIP creation: objects exist with: {query}");
                return Ok(Outcome::Skipped { query });
            }
        }

        if !self.config.keep_ids && !data.contains_key(ORIGINAL_ID_KEY) {
            if let Some(id) = data.remove(ID_KEY) {
                data.insert(ORIGINAL_ID_KEY.to_string(), id);
            }
        }

        let meta = self.extract_meta(&mut data);
        let mut handle = self.backend.create();
        let saved = self.save(&mut handle, data, &meta)?;
        debug!(record = %handle, "CREATED");
        Ok(Outcome::Created(saved))
    }

    /// Look up the records the incoming one targets.
    fn find(&self, data: &Record) -> Result<(MatchQuery, Collection), EngineError> {
        let mut query = build_query(data, &self.config.op_params, &self.format)?;
        if !self.config.query.is_empty() {
            query.extend(static_query(&self.config.query));
        }
        let objects = self.backend.get_collection(&query)?;
        Ok((query, objects))
    }

    fn update_objects(
        &mut self,
        query: &MatchQuery,
        objects: Collection,
        mut data: Record,
    ) -> Result<Vec<Record>, EngineError> {
        let count = objects.len();
        if count > 1 {
            warn!(count, "Multiple ({count}) updates for\n{}", self.format.query(query));
        }

        // Source logs would overwrite the target's history.
        if !self.config.keep_source_logs {
            data.remove(LOGS_KEY);
        }

        let meta = self.extract_meta(&mut data);
        data.remove(SOURCE_KEY);
        let options = MergeOptions::from_config(&self.config);

        let mut updated = Vec::with_capacity(count);
        for mut handle in objects {
            let existing = handle.to_record();

            if let Some(fields) = &self.config.show_diff {
                log_diff(&diff(&data, &existing, fields));
            }

            let mut merged = update_with(&existing, &data, &options);
            self.consolidate_source(&existing, &meta, &mut merged)?;

            if let Some(saved) = self.save(&mut handle, merged, &meta)? {
                updated.push(saved);
            }
            debug!(record = %handle, "UPDATED with:\n{}", self.format.query(query));
        }
        Ok(updated)
    }

    fn consolidate_source(&self, existing: &Record, meta: &MergeMeta, merged: &mut Record) -> Result<(), EngineError> {
        match &self.config.source_consolidation_mode {
            Some(mode) => {
                let current = existing
                    .get(SOURCE_KEY)
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Record::new()));
                let consolidated = self
                    .collaborators
                    .consolidator
                    .consolidate(&current, &meta.source, mode)?;
                if let Some(source) = consolidated.filter(|source| !is_empty_value(source)) {
                    merged.insert(SOURCE_KEY.to_string(), source);
                }
            }
            None if !is_empty_value(&meta.source) => {
                warn!(
                    "SKIP source consolidation. Reason: `source_consolidation_mode` has not been set. Choices are: {:?}.\nDATA:{}",
                    self.collaborators.consolidator.modes(),
                    meta.source
                );
            }
            None => {}
        }
        Ok(())
    }

    fn delete(&mut self, handle: &RecordHandle) -> Result<Record, EngineError> {
        let snapshot = handle.to_record();
        let result = if self.config.dry_run {
            warn!("DRY RUN");
            Ok(())
        } else {
            self.backend.delete(handle)
        };
        debug!(record = %handle, "DELETED with data:\n{}", self.format.record(&snapshot));
        result?;
        Ok(snapshot)
    }

    /// Pull `log` (merged with the job log) and `source` off the record.
    pub(crate) fn extract_meta(&self, data: &mut Record) -> MergeMeta {
        let mut log = take_object(data, LOG_KEY);
        log.extend(self.job_log.clone());
        let source = data
            .get(SOURCE_KEY)
            .cloned()
            .unwrap_or_else(|| Value::Object(Record::new()));
        MergeMeta { log, source }
    }

    fn log_not_found(&self, query: &MatchQuery, data: &Record) {
        warn!(
            "NOT FOUND in <{}> with:\n{}",
            self.backend.name(),
            self.format.render(query, data)
        );
    }
}
