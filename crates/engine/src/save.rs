//! The save pipeline shared by create and update.

use serde_json::Value;
use tracing::{debug, warn};

use reconcile_core::{
    cast::typecast_record,
    dotted::{extract, get_path, remove_path},
    record::{is_blank, Record, LOGS_KEY},
};
use reconcile_storage::RecordHandle;

use crate::error::EngineError;
use crate::processor::{MergeMeta, Processor};

/// Field the normalized value is stored under.
pub const NORMALIZED_KEY: &str = "n";

impl Processor<'_> {
    /// Shape the record that is about to be stored.
    pub(crate) fn pre_save(&self, data: Record, meta: &MergeMeta) -> Record {
        let mut data = self.run_transformer(data);

        let mut logs = match data.remove(LOGS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
        };
        logs.insert(0, Value::Object(meta.log.clone()));

        if !self.config.normalize.is_empty() {
            let normalized = self
                .collaborators
                .normalizer()
                .normalize(&data, &self.config.normalize);
            data.insert(NORMALIZED_KEY.to_string(), normalized);
        }

        if let Some(fields) = &self.config.fields {
            data = typecast_record(extract(&data, fields));
        }
        data.insert(LOGS_KEY.to_string(), Value::Array(logs));

        for key in &self.config.pop_empty {
            if get_path(&data, key).is_some_and(is_blank) {
                remove_path(&mut data, key);
            }
        }
        data
    }

    /// First record the configured transformer yields. With an alias the
    /// output becomes the only field, stored under the alias. No output
    /// leaves the data as it was.
    fn run_transformer(&self, data: Record) -> Record {
        let Some(selected) = &self.config.transformer else {
            return data;
        };
        let Some(transformer) = self.collaborators.transformer(&selected.name) else {
            return data;
        };

        let original = data.clone();
        match transformer.transform(data).into_iter().next() {
            Some(out) => match &selected.alias {
                Some(alias) => Record::from_iter([(alias.clone(), Value::Object(out))]),
                None => out,
            },
            None => {
                debug!(transformer = %selected.name, "transformer yielded nothing");
                original
            }
        }
    }

    /// Persist `data` through `handle`. Returns the stored (or, on a dry
    /// run, the would-be) record; `None` when there was nothing to save.
    pub(crate) fn save(
        &mut self,
        handle: &mut RecordHandle,
        data: Record,
        meta: &MergeMeta,
    ) -> Result<Option<Record>, EngineError> {
        if data.is_empty() {
            debug!("NOTHING TO SAVE");
            return Ok(None);
        }

        let data = self.pre_save(data, meta);

        let result = if self.config.dry_run {
            warn!("DRY RUN");
            Ok(())
        } else {
            self.backend.persist(handle, &data)
        };
        debug!(record = %handle, "SAVED with data:\n{}", self.format.record(&data));

        result?;
        Ok(Some(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reconcile_storage::{Backend, DocumentStore};
    use serde_json::json;

    use crate::params::OperationConfig;
    use crate::processor::Collaborators;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn meta() -> MergeMeta {
        MergeMeta {
            log: record(json!({"job": "j1"})),
            source: json!({}),
        }
    }

    #[test]
    fn logs_head_fields_and_pop_empty() -> Result<(), EngineError> {
        let mut store = DocumentStore::open_in_memory("default", "t")?;
        let config = OperationConfig::from_map(&record(json!({
            "name": "t",
            "op": "create",
            "normalize": ["name"],
            "fields": ["name", "age", "n", "note"],
            "pop_empty": ["note"],
        })))?;
        let processor = Processor::new(config, &mut store)?;

        let out = processor.pre_save(
            record(json!({"name": "Ann LEE", "age": "30", "note": "", "junk": 1, "logs": [{"job": "j0"}]})),
            &meta(),
        );
        assert_eq!(
            out,
            record(json!({
                "name": "Ann LEE",
                "age": 30,
                "n": "ann lee",
                "logs": [{"job": "j1"}, {"job": "j0"}],
            }))
        );
        Ok(())
    }

    #[test]
    fn transformer_alias_and_empty_output() -> Result<(), EngineError> {
        let mut store = DocumentStore::open_in_memory("default", "t")?;
        let config = OperationConfig::from_map(&record(json!({
            "name": "t", "op": "create", "transformer": "upper__as__shout"
        })))?;
        let collaborators = Collaborators::new().with_transformer("upper", |data: Record| {
            let name = data.get("name").and_then(Value::as_str).unwrap_or_default().to_uppercase();
            vec![record(json!({"name": name}))]
        });
        let processor = Processor::with_collaborators(config, &mut store, collaborators)?;
        let out = processor.pre_save(record(json!({"name": "ann", "age": 3})), &meta());
        assert_eq!(
            out,
            record(json!({"shout": {"name": "ANN"}, "logs": [{"job": "j1"}]}))
        );

        let mut store = DocumentStore::open_in_memory("default", "t")?;
        let config = OperationConfig::from_map(&record(json!({
            "name": "t", "op": "create", "transformer": "nothing"
        })))?;
        let collaborators = Collaborators::new().with_transformer("nothing", |_: Record| -> Vec<Record> { Vec::new() });
        let processor = Processor::with_collaborators(config, &mut store, collaborators)?;
        let out = processor.pre_save(record(json!({"name": "ann"})), &meta());
        assert_eq!(out.get("name"), Some(&json!("ann")));
        Ok(())
    }

    #[test]
    fn unknown_transformer_is_rejected() -> Result<(), EngineError> {
        let mut store = DocumentStore::open_in_memory("default", "t")?;
        let config = OperationConfig::from_map(&record(json!({
            "name": "t", "op": "create", "transformer": "missing"
        })))?;
        let err = Processor::new(config, &mut store).err();
        assert!(matches!(err, Some(EngineError::InvalidOption { name, .. }) if name == "transformer"));
        Ok(())
    }

    #[test]
    fn dry_run_and_empty_saves_touch_nothing() -> Result<(), EngineError> {
        let mut store = DocumentStore::open_in_memory("default", "t")?;
        let config = OperationConfig::from_map(&record(json!({"name": "t", "op": "create", "dry_run": true})))?;
        let mut processor = Processor::new(config, &mut store)?;

        let mut handle = processor.backend.create();
        assert_eq!(processor.save(&mut handle, Record::new(), &meta())?, None);

        let saved = processor.save(&mut handle, record(json!({"a": 1})), &meta())?;
        assert_eq!(saved, Some(record(json!({"a": 1, "logs": [{"job": "j1"}]}))));
        assert!(handle.is_new());
        drop(processor);
        assert_eq!(store.count()?, 0);
        Ok(())
    }
}
