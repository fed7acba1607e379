//! Flat-file CSV collections.
//!
//! Nested records are written as dotted columns and rebuilt on read. All
//! cells come back as text; typed comparisons happen in the lookup layer.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, error};

use reconcile_core::{
    dotted::{flatten, unflatten},
    ids::RecordId,
    query::MatchQuery,
    record::{Record, ID_KEY},
};

use crate::error::StorageError;
use crate::traits::{storable, Backend, Collection, RecordHandle};

/// Cell values read as empty.
pub const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "N/A", "NULL", "NaN", "n/a", "nan", "null",
];

pub struct CsvStore {
    path: PathBuf,
    qualified: String,
    columns: Vec<String>,
    rows: Vec<(RecordId, Record)>,
}

impl CsvStore {
    /// Open `<root>/<namespace>/<name>`, or `name` itself when absolute.
    /// With `create`, a missing file (and its directory) is created empty.
    pub fn open(root: &Path, namespace: &str, name: &str, create: bool) -> Result<Self, StorageError> {
        let path = if Path::new(name).is_absolute() {
            PathBuf::from(name)
        } else {
            root.join(namespace).join(name)
        };

        if !path.is_file() {
            if !create {
                return Err(StorageError::NotFound(format!(
                    "file does not exist: {}",
                    path.display()
                )));
            }
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::File::create(&path)?;
        }

        let (columns, rows) = load(&path)?;
        debug!(path = %path.display(), rows = rows.len(), "opened csv collection");
        Ok(Self {
            path,
            qualified: format!("{namespace}.{name}"),
            columns,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn position(&self, id: RecordId) -> Result<usize, StorageError> {
        self.rows
            .iter()
            .position(|(row_id, _)| *row_id == id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn flush(&self) -> Result<(), StorageError> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        if self.rows.is_empty() && self.columns.is_empty() {
            writer.flush()?;
            return Ok(());
        }

        let mut header = vec![ID_KEY.to_string()];
        header.extend(self.columns.iter().cloned());
        writer.write_record(&header)?;

        for (id, flat) in &self.rows {
            let mut cells = vec![id.to_string()];
            cells.extend(self.columns.iter().map(|column| encode_cell(flat.get(column))));
            writer.write_record(&cells)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn load(path: &Path) -> Result<(Vec<String>, Vec<(RecordId, Record)>), StorageError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let header: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let columns: Vec<String> = header.iter().filter(|h| *h != ID_KEY).cloned().collect();

    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let mut id = None;
        let mut flat = Record::new();
        for (column, cell) in header.iter().zip(row.iter()) {
            if column == ID_KEY {
                id = cell.parse::<RecordId>().ok();
            } else {
                flat.insert(column.clone(), decode_cell(cell));
            }
        }
        rows.push((id.unwrap_or_default(), flat));
    }
    Ok((columns, rows))
}

fn decode_cell(cell: &str) -> Value {
    if NA_VALUES.contains(&cell) {
        return Value::String(String::new());
    }
    let trimmed = cell.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(value @ (Value::Array(_) | Value::Object(_))) = serde_json::from_str::<Value>(cell) {
            return value;
        }
    }
    Value::String(cell.to_string())
}

fn encode_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl Backend for CsvStore {
    fn name(&self) -> &str {
        &self.qualified
    }

    fn get_collection(&self, query: &MatchQuery) -> Result<Collection, StorageError> {
        let candidates = self
            .rows
            .iter()
            .map(|(id, flat)| RecordHandle::loaded(&self.qualified, *id, unflatten(flat)));
        Ok(Collection::select(candidates, query))
    }

    fn persist(&mut self, handle: &mut RecordHandle, data: &Record) -> Result<(), StorageError> {
        let body = storable(data);
        let flat = flatten(&body);
        for key in flat.keys() {
            if !self.columns.contains(key) {
                self.columns.push(key.clone());
            }
        }

        if handle.is_new() {
            self.rows.push((handle.id(), flat));
        } else {
            let index = self.position(handle.id())?;
            self.rows[index].1 = flat;
        }
        self.flush()?;
        handle.mark_persisted(body);
        Ok(())
    }

    fn delete(&mut self, handle: &RecordHandle) -> Result<(), StorageError> {
        let index = self.position(handle.id())?;
        self.rows.remove(index);
        self.flush()
    }

    fn drop_collection(&mut self) -> Result<(), StorageError> {
        self.rows.clear();
        self.columns.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(path = %self.path.display(), "{e}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn unregister(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}
