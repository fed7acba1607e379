use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use reconcile_core::{ids::RecordId, query::MatchQuery, record::Record};

use crate::error::StorageError;
use crate::traits::{storable, Backend, Collection, RecordHandle};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn encode_body(body: &Record) -> Result<Vec<u8>, StorageError> {
    rmp_serde::to_vec(body).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_body(bytes: &[u8]) -> Result<Record, StorageError> {
    match rmp_serde::from_slice::<Value>(bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?
    {
        Value::Object(map) => Ok(map),
        _ => Err(StorageError::Serialization("document body is not a map".into())),
    }
}

/// Document collection stored in SQLite. Every collection of a database
/// shares the `documents` table, scoped by `(namespace, collection)`.
pub struct DocumentStore {
    conn: Connection,
    namespace: String,
    collection: String,
    qualified: String,
}

impl DocumentStore {
    pub fn open(path: &Path, namespace: &str, collection: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self::with_connection(conn, namespace, collection))
    }

    pub fn open_in_memory(namespace: &str, collection: &str) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self::with_connection(conn, namespace, collection))
    }

    fn with_connection(conn: Connection, namespace: &str, collection: &str) -> Self {
        Self {
            conn,
            namespace: namespace.to_string(),
            collection: collection.to_string(),
            qualified: format!("{namespace}.{collection}"),
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn count(&self) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE namespace = ?1 AND collection = ?2",
            rusqlite::params![self.namespace, self.collection],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn get(&self, id: RecordId) -> Result<Option<RecordHandle>, StorageError> {
        let body: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE record_id = ?1 AND namespace = ?2 AND collection = ?3",
                rusqlite::params![id.as_bytes().as_slice(), self.namespace, self.collection],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(bytes) => Ok(Some(RecordHandle::loaded(&self.qualified, id, decode_body(&bytes)?))),
            None => Ok(None),
        }
    }

    /// Every `(namespace, collection)` pair holding at least one document.
    pub fn collections(&self) -> Result<Vec<(String, String)>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT namespace, collection FROM documents ORDER BY namespace, collection",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn load_all(&self) -> Result<Vec<RecordHandle>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT record_id, body FROM documents WHERE namespace = ?1 AND collection = ?2 ORDER BY rowid DESC",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![self.namespace, self.collection],
            |row| {
                let id_bytes: Vec<u8> = row.get(0)?;
                let body: Vec<u8> = row.get(1)?;
                Ok((id_bytes, body))
            },
        )?;

        let mut handles = Vec::new();
        for row in rows {
            let (id_bytes, body) = row?;
            let id = RecordId::from_bytes(to_array::<16>(id_bytes, "record_id")?);
            handles.push(RecordHandle::loaded(&self.qualified, id, decode_body(&body)?));
        }
        Ok(handles)
    }
}

impl Backend for DocumentStore {
    fn name(&self) -> &str {
        &self.qualified
    }

    fn get_collection(&self, query: &MatchQuery) -> Result<Collection, StorageError> {
        Ok(Collection::select(self.load_all()?, query))
    }

    fn persist(&mut self, handle: &mut RecordHandle, data: &Record) -> Result<(), StorageError> {
        let body = storable(data);
        let bytes = encode_body(&body)?;
        let hash = blake3::hash(&bytes);

        if handle.is_new() {
            self.conn.execute(
                "INSERT INTO documents (namespace, collection, record_id, body, content_hash) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    self.namespace,
                    self.collection,
                    handle.id().as_bytes().as_slice(),
                    bytes,
                    hash.as_bytes().as_slice(),
                ],
            )?;
        } else {
            let stored: Option<Vec<u8>> = self
                .conn
                .query_row(
                    "SELECT content_hash FROM documents WHERE record_id = ?1",
                    rusqlite::params![handle.id().as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            match stored {
                None => return Err(StorageError::NotFound(handle.to_string())),
                Some(stored) if stored.as_slice() == hash.as_bytes().as_slice() => {
                    debug!(record = %handle, "content unchanged, skipping write");
                }
                Some(_) => {
                    self.conn.execute(
                        "UPDATE documents SET body = ?1, content_hash = ?2, updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER) WHERE record_id = ?3",
                        rusqlite::params![
                            bytes,
                            hash.as_bytes().as_slice(),
                            handle.id().as_bytes().as_slice(),
                        ],
                    )?;
                }
            }
        }

        handle.mark_persisted(body);
        Ok(())
    }

    fn delete(&mut self, handle: &RecordHandle) -> Result<(), StorageError> {
        let removed = self.conn.execute(
            "DELETE FROM documents WHERE record_id = ?1",
            rusqlite::params![handle.id().as_bytes().as_slice()],
        )?;
        if removed == 0 {
            return Err(StorageError::NotFound(handle.to_string()));
        }
        Ok(())
    }

    fn drop_collection(&mut self) -> Result<(), StorageError> {
        let removed = self.conn.execute(
            "DELETE FROM documents WHERE namespace = ?1 AND collection = ?2",
            rusqlite::params![self.namespace, self.collection],
        )?;
        debug!(collection = %self.qualified, removed, "dropped collection");
        Ok(())
    }

    fn unregister(&mut self) -> Result<(), StorageError> {
        debug!(collection = %self.qualified, "unregistered");
        Ok(())
    }
}
