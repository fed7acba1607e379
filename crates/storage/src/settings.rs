use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::document::DocumentStore;
use crate::error::StorageError;
use crate::tabular::CsvStore;
use crate::traits::Backend;

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Documents,
    Csv,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Documents => "docs",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "docs" | "mongo" => Ok(Self::Documents),
            "csv" => Ok(Self::Csv),
            other => Err(StorageError::InvalidName(format!(
                "unknown backend `{other}`, expected one of: docs, csv"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the stores keep their data.
#[derive(Debug, Clone, Default)]
pub struct StoreSettings {
    /// Root directory for CSV collections (`<root>/<ns>/<name>`).
    pub csv_root: PathBuf,
    /// SQLite file for document collections; in-memory when unset.
    pub document_db: Option<PathBuf>,
}

/// Open (creating if needed) the collection `namespace.name` on the chosen
/// backend.
pub fn open_backend(
    kind: BackendKind,
    namespace: &str,
    name: &str,
    settings: &StoreSettings,
) -> Result<Box<dyn Backend>, StorageError> {
    Ok(match kind {
        BackendKind::Documents => match &settings.document_db {
            Some(path) => Box::new(DocumentStore::open(path, namespace, name)?),
            None => Box::new(DocumentStore::open_in_memory(namespace, name)?),
        },
        BackendKind::Csv => Box::new(CsvStore::open(&settings.csv_root, namespace, name, true)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() {
        assert_eq!("csv".parse::<BackendKind>().unwrap(), BackendKind::Csv);
        assert_eq!("mongo".parse::<BackendKind>().unwrap(), BackendKind::Documents);
        assert_eq!("".parse::<BackendKind>().unwrap(), BackendKind::Documents);
        assert!("es".parse::<BackendKind>().is_err());
    }

    #[test]
    fn opens_csv_under_root() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let settings = StoreSettings {
            csv_root: dir.path().to_path_buf(),
            document_db: None,
        };
        let backend = open_backend(BackendKind::Csv, "ns", "out.csv", &settings)?;
        assert_eq!(backend.name(), "ns.out.csv");
        assert!(dir.path().join("ns").join("out.csv").is_file());
        Ok(())
    }
}
