pub mod document;
pub mod error;
pub mod registry;
pub mod schema;
pub mod settings;
pub mod tabular;
pub mod traits;

pub use document::DocumentStore;
pub use error::StorageError;
pub use registry::Registry;
pub use settings::{open_backend, BackendKind, StoreSettings};
pub use tabular::CsvStore;
pub use traits::*;
