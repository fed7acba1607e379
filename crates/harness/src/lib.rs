mod faulty;
mod logs;
mod registry;
mod store;

pub use faulty::FaultyBackend;
pub use logs::LogCapture;
pub use registry::TestRegistry;
pub use store::{field_text, record, records, StoreKind, TestStore};
