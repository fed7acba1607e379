pub mod cast;
pub mod dotted;
pub mod error;
pub mod ids;
pub mod query;
pub mod record;

pub use cast::Scalar;
pub use error::CoreError;
pub use ids::*;
pub use query::MatchQuery;
pub use record::Record;
