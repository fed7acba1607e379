pub mod diagnostics;
pub mod error;
pub mod extra;
pub mod merge;
pub mod params;
pub mod processor;
pub mod provenance;
pub mod query;
pub mod save;
pub mod transform;

pub use error::EngineError;
pub use merge::{update_with, MergeOptions};
pub use params::{Operation, OperationConfig};
pub use processor::{Collaborators, MergeMeta, Outcome, Processor, RunSummary};
pub use provenance::{ConsolidationMode, SourceConsolidator, StrategyTable};
pub use transform::{Normalizer, TextNormalizer, Transformer};

use reconcile_storage::{open_backend, Backend, Registry, StoreSettings};

/// The registered backend for the configured collection, opening and
/// registering it on first use.
pub fn resolve_backend<'r>(
    registry: &'r mut Registry,
    config: &OperationConfig,
    settings: &StoreSettings,
) -> Result<&'r mut (dyn Backend + 'static), EngineError> {
    let (namespace, name) = config.collection();
    let kind = config.backend;
    let backend = registry.get_or_define(&namespace, &name, |ns, name| open_backend(kind, ns, name, settings))?;
    Ok(backend)
}
