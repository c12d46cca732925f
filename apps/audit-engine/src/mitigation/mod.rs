// Bias mitigation: reweighing, prejudice-remover in-processing and
// equalized-odds post-processing behind a single `Mitigator` capability.
// All fitting is CPU-bound; run it via tokio::task::spawn_blocking.

pub mod in_processing;
pub mod post_processing;
pub mod reweighing;
pub mod selector;
pub mod strategy;

pub use in_processing::{InProcessing, InProcessingOptions};
pub use post_processing::{GroupThresholds, OddsGaps, PostProcessing};
pub use reweighing::Reweighing;
pub use selector::MitigationSelector;
pub use strategy::{
    Membership, MitigatedData, MitigationContext, MitigationDataset, MitigationResult,
    MitigationStrategy, Mitigator,
};
