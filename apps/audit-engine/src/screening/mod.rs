// Screening pipeline: resume text → features → classifier decision.
// Extraction and classification are both seams; the audit engine only ever
// sees the resulting (FeatureRecord, Decision) pairs.

pub mod extractor;
pub mod model;
pub mod pipeline;

pub use extractor::{FeatureExtractor, ResumeDocument, RuleBasedExtractor};
pub use model::{Classifier, FeatureSchema, TrainedModel};
pub use pipeline::{screen_batch, ScreenedResume};
