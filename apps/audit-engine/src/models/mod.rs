// Plain in-memory records exchanged with the engine.
// Everything here serializes to a nested JSON mapping for the surrounding service layer.

pub mod decision;
pub mod record;

pub use decision::{Decision, Outcome};
pub use record::{AttributeValue, FeatureRecord, FeatureValue};
