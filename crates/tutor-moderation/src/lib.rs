pub mod cache;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod skip;
pub mod types;

pub use engine::{Classifier, ClassifierVerdict, GateConfig, ModerationGate};
pub use error::ModerationError;
pub use types::{ModerationDecision, ModerationResult, PronounStyle};
