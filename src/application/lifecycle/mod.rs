pub mod manager;
pub mod outcome_recorder;

pub use manager::{LifecycleManager, evaluate_position};
pub use outcome_recorder::OutcomeRecorder;
