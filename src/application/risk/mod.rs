pub mod correlation_manager;
pub mod sizing;

pub use correlation_manager::{
    CorrelationManager, OpenPositionRef, RiskDecision, RiskStatus,
};
pub use sizing::PositionSizer;
