pub mod candle_store;
pub mod indicators;
pub mod regime_detector;

pub use candle_store::CandleStore;
pub use indicators::IndicatorSet;
pub use regime_detector::{RegimeDetector, RegimeThresholds};
