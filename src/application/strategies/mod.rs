mod breakout;
mod composite;
mod ema_cross;
mod mean_reversion;
mod momentum_divergence;
mod rsi_extreme;
mod traits;

pub use breakout::BreakoutDetector;
pub use composite::{CompositeEngine, CompositeScore};
pub use ema_cross::EmaCrossDetector;
pub use mean_reversion::MeanReversionDetector;
pub use momentum_divergence::MomentumDivergenceDetector;
pub use rsi_extreme::RsiExtremeDetector;
pub use traits::{DetectionContext, PatternDetector, PatternSignal};

use crate::config::UniverseConfig;

/// The detector family in its fixed trial order. The pipeline takes the
/// first hit, or the best-scored one when the universe config asks for it.
pub fn standard_detectors() -> Vec<Box<dyn PatternDetector>> {
    vec![
        Box::new(EmaCrossDetector::default()),
        Box::new(MomentumDivergenceDetector::default()),
        Box::new(RsiExtremeDetector::default()),
        Box::new(BreakoutDetector::default()),
        Box::new(MeanReversionDetector::default()),
    ]
}

/// Runs the detectors over one context and picks the candidate.
pub fn select_candidate(
    detectors: &[Box<dyn PatternDetector>],
    ctx: &DetectionContext<'_>,
    universe: &UniverseConfig,
) -> Option<PatternSignal> {
    if universe.prefer_highest_score {
        detectors
            .iter()
            .filter_map(|d| d.detect(ctx))
            .max_by(|a, b| {
                a.raw_score
                    .partial_cmp(&b.raw_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    } else {
        detectors.iter().find_map(|d| d.detect(ctx))
    }
}
