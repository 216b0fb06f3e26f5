use crate::domain::regime::MarketRegime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Direction of a futures signal or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// +1 for long, -1 for short. Used when mirroring level arithmetic.
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => -Decimal::ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LONG" => Ok(Side::Long),
            "SHORT" => Ok(Side::Short),
            _ => anyhow::bail!("Invalid side: {}. Must be 'LONG' or 'SHORT'", s),
        }
    }
}

/// Candle timeframe. Only the intervals the engine actually ticks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Interval {
    pub fn secs(&self) -> i64 {
        match self {
            Interval::M1 => 60,
            Interval::M5 => 300,
            Interval::M15 => 900,
            Interval::H1 => 3_600,
            Interval::H4 => 14_400,
            Interval::D1 => 86_400,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::M1 => write!(f, "1m"),
            Interval::M5 => write!(f, "5m"),
            Interval::M15 => write!(f, "15m"),
            Interval::H1 => write!(f, "1h"),
            Interval::H4 => write!(f, "4h"),
            Interval::D1 => write!(f, "1d"),
        }
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::M1),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "1h" => Ok(Interval::H1),
            "4h" => Ok(Interval::H4),
            "1d" => Ok(Interval::D1),
            _ => anyhow::bail!("Invalid interval: {}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: i64,
}

/// Tag identifying which detector produced a candidate.
/// Carried through emission into `TradeResult` for learning attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternType {
    EmaCross,
    MomentumDivergence,
    RsiExtreme,
    Breakout,
    MeanReversion,
}

impl PatternType {
    pub const ALL: [PatternType; 5] = [
        PatternType::EmaCross,
        PatternType::MomentumDivergence,
        PatternType::RsiExtreme,
        PatternType::Breakout,
        PatternType::MeanReversion,
    ];
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternType::EmaCross => write!(f, "ema_cross"),
            PatternType::MomentumDivergence => write!(f, "momentum_divergence"),
            PatternType::RsiExtreme => write!(f, "rsi_extreme"),
            PatternType::Breakout => write!(f, "breakout"),
            PatternType::MeanReversion => write!(f, "mean_reversion"),
        }
    }
}

impl FromStr for PatternType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ema_cross" => Ok(PatternType::EmaCross),
            "momentum_divergence" => Ok(PatternType::MomentumDivergence),
            "rsi_extreme" => Ok(PatternType::RsiExtreme),
            "breakout" => Ok(PatternType::Breakout),
            "mean_reversion" => Ok(PatternType::MeanReversion),
            _ => anyhow::bail!("Unknown pattern type: {}", s),
        }
    }
}

/// Coarse correlation group a symbol belongs to, used for group quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetGroup {
    BtcHigh,
    EthHigh,
    Layer1,
    DeFi,
    Other,
}

impl AssetGroup {
    /// Static classification by base asset. Good enough for quota purposes;
    /// the correlation check itself works on actual price history.
    pub fn classify(symbol: &str) -> AssetGroup {
        let base = symbol
            .strip_suffix("USDT")
            .or_else(|| symbol.strip_suffix("USDC"))
            .or_else(|| symbol.strip_suffix("USD"))
            .unwrap_or(symbol);
        match base {
            "BTC" => AssetGroup::BtcHigh,
            "ETH" => AssetGroup::EthHigh,
            "SOL" | "AVAX" | "ADA" | "DOT" | "NEAR" | "APT" | "SUI" => AssetGroup::Layer1,
            "UNI" | "AAVE" | "LINK" | "MKR" | "CRV" | "COMP" => AssetGroup::DeFi,
            _ => AssetGroup::Other,
        }
    }
}

impl fmt::Display for AssetGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetGroup::BtcHigh => write!(f, "BTC_HIGH"),
            AssetGroup::EthHigh => write!(f, "ETH_HIGH"),
            AssetGroup::Layer1 => write!(f, "LAYER1"),
            AssetGroup::DeFi => write!(f, "DEFI"),
            AssetGroup::Other => write!(f, "OTHER"),
        }
    }
}

impl FromStr for AssetGroup {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BTC_HIGH" => Ok(AssetGroup::BtcHigh),
            "ETH_HIGH" => Ok(AssetGroup::EthHigh),
            "LAYER1" => Ok(AssetGroup::Layer1),
            "DEFI" => Ok(AssetGroup::DeFi),
            "OTHER" => Ok(AssetGroup::Other),
            _ => anyhow::bail!("Unknown asset group: {}", s),
        }
    }
}

/// Transient per-tick candidate produced by the detector stage and scored
/// by the composite engine. Immutable once built; the pipeline only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalCandidate {
    pub symbol: String,
    pub side: Side,
    pub entry: Decimal,
    pub pattern: PatternType,
    pub raw_score: f64,
    pub regime_at_gen: MarketRegime,
    pub composite_score: f64,
    pub composite_confidence: f64,
    pub quality_score: f64,
    pub pattern_confidence: f64,
    pub atr: Decimal,
    pub volatility_pct: f64,
    /// Open time of the candle the candidate was generated on.
    pub candle_t: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    Pending,
    Accepted,
    Expired,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStatus::Pending => write!(f, "PENDING"),
            SignalStatus::Accepted => write!(f, "ACCEPTED"),
            SignalStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A candidate that survived every gate, sized and levelled, as persisted
/// and handed to the notification dispatcher.
///
/// Invariant: `sl < entry < tp1 <= tp2` for LONG, mirrored for SHORT.
/// Checked by [`EmittedSignal::validate_levels`] before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedSignal {
    pub id: Uuid,
    pub user_id: i64,
    pub candidate: SignalCandidate,
    pub sl: Decimal,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub size_usdt: Decimal,
    pub leverage: u32,
    pub status: SignalStatus,
    pub message_ref: Option<String>,
}

impl EmittedSignal {
    /// Enforces the level-ordering invariant for both sides.
    pub fn validate_levels(&self) -> Result<(), crate::domain::errors::CandidateError> {
        let entry = self.candidate.entry;
        let ok = match self.candidate.side {
            Side::Long => self.sl < entry && entry < self.tp1 && self.tp1 <= self.tp2,
            Side::Short => self.sl > entry && entry > self.tp1 && self.tp1 >= self.tp2,
        };
        if ok {
            Ok(())
        } else {
            Err(crate::domain::errors::CandidateError::InvalidLevels {
                symbol: self.candidate.symbol.clone(),
                side: self.candidate.side,
                entry,
                sl: self.sl,
                tp1: self.tp1,
                tp2: self.tp2,
            })
        }
    }

    /// Idempotence key for persistence: one signal per user, symbol, side
    /// and generation candle.
    pub fn dedup_key(&self) -> (i64, String, Side, i64) {
        (
            self.user_id,
            self.candidate.symbol.clone(),
            self.candidate.side,
            self.candidate.candle_t,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candidate(side: Side) -> SignalCandidate {
        SignalCandidate {
            symbol: "ETHUSDT".to_string(),
            side,
            entry: dec!(2500),
            pattern: PatternType::EmaCross,
            raw_score: 40.0,
            regime_at_gen: MarketRegime::BullTrend,
            composite_score: 0.8,
            composite_confidence: 0.85,
            quality_score: 0.75,
            pattern_confidence: 0.7,
            atr: dec!(12),
            volatility_pct: 2.0,
            candle_t: 1_700_000_000,
        }
    }

    fn signal(side: Side, sl: Decimal, tp1: Decimal, tp2: Decimal) -> EmittedSignal {
        EmittedSignal {
            id: Uuid::new_v4(),
            user_id: 7,
            candidate: candidate(side),
            sl,
            tp1,
            tp2,
            size_usdt: dec!(100),
            leverage: 10,
            status: SignalStatus::Pending,
            message_ref: None,
        }
    }

    #[test]
    fn test_long_levels_valid() {
        let s = signal(Side::Long, dec!(2485.6), dec!(2527), dec!(2554));
        assert!(s.validate_levels().is_ok());
    }

    #[test]
    fn test_long_levels_inverted_sl_rejected() {
        let s = signal(Side::Long, dec!(2510), dec!(2527), dec!(2554));
        assert!(s.validate_levels().is_err());
    }

    #[test]
    fn test_short_levels_mirrored() {
        let s = signal(Side::Short, dec!(2514.4), dec!(2473), dec!(2446));
        assert!(s.validate_levels().is_ok());

        let bad = signal(Side::Short, dec!(2490), dec!(2473), dec!(2446));
        assert!(bad.validate_levels().is_err());
    }

    #[test]
    fn test_tp1_equal_tp2_allowed() {
        let s = signal(Side::Long, dec!(2480), dec!(2550), dec!(2550));
        assert!(s.validate_levels().is_ok());
    }

    #[test]
    fn test_asset_group_classification() {
        assert_eq!(AssetGroup::classify("BTCUSDT"), AssetGroup::BtcHigh);
        assert_eq!(AssetGroup::classify("ETHUSDT"), AssetGroup::EthHigh);
        assert_eq!(AssetGroup::classify("SOLUSDT"), AssetGroup::Layer1);
        assert_eq!(AssetGroup::classify("LINKUSDT"), AssetGroup::DeFi);
        assert_eq!(AssetGroup::classify("DOGEUSDT"), AssetGroup::Other);
    }

    #[test]
    fn test_side_roundtrip() {
        assert_eq!(Side::from_str("LONG").unwrap(), Side::Long);
        assert_eq!(Side::from_str("short").unwrap(), Side::Short);
        assert_eq!(Side::Long.opposite(), Side::Short);
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!(Interval::from_str("1h").unwrap(), Interval::H1);
        assert_eq!(Interval::H1.secs(), 3600);
        assert!(Interval::from_str("2h").is_err());
    }
}
