//! Strategy engine — a closed set of signal generators behind one trait.
//!
//! Strategies are selected by key through the [`registry::StrategyRegistry`];
//! nothing else in the crate resolves a key to behaviour. Signal math is
//! intentionally small: the runner cares that a strategy turns a
//! [`MarketSnapshot`] into [`Signal`]s, not how clever it is about it.

pub mod registry;
pub mod reversion;
pub mod trend;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::runtime_config::RiskParams;
use crate::types::{pip_size, MarketSnapshot, Side, Signal};

/// Anything that turns market data into trade signals.
pub trait Strategy {
    fn generate_signals(&self, market: &MarketSnapshot, risk: &RiskParams) -> Vec<Signal>;
}

/// Every strategy the process knows about. Adding one means adding a
/// variant here and a descriptor in the registry; there is no other
/// lookup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Momentum,
    Gold,
    MeanReversion,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Momentum,
        StrategyKind::Gold,
        StrategyKind::MeanReversion,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            StrategyKind::Momentum => "momentum",
            StrategyKind::Gold => "gold",
            StrategyKind::MeanReversion => "mean_reversion",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Strategy for StrategyKind {
    fn generate_signals(&self, market: &MarketSnapshot, risk: &RiskParams) -> Vec<Signal> {
        match self {
            StrategyKind::Momentum => trend::TrendFollower::momentum().generate_signals(market, risk),
            StrategyKind::Gold => trend::TrendFollower::gold().generate_signals(market, risk),
            StrategyKind::MeanReversion => {
                reversion::MeanReversion::default().generate_signals(market, risk)
            }
        }
    }
}

/// Coarse risk classification shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Trading session a strategy is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Asia,
    London,
    NewYork,
    LondonNewYorkOverlap,
}

/// Build a signal with stop-loss and take-profit placed `risk` pips away
/// from the entry price on the correct side.
pub(crate) fn bracket_signal(
    strategy: StrategyKind,
    instrument: &str,
    side: Side,
    price: f64,
    risk: &RiskParams,
) -> Signal {
    let pip = pip_size(instrument);
    let sl_dist = risk.stop_loss_pips * pip;
    let tp_dist = risk.take_profit_pips * pip;
    let (stop_loss, take_profit) = match side {
        Side::Buy => (price - sl_dist, price + tp_dist),
        Side::Sell => (price + sl_dist, price - tp_dist),
    };
    Signal {
        strategy: strategy.key().to_string(),
        instrument: instrument.to_string(),
        side,
        price,
        stop_loss,
        take_profit,
    }
}
