//! Trend-following strategies (momentum on FX majors, gold).
//!
//! Trades in the direction of a move since the previous scan once it
//! exceeds a per-strategy threshold in basis points.

use super::{bracket_signal, Strategy, StrategyKind};
use crate::storage::runtime_config::RiskParams;
use crate::types::{MarketSnapshot, Side, Signal};

pub const MOMENTUM_INSTRUMENTS: &[&str] = &["EUR_USD", "GBP_USD", "USD_JPY"];
pub const GOLD_INSTRUMENTS: &[&str] = &["XAU_USD"];

/// Moves smaller than this are noise for FX majors.
const MOMENTUM_MIN_MOVE_BPS: f64 = 5.0;
/// Gold is noisier; require a larger move.
const GOLD_MIN_MOVE_BPS: f64 = 8.0;

#[derive(Debug, Clone)]
pub struct TrendFollower {
    kind: StrategyKind,
    instruments: &'static [&'static str],
    min_move_bps: f64,
}

impl TrendFollower {
    pub fn momentum() -> Self {
        Self {
            kind: StrategyKind::Momentum,
            instruments: MOMENTUM_INSTRUMENTS,
            min_move_bps: MOMENTUM_MIN_MOVE_BPS,
        }
    }

    pub fn gold() -> Self {
        Self {
            kind: StrategyKind::Gold,
            instruments: GOLD_INSTRUMENTS,
            min_move_bps: GOLD_MIN_MOVE_BPS,
        }
    }
}

impl Strategy for TrendFollower {
    fn generate_signals(&self, market: &MarketSnapshot, risk: &RiskParams) -> Vec<Signal> {
        self.instruments
            .iter()
            .filter_map(|instrument| {
                let quote = market.current.get(*instrument)?;
                if quote.spread_pips() > risk.max_spread_pips {
                    return None;
                }
                let moved = market.move_bps(instrument)?;
                if moved.abs() < self.min_move_bps {
                    return None;
                }
                let (side, price) = if moved > 0.0 {
                    (Side::Buy, quote.ask)
                } else {
                    (Side::Sell, quote.bid)
                };
                Some(bracket_signal(self.kind, instrument, side, price, risk))
            })
            .collect()
    }
}
