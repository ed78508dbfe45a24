//! Mean reversion: fade sharp moves on quiet-session crosses.

use super::{bracket_signal, Strategy, StrategyKind};
use crate::storage::runtime_config::RiskParams;
use crate::types::{MarketSnapshot, Side, Signal};

pub const REVERSION_INSTRUMENTS: &[&str] = &["EUR_USD", "AUD_USD", "EUR_GBP"];

#[derive(Debug, Clone)]
pub struct MeanReversion {
    pub min_move_bps: f64,
}

impl Default for MeanReversion {
    fn default() -> Self {
        Self { min_move_bps: 10.0 }
    }
}

impl Strategy for MeanReversion {
    fn generate_signals(&self, market: &MarketSnapshot, risk: &RiskParams) -> Vec<Signal> {
        let mut signals = Vec::new();
        for instrument in REVERSION_INSTRUMENTS {
            let Some(quote) = market.current.get(*instrument) else {
                continue;
            };
            if quote.spread_pips() > risk.max_spread_pips {
                continue;
            }
            let Some(moved) = market.move_bps(instrument) else {
                continue;
            };
            if moved.abs() < self.min_move_bps {
                continue;
            }
            // Opposite of the move.
            let (side, price) = if moved > 0.0 {
                (Side::Sell, quote.bid)
            } else {
                (Side::Buy, quote.ask)
            };
            signals.push(bracket_signal(
                StrategyKind::MeanReversion,
                instrument,
                side,
                price,
                risk,
            ));
        }
        signals
    }
}
