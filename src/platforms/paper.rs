//! Synthetic paper broker.
//!
//! Stands in for accounts that cannot reach a real broker (placeholder
//! ids, missing credentials). Quotes are generated deterministically from
//! a per-instrument base price and a call counter, so strategies still
//! have something to chew on in signals-only mode. It never touches the
//! network and refuses every order.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::BrokerClient;
use crate::types::{AccountInfo, BrokerError, MarketOrder, OrderReceipt, Quote};

const PLATFORM_NAME: &str = "paper";

pub struct PaperBroker {
    account_id: String,
    price_calls: AtomicU64,
}

impl PaperBroker {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            price_calls: AtomicU64::new(0),
        }
    }

    /// Number of quote requests served so far.
    pub fn price_calls(&self) -> u64 {
        self.price_calls.load(Ordering::Relaxed)
    }

    fn base_price(instrument: &str) -> f64 {
        match instrument {
            "EUR_USD" => 1.0850,
            "GBP_USD" => 1.2700,
            "USD_JPY" => 150.00,
            "AUD_USD" => 0.6600,
            "EUR_GBP" => 0.8550,
            "XAU_USD" => 2400.0,
            _ => 1.0,
        }
    }

    fn synthetic_quote(instrument: &str, tick: u64) -> Quote {
        let base = Self::base_price(instrument);
        // Slow oscillation of roughly +/- 12 bps.
        let drift = (tick as f64 * 0.7).sin() * 0.0012;
        let mid = base * (1.0 + drift);
        let half_spread = crate::types::pip_size(instrument) * 0.5;
        Quote {
            instrument: instrument.to_string(),
            bid: mid - half_spread,
            ask: mid + half_spread,
            time: Utc::now(),
        }
    }
}

#[async_trait]
impl BrokerClient for PaperBroker {
    async fn get_account_info(&self) -> Result<AccountInfo, BrokerError> {
        Ok(AccountInfo {
            id: self.account_id.clone(),
            currency: "USD".to_string(),
            balance: 0.0,
        })
    }

    async fn get_current_prices(&self, instruments: &[String]) -> Result<Vec<Quote>, BrokerError> {
        let tick = self.price_calls.fetch_add(1, Ordering::Relaxed);
        Ok(instruments
            .iter()
            .map(|i| Self::synthetic_quote(i, tick))
            .collect())
    }

    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderReceipt, BrokerError> {
        Err(BrokerError::Rejected(format!(
            "synthetic broker for {} does not place orders ({})",
            self.account_id, order.instrument
        )))
    }

    fn name(&self) -> &'static str {
        PLATFORM_NAME
    }

    fn is_synthetic(&self) -> bool {
        true
    }
}
