//! Mock broker for integration testing.
//!
//! Provides a deterministic `BrokerClient` that counts every call, moves
//! prices by a scripted number of basis points per quote request, and
//! records orders in memory. Clones share state, so a test can keep one
//! handle while the scanner owns another.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fxgate::platforms::BrokerClient;
use fxgate::types::{pip_size, AccountInfo, BrokerError, MarketOrder, OrderReceipt, Quote};

#[derive(Default)]
struct Inner {
    handshakes: AtomicUsize,
    price_calls: AtomicUsize,
    orders: Mutex<Vec<MarketOrder>>,
    handshake_error: Mutex<Option<BrokerError>>,
    /// Basis-point moves applied on successive quote requests.
    moves_bps: Mutex<VecDeque<f64>>,
    level: Mutex<f64>,
}

#[derive(Clone, Default)]
pub struct MockBroker {
    inner: Arc<Inner>,
}

impl MockBroker {
    pub fn new() -> Self {
        let broker = Self::default();
        *broker.inner.level.lock().unwrap() = 1.0;
        broker
    }

    /// Make the handshake fail with `err`.
    pub fn failing_handshake(err: BrokerError) -> Self {
        let broker = Self::new();
        *broker.inner.handshake_error.lock().unwrap() = Some(err);
        broker
    }

    /// Queue price moves, one per quote request.
    pub fn with_moves(self, moves_bps: &[f64]) -> Self {
        self.inner.moves_bps.lock().unwrap().extend(moves_bps.iter().copied());
        self
    }

    pub fn handshakes(&self) -> usize {
        self.inner.handshakes.load(Ordering::SeqCst)
    }

    pub fn price_calls(&self) -> usize {
        self.inner.price_calls.load(Ordering::SeqCst)
    }

    pub fn orders(&self) -> Vec<MarketOrder> {
        self.inner.orders.lock().unwrap().clone()
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
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn get_account_info(&self) -> Result<AccountInfo, BrokerError> {
        self.inner.handshakes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.inner.handshake_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(AccountInfo {
            id: "mock".to_string(),
            currency: "USD".to_string(),
            balance: 10_000.0,
        })
    }

    async fn get_current_prices(&self, instruments: &[String]) -> Result<Vec<Quote>, BrokerError> {
        self.inner.price_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.inner.moves_bps.lock().unwrap().pop_front().unwrap_or(0.0);
        let level = {
            let mut level = self.inner.level.lock().unwrap();
            *level *= 1.0 + step / 10_000.0;
            *level
        };
        Ok(instruments
            .iter()
            .map(|i| {
                let mid = Self::base_price(i) * level;
                let half_spread = pip_size(i) * 0.5;
                Quote {
                    instrument: i.clone(),
                    bid: mid - half_spread,
                    ask: mid + half_spread,
                    time: Utc::now(),
                }
            })
            .collect())
    }

    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderReceipt, BrokerError> {
        let mut orders = self.inner.orders.lock().unwrap();
        orders.push(order.clone());
        Ok(OrderReceipt {
            order_id: format!("MOCK-{}", orders.len()),
            instrument: order.instrument.clone(),
            units: order.units,
            fill_price: None,
            timestamp: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
