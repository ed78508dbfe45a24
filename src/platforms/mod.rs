//! Broker integrations.
//!
//! Defines the `BrokerClient` trait and provides implementations for:
//! - OANDA v3 REST (practice host in paper mode, live host in live mode)
//! - A synthetic paper broker for placeholder or credential-less accounts

pub mod oanda;
pub mod paper;

use async_trait::async_trait;

use crate::types::{AccountInfo, BrokerError, MarketOrder, OrderReceipt, Quote};

/// Abstraction over broker connections, one instance per account.
///
/// Every method fails with a distinguishable [`BrokerError`] kind so the
/// capability resolver and executor can branch on auth vs network vs
/// account problems.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Lightweight handshake: fetch the account summary.
    async fn get_account_info(&self) -> Result<AccountInfo, BrokerError>;

    /// Current quotes for the given instruments.
    async fn get_current_prices(&self, instruments: &[String]) -> Result<Vec<Quote>, BrokerError>;

    /// Place a market order with attached stop-loss and take-profit.
    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderReceipt, BrokerError>;

    /// Broker name for logging and the status snapshot.
    fn name(&self) -> &'static str;

    /// True for brokers that fabricate quotes and never touch the network.
    fn is_synthetic(&self) -> bool {
        false
    }
}
