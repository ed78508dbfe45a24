//! Order executor.
//!
//! Turns one account's signals into orders, asking the execution gate
//! about every signal first. A denied signal is a logged business
//! decision, not an error. Broker failures are recorded per order and
//! never abort the batch.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::accounts::Account;
use super::gate::{ExecutionDecision, ExecutionGate};
use crate::storage::runtime_config::RiskParams;
use crate::types::{MarketOrder, OrderReceipt, Signal};

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

/// Result of executing one account's signals.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub executed: Vec<ExecutedOrder>,
    pub failed: Vec<FailedOrder>,
    /// Signals the gate refused.
    pub denied: usize,
    /// Signals the gate allowed but the per-cycle order cap dropped.
    pub capped: usize,
}

impl ExecutionReport {
    pub fn merge(&mut self, other: ExecutionReport) {
        self.executed.extend(other.executed);
        self.failed.extend(other.failed);
        self.denied += other.denied;
        self.capped += other.capped;
    }
}

#[derive(Debug, Clone)]
pub struct ExecutedOrder {
    pub account: String,
    pub signal: Signal,
    pub decision: ExecutionDecision,
    pub receipt: OrderReceipt,
}

#[derive(Debug, Clone)]
pub struct FailedOrder {
    pub account: String,
    pub signal: Signal,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor<'a> {
    gate: &'a ExecutionGate,
}

impl<'a> Executor<'a> {
    pub fn new(gate: &'a ExecutionGate) -> Self {
        Self { gate }
    }

    /// Gate and place each signal for `account`.
    ///
    /// `remaining_orders` is the cycle-wide cap from the execution policy;
    /// it is decremented for every order attempted.
    pub async fn execute(
        &self,
        account: &Account,
        signals: &[Signal],
        risk: &RiskParams,
        remaining_orders: &mut u32,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for signal in signals {
            let decision = self
                .gate
                .evaluate(&account.id, &signal.instrument, account.execution_capable);

            if !decision.allow {
                debug!(account = %account.id, %signal, reason = %decision.reason, "Signal not executed");
                report.denied += 1;
                continue;
            }

            if *remaining_orders == 0 {
                info!(account = %account.id, %signal, "Order cap for this cycle reached, skipping");
                report.capped += 1;
                continue;
            }
            *remaining_orders -= 1;

            let order = MarketOrder {
                instrument: signal.instrument.clone(),
                units: risk.order_units as i64 * signal.side.sign(),
                stop_loss: signal.stop_loss,
                take_profit: signal.take_profit,
            };

            match account.broker.place_market_order(&order).await {
                Ok(receipt) => {
                    info!(
                        account = %account.id,
                        broker = account.broker.name(),
                        order_id = %receipt.order_id,
                        instrument = %order.instrument,
                        units = order.units,
                        reason = %decision.reason,
                        "Order placed"
                    );
                    report.executed.push(ExecutedOrder {
                        account: account.id.clone(),
                        signal: signal.clone(),
                        decision,
                        receipt,
                    });
                }
                Err(e) => {
                    warn!(
                        account = %account.id,
                        instrument = %order.instrument,
                        error = %e,
                        "Order placement failed"
                    );
                    report.failed.push(FailedOrder {
                        account: account.id.clone(),
                        signal: signal.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !signals.is_empty() {
            info!(
                account = %account.id,
                signals = signals.len(),
                executed = report.executed.len(),
                failed = report.failed.len(),
                denied = report.denied,
                at = %Utc::now().to_rfc3339(),
                "Account execution complete"
            );
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
