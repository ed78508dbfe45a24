//! Execution gate — decides whether a signal may become an order.
//!
//! [`decide`] is a pure function of its inputs: no clock, no state, no
//! I/O. [`ExecutionGate`] wraps it with the process's environment flags
//! and a run id so every evaluation is logged as a replayable event.
//! Because nothing is cached, a flag change is seen on the very next
//! evaluation and never earlier.
//!
//! Decision order, first match wins:
//! 1. kill switch on → deny (`KILL_SWITCH`)
//! 2. paper mode, paper execution on, broker capable → allow (`PAPER_EXECUTING`)
//! 3. paper mode otherwise → deny (`SIGNALS_ONLY_MODE`)
//! 4. live mode, both live flags on, broker capable → allow (`LIVE_EXECUTING`)
//! 5. live mode otherwise → deny (`LIVE_NOT_DUAL_CONFIRMED`)

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;
use uuid::Uuid;

use crate::config::ExecutionEnv;
use crate::types::TradingMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateReason {
    KillSwitch,
    PaperExecuting,
    SignalsOnlyMode,
    LiveExecuting,
    LiveNotDualConfirmed,
}

impl GateReason {
    pub fn code(&self) -> &'static str {
        match self {
            GateReason::KillSwitch => "KILL_SWITCH",
            GateReason::PaperExecuting => "PAPER_EXECUTING",
            GateReason::SignalsOnlyMode => "SIGNALS_ONLY_MODE",
            GateReason::LiveExecuting => "LIVE_EXECUTING",
            GateReason::LiveNotDualConfirmed => "LIVE_NOT_DUAL_CONFIRMED",
        }
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Everything the gate looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateInputs {
    pub trading_mode: TradingMode,
    pub live_trading: bool,
    pub live_trading_confirm: bool,
    pub kill_switch: bool,
    pub paper_execution: bool,
    pub broker_capable: bool,
}

impl GateInputs {
    pub fn new(env: &ExecutionEnv, broker_capable: bool) -> Self {
        Self {
            trading_mode: env.trading_mode,
            live_trading: env.live_trading,
            live_trading_confirm: env.live_trading_confirm,
            kill_switch: env.kill_switch,
            paper_execution: env.paper_execution,
            broker_capable,
        }
    }
}

/// Result of one gate evaluation. Never stored beyond the cycle that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutionDecision {
    pub allow: bool,
    pub reason: GateReason,
}

impl ExecutionDecision {
    /// Operator-facing label, e.g. `signals-only: LIVE_NOT_DUAL_CONFIRMED`.
    pub fn label(&self) -> String {
        if self.allow {
            format!("executing: {}", self.reason)
        } else {
            format!("signals-only: {}", self.reason)
        }
    }
}

pub fn decide(inputs: &GateInputs) -> ExecutionDecision {
    let (allow, reason) = if inputs.kill_switch {
        (false, GateReason::KillSwitch)
    } else {
        match inputs.trading_mode {
            TradingMode::Paper if inputs.paper_execution && inputs.broker_capable => {
                (true, GateReason::PaperExecuting)
            }
            TradingMode::Paper => (false, GateReason::SignalsOnlyMode),
            TradingMode::Live
                if inputs.live_trading && inputs.live_trading_confirm && inputs.broker_capable =>
            {
                (true, GateReason::LiveExecuting)
            }
            TradingMode::Live => (false, GateReason::LiveNotDualConfirmed),
        }
    };
    ExecutionDecision { allow, reason }
}

/// The gate as the runner uses it: environment flags fixed at startup,
/// capability supplied per evaluation.
#[derive(Debug, Clone)]
pub struct ExecutionGate {
    env: ExecutionEnv,
    run_id: Uuid,
}

impl ExecutionGate {
    pub fn new(env: ExecutionEnv, run_id: Uuid) -> Self {
        Self { env, run_id }
    }

    pub fn env(&self) -> &ExecutionEnv {
        &self.env
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Evaluate and log a decision for one signal on one account.
    pub fn evaluate(&self, account: &str, instrument: &str, broker_capable: bool) -> ExecutionDecision {
        let inputs = GateInputs::new(&self.env, broker_capable);
        let decision = decide(&inputs);
        info!(
            target: "fxgate::gate",
            run_id = %self.run_id,
            account,
            instrument,
            mode = %inputs.trading_mode,
            broker_capable,
            allow = decision.allow,
            reason = %decision.reason,
            "Execution decision"
        );
        decision
    }

    /// Cycle-level decision reported in the snapshot: would an order be
    /// allowed on at least one capable account right now.
    pub fn cycle_decision(&self, any_capable: bool) -> ExecutionDecision {
        decide(&GateInputs::new(&self.env, any_capable))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
