//! Runtime configuration — the one document the API may change while the
//! scanner runs.
//!
//! Nothing here can unlock execution. Risk parameters shape signals and
//! order size; the execution policy can only reduce activity. The gate
//! flags live in the process environment (see `config::ExecutionEnv`).

use serde::{Deserialize, Serialize};

use crate::strategy::registry::StrategyRegistry;
use crate::types::{ConfigError, FieldError};

pub const MIN_SCAN_INTERVAL_SECS: u64 = 1;
pub const MAX_SCAN_INTERVAL_SECS: u64 = 86_400;
const MAX_NOTES_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    pub active_strategy_key: String,
    pub scan_interval_seconds: u64,
    #[serde(default)]
    pub risk: RiskParams,
    #[serde(default)]
    pub execution_policy: ExecutionPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskParams {
    pub stop_loss_pips: f64,
    pub take_profit_pips: f64,
    /// Quotes wider than this are skipped by every strategy.
    pub max_spread_pips: f64,
    pub order_units: u64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            stop_loss_pips: 20.0,
            take_profit_pips: 40.0,
            max_spread_pips: 3.0,
            order_units: 1_000,
        }
    }
}

/// Advisory flags. They may throttle the runner but never feed the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionPolicy {
    pub skip_weekends: bool,
    pub max_orders_per_cycle: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            skip_weekends: true,
            max_orders_per_cycle: 5,
            notes: None,
        }
    }
}

impl RuntimeConfig {
    /// The config written on first run.
    pub fn template(registry: &StrategyRegistry) -> Self {
        Self {
            active_strategy_key: registry.default_key().to_string(),
            scan_interval_seconds: 60,
            risk: RiskParams::default(),
            execution_policy: ExecutionPolicy::default(),
        }
    }

    /// Check every field, collecting all problems rather than stopping at
    /// the first.
    pub fn validate(&self, registry: &StrategyRegistry) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if !registry.validate(&self.active_strategy_key) {
            let known: Vec<_> = registry.keys().collect();
            errors.push(FieldError::new(
                "active_strategy_key",
                format!(
                    "unknown strategy '{}' (expected one of: {})",
                    self.active_strategy_key,
                    known.join(", ")
                ),
            ));
        }

        if !(MIN_SCAN_INTERVAL_SECS..=MAX_SCAN_INTERVAL_SECS).contains(&self.scan_interval_seconds) {
            errors.push(FieldError::new(
                "scan_interval_seconds",
                format!("must be between {MIN_SCAN_INTERVAL_SECS} and {MAX_SCAN_INTERVAL_SECS}"),
            ));
        }

        let r = &self.risk;
        check_range(&mut errors, "risk.stop_loss_pips", r.stop_loss_pips, 1000.0);
        check_range(&mut errors, "risk.take_profit_pips", r.take_profit_pips, 2000.0);
        check_range(&mut errors, "risk.max_spread_pips", r.max_spread_pips, 50.0);
        if !(1..=1_000_000).contains(&r.order_units) {
            errors.push(FieldError::new(
                "risk.order_units",
                "must be between 1 and 1000000",
            ));
        }

        let p = &self.execution_policy;
        if !(1..=100).contains(&p.max_orders_per_cycle) {
            errors.push(FieldError::new(
                "execution_policy.max_orders_per_cycle",
                "must be between 1 and 100",
            ));
        }
        if let Some(notes) = &p.notes {
            if notes.chars().count() > MAX_NOTES_LEN {
                errors.push(FieldError::new(
                    "execution_policy.notes",
                    format!("must be at most {MAX_NOTES_LEN} characters"),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Merge a partial update onto this config and validate the result as
    /// a whole. Either the full merged config is returned or nothing is.
    pub fn apply(
        &self,
        patch: &RuntimeConfigPatch,
        registry: &StrategyRegistry,
    ) -> Result<RuntimeConfig, ConfigError> {
        let mut next = self.clone();
        let mut errors = Vec::new();

        if let Some(key) = &patch.active_strategy_key {
            next.active_strategy_key = key.trim().to_string();
        }
        if let Some(secs) = patch.scan_interval_seconds {
            match u64::try_from(secs) {
                Ok(v) => next.scan_interval_seconds = v,
                Err(_) => errors.push(FieldError::new("scan_interval_seconds", "must not be negative")),
            }
        }

        if let Some(risk) = &patch.risk {
            let r = &mut next.risk;
            if let Some(v) = risk.stop_loss_pips {
                r.stop_loss_pips = v;
            }
            if let Some(v) = risk.take_profit_pips {
                r.take_profit_pips = v;
            }
            if let Some(v) = risk.max_spread_pips {
                r.max_spread_pips = v;
            }
            if let Some(v) = risk.order_units {
                match u64::try_from(v) {
                    Ok(units) => r.order_units = units,
                    Err(_) => errors.push(FieldError::new("risk.order_units", "must not be negative")),
                }
            }
        }

        if let Some(policy) = &patch.execution_policy {
            let p = &mut next.execution_policy;
            if let Some(v) = policy.skip_weekends {
                p.skip_weekends = v;
            }
            if let Some(v) = policy.max_orders_per_cycle {
                match u32::try_from(v) {
                    Ok(n) => p.max_orders_per_cycle = n,
                    Err(_) => errors.push(FieldError::new(
                        "execution_policy.max_orders_per_cycle",
                        "must be between 1 and 100",
                    )),
                }
            }
            if let Some(notes) = &policy.notes {
                p.notes = if notes.trim().is_empty() {
                    None
                } else {
                    Some(notes.clone())
                };
            }
        }

        // Report conversion problems together with range problems.
        if let Err(ConfigError::Validation(mut more)) = next.validate(registry) {
            errors.append(&mut more);
        }
        if errors.is_empty() {
            Ok(next)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

fn check_range(errors: &mut Vec<FieldError>, field: &str, value: f64, max: f64) {
    if !value.is_finite() || value <= 0.0 || value > max {
        errors.push(FieldError::new(field, format!("must be > 0 and <= {max}")));
    }
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

/// Body of `POST /api/config`. Absent fields keep their current value.
/// Integers are signed so out-of-range input reaches validation and gets
/// a field-level message instead of a generic parse error.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfigPatch {
    pub active_strategy_key: Option<String>,
    pub scan_interval_seconds: Option<i64>,
    pub risk: Option<RiskPatch>,
    pub execution_policy: Option<ExecutionPolicyPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskPatch {
    pub stop_loss_pips: Option<f64>,
    pub take_profit_pips: Option<f64>,
    pub max_spread_pips: Option<f64>,
    pub order_units: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionPolicyPatch {
    pub skip_weekends: Option<bool>,
    pub max_orders_per_cycle: Option<i64>,
    /// Empty string clears the notes.
    pub notes: Option<String>,
}

impl RuntimeConfigPatch {
    pub fn strategy(key: &str) -> Self {
        Self {
            active_strategy_key: Some(key.to_string()),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
