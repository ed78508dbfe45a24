//! Strategy registry — the catalogue of valid strategy keys.
//!
//! This is the only place a strategy key is checked. The config store and
//! the activate endpoint both call [`StrategyRegistry::validate`], so a key
//! accepted by one path is accepted by the other.

use serde::Serialize;

use super::reversion::REVERSION_INSTRUMENTS;
use super::trend::{GOLD_INSTRUMENTS, MOMENTUM_INSTRUMENTS};
use super::{RiskLevel, Session, StrategyKind};

/// Static description of one strategy. Defined in code; changes need a
/// restart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyDescriptor {
    pub key: &'static str,
    pub name: &'static str,
    pub instruments: Vec<&'static str>,
    pub risk_level: RiskLevel,
    pub session_preference: Session,
    #[serde(skip)]
    pub kind: StrategyKind,
}

#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    descriptors: Vec<StrategyDescriptor>,
}

impl StrategyRegistry {
    /// The registry of every strategy compiled into this binary.
    pub fn builtin() -> Self {
        let descriptors = StrategyKind::ALL.iter().map(|k| describe(*k)).collect();
        Self { descriptors }
    }

    pub fn list(&self) -> &[StrategyDescriptor] {
        &self.descriptors
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.iter().map(|d| d.key)
    }

    pub fn validate(&self, key: &str) -> bool {
        self.descriptors.iter().any(|d| d.key == key)
    }

    /// Fallback key used for fresh configs.
    pub fn default_key(&self) -> &'static str {
        StrategyKind::Momentum.key()
    }

    pub fn get(&self, key: &str) -> Option<&StrategyDescriptor> {
        self.descriptors.iter().find(|d| d.key == key)
    }
}

fn describe(kind: StrategyKind) -> StrategyDescriptor {
    let (name, instruments, risk_level, session_preference) = match kind {
        StrategyKind::Momentum => (
            "FX Momentum",
            MOMENTUM_INSTRUMENTS,
            RiskLevel::Medium,
            Session::LondonNewYorkOverlap,
        ),
        StrategyKind::Gold => ("Gold Trend", GOLD_INSTRUMENTS, RiskLevel::High, Session::NewYork),
        StrategyKind::MeanReversion => (
            "Asian Range Mean Reversion",
            REVERSION_INSTRUMENTS,
            RiskLevel::Low,
            Session::Asia,
        ),
    };
    StrategyDescriptor {
        key: kind.key(),
        name,
        instruments: instruments.to_vec(),
        risk_level,
        session_preference,
        kind,
    }
}
