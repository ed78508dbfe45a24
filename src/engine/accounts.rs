//! Account capability resolver.
//!
//! Decides, once at startup, which configured accounts may execute and
//! which are signals-only. Failures are isolated per account: a
//! placeholder id, a missing token, or a broker that rejects the
//! handshake demotes that one account and the rest carry on. An account
//! whose credentials or id the broker rejected moves to the synthetic
//! broker; one that only hit a network error keeps its client.

use secrecy::SecretString;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AccountConfig, AppConfig};
use crate::platforms::oanda::OandaClient;
use crate::platforms::paper::PaperBroker;
use crate::platforms::BrokerClient;
use crate::types::{BrokerError, TradingMode};

/// Ids that ship in sample configs and docs. Matched case-insensitively
/// after trimming.
const PLACEHOLDER_IDS: &[&str] = &[
    "",
    "placeholder",
    "changeme",
    "change_me",
    "change-me",
    "your-account-id",
    "your_account_id",
    "account-id",
    "test",
    "demo",
    "none",
    "xxx-xxx-xxxxxxx-xxx",
    "000-000-0000000-000",
];

/// True when `id` is a sentinel rather than a real brokerage account.
pub fn is_placeholder_account(id: &str) -> bool {
    let id = id.trim().to_lowercase();
    if PLACEHOLDER_IDS.contains(&id.as_str()) {
        return true;
    }
    if id.contains("your") || id.contains("placeholder") || id.contains("example") {
        return true;
    }
    // All zeros or all x's once separators are removed.
    let core: String = id.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    !core.is_empty() && (core.chars().all(|c| c == '0') || core.chars().all(|c| c == 'x'))
}

/// One configured account with its resolved credential.
pub struct AccountSpec {
    pub id: String,
    pub token: Option<SecretString>,
}

impl AccountSpec {
    /// Resolve credentials for every active account in the process config.
    /// Inactive accounts are dropped here.
    pub fn from_config(accounts: &[AccountConfig]) -> Vec<AccountSpec> {
        accounts
            .iter()
            .filter(|a| {
                if !a.active {
                    info!(account = %a.id, "Account inactive, not loaded");
                }
                a.active
            })
            .map(|a| AccountSpec {
                id: a.id.clone(),
                token: AppConfig::resolve_env(&a.token_env)
                    .ok()
                    .filter(|t| !t.trim().is_empty())
                    .map(SecretString::new),
            })
            .collect()
    }
}

/// Builds a real broker connection for an account that passed the
/// placeholder and credential checks.
pub trait BrokerFactory: Send + Sync {
    fn connect(&self, id: &str, token: SecretString) -> Result<Box<dyn BrokerClient>, BrokerError>;
}

impl<F> BrokerFactory for F
where
    F: Fn(&str, SecretString) -> Result<Box<dyn BrokerClient>, BrokerError> + Send + Sync,
{
    fn connect(&self, id: &str, token: SecretString) -> Result<Box<dyn BrokerClient>, BrokerError> {
        self(id, token)
    }
}

/// Connects accounts to OANDA using the host for the current mode.
pub struct OandaFactory {
    pub mode: TradingMode,
}

impl BrokerFactory for OandaFactory {
    fn connect(&self, id: &str, token: SecretString) -> Result<Box<dyn BrokerClient>, BrokerError> {
        Ok(Box::new(OandaClient::new(id, token, self.mode)?))
    }
}

/// A loaded account, ready to scan.
pub struct Account {
    pub id: String,
    pub execution_capable: bool,
    /// Why the account is not capable, if it isn't.
    pub demotion: Option<String>,
    pub broker: Box<dyn BrokerClient>,
}

impl Account {
    fn synthetic(id: &str, reason: &str) -> Self {
        Self {
            id: id.to_string(),
            execution_capable: false,
            demotion: Some(reason.to_string()),
            broker: Box::new(PaperBroker::new(id)),
        }
    }

    pub fn status(&self) -> AccountStatus {
        AccountStatus {
            id: self.id.clone(),
            broker: self.broker.name().to_string(),
            execution_capable: self.execution_capable,
            reason: self.demotion.clone(),
        }
    }
}

/// Per-account line in the status snapshot. Ids only, never credentials.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct AccountStatus {
    pub id: String,
    pub broker: String,
    pub execution_capable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct AccountCapabilityResolver<F> {
    factory: F,
}

impl<F: BrokerFactory> AccountCapabilityResolver<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Classify every account. Never fails as a whole.
    pub async fn resolve(&self, specs: Vec<AccountSpec>) -> Vec<Account> {
        let mut accounts = Vec::with_capacity(specs.len());
        for spec in specs {
            accounts.push(self.resolve_one(spec).await);
        }

        let capable = accounts.iter().filter(|a| a.execution_capable).count();
        info!(
            loaded = accounts.len(),
            execution_capable = capable,
            "Accounts resolved"
        );
        accounts
    }

    async fn resolve_one(&self, spec: AccountSpec) -> Account {
        if is_placeholder_account(&spec.id) {
            info!(account = %spec.id, "Placeholder account id, routing to synthetic broker");
            return Account::synthetic(&spec.id, "placeholder account id");
        }

        let Some(token) = spec.token else {
            warn!(account = %spec.id, "No broker credentials, routing to synthetic broker");
            return Account::synthetic(&spec.id, "missing credentials");
        };

        let broker = match self.factory.connect(&spec.id, token) {
            Ok(b) => b,
            Err(e) => {
                warn!(account = %spec.id, error = %e, "Broker client construction failed");
                return Account::synthetic(&spec.id, &e.to_string());
            }
        };

        match broker.get_account_info().await {
            Ok(info) => {
                info!(
                    account = %spec.id,
                    broker = broker.name(),
                    currency = %info.currency,
                    "Broker handshake ok"
                );
                Account {
                    id: spec.id,
                    execution_capable: true,
                    demotion: None,
                    broker,
                }
            }
            Err(e @ (BrokerError::Auth(_) | BrokerError::InvalidAccount(_))) => {
                warn!(
                    account = %spec.id,
                    broker = broker.name(),
                    error = %e,
                    "Broker rejected account, routing to synthetic broker"
                );
                Account::synthetic(&spec.id, &e.to_string())
            }
            Err(e) => {
                warn!(
                    account = %spec.id,
                    broker = broker.name(),
                    error = %e,
                    "Broker handshake failed, account is signals-only"
                );
                Account {
                    id: spec.id,
                    execution_capable: false,
                    demotion: Some(e.to_string()),
                    broker,
                }
            }
        }
    }
}

pub fn capable_count(accounts: &[Account]) -> usize {
    accounts.iter().filter(|a| a.execution_capable).count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
