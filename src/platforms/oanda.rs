//! OANDA v3 REST integration.
//!
//! Thin client covering the three calls the scanner needs: account
//! summary (used as the capability handshake), pricing, and market
//! orders with attached stop-loss / take-profit.
//!
//! API docs: https://developer.oanda.com/rest-live-v20/introduction/
//! Practice host: https://api-fxpractice.oanda.com
//! Live host: https://api-fxtrade.oanda.com
//! Auth: `Authorization: Bearer {token}`
//!
//! HTTP failures are mapped onto [`BrokerError`] kinds: 401/403 → Auth,
//! 400/404 → InvalidAccount, transport errors and 5xx → Network.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use super::BrokerClient;
use crate::types::{AccountInfo, BrokerError, MarketOrder, OrderReceipt, Quote, TradingMode};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PRACTICE_URL: &str = "https://api-fxpractice.oanda.com";
const LIVE_URL: &str = "https://api-fxtrade.oanda.com";
const PLATFORM_NAME: &str = "oanda";

/// Per-request timeout. A slow broker only stretches the current cycle.
const REQUEST_TIMEOUT_SECS: u64 = 15;

pub fn base_url(mode: TradingMode) -> &'static str {
    match mode {
        TradingMode::Paper => PRACTICE_URL,
        TradingMode::Live => LIVE_URL,
    }
}

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    account: AccountSummary,
}

#[derive(Debug, Deserialize)]
struct AccountSummary {
    id: String,
    currency: String,
    balance: String,
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    #[serde(default)]
    prices: Vec<Price>,
}

#[derive(Debug, Deserialize)]
struct Price {
    instrument: String,
    time: DateTime<Utc>,
    #[serde(default)]
    bids: Vec<PriceBucket>,
    #[serde(default)]
    asks: Vec<PriceBucket>,
}

#[derive(Debug, Deserialize)]
struct PriceBucket {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(default)]
    order_fill_transaction: Option<FillTransaction>,
    #[serde(default)]
    order_cancel_transaction: Option<CancelTransaction>,
}

#[derive(Debug, Deserialize)]
struct FillTransaction {
    id: String,
    #[serde(default)]
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelTransaction {
    reason: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OandaClient {
    http: Client,
    base_url: String,
    account_id: String,
    token: SecretString,
}

impl OandaClient {
    pub fn new(account_id: &str, token: SecretString, mode: TradingMode) -> Result<Self, BrokerError> {
        Self::with_base_url(account_id, token, base_url(mode))
    }

    pub fn with_base_url(
        account_id: &str,
        token: SecretString,
        base_url: &str,
    ) -> Result<Self, BrokerError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("FXGATE/0.1.0")
            .build()
            .map_err(|e| BrokerError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_id: account_id.to_string(),
            token,
        })
    }

    fn account_url(&self, suffix: &str) -> String {
        format!(
            "{}/v3/accounts/{}{suffix}",
            self.base_url,
            urlencoding::encode(&self.account_id)
        )
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, BrokerError> {
        let resp = req
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(status, &self.account_id, &body))
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
        what: &str,
    ) -> Result<T, BrokerError> {
        resp.json()
            .await
            .map_err(|e| BrokerError::Network(format!("failed to parse {what} response: {e}")))
    }
}

/// Map a non-success HTTP status onto a broker error kind.
fn classify_status(status: StatusCode, account_id: &str, body: &str) -> BrokerError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BrokerError::Auth(format!("{status} for account {account_id}"))
        }
        StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
            BrokerError::InvalidAccount(format!("{status} for account {account_id}: {body}"))
        }
        s if s.is_server_error() => BrokerError::Network(format!("{status}: {body}")),
        _ => BrokerError::Rejected(format!("{status}: {body}")),
    }
}

fn parse_price(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|p| p.is_finite() && *p > 0.0)
}

/// Price strings sent to OANDA; metals and JPY pairs take fewer decimals.
fn format_price(instrument: &str, price: f64) -> String {
    if crate::types::pip_size(instrument) >= 0.01 {
        format!("{price:.3}")
    } else {
        format!("{price:.5}")
    }
}

#[async_trait]
impl BrokerClient for OandaClient {
    async fn get_account_info(&self) -> Result<AccountInfo, BrokerError> {
        let resp = self.send(self.http.get(self.account_url("/summary"))).await?;
        let summary: SummaryResponse = Self::parse(resp, "account summary").await?;
        Ok(AccountInfo {
            id: summary.account.id,
            currency: summary.account.currency,
            balance: summary.account.balance.parse().unwrap_or(0.0),
        })
    }

    async fn get_current_prices(&self, instruments: &[String]) -> Result<Vec<Quote>, BrokerError> {
        if instruments.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}?instruments={}",
            self.account_url("/pricing"),
            urlencoding::encode(&instruments.join(","))
        );
        debug!(account = %self.account_id, count = instruments.len(), "Fetching OANDA prices");

        let resp = self.send(self.http.get(&url)).await?;
        let pricing: PricingResponse = Self::parse(resp, "pricing").await?;

        Ok(pricing
            .prices
            .into_iter()
            .filter_map(|p| {
                let bid = parse_price(&p.bids.first()?.price)?;
                let ask = parse_price(&p.asks.first()?.price)?;
                Some(Quote {
                    instrument: p.instrument,
                    bid,
                    ask,
                    time: p.time,
                })
            })
            .collect())
    }

    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderReceipt, BrokerError> {
        let body = serde_json::json!({
            "order": {
                "type": "MARKET",
                "instrument": order.instrument,
                "units": order.units.to_string(),
                "timeInForce": "FOK",
                "positionFill": "DEFAULT",
                "stopLossOnFill": { "price": format_price(&order.instrument, order.stop_loss) },
                "takeProfitOnFill": { "price": format_price(&order.instrument, order.take_profit) },
            }
        });

        let resp = self
            .send(self.http.post(self.account_url("/orders")).json(&body))
            .await?;
        let parsed: OrderResponse = Self::parse(resp, "order").await?;

        if let Some(cancel) = parsed.order_cancel_transaction {
            return Err(BrokerError::Rejected(cancel.reason));
        }
        let fill = parsed
            .order_fill_transaction
            .ok_or_else(|| BrokerError::Rejected("no fill transaction in response".to_string()))?;

        info!(
            account = %self.account_id,
            order_id = %fill.id,
            instrument = %order.instrument,
            units = order.units,
            "OANDA order filled"
        );

        Ok(OrderReceipt {
            order_id: fill.id,
            instrument: order.instrument.clone(),
            units: order.units,
            fill_price: fill.price.as_deref().and_then(parse_price),
            timestamp: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        PLATFORM_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
