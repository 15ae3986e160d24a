use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, warn};

use common::{
    AccountProvider, Error, MarketDataProvider, Order, OrderConfirmation,
    OrderExecutionProvider, PriceSample, PriceSeries, RejectionReason, Result,
};

const BASE_URL: &str = "https://api.binance.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Binance error code for "Account has insufficient balance for requested action."
const INSUFFICIENT_BALANCE_CODE: i64 = -2010;

struct Credentials {
    api_key: String,
    secret: String,
}

/// Binance spot REST client: klines and ticker for market data, signed
/// endpoints for orders and balances.
///
/// `public()` builds a client without credentials, enough for market data in
/// paper mode; signed calls on it fail with `Error::Config`.
pub struct BinanceClient {
    credentials: Option<Credentials>,
    http: Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        Ok(Self {
            credentials: Some(Credentials {
                api_key: api_key.into(),
                secret: secret.into(),
            }),
            http: Self::build_http()?,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn public() -> Result<Self> {
        Ok(Self {
            credentials: None,
            http: Self::build_http()?,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Point the client at another host, e.g. the spot testnet.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_http() -> Result<Client> {
        Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {e}")))
    }

    fn credentials(&self) -> Result<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| Error::Config("Binance API credentials are not configured".into()))
    }

    fn signed_query(&self, params: &str) -> Result<String> {
        let credentials = self.credentials()?;
        let ts = Utc::now().timestamp_millis();
        let query = if params.is_empty() {
            format!("timestamp={ts}")
        } else {
            format!("{params}&timestamp={ts}")
        };
        let signature = sign(&credentials.secret, &query)?;
        Ok(format!("{query}&signature={signature}"))
    }

    async fn public_get(&self, path: &str, query: &str) -> Result<String> {
        let url = format!("{}{path}?{query}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::DataUnavailable(format!("GET {path}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::DataUnavailable(format!("GET {path}: {e}")))?;

        if !status.is_success() {
            return Err(Error::DataUnavailable(format!("GET {path}: HTTP {status}: {body}")));
        }
        Ok(body)
    }

    async fn signed_get(&self, path: &str, params: &str) -> Result<String> {
        let query = self.signed_query(params)?;
        let url = format!("{}{path}?{query}", self.base_url);

        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.credentials()?.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }
}

#[async_trait]
impl MarketDataProvider for BinanceClient {
    async fn series(&self, symbol: &str, interval_secs: u64, lookback: usize) -> Result<PriceSeries> {
        let interval = interval_code(interval_secs)?;
        // One extra row: the newest kline is usually still forming and is dropped.
        let limit = (lookback + 1).min(1000);
        let body = self
            .public_get("/api/v3/klines", &format!("symbol={symbol}&interval={interval}&limit={limit}"))
            .await?;

        let mut samples = parse_klines(&body, Utc::now())?;
        if samples.len() > lookback {
            samples.drain(..samples.len() - lookback);
        }
        debug!(symbol, interval, candles = samples.len(), "Fetched klines");
        PriceSeries::new(samples)
    }

    async fn latest_price(&self, symbol: &str) -> Result<f64> {
        let body = self
            .public_get("/api/v3/ticker/price", &format!("symbol={symbol}"))
            .await?;
        let ticker: PriceTicker = serde_json::from_str(&body)
            .map_err(|e| Error::DataUnavailable(format!("ticker for {symbol}: {e}")))?;
        ticker
            .price
            .parse::<f64>()
            .map_err(|e| Error::DataUnavailable(format!("ticker for {symbol}: {e}")))
    }
}

#[async_trait]
impl OrderExecutionProvider for BinanceClient {
    async fn place_market_order(&self, order: &Order) -> Result<OrderConfirmation> {
        let params = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newClientOrderId={}&newOrderRespType=FULL",
            order.symbol, order.side, order.quantity, order.id
        );
        let body = self.signed_query(&params)?;
        let url = format!("{}/api/v3/order", self.base_url);

        debug!(symbol = %order.symbol, side = %order.side, qty = order.quantity, "Submitting order to Binance");
        let sent = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.credentials()?.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await;

        let resp = match sent {
            Ok(resp) => resp,
            // The request never reached Binance, so nothing was placed.
            Err(e) if e.is_connect() => {
                return Err(rejected(order, RejectionReason::Exchange(format!("connection failed: {e}"))))
            }
            Err(e) => {
                warn!(symbol = %order.symbol, error = %e, "Order status unknown");
                return Err(timed_out(order));
            }
        };

        let status = resp.status();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(_) if status.is_success() => return Err(timed_out(order)),
            Err(e) => e.to_string(),
        };

        if let Some(err) = classify_order_failure(order, status, &text) {
            return Err(err);
        }
        confirmation_from_response(order, &text)
    }
}

#[async_trait]
impl AccountProvider for BinanceClient {
    async fn balance(&self, asset: &str) -> Result<f64> {
        let body = self.signed_get("/api/v3/account", "omitZeroBalances=true").await?;
        free_balance(&body, asset)
    }
}

/// Binance kline interval code for a candle width in seconds.
pub fn interval_code(secs: u64) -> Result<&'static str> {
    Ok(match secs {
        60 => "1m",
        180 => "3m",
        300 => "5m",
        900 => "15m",
        1800 => "30m",
        3600 => "1h",
        7200 => "2h",
        14_400 => "4h",
        21_600 => "6h",
        28_800 => "8h",
        43_200 => "12h",
        86_400 => "1d",
        259_200 => "3d",
        604_800 => "1w",
        other => {
            return Err(Error::Config(format!(
                "No Binance kline interval is {other} seconds wide"
            )))
        }
    })
}

fn sign(secret: &str, query: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Config(format!("Invalid Binance secret: {e}")))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn rejected(order: &Order, reason: RejectionReason) -> Error {
    Error::OrderRejected {
        symbol: order.symbol.clone(),
        side: order.side,
        quantity: order.quantity,
        reason,
    }
}

fn timed_out(order: &Order) -> Error {
    Error::OrderTimeout {
        symbol: order.symbol.clone(),
        side: order.side,
        quantity: order.quantity,
    }
}

/// 4xx means Binance refused the order; 5xx means its execution status is
/// unknown.
fn classify_order_failure(order: &Order, status: StatusCode, body: &str) -> Option<Error> {
    if status.is_success() {
        return None;
    }
    if status.is_server_error() {
        warn!(symbol = %order.symbol, %status, body, "Binance returned a server error for an order");
        return Some(timed_out(order));
    }

    let reason = match serde_json::from_str::<ApiError>(body) {
        Ok(api) if api.code == INSUFFICIENT_BALANCE_CODE => RejectionReason::InsufficientBalance,
        Ok(api) => RejectionReason::Exchange(format!("{} ({})", api.msg, api.code)),
        Err(_) => RejectionReason::Exchange(format!("HTTP {status}: {body}")),
    };
    Some(rejected(order, reason))
}

/// Binance order statuses that mean nothing was, or will be, executed.
const NOT_EXECUTED: [&str; 4] = ["EXPIRED", "REJECTED", "CANCELED", "EXPIRED_IN_MATCH"];

/// Build the confirmation from a 2xx order response. Binance accepted the
/// order, so any body that does not prove a fill or a clean non-execution
/// leaves the order status unknown.
fn confirmation_from_response(order: &Order, body: &str) -> Result<OrderConfirmation> {
    let unknown = |detail: String| {
        warn!(symbol = %order.symbol, side = %order.side, %detail, "Order accepted but fill unclear");
        timed_out(order)
    };

    let resp: OrderResponse = serde_json::from_str(body)
        .map_err(|e| unknown(format!("unreadable order response: {e}")))?;

    let executed = resp
        .executed_qty
        .parse::<f64>()
        .map_err(|_| unknown(format!("executedQty '{}' is not a number", resp.executed_qty)))?;
    if executed <= 0.0 {
        if NOT_EXECUTED.contains(&resp.status.as_str()) {
            return Err(rejected(
                order,
                RejectionReason::Exchange(format!("order not filled (status {})", resp.status)),
            ));
        }
        return Err(unknown(format!("nothing executed yet (status '{}')", resp.status)));
    }

    let quote = resp.cummulative_quote_qty.parse::<f64>().unwrap_or(0.0);
    let filled_price = if quote > 0.0 {
        quote / executed
    } else {
        resp.fills
            .first()
            .and_then(|f| f.price.parse::<f64>().ok())
            .filter(|p| *p > 0.0)
            .ok_or_else(|| unknown("order response has no fill price".into()))?
    };

    let timestamp = resp
        .transact_time
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);

    Ok(OrderConfirmation {
        order_id: resp.client_order_id,
        symbol: order.symbol.clone(),
        side: order.side,
        filled_price,
        filled_quantity: executed,
        timestamp,
    })
}

/// Free balance of `asset` in an account response; an asset Binance omits
/// holds nothing.
fn free_balance(body: &str, asset: &str) -> Result<f64> {
    let account: AccountResponse =
        serde_json::from_str(body).map_err(|e| Error::Exchange(e.to_string()))?;
    match account.balances.iter().find(|b| b.asset == asset) {
        Some(b) => b
            .free
            .parse::<f64>()
            .map_err(|_| Error::Exchange(format!("{asset} free balance '{}' is not a number", b.free))),
        None => Ok(0.0),
    }
}

/// Parse the kline array, keeping only candles that closed before `now`.
fn parse_klines(body: &str, now: DateTime<Utc>) -> Result<Vec<PriceSample>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)
        .map_err(|e| Error::DataUnavailable(format!("kline response: {e}")))?;

    let mut samples = Vec::with_capacity(rows.len());
    for row in rows {
        let close_time = row.get(6).and_then(Value::as_i64).unwrap_or(i64::MAX);
        if close_time >= now.timestamp_millis() {
            continue;
        }
        let timestamp = row
            .first()
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| Error::DataUnavailable("kline without open time".into()))?;
        let field = |i: usize| -> Result<f64> {
            row.get(i)
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| Error::DataUnavailable(format!("kline field {i} is not a number")))
        };
        samples.push(PriceSample {
            timestamp,
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
            volume: field(5)?,
        });
    }
    Ok(samples)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    client_order_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    executed_qty: String,
    #[serde(default)]
    cummulative_quote_qty: String,
    #[serde(default)]
    transact_time: Option<i64>,
    #[serde(default)]
    fills: Vec<FillDetail>,
}

#[derive(Deserialize)]
struct FillDetail {
    price: String,
}

#[derive(Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

#[derive(Deserialize)]
struct AccountResponse {
    balances: Vec<Balance>,
}

#[derive(Deserialize)]
struct Balance {
    asset: String,
    free: String,
}

#[derive(Deserialize)]
struct PriceTicker {
    price: String,
}
