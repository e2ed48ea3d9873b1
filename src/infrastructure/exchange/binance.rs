//! Binance USDT-M futures client.
//!
//! Implements the `ExchangeClient` wire contract against the futures REST
//! API: HMAC-SHA256 signed requests, strict numeric coercion (missing or
//! unparseable fields become zero), and idempotent leverage/margin setters.

use crate::domain::ports::ExchangeClient;
use crate::domain::trading::types::{
    Candle, CurrencyBalance, ExchangeOrder, ExchangeOrderKind, MarginMode, Position, PositionSide,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{info, warn};

/// Quote currencies recognized when mapping venue symbols back to the
/// `BASE/QUOTE` form, longest first so USDT wins over USD.
const QUOTE_CURRENCIES: &[&str] = &["USDT", "USDC", "BUSD", "USD"];

/// Venue answer when the margin type is already what we asked for.
const ERR_NO_NEED_TO_CHANGE_MARGIN: i64 = -4046;

pub struct BinanceFuturesClient {
    client: ClientWithMiddleware,
    api_key: String,
    api_secret: String,
    base_url: String,
}

impl BinanceFuturesClient {
    pub fn new(api_key: String, api_secret: String, base_url: String) -> Self {
        Self {
            client: venue_http_client(),
            api_key,
            api_secret,
            base_url,
        }
    }

    fn sign_request(&self, query_string: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;

        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_url(&self, path: &str, params: &[(&str, String)]) -> String {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        query.push(format!("timestamp={}", timestamp));
        let query_string = query.join("&");
        let signature = self.sign_request(&query_string);
        format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query_string, signature
        )
    }

    /// Recent OHLCV history from the public kline endpoint, oldest first.
    /// Rows the venue sends malformed are dropped, not propagated.
    pub async fn recent_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            to_api_symbol(symbol),
            interval,
            limit
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Kline request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("Kline fetch failed for {}: {}", symbol, response.status());
        }

        let rows: Vec<Vec<serde_json::Value>> =
            response.json().await.context("Invalid kline payload")?;
        Ok(rows.iter().filter_map(|row| candle_from_row(row)).collect())
    }

    async fn send_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let url = self.signed_url(path, params);
        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", path))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("{} returned {}: {}", path, status, body);
        }
        serde_json::from_str(&body).with_context(|| format!("Invalid JSON from {}", path))
    }
}

/// Signed requests carry a timestamp the venue checks against its
/// `recvWindow`, so transport retries must finish fast: two attempts with
/// short bounds, and tight per-request timeouts. Order creation stays safe
/// to retry because every order is sent with a fresh `newClientOrderId`
/// the venue deduplicates on.
fn venue_http_client() -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(250), Duration::from_secs(2))
        .build_with_max_retries(2);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

/// `BTC/USDT` or `BTC/USDT:USDC` -> `BTCUSDT` for the venue.
pub fn to_api_symbol(symbol: &str) -> String {
    let without_suffix = symbol.split(':').next().unwrap_or(symbol);
    without_suffix.replace('/', "")
}

/// `BTCUSDT` -> `BTC/USDT`, falling back to the raw symbol when no quote
/// currency matches.
pub fn from_api_symbol(symbol: &str) -> String {
    for quote in QUOTE_CURRENCIES {
        if symbol.ends_with(quote) && symbol.len() > quote.len() {
            let base = &symbol[..symbol.len() - quote.len()];
            return format!("{}/{}", base, quote);
        }
    }
    symbol.to_string()
}

/// Strict coercion for the venue's stringly-typed numbers: anything absent
/// or unparseable is zero, keeping the PnL math total.
fn parse_or_zero(value: &str) -> Decimal {
    value.parse::<Decimal>().unwrap_or(Decimal::ZERO)
}

/// Kline rows are positional arrays: [openTime, open, high, low, close,
/// volume, ...]. Short or mistyped rows yield `None`.
fn candle_from_row(row: &[serde_json::Value]) -> Option<Candle> {
    if row.len() < 6 {
        return None;
    }
    let field = |index: usize| row[index].as_str().map(parse_or_zero);
    Some(Candle {
        open_time: row[0].as_i64()?,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

#[async_trait]
impl ExchangeClient for BinanceFuturesClient {
    async fn last_price(&self, symbol: &str) -> Result<Decimal> {
        #[derive(Deserialize)]
        struct Ticker {
            price: String,
        }

        let url = format!(
            "{}/fapi/v1/ticker/price?symbol={}",
            self.base_url,
            to_api_symbol(symbol)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Ticker request failed")?;
        if !response.status().is_success() {
            anyhow::bail!(
                "Ticker fetch failed for {}: {}",
                symbol,
                response.status()
            );
        }

        let ticker: Ticker = response.json().await.context("Invalid ticker payload")?;
        Ok(parse_or_zero(&ticker.price))
    }

    async fn create_order(&self, order: &ExchangeOrder) -> Result<String> {
        let mut params: Vec<(&str, String)> = vec![
            ("symbol", to_api_symbol(&order.symbol)),
            ("side", order.side.to_string()),
            ("type", order.kind.wire_name().to_string()),
            ("quantity", order.amount.to_string()),
            ("newClientOrderId", uuid::Uuid::new_v4().to_string()),
        ];

        match order.kind {
            ExchangeOrderKind::Limit(price) => {
                params.push(("price", price.to_string()));
                params.push(("timeInForce", "GTC".to_string()));
            }
            ExchangeOrderKind::StopMarket(stop_price)
            | ExchangeOrderKind::TakeProfitMarket(stop_price) => {
                params.push(("stopPrice", stop_price.to_string()));
            }
            ExchangeOrderKind::Market => {}
        }

        if order.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        let response = self
            .send_signed(reqwest::Method::POST, "/fapi/v1/order", &params)
            .await?;

        let order_id = response
            .get("orderId")
            .map(|id| id.to_string().trim_matches('"').to_string())
            .filter(|id| !id.is_empty() && id != "null")
            .context("Order response carried no orderId")?;

        info!(
            "BinanceFutures: {} {} {} accepted as {}",
            order.kind.wire_name(),
            order.side,
            order.symbol,
            order_id
        );
        Ok(order_id)
    }

    async fn fetch_positions(&self, symbols: Option<&[String]>) -> Result<Vec<Position>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct PositionRisk {
            symbol: String,
            position_amt: String,
            entry_price: String,
            mark_price: String,
            un_realized_profit: String,
            leverage: String,
            liquidation_price: String,
        }

        let response = self
            .send_signed(reqwest::Method::GET, "/fapi/v2/positionRisk", &[])
            .await?;
        let raw: Vec<PositionRisk> =
            serde_json::from_value(response).context("Invalid positionRisk payload")?;

        let wanted: Option<Vec<String>> =
            symbols.map(|s| s.iter().map(|sym| to_api_symbol(sym)).collect());

        let positions = raw
            .into_iter()
            .filter(|p| {
                wanted
                    .as_ref()
                    .is_none_or(|wanted| wanted.contains(&p.symbol))
            })
            .filter_map(|p| {
                let signed_amount = parse_or_zero(&p.position_amt);
                if signed_amount == Decimal::ZERO {
                    return None;
                }
                let side = if signed_amount > Decimal::ZERO {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                };
                Some(Position {
                    symbol: from_api_symbol(&p.symbol),
                    side,
                    amount: signed_amount.abs(),
                    entry_price: parse_or_zero(&p.entry_price),
                    mark_price: parse_or_zero(&p.mark_price),
                    unrealized_pnl: parse_or_zero(&p.un_realized_profit),
                    leverage: p.leverage.parse::<u32>().unwrap_or(1),
                    liquidation_price: parse_or_zero(&p.liquidation_price),
                })
            })
            .collect();

        Ok(positions)
    }

    async fn fetch_balance(&self) -> Result<CurrencyBalance> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Asset {
            asset: String,
            available_balance: String,
            initial_margin: String,
            wallet_balance: String,
        }

        let response = self
            .send_signed(reqwest::Method::GET, "/fapi/v2/balance", &[])
            .await?;
        let assets: Vec<Asset> =
            serde_json::from_value(response).context("Invalid balance payload")?;

        // Missing settlement currency resolves to the zero triple.
        Ok(assets
            .into_iter()
            .find(|a| a.asset == "USDT")
            .map(|a| CurrencyBalance {
                free: parse_or_zero(&a.available_balance),
                used: parse_or_zero(&a.initial_margin),
                total: parse_or_zero(&a.wallet_balance),
            })
            .unwrap_or_default())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let params = [
            ("symbol", to_api_symbol(symbol)),
            ("leverage", leverage.to_string()),
        ];
        self.send_signed(reqwest::Method::POST, "/fapi/v1/leverage", &params)
            .await?;
        Ok(())
    }

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> Result<()> {
        let params = [
            ("symbol", to_api_symbol(symbol)),
            ("marginType", mode.to_string()),
        ];
        match self
            .send_signed(reqwest::Method::POST, "/fapi/v1/marginType", &params)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                // Re-setting the same mode answers with -4046; that is the
                // idempotent no-op case, not a failure.
                if e.to_string()
                    .contains(&ERR_NO_NEED_TO_CHANGE_MARGIN.to_string())
                {
                    warn!(
                        "BinanceFutures: margin mode for {} already {}",
                        symbol, mode
                    );
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }
}

impl std::fmt::Debug for BinanceFuturesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceFuturesClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

// OrderSide's Display already matches the venue's BUY/SELL casing; assert
// it stays that way since the wire depends on it.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::OrderSide;

    #[test]
    fn test_order_side_wire_casing() {
        assert_eq!(OrderSide::Buy.to_string(), "BUY");
        assert_eq!(OrderSide::Sell.to_string(), "SELL");
    }

    #[test]
    fn test_symbol_round_trip() {
        assert_eq!(to_api_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(to_api_symbol("BTC/USDT:USDC"), "BTCUSDT");
        assert_eq!(from_api_symbol("BTCUSDT"), "BTC/USDT");
        assert_eq!(from_api_symbol("ETHUSDC"), "ETH/USDC");
        assert_eq!(from_api_symbol("WEIRD"), "WEIRD");
    }

    #[test]
    fn test_parse_or_zero_is_total() {
        assert_eq!(parse_or_zero("12.5"), Decimal::new(125, 1));
        assert_eq!(parse_or_zero(""), Decimal::ZERO);
        assert_eq!(parse_or_zero("NaN"), Decimal::ZERO);
        assert_eq!(parse_or_zero("not-a-number"), Decimal::ZERO);
    }

    #[test]
    fn test_candle_from_row() {
        let row: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1700000000000, "96000.1", "96500.0", "95800.0", "96200.5", "1234.5", 1700000059999]"#,
        )
        .unwrap();
        let candle = candle_from_row(&row).unwrap();
        assert_eq!(candle.open_time, 1_700_000_000_000);
        assert_eq!(candle.close, Decimal::new(962005, 1));

        // Truncated and mistyped rows are dropped.
        assert!(candle_from_row(&row[..4]).is_none());
        let bad: Vec<serde_json::Value> = serde_json::from_str(r#"[1, 2, 3, 4, 5, 6]"#).unwrap();
        assert!(candle_from_row(&bad).is_none());
    }

    #[test]
    fn test_hmac_signature_format() {
        let client = BinanceFuturesClient::new(
            "test_key".to_string(),
            "test_secret".to_string(),
            "https://testnet.binancefuture.com".to_string(),
        );

        let signature = client
            .sign_request("symbol=BTCUSDT&side=BUY&type=MARKET&quantity=0.001&timestamp=1234567890");

        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
