use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use crate::config::PricesConfig;
use crate::error::{Result, YellowTrackerError};
use crate::interfaces::providers::{AssetClass, PriceProvider};

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
const COINGECKO_BASE_URL: &str = "https://api.coingecko.com";

/// Stock quotes from the Yahoo Finance chart API, crypto from CoinGecko.
pub struct MarketPriceProvider {
    http: reqwest::Client,
    stock_base_url: String,
    crypto_base_url: String,
}

impl MarketPriceProvider {
    pub fn new(config: Option<&PricesConfig>) -> Result<Self> {
        let base = |value: Option<&String>, default: &str| {
            value
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let timeout = config.and_then(|c| c.timeout_seconds).unwrap_or(10).max(1);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .user_agent("yellow-tracker/0.1")
            .build()
            .map_err(|e| YellowTrackerError::Config(e.to_string()))?;
        Ok(Self {
            http,
            stock_base_url: base(config.and_then(|c| c.stock_base_url.as_ref()), YAHOO_BASE_URL),
            crypto_base_url: base(
                config.and_then(|c| c.crypto_base_url.as_ref()),
                COINGECKO_BASE_URL,
            ),
        })
    }

    async fn fetch_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| YellowTrackerError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| YellowTrackerError::Http(e.to_string()))?;
        response
            .json::<Value>()
            .await
            .map_err(|e| YellowTrackerError::Serialization(e.to_string()))
    }

    async fn stock_price(&self, ticker: &str) -> Result<Option<Decimal>> {
        let url = format!("{}/v8/finance/chart/{}", self.stock_base_url, ticker.trim());
        let body = self.fetch_json(&url, &[]).await?;
        Ok(body
            .pointer("/chart/result/0/meta/regularMarketPrice")
            .and_then(json_decimal))
    }

    async fn crypto_price(&self, ticker: &str) -> Result<Option<Decimal>> {
        let coin_id = coingecko_id(ticker);
        let url = format!("{}/api/v3/simple/price", self.crypto_base_url);
        let body = self
            .fetch_json(&url, &[("ids", coin_id.as_str()), ("vs_currencies", "usd")])
            .await?;
        Ok(body
            .get(&coin_id)
            .and_then(|coin| coin.get("usd"))
            .and_then(json_decimal))
    }
}

#[async_trait]
impl PriceProvider for MarketPriceProvider {
    async fn price(&self, ticker: &str, class: AssetClass) -> Option<Decimal> {
        let result = match class {
            AssetClass::Stock => self.stock_price(ticker).await,
            AssetClass::Crypto => self.crypto_price(ticker).await,
        };
        match result {
            Ok(price) => price,
            Err(err) => {
                debug!(ticker, error = %err, "price lookup failed");
                None
            }
        }
    }
}

pub fn coingecko_id(ticker: &str) -> String {
    match ticker.trim().to_uppercase().as_str() {
        "BTC" => "bitcoin".to_string(),
        "ETH" => "ethereum".to_string(),
        "SOL" => "solana".to_string(),
        "ADA" => "cardano".to_string(),
        "DOT" => "polkadot".to_string(),
        "LINK" => "chainlink".to_string(),
        "MATIC" => "matic-network".to_string(),
        "AVAX" => "avalanche-2".to_string(),
        "USDT" => "tether".to_string(),
        "USDC" => "usd-coin".to_string(),
        _ => ticker.trim().to_lowercase(),
    }
}

fn json_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let raw = n.to_string();
            raw.parse()
                .ok()
                .or_else(|| Decimal::from_scientific(&raw).ok())
        }
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_coins_and_lowercases_the_rest() {
        assert_eq!(coingecko_id("btc"), "bitcoin");
        assert_eq!(coingecko_id("AVAX"), "avalanche-2");
        assert_eq!(coingecko_id("PEPE"), "pepe");
    }

    #[test]
    fn json_numbers_become_decimals() {
        assert_eq!(
            json_decimal(&serde_json::json!(187.25)),
            Some(Decimal::new(18725, 2))
        );
        assert_eq!(json_decimal(&serde_json::json!(null)), None);
    }
}
