//! 现货价格服务
//!
//! 交易所 ticker 接口拉取 USDT 计价现货价，带 TTL 缓存。
//! 稳定币固定按 1 折算，不发起网络请求。

use std::{
    str::FromStr,
    time::{Duration, Instant},
};

use rust_decimal::Decimal;

use crate::{
    config::PriceConfig,
    domain::{
        currency::{Currency, CurrencyKind},
        error::DepositError,
    },
    infrastructure::ttl_cache::TtlCache,
    metrics,
};

pub struct PriceService {
    http: reqwest::Client,
    base_url: String,
    cache: TtlCache<String, Decimal>,
}

impl PriceService {
    pub fn new(config: &PriceConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: config.base_url.clone(),
            cache: TtlCache::new(Duration::from_secs(config.ttl_secs)),
        }
    }

    /// 币种的美元价格。稳定币恒为1，波动资产查现货并缓存。
    pub async fn usd_price(&self, currency: &Currency) -> Result<Decimal, DepositError> {
        if currency.kind == CurrencyKind::Stable {
            return Ok(Decimal::ONE);
        }

        let symbol = currency.symbol.to_string();
        if let Some(price) = self.cache.get(&symbol).await {
            return Ok(price);
        }

        let price = self.fetch_spot_price(&symbol).await?;
        self.cache.insert(symbol, price).await;
        Ok(price)
    }

    async fn fetch_spot_price(&self, symbol: &str) -> Result<Decimal, DepositError> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}USDT",
            self.base_url.trim_end_matches('/'),
            symbol
        );

        let started = Instant::now();
        let result = self.http.get(&url).send().await;
        let latency_ms = started.elapsed().as_millis();

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                metrics::observe_rpc_latency_ms(latency_ms, false);
                return Err(DepositError::PriceUnavailable(format!(
                    "ticker request for {} failed: {}",
                    symbol, e
                )));
            }
        };

        if !response.status().is_success() {
            metrics::observe_rpc_latency_ms(latency_ms, false);
            return Err(DepositError::PriceUnavailable(format!(
                "ticker for {} returned HTTP {}",
                symbol,
                response.status()
            )));
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| {
            metrics::observe_rpc_latency_ms(latency_ms, false);
            DepositError::PriceUnavailable(format!("ticker for {} bad response: {}", symbol, e))
        })?;

        metrics::observe_rpc_latency_ms(latency_ms, true);

        let price_str = payload
            .get("price")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                DepositError::PriceUnavailable(format!("ticker for {} missing price", symbol))
            })?;

        let price = Decimal::from_str(price_str).map_err(|e| {
            DepositError::PriceUnavailable(format!("ticker for {} bad price: {}", symbol, e))
        })?;

        if price <= Decimal::ZERO {
            return Err(DepositError::PriceUnavailable(format!(
                "ticker for {} returned non-positive price",
                symbol
            )));
        }
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::Blockchain;

    fn stable() -> Currency {
        Currency {
            id: "USDT",
            symbol: "USDT",
            blockchain: Blockchain::Tron,
            kind: CurrencyKind::Stable,
            contract: Some("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".into()),
            decimals: 6,
        }
    }

    #[tokio::test]
    async fn test_stablecoin_is_pegged_without_network() {
        // base_url 指向不可达端口，稳定币路径不会发请求
        let service = PriceService::new(&PriceConfig {
            base_url: "http://127.0.0.1:1".into(),
            ttl_secs: 60,
            timeout_secs: 1,
        });
        assert_eq!(service.usd_price(&stable()).await.unwrap(), Decimal::ONE);
    }
}
