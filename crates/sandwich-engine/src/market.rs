//! Dados de mercado: gas rápido da rede e preço em USD das moedas.

use chrono::{DateTime, Utc};
use ethereum_types::U256;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use rust_decimal::Decimal;
use sandwich_core::traits::SharedConnector;
use sandwich_core::utils::gwei_to_wei;
use sandwich_core::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::{CoinEntry, ConfigSnapshot, ConfigStore};

/// Leitura de mercado usada pelo avaliador
#[derive(Debug, Clone, Default)]
pub struct LiveContext {
    /// Gas rápido da rede, em wei
    pub fast_gas_price: U256,
    /// id do feed -> preço em USD
    pub usd_prices: HashMap<String, Decimal>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LiveContext {
    pub fn new(fast_gas_price: U256) -> Self {
        Self {
            fast_gas_price,
            usd_prices: HashMap::new(),
            updated_at: Some(Utc::now()),
        }
    }

    pub fn with_price(mut self, id: impl Into<String>, price: Decimal) -> Self {
        self.usd_prices.insert(id.into(), price);
        self
    }

    /// Preço da moeda; sem `price_id` a moeda vale 1 USD
    pub fn price_of(&self, coin: &CoinEntry) -> Option<Decimal> {
        match &coin.price_id {
            None => Some(Decimal::ONE),
            Some(id) => self.usd_prices.get(id).copied(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GasOracleResponse {
    result: GasOracleResult,
}

#[derive(Debug, Deserialize)]
struct GasOracleResult {
    #[serde(rename = "FastGasPrice")]
    fast_gas_price: String,
}

/// Mantém o `LiveContext` atualizado
pub struct MarketFeed {
    client: Client,
    connector: SharedConnector,
    live: RwLock<Arc<LiveContext>>,
    gas_fetched_at: Mutex<Option<Instant>>,
}

impl MarketFeed {
    pub fn new(connector: SharedConnector) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            connector,
            live: RwLock::new(Arc::new(LiveContext::default())),
            gas_fetched_at: Mutex::new(None),
        }
    }

    /// Leitura vigente
    pub fn current(&self) -> Arc<LiveContext> {
        self.live.read().clone()
    }

    /// Substitui a leitura vigente
    pub fn publish(&self, live: LiveContext) {
        *self.live.write() = Arc::new(live);
    }

    /// Gas rápido em wei: oracle quando configurado, senão `eth_gasPrice`
    pub async fn fetch_fast_gas(&self, oracle_url: Option<&str>) -> Result<U256> {
        let Some(url) = oracle_url else {
            return self.connector.gas_price().await;
        };
        let body: GasOracleResponse = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::RpcError(format!("gas oracle request failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::DecodeError(format!("gas oracle response: {e}")))?;
        let gwei = Decimal::from_str(body.result.fast_gas_price.trim())
            .map_err(|e| Error::DecodeError(format!("FastGasPrice `{}`: {e}", body.result.fast_gas_price)))?;
        gwei_to_wei(gwei)
    }

    /// Preços em USD via `simple/price`
    pub async fn fetch_prices(&self, base_url: &str, ids: &[String]) -> Result<HashMap<String, Decimal>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!("{}/simple/price", base_url.trim_end_matches('/'));
        let body: HashMap<String, HashMap<String, Decimal>> = self
            .client
            .get(url)
            .query(&[("ids", ids.join(",")), ("vs_currencies", "usd".to_string())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::RpcError(format!("price request failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::DecodeError(format!("price response: {e}")))?;
        Ok(body
            .into_iter()
            .filter_map(|(id, quotes)| quotes.get("usd").copied().map(|p| (id, p)))
            .collect())
    }

    /// Atualiza gas (respeitando o cache) e preços. Falhas mantêm o valor anterior.
    pub async fn refresh(&self, snapshot: &ConfigSnapshot) {
        let previous = self.current();
        let mut next = (*previous).clone();

        let gas_ttl = Duration::from_millis(snapshot.market.gas_cache_ttl_ms);
        let gas_stale = self
            .gas_fetched_at
            .lock()
            .map_or(true, |at| at.elapsed() >= gas_ttl);
        if gas_stale {
            match self.fetch_fast_gas(snapshot.market.gas_oracle_url.as_deref()).await {
                Ok(gas) => {
                    next.fast_gas_price = gas;
                    *self.gas_fetched_at.lock() = Some(Instant::now());
                }
                Err(e) => warn!(error = %e, "falha ao obter gas rápido"),
            }
        }

        if let Some(base) = snapshot.market.price_api_url.as_deref() {
            let mut ids: Vec<String> = snapshot.coins.iter().filter_map(|c| c.price_id.clone()).collect();
            ids.push(snapshot.market.native_price_id.clone());
            ids.sort();
            ids.dedup();
            match self.fetch_prices(base, &ids).await {
                Ok(prices) => next.usd_prices.extend(prices),
                Err(e) => warn!(error = %e, "falha ao obter preços"),
            }
        }

        next.updated_at = Some(Utc::now());
        debug!(fast_gas = %next.fast_gas_price, prices = next.usd_prices.len(), "mercado atualizado");
        self.publish(next);
    }

    /// Laço de atualização até o sinal de encerramento
    pub async fn run(self: Arc<Self>, config: Arc<ConfigStore>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            let active = config.current();
            self.refresh(&active.snapshot).await;
            let interval = Duration::from_millis(active.snapshot.market.poll_interval_ms.max(100));
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketSettings;
    use async_trait::async_trait;
    use ethereum_types::{Address, H256};
    use ethers::types::{Bytes, Transaction, TransactionReceipt};
    use sandwich_core::traits::{ChainConnector, PendingStream};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct GasOnly(U256);

    #[async_trait]
    impl ChainConnector for GasOnly {
        async fn subscribe_pending(&self) -> Result<PendingStream> {
            Err(Error::ConnectionError("unused".into()))
        }
        async fn fetch_transaction(&self, _: H256, _: Duration) -> Result<Option<(Transaction, bool)>> {
            Ok(None)
        }
        async fn submit(&self, _: Bytes) -> Result<H256> {
            Err(Error::SubmissionError("unused".into()))
        }
        async fn poll_receipt(&self, _: H256, _: Duration) -> Result<Option<TransactionReceipt>> {
            Ok(None)
        }
        async fn native_balance(&self, _: Address) -> Result<U256> { Ok(U256::zero()) }
        async fn erc20_balance(&self, _: Address, _: Address) -> Result<U256> { Ok(U256::zero()) }
        async fn erc20_allowance(&self, _: Address, _: Address, _: Address) -> Result<U256> { Ok(U256::zero()) }
        async fn erc20_decimals(&self, _: Address) -> Result<u8> { Ok(18) }
        async fn nonce(&self, _: Address) -> Result<u64> { Ok(0) }
        async fn pending_nonce(&self, _: Address) -> Result<u64> { Ok(0) }
        async fn gas_price(&self) -> Result<U256> { Ok(self.0) }
        fn chain_id(&self) -> u64 { 137 }
    }

    fn feed(node_gas: u64) -> MarketFeed {
        MarketFeed::new(Arc::new(GasOnly(U256::from(node_gas))))
    }

    #[tokio::test]
    async fn oracle_fast_gas_is_converted_to_wei() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "1",
                "result": { "SafeGasPrice": "30", "ProposeGasPrice": "35", "FastGasPrice": "45.5" }
            })))
            .mount(&server)
            .await;

        let url = format!("{}/api?module=gastracker&action=gasoracle", server.uri());
        let gas = feed(1).fetch_fast_gas(Some(&url)).await.unwrap();
        assert_eq!(gas, U256::from(45_500_000_000u64));
    }

    #[tokio::test]
    async fn node_gas_price_without_oracle() {
        let gas = feed(42).fetch_fast_gas(None).await.unwrap();
        assert_eq!(gas, U256::from(42));
    }

    #[tokio::test]
    async fn prices_are_read_per_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "matic-network": { "usd": 0.71 },
                "tether": { "usd": 1.0 }
            })))
            .mount(&server)
            .await;

        let ids = vec!["matic-network".to_string(), "tether".to_string()];
        let prices = feed(1).fetch_prices(&server.uri(), &ids).await.unwrap();
        assert_eq!(prices["matic-network"], Decimal::from_str("0.71").unwrap());
        assert_eq!(prices.len(), 2);
    }

    #[tokio::test]
    async fn failed_oracle_keeps_previous_reading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let feed = feed(1);
        feed.publish(LiveContext::new(U256::from(7)));
        let mut snapshot = ConfigSnapshot::default();
        snapshot.market = MarketSettings {
            gas_oracle_url: Some(server.uri()),
            ..Default::default()
        };
        feed.refresh(&snapshot).await;
        assert_eq!(feed.current().fast_gas_price, U256::from(7));
    }

    #[test]
    fn coins_without_feed_are_worth_one_dollar() {
        let coin = CoinEntry {
            symbol: "usdt".to_string(),
            address: Address::zero(),
            decimals: 6,
            price_id: None,
        };
        assert_eq!(LiveContext::default().price_of(&coin), Some(Decimal::ONE));
    }
}
