use async_trait::async_trait;
use ethereum_types::{Address, U256};
use ethers::providers::{Middleware, ProviderError};
use ethers::types::{
    transaction::eip2718::TypedTransaction, BlockId, BlockNumber, Bytes, Transaction,
    TransactionReceipt, TransactionRequest,
};
use sandwich_core::traits::{ChainConnector, PendingStream};
use sandwich_core::{Error, Result, TransactionHash};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{erc20, subscription, RpcConfig, RpcConnectionPool};

/// Conector EVM sobre ethers
pub struct EvmChainClient {
    config: RpcConfig,
    pool: RpcConnectionPool,
}

impl EvmChainClient {
    /// Cria o conector. As conexões HTTP são abertas sob demanda.
    pub fn new(config: RpcConfig) -> Result<Self> {
        let pool = RpcConnectionPool::new(&config.effective_http_endpoints())?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn pool(&self) -> &RpcConnectionPool {
        &self.pool
    }

    /// Executa uma chamada com prazo, mapeando timeout para `DeadlineExceeded`
    async fn bounded<T, F>(&self, what: &str, budget: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ProviderError>>,
    {
        match tokio::time::timeout(budget, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::RpcError(format!("Falha em {what}: {e}"))),
            Err(_) => Err(Error::DeadlineExceeded(format!("{what} after {budget:?}"))),
        }
    }

    async fn call_uint(&self, to: Address, data: Bytes, signature: &str) -> Result<U256> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        let client = self.pool.get_client();
        let out = self
            .bounded("eth_call", self.config.lookup_timeout, client.call(&tx, None))
            .await?;
        erc20::decode_uint(signature, &out)
    }

    async fn transaction_count(&self, owner: Address, block: BlockNumber) -> Result<u64> {
        let client = self.pool.get_client();
        let count = self
            .bounded(
                "eth_getTransactionCount",
                self.config.lookup_timeout,
                client.get_transaction_count(owner, Some(BlockId::Number(block))),
            )
            .await?;
        Ok(count.low_u64())
    }
}

#[async_trait]
impl ChainConnector for EvmChainClient {
    async fn subscribe_pending(&self) -> Result<PendingStream> {
        subscription::open(
            self.config.ws_endpoints.clone(),
            self.config.lookup_timeout,
            self.config.retry_delay,
            self.config.max_retries,
        )
        .await
    }

    async fn fetch_transaction(
        &self,
        hash: TransactionHash,
        budget: Duration,
    ) -> Result<Option<(Transaction, bool)>> {
        let client = self.pool.get_client();
        let tx = self
            .bounded("eth_getTransactionByHash", budget, client.get_transaction(hash))
            .await?;
        Ok(tx.map(|tx| {
            let pending = tx.block_number.is_none();
            (tx, pending)
        }))
    }

    async fn submit(&self, raw: Bytes) -> Result<TransactionHash> {
        let client = self.pool.get_client();
        let result = match tokio::time::timeout(self.config.lookup_timeout, client.send_raw_transaction(raw)).await {
            Ok(Ok(pending)) => Ok(pending.tx_hash()),
            Ok(Err(e)) => Err(Error::SubmissionError(e.to_string())),
            Err(_) => Err(Error::SubmissionError(format!(
                "eth_sendRawTransaction timed out after {:?}",
                self.config.lookup_timeout
            ))),
        };
        result
    }

    async fn poll_receipt(
        &self,
        hash: TransactionHash,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(tx = ?hash, "recibo não encontrado dentro do prazo");
                return Ok(None);
            }
            let client = self.pool.get_client();
            match self
                .bounded("eth_getTransactionReceipt", remaining, client.get_transaction_receipt(hash))
                .await
            {
                Ok(Some(receipt)) => return Ok(Some(receipt)),
                Ok(None) => {}
                Err(e) => trace!(tx = ?hash, error = %e, "falha transitória ao consultar recibo"),
            }
            tokio::time::sleep(self.config.receipt_poll_interval.min(remaining)).await;
        }
    }

    async fn native_balance(&self, owner: Address) -> Result<U256> {
        let client = self.pool.get_client();
        self.bounded("eth_getBalance", self.config.lookup_timeout, client.get_balance(owner, None))
            .await
    }

    async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256> {
        self.call_uint(token, erc20::encode_balance_of(owner)?, erc20::BALANCE_OF)
            .await
    }

    async fn erc20_allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        self.call_uint(token, erc20::encode_allowance(owner, spender)?, erc20::ALLOWANCE)
            .await
    }

    async fn erc20_decimals(&self, token: Address) -> Result<u8> {
        let value = self
            .call_uint(token, erc20::encode_decimals()?, erc20::DECIMALS)
            .await?;
        u8::try_from(value.low_u64())
            .map_err(|_| Error::DecodeError(format!("decimals {value} out of range")))
    }

    async fn nonce(&self, owner: Address) -> Result<u64> {
        self.transaction_count(owner, BlockNumber::Latest).await
    }

    async fn pending_nonce(&self, owner: Address) -> Result<u64> {
        self.transaction_count(owner, BlockNumber::Pending).await
    }

    async fn gas_price(&self) -> Result<U256> {
        let client = self.pool.get_client();
        self.bounded("eth_gasPrice", self.config.lookup_timeout, client.get_gas_price())
            .await
    }

    fn chain_id(&self) -> u64 {
        self.config.chain.chain_id()
    }
}
