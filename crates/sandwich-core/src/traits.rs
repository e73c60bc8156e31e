/*!
 * Sandwich Traits
 *
 * Capacidades consumidas pelo motor. Cada rede suportada fornece uma
 * implementação de `ChainConnector`.
 */

use async_trait::async_trait;
use ethereum_types::{Address, U256};
use ethers::types::{Bytes, Transaction, TransactionReceipt};
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::types::{AuditRecord, TransactionHash};

/// Stream de hashes pendentes. Um item `Err` fatal encerra a assinatura.
pub type PendingStream = BoxStream<'static, Result<TransactionHash>>;

/// Conector compartilhado entre os componentes
pub type SharedConnector = Arc<dyn ChainConnector>;

/// Acesso ao node: assinatura da mempool, consultas pontuais e envio
#[async_trait]
pub trait ChainConnector: Send + Sync {
    /// Abre a assinatura de transações pendentes
    async fn subscribe_pending(&self) -> Result<PendingStream>;

    /// Busca uma transação dentro do orçamento de latência.
    /// Retorna a transação e se ela ainda está pendente.
    async fn fetch_transaction(
        &self,
        hash: TransactionHash,
        budget: Duration,
    ) -> Result<Option<(Transaction, bool)>>;

    /// Envia uma transação assinada
    async fn submit(&self, raw: Bytes) -> Result<TransactionHash>;

    /// Aguarda o recibo; `None` quando o prazo expira
    async fn poll_receipt(
        &self,
        hash: TransactionHash,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>>;

    /// Saldo nativo
    async fn native_balance(&self, owner: Address) -> Result<U256>;

    /// `balanceOf(owner)` de um ERC-20
    async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256>;

    /// `allowance(owner, spender)` de um ERC-20
    async fn erc20_allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;

    /// `decimals()` de um ERC-20
    async fn erc20_decimals(&self, token: Address) -> Result<u8>;

    /// Nonce confirmado (bloco mais recente)
    async fn nonce(&self, owner: Address) -> Result<u64>;

    /// Nonce considerando transações pendentes
    async fn pending_nonce(&self, owner: Address) -> Result<u64>;

    /// Preço de gas sugerido pelo node, em wei
    async fn gas_price(&self) -> Result<U256>;

    /// Chain id da rede selecionada
    fn chain_id(&self) -> u64;
}

/// Destino dos registros de auditoria
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Registra um evento; falhas não devem interromper o pipeline
    async fn record(&self, record: AuditRecord) -> Result<()>;
}

/// Sink compartilhado entre os componentes
pub type SharedAuditSink = Arc<dyn AuditSink>;
