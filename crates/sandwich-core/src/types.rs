/*!
 * Sandwich Types
 *
 * Tipos comuns usados em toda a workspace
 */

use chrono::{DateTime, Utc};
use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Alias para hash de transação
pub type TransactionHash = H256;

/// Família de router suportada pelo registro de DEX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DexKind {
    /// Router de produto constante (Uniswap V2 e forks)
    #[serde(alias = "uniswapv2", alias = "v2")]
    UniswapV2,
    /// Router de liquidez concentrada com tiers de taxa
    #[serde(alias = "uniswapv3", alias = "v3")]
    UniswapV3,
    /// Router Algebra (QuickSwap V3), sem tier de taxa no path
    #[serde(alias = "quickswapv3", alias = "algebra")]
    QuickswapV3,
}

impl DexKind {
    /// Routers que recebem parâmetros em struct única
    pub fn is_concentrated(&self) -> bool {
        !matches!(self, DexKind::UniswapV2)
    }
}

impl fmt::Display for DexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DexKind::UniswapV2 => write!(f, "uniswap_v2"),
            DexKind::UniswapV3 => write!(f, "uniswap_v3"),
            DexKind::QuickswapV3 => write!(f, "quickswap_v3"),
        }
    }
}

impl FromStr for DexKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace(['_', '-', ' '], "");
        match normalized.as_str() {
            "uniswapv2" | "v2" | "sushiswap" | "quickswap" | "quickswapv2" => Ok(DexKind::UniswapV2),
            "uniswapv3" | "v3" => Ok(DexKind::UniswapV3),
            "quickswapv3" | "algebra" => Ok(DexKind::QuickswapV3),
            other => Err(Error::ConfigError(format!("unknown dex kind `{other}`"))),
        }
    }
}

/// Ativo cujo saldo é mantido em cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    Native,
    Token(Address),
}

/// Perna de um sandwich
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    Frontrun,
    Backrun,
    Approval,
}

impl fmt::Display for LegKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegKind::Frontrun => write!(f, "frontrun"),
            LegKind::Backrun => write!(f, "backrun"),
            LegKind::Approval => write!(f, "approval"),
        }
    }
}

/// Status de transação observado pelo rastreador de recibos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Success,
    Failure,
    /// Recibo não apareceu dentro do prazo
    Unconfirmed,
}

/// Registro de oportunidade aceita
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub target_tx: TransactionHash,
    pub router: Address,
    pub dex: String,
    pub method: String,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out: U256,
    pub frontrun_amount_in: U256,
    pub backrun_amount_in: U256,
    pub gas_tip: U256,
    pub wallet: Option<Address>,
    pub dry_run: bool,
    pub timestamp: DateTime<Utc>,
}

/// Registro de candidata rejeitada, malformada ou abortada
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectRecord {
    pub target_tx: TransactionHash,
    pub router: Option<Address>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Registro de uma perna enviada
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRecord {
    pub target_tx: Option<TransactionHash>,
    pub leg: LegKind,
    pub hash: TransactionHash,
    pub wallet: Address,
    pub nonce: u64,
    pub gas_tip: U256,
    pub fee_cap: U256,
    pub amount_in: U256,
    pub amount_out: U256,
    pub timestamp: DateTime<Utc>,
}

/// Recibo associado a uma perna ou à transação alvo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub hash: TransactionHash,
    pub target_tx: Option<TransactionHash>,
    pub leg: Option<LegKind>,
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub timestamp: DateTime<Utc>,
}

/// Projeção somente-escrita enviada ao colaborador de persistência
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    Order(OrderRecord),
    Reject(RejectRecord),
    OutboundTransaction(OutboundRecord),
    Receipt(ReceiptRecord),
}

impl AuditRecord {
    /// Atalho para rejeições com motivo legível
    pub fn reject(target_tx: TransactionHash, router: Option<Address>, reason: impl Into<String>) -> Self {
        AuditRecord::Reject(RejectRecord {
            target_tx,
            router,
            reason: reason.into(),
            timestamp: Utc::now(),
        })
    }

    /// Nome curto do tipo de registro
    pub fn kind(&self) -> &'static str {
        match self {
            AuditRecord::Order(_) => "order",
            AuditRecord::Reject(_) => "reject",
            AuditRecord::OutboundTransaction(_) => "outbound_transaction",
            AuditRecord::Receipt(_) => "receipt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dex_kind_accepts_registry_spellings() {
        assert_eq!("uniswapv2".parse::<DexKind>().unwrap(), DexKind::UniswapV2);
        assert_eq!("UniswapV3".parse::<DexKind>().unwrap(), DexKind::UniswapV3);
        assert_eq!("quickswap_v3".parse::<DexKind>().unwrap(), DexKind::QuickswapV3);
        assert!("curve".parse::<DexKind>().is_err());
    }

    #[test]
    fn audit_record_is_tagged() {
        let record = AuditRecord::reject(H256::zero(), None, "kill switch is on");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "reject");
        assert_eq!(json["reason"], "kill switch is on");
    }
}
