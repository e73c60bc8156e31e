//! Classificação de transações pendentes em intenções de swap.

use ethereum_types::{Address, U256};
use ethers::types::Transaction;
use sandwich_core::{DexKind, TransactionHash};
use tracing::{debug, warn};

use crate::dex::{decode_swap, AmountBounds, SwapMethod};
use crate::registry::DexRegistry;

/// Swap normalizada de uma transação alvo. Imutável após a classificação.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapIntent {
    hash: TransactionHash,
    sender: Address,
    router: Address,
    dex_name: String,
    dex_kind: DexKind,
    method: SwapMethod,
    amount_in: AmountBounds,
    amount_out: AmountBounds,
    path: Vec<Address>,
    fees: Vec<u32>,
    recipient: Address,
    deadline: Option<U256>,
    gas_tip: U256,
    gas_price: U256,
}

impl SwapIntent {
    pub fn hash(&self) -> TransactionHash {
        self.hash
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn router(&self) -> Address {
        self.router
    }

    pub fn dex_name(&self) -> &str {
        &self.dex_name
    }

    pub fn dex_kind(&self) -> DexKind {
        self.dex_kind
    }

    pub fn method(&self) -> SwapMethod {
        self.method
    }

    pub fn amount_in(&self) -> &AmountBounds {
        &self.amount_in
    }

    pub fn amount_out(&self) -> &AmountBounds {
        &self.amount_out
    }

    pub fn path(&self) -> &[Address] {
        &self.path
    }

    pub fn fees(&self) -> &[u32] {
        &self.fees
    }

    pub fn recipient(&self) -> Address {
        self.recipient
    }

    pub fn deadline(&self) -> Option<U256> {
        self.deadline
    }

    /// Tip de prioridade da alvo; para transações legadas é o gas price
    pub fn gas_tip(&self) -> U256 {
        self.gas_tip
    }

    pub fn gas_price(&self) -> U256 {
        self.gas_price
    }

    pub fn token_in(&self) -> Address {
        self.path[0]
    }

    pub fn token_out(&self) -> Address {
        self.path[self.path.len() - 1]
    }

    /// Contrato comprado/vendido pelo ataque: sempre o último hop
    pub fn target(&self) -> Address {
        self.token_out()
    }

    /// Primeiro tier de taxa informado pela alvo
    pub fn fee_tier(&self) -> Option<u32> {
        self.fees.first().copied()
    }

    /// Mais de dois tokens no path
    pub fn is_multi_hop(&self) -> bool {
        self.path.len() > 2
    }
}

/// Resultado da classificação
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Destino fora do registro ou seletor desconhecido
    NotASwap,
    Swap(SwapIntent),
    /// Seletor conhecido mas sem valores ou path utilizáveis
    Malformed { router: Address, reason: String },
}

/// Classifica uma transação contra o registro de routers
pub fn classify(tx: &Transaction, dexes: &DexRegistry) -> Classification {
    let Some(to) = tx.to else {
        return Classification::NotASwap;
    };
    let Some(dex) = dexes.lookup(&to) else {
        return Classification::NotASwap;
    };

    let decoded = match decode_swap(dex.kind, &tx.input, tx.value) {
        Ok(Some(decoded)) => decoded,
        Ok(None) => {
            let selector = tx.input.get(..4).map(|s| format!("0x{}", hex::encode(s)));
            debug!(tx = ?tx.hash, router = ?to, selector = ?selector, "seletor não reconhecido");
            return Classification::NotASwap;
        }
        Err(e) => {
            return Classification::Malformed {
                router: to,
                reason: format!("malformed tx: {e}"),
            }
        }
    };

    if decoded.path.len() > 2 {
        warn!(
            tx = ?tx.hash,
            hops = decoded.path.len(),
            "Probably bundled transaction"
        );
    }

    let gas_price = tx.gas_price.unwrap_or_default();
    Classification::Swap(SwapIntent {
        hash: tx.hash,
        sender: tx.from,
        router: to,
        dex_name: dex.name.clone(),
        dex_kind: dex.kind,
        method: decoded.method,
        amount_in: decoded.amount_in,
        amount_out: decoded.amount_out,
        path: decoded.path,
        fees: decoded.fees,
        recipient: decoded.recipient,
        deadline: decoded.deadline,
        gas_tip: tx.max_priority_fee_per_gas.unwrap_or(gas_price),
        gas_price,
    })
}
