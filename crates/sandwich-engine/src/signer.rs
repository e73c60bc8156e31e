//! Chaves das carteiras de ataque e assinatura das pernas.

use ethereum_types::{Address, H256, U256};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, Eip1559TransactionRequest, TransactionRequest};
use ethers::utils::keccak256;
use sandwich_core::{Error, LegKind, Result};
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::WalletCredential;

/// Transação a assinar
#[derive(Debug, Clone)]
pub struct LegRequest {
    pub to: Address,
    pub data: Bytes,
    pub nonce: u64,
    pub gas_tip: U256,
    pub fee_cap: U256,
    pub gas_limit: U256,
}

/// Perna assinada pronta para envio
#[derive(Debug, Clone)]
pub struct SignedLeg {
    pub leg: LegKind,
    pub wallet: Address,
    pub nonce: u64,
    pub hash: H256,
    pub raw: Bytes,
    pub gas_tip: U256,
    pub fee_cap: U256,
}

/// Chaves carregadas na inicialização, na ordem da configuração
pub struct Keyring {
    order: Vec<Address>,
    wallets: HashMap<Address, LocalWallet>,
    chain_id: u64,
    legacy: bool,
}

impl Keyring {
    pub fn new(credentials: &[WalletCredential], chain_id: u64, legacy: bool) -> Result<Self> {
        let mut order = Vec::with_capacity(credentials.len());
        let mut wallets = HashMap::with_capacity(credentials.len());
        for (idx, cred) in credentials.iter().enumerate() {
            let key = cred.private_key.trim().trim_start_matches("0x");
            let wallet = LocalWallet::from_str(key)
                .map_err(|e| {
                    let label = cred.label.clone().unwrap_or_else(|| format!("#{idx}"));
                    Error::ConfigError(format!("invalid private key for wallet {label}: {e}"))
                })?
                .with_chain_id(chain_id);
            let address = wallet.address();
            if wallets.insert(address, wallet).is_none() {
                order.push(address);
            }
        }
        Ok(Self {
            order,
            wallets,
            chain_id,
            legacy,
        })
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.order.clone()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    fn envelope(&self, from: Address, req: &LegRequest) -> TypedTransaction {
        if self.legacy {
            TransactionRequest::new()
                .from(from)
                .to(req.to)
                .data(req.data.clone())
                .value(U256::zero())
                .nonce(req.nonce)
                .gas(req.gas_limit)
                .gas_price(req.gas_tip)
                .chain_id(self.chain_id)
                .into()
        } else {
            Eip1559TransactionRequest::new()
                .from(from)
                .to(req.to)
                .data(req.data.clone())
                .value(U256::zero())
                .nonce(req.nonce)
                .gas(req.gas_limit)
                .max_priority_fee_per_gas(req.gas_tip)
                .max_fee_per_gas(req.fee_cap)
                .chain_id(self.chain_id)
                .into()
        }
    }

    /// Assina sem tocar a rede
    pub async fn sign(&self, leg: LegKind, wallet: Address, req: &LegRequest) -> Result<SignedLeg> {
        let signer = self
            .wallets
            .get(&wallet)
            .ok_or_else(|| Error::SigningError(format!("no key loaded for {wallet:?}")))?;
        let tx = self.envelope(wallet, req);
        let signature = signer
            .sign_transaction(&tx)
            .await
            .map_err(|e| Error::SigningError(format!("failed to sign {leg}: {e}")))?;
        let raw = tx.rlp_signed(&signature);
        Ok(SignedLeg {
            leg,
            wallet,
            nonce: req.nonce,
            hash: H256::from(keccak256(&raw)),
            raw,
            gas_tip: req.gas_tip,
            fee_cap: if self.legacy { req.gas_tip } else { req.fee_cap },
        })
    }
}
