#![allow(dead_code)]

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Bytes, Transaction, TransactionReceipt, U64};
use ethers::utils::keccak256;
use ethereum_types::{Address, H256, U256};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sandwich_core::traits::{AuditSink, ChainConnector, PendingStream};
use sandwich_core::{AuditRecord, DexKind, Error, Result};
use sandwich_engine::config::{CoinEntry, ConfigSnapshot, DexEntry, TokenEntry, WalletCredential};
use sandwich_engine::dex::{encode_packed_path, SwapMethod};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

// chaves públicas de desenvolvimento do hardhat/anvil
pub const KEY_A: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const KEY_B: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub fn wallet_a() -> Address {
    Address::from_str("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap()
}

pub fn wallet_b() -> Address {
    Address::from_str("0x70997970c51812dc3a010c7d01b50e0d17dc79c8").unwrap()
}

pub fn usdt() -> Address {
    Address::repeat_byte(0x11)
}

pub fn target() -> Address {
    Address::repeat_byte(0x22)
}

pub fn other_token() -> Address {
    Address::repeat_byte(0x33)
}

pub fn router_v2() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn router_v3() -> Address {
    Address::repeat_byte(0xa2)
}

pub fn router_algebra() -> Address {
    Address::repeat_byte(0xa3)
}

pub fn gwei(v: u64) -> U256 {
    U256::from(v) * U256::exp10(9)
}

/// Snapshot com USDT negociável, um alvo na whitelist e três routers
pub fn snapshot(keys: &[&str]) -> ConfigSnapshot {
    let mut snapshot = ConfigSnapshot::default();
    snapshot.wallets = keys
        .iter()
        .map(|k| WalletCredential {
            private_key: k.to_string(),
            label: None,
        })
        .collect();
    snapshot.dexes = vec![
        DexEntry { name: "quickswap".to_string(), kind: DexKind::UniswapV2, router: router_v2() },
        DexEntry { name: "uniswap".to_string(), kind: DexKind::UniswapV3, router: router_v3() },
        DexEntry { name: "quickswap-v3".to_string(), kind: DexKind::QuickswapV3, router: router_algebra() },
    ];
    snapshot.coins = vec![CoinEntry {
        symbol: "usdt".to_string(),
        address: usdt(),
        decimals: 6,
        price_id: None,
    }];
    snapshot.whitelist = vec![TokenEntry {
        name: "planetix".to_string(),
        address: target(),
        decimals: 18,
    }];
    // 1 USDT cabe na faixa
    snapshot.settings.target_value_min = Decimal::from_str("0.5").unwrap();
    snapshot.settings.target_value_max = Decimal::from(1_000);
    snapshot.runtime.receipt_timeout_secs = 1;
    snapshot
}

pub fn pending_tx(hash: H256, router: Address, input: Bytes, tip: U256) -> Transaction {
    Transaction {
        hash,
        from: Address::repeat_byte(0x99),
        to: Some(router),
        input,
        value: U256::zero(),
        gas: U256::from(250_000),
        gas_price: Some(tip),
        max_priority_fee_per_gas: Some(tip),
        max_fee_per_gas: Some(tip * 2),
        block_number: None,
        ..Default::default()
    }
}

pub fn encode(method: SwapMethod, args: &[Token]) -> Bytes {
    Bytes::from(method.function().unwrap().encode_input(args).unwrap())
}

/// `swapExactTokensForTokens(amount_in, amount_out_min, path, to, deadline)`
pub fn v2_exact_in(amount_in: U256, amount_out_min: U256, path: &[Address]) -> Bytes {
    encode(
        SwapMethod::SwapExactTokensForTokens,
        &[
            Token::Uint(amount_in),
            Token::Uint(amount_out_min),
            Token::Array(path.iter().map(|a| Token::Address(*a)).collect()),
            Token::Address(Address::repeat_byte(0x99)),
            Token::Uint(U256::from(1_900_000_000u64)),
        ],
    )
}

pub fn v3_exact_input_single(token_in: Address, token_out: Address, fee: u32, amount_in: U256, min_out: U256) -> Bytes {
    encode(
        SwapMethod::ExactInputSingle,
        &[Token::Tuple(vec![
            Token::Address(token_in),
            Token::Address(token_out),
            Token::Uint(U256::from(fee)),
            Token::Address(Address::repeat_byte(0x99)),
            Token::Uint(U256::from(1_900_000_000u64)),
            Token::Uint(amount_in),
            Token::Uint(min_out),
            Token::Uint(U256::zero()),
        ])],
    )
}

/// `exactOutput` com path empacotado no sentido tokenOut -> tokenIn
pub fn v3_exact_output(tokens_out_to_in: &[Address], fees: &[u32], amount_out: U256, max_in: U256) -> Bytes {
    encode(
        SwapMethod::ExactOutput,
        &[Token::Tuple(vec![
            Token::Bytes(encode_packed_path(tokens_out_to_in, fees)),
            Token::Address(Address::repeat_byte(0x99)),
            Token::Uint(U256::from(1_900_000_000u64)),
            Token::Uint(amount_out),
            Token::Uint(max_in),
        ])],
    )
}

pub fn algebra_exact_input_single(token_in: Address, token_out: Address, amount_in: U256, min_out: U256) -> Bytes {
    encode(
        SwapMethod::AlgebraExactInputSingle,
        &[Token::Tuple(vec![
            Token::Address(token_in),
            Token::Address(token_out),
            Token::Address(Address::repeat_byte(0x99)),
            Token::Uint(U256::from(1_900_000_000u64)),
            Token::Uint(amount_in),
            Token::Uint(min_out),
            Token::Uint(U256::zero()),
        ])],
    )
}

#[derive(Default)]
pub struct MockState {
    pub transactions: HashMap<H256, (Transaction, bool)>,
    pub native: HashMap<Address, U256>,
    /// (token, dono)
    pub balances: HashMap<(Address, Address), U256>,
    /// (token, dono, spender)
    pub allowances: HashMap<(Address, Address, Address), U256>,
    pub nonces: HashMap<Address, u64>,
    pub pending_nonces: HashMap<Address, u64>,
    pub gas_price: U256,
    pub receipts: HashMap<H256, TransactionReceipt>,
    /// Todo hash enviado recebe recibo de sucesso
    pub auto_receipts: bool,
    pub submitted: Vec<Bytes>,
    pub fail_submit: bool,
    /// Falha só a n-ésima tentativa de envio (1 = primeira)
    pub fail_submit_at: Option<usize>,
    /// Instante de cada envio aceito
    pub submit_times: Vec<Instant>,
    pub lookup_delay: Duration,
    /// Consultas entram em pânico
    pub panic_lookups: bool,
}

/// Conector em memória
#[derive(Default)]
pub struct MockConnector {
    pub state: Mutex<MockState>,
    pub calls: AtomicUsize,
    pub submit_attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nonce(self, wallet: Address, nonce: u64) -> Self {
        {
            let mut state = self.state.lock();
            state.nonces.insert(wallet, nonce);
            state.pending_nonces.insert(wallet, nonce);
        }
        self
    }

    pub fn submitted(&self) -> Vec<Bytes> {
        self.state.lock().submitted.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn lookup(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, panics) = {
            let state = self.state.lock();
            (state.lookup_delay, state.panic_lookups)
        };
        if panics {
            panic!("lookup panicked");
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

pub fn success_receipt(hash: H256) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: hash,
        status: Some(U64::from(1)),
        block_number: Some(U64::from(100)),
        gas_used: Some(U256::from(120_000)),
        ..Default::default()
    }
}

#[async_trait]
impl ChainConnector for MockConnector {
    async fn subscribe_pending(&self) -> Result<PendingStream> {
        Err(Error::ConnectionError("mock has no subscription".to_string()))
    }

    async fn fetch_transaction(&self, hash: H256, _budget: Duration) -> Result<Option<(Transaction, bool)>> {
        self.lookup().await;
        Ok(self.state.lock().transactions.get(&hash).cloned())
    }

    async fn submit(&self, raw: Bytes) -> Result<H256> {
        let attempt = self.submit_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock();
        if state.fail_submit || state.fail_submit_at == Some(attempt) {
            return Err(Error::SubmissionError("nonce too low".to_string()));
        }
        let hash = H256::from(keccak256(&raw));
        if state.auto_receipts {
            state.receipts.insert(hash, success_receipt(hash));
        }
        state.submitted.push(raw);
        state.submit_times.push(Instant::now());
        Ok(hash)
    }

    async fn poll_receipt(&self, hash: H256, _timeout: Duration) -> Result<Option<TransactionReceipt>> {
        Ok(self.state.lock().receipts.get(&hash).cloned())
    }

    async fn native_balance(&self, owner: Address) -> Result<U256> {
        self.lookup().await;
        Ok(self.state.lock().native.get(&owner).copied().unwrap_or_default())
    }

    async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256> {
        self.lookup().await;
        Ok(self.state.lock().balances.get(&(token, owner)).copied().unwrap_or_default())
    }

    async fn erc20_allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        self.lookup().await;
        Ok(self
            .state
            .lock()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn erc20_decimals(&self, _token: Address) -> Result<u8> {
        Ok(18)
    }

    async fn nonce(&self, owner: Address) -> Result<u64> {
        self.lookup().await;
        Ok(self.state.lock().nonces.get(&owner).copied().unwrap_or_default())
    }

    async fn pending_nonce(&self, owner: Address) -> Result<u64> {
        self.lookup().await;
        Ok(self.state.lock().pending_nonces.get(&owner).copied().unwrap_or_default())
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(self.state.lock().gas_price)
    }

    fn chain_id(&self) -> u64 {
        137
    }
}

/// Guarda tudo que foi auditado
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<AuditRecord>>,
    delay: Duration,
}

impl RecordingSink {
    /// Sink que demora `delay` em cada registro
    pub fn slow(delay: Duration) -> Self {
        Self {
            records: Mutex::default(),
            delay,
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn reject_reasons(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                AuditRecord::Reject(r) => Some(r.reason),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.records().iter().filter(|r| r.kind() == kind).count()
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.records.lock().push(record);
        Ok(())
    }
}
