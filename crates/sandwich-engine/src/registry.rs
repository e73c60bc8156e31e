//! Registros somente-leitura derivados do snapshot de configuração.

use ethereum_types::Address;
use sandwich_core::DexKind;
use std::collections::{HashMap, HashSet};

use crate::config::{CoinEntry, ConfigSnapshot, DexEntry, TokenEntry};

/// Router -> família e nome
#[derive(Debug, Default, Clone)]
pub struct DexRegistry {
    by_router: HashMap<Address, DexEntry>,
}

impl DexRegistry {
    pub fn new(entries: &[DexEntry]) -> Self {
        let by_router = entries.iter().map(|d| (d.router, d.clone())).collect();
        Self { by_router }
    }

    /// `Address` compara bytes, então a caixa do hex não importa
    pub fn lookup(&self, router: &Address) -> Option<&DexEntry> {
        self.by_router.get(router)
    }

    pub fn kind_of(&self, router: &Address) -> Option<DexKind> {
        self.lookup(router).map(|d| d.kind)
    }

    pub fn routers(&self) -> Vec<Address> {
        self.by_router.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_router.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_router.is_empty()
    }
}

/// Moedas negociáveis, whitelist e blacklist
#[derive(Debug, Default, Clone)]
pub struct TokenRegistry {
    coins: HashMap<Address, CoinEntry>,
    whitelist: HashMap<Address, TokenEntry>,
    blacklist: HashSet<Address>,
}

impl TokenRegistry {
    pub fn new(coins: &[CoinEntry], whitelist: &[TokenEntry], blacklist: &[Address]) -> Self {
        let coins: HashMap<_, _> = coins.iter().map(|c| (c.address, c.clone())).collect();
        let mut blacklist: HashSet<Address> = blacklist.iter().copied().collect();
        // uma swap que compra uma moeda negociável nunca é alvo
        blacklist.extend(coins.keys().copied());
        Self {
            whitelist: whitelist.iter().map(|t| (t.address, t.clone())).collect(),
            coins,
            blacklist,
        }
    }

    pub fn is_blacklisted(&self, address: &Address) -> bool {
        self.blacklist.contains(address)
    }

    pub fn whitelisted(&self, address: &Address) -> Option<&TokenEntry> {
        self.whitelist.get(address)
    }

    pub fn coin(&self, address: &Address) -> Option<&CoinEntry> {
        self.coins.get(address)
    }

    pub fn coins(&self) -> impl Iterator<Item = &CoinEntry> {
        self.coins.values()
    }

    pub fn whitelist(&self) -> impl Iterator<Item = &TokenEntry> {
        self.whitelist.values()
    }

    /// Todos os tokens cujo saldo e allowance interessam às carteiras
    pub fn tracked_tokens(&self) -> Vec<Address> {
        let mut tokens: Vec<Address> = self.coins.keys().copied().collect();
        tokens.extend(self.whitelist.keys().copied());
        tokens.sort();
        tokens.dedup();
        tokens
    }
}

/// Par de registros trocado junto com o snapshot
#[derive(Debug, Default, Clone)]
pub struct Registries {
    pub dexes: DexRegistry,
    pub tokens: TokenRegistry,
}

impl Registries {
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        Self {
            dexes: DexRegistry::new(&snapshot.dexes),
            tokens: TokenRegistry::new(&snapshot.coins, &snapshot.whitelist, &snapshot.blacklist),
        }
    }
}
