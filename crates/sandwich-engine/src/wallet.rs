//! Cache concorrente do estado das carteiras de ataque.
//!
//! Saldos e allowances ficam em mapas separados com chave composta, então
//! consultas de carteiras diferentes não disputam o mesmo lock. Nonces e o
//! marcador de ataque em andamento são atômicos. Nenhum lock é mantido
//! durante chamadas ao node.

use dashmap::{DashMap, DashSet};
use ethereum_types::{Address, U256};
use futures::future::join_all;
use parking_lot::RwLock;
use sandwich_core::traits::SharedConnector;
use sandwich_core::{Asset, Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chave de allowance: (dono, token, spender)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllowanceKey {
    pub wallet: Address,
    pub token: Address,
    pub router: Address,
}

impl AllowanceKey {
    pub fn new(wallet: Address, token: Address, router: Address) -> Self {
        Self { wallet, token, router }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RefreshKey {
    Balance(Address, Asset),
    Allowance(AllowanceKey),
    Nonce(Address),
}

#[derive(Debug, Default)]
struct NonceSlot {
    confirmed: AtomicU64,
    pending: AtomicU64,
    next: AtomicU64,
    synced: AtomicBool,
}

/// Libera a chave de refresh mesmo se a tarefa entrar em pânico
struct RefreshGuard {
    cache: WalletStateCache,
    key: RefreshKey,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.cache.inner.refreshing.remove(&self.key);
    }
}

struct CacheInner {
    connector: SharedConnector,
    /// Ordem de preferência na escolha de carteira
    wallets: Vec<Address>,
    in_flight: HashMap<Address, AtomicBool>,
    nonces: HashMap<Address, NonceSlot>,
    balances: DashMap<(Address, Asset), U256>,
    allowances: DashMap<AllowanceKey, U256>,
    tracked_tokens: RwLock<Vec<Address>>,
    tracked_routers: RwLock<Vec<Address>>,
    refreshing: DashSet<RefreshKey>,
    lookup_timeout: Duration,
}

/// Cache compartilhado; `clone` é barato
#[derive(Clone)]
pub struct WalletStateCache {
    inner: Arc<CacheInner>,
}

impl WalletStateCache {
    pub fn new(connector: SharedConnector, wallets: Vec<Address>, lookup_timeout: Duration) -> Self {
        let in_flight = wallets.iter().map(|w| (*w, AtomicBool::new(false))).collect();
        let nonces = wallets.iter().map(|w| (*w, NonceSlot::default())).collect();
        Self {
            inner: Arc::new(CacheInner {
                connector,
                wallets,
                in_flight,
                nonces,
                balances: DashMap::new(),
                allowances: DashMap::new(),
                tracked_tokens: RwLock::new(Vec::new()),
                tracked_routers: RwLock::new(Vec::new()),
                refreshing: DashSet::new(),
                lookup_timeout,
            }),
        }
    }

    pub fn wallets(&self) -> &[Address] {
        &self.inner.wallets
    }

    /// Define quais tokens e routers entram nos refreshes em lote
    pub fn track(&self, tokens: Vec<Address>, routers: Vec<Address>) {
        *self.inner.tracked_tokens.write() = tokens;
        *self.inner.tracked_routers.write() = routers;
    }

    // ---- leitura sem bloqueio ----

    /// Saldo em cache; ausente dispara refresh em segundo plano
    pub fn get_balance(&self, wallet: Address, asset: Asset) -> Option<U256> {
        let cached = self.inner.balances.get(&(wallet, asset)).map(|v| *v);
        if cached.is_none() {
            self.spawn_refresh(RefreshKey::Balance(wallet, asset));
        }
        cached
    }

    /// Allowance em cache; ausente dispara refresh em segundo plano
    pub fn get_allowance(&self, wallet: Address, token: Address, router: Address) -> Option<U256> {
        let key = AllowanceKey::new(wallet, token, router);
        let cached = self.inner.allowances.get(&key).map(|v| *v);
        if cached.is_none() {
            self.spawn_refresh(RefreshKey::Allowance(key));
        }
        cached
    }

    /// (confirmado, pendente); não sincronizado dispara sync em segundo plano
    pub fn get_nonce(&self, wallet: Address) -> Option<(u64, u64)> {
        let slot = self.inner.nonces.get(&wallet)?;
        if !slot.synced.load(Ordering::Acquire) {
            self.spawn_refresh(RefreshKey::Nonce(wallet));
            return None;
        }
        Some((slot.confirmed.load(Ordering::Acquire), slot.pending.load(Ordering::Acquire)))
    }

    fn spawn_refresh(&self, key: RefreshKey) {
        if !self.inner.refreshing.insert(key) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.inner.refreshing.remove(&key);
            return;
        };
        let guard = RefreshGuard {
            cache: self.clone(),
            key,
        };
        handle.spawn(async move {
            let cache = &guard.cache;
            let result = match key {
                RefreshKey::Balance(wallet, asset) => cache.refresh_balance(wallet, asset).await.map(|_| ()),
                RefreshKey::Allowance(k) => cache.refresh_allowance(k).await.map(|_| ()),
                RefreshKey::Nonce(wallet) => cache.sync_nonce(wallet).await.map(|_| ()),
            };
            if let Err(e) = result {
                debug!(?key, error = %e, "refresh preguiçoso falhou");
            }
        });
    }

    // ---- refresh ----

    async fn bounded<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.inner.lookup_timeout, fut)
            .await
            .map_err(|_| Error::DeadlineExceeded(format!("wallet lookup after {:?}", self.inner.lookup_timeout)))?
    }

    async fn refresh_balance(&self, wallet: Address, asset: Asset) -> Result<U256> {
        let connector = &self.inner.connector;
        let value = match asset {
            Asset::Native => self.bounded(connector.native_balance(wallet)).await?,
            Asset::Token(token) => self.bounded(connector.erc20_balance(token, wallet)).await?,
        };
        self.inner.balances.insert((wallet, asset), value);
        Ok(value)
    }

    async fn refresh_allowance(&self, key: AllowanceKey) -> Result<U256> {
        let value = self
            .bounded(self.inner.connector.erc20_allowance(key.token, key.wallet, key.router))
            .await?;
        self.inner.allowances.insert(key, value);
        Ok(value)
    }

    /// Atualiza saldo nativo e de cada token rastreado, uma consulta por
    /// par. Falhas parciais mantêm a entrada anterior. Retorna quantas
    /// entradas foram atualizadas.
    pub async fn refresh_balances(&self, wallet: Address) -> usize {
        let mut assets = vec![Asset::Native];
        assets.extend(self.inner.tracked_tokens.read().iter().map(|t| Asset::Token(*t)));

        let results = join_all(assets.iter().map(|asset| self.refresh_balance(wallet, *asset))).await;
        let mut updated = 0;
        for (asset, result) in assets.iter().zip(results) {
            match result {
                Ok(_) => updated += 1,
                Err(e) => warn!(?wallet, ?asset, error = %e, "saldo mantido em cache"),
            }
        }
        updated
    }

    /// Atualiza allowance de cada (token × router) rastreado
    pub async fn refresh_allowances(&self, wallet: Address) -> usize {
        let tokens = self.inner.tracked_tokens.read().clone();
        let routers = self.inner.tracked_routers.read().clone();
        let keys: Vec<AllowanceKey> = tokens
            .iter()
            .flat_map(|t| routers.iter().map(move |r| AllowanceKey::new(wallet, *t, *r)))
            .collect();

        let results = join_all(keys.iter().map(|k| self.refresh_allowance(*k))).await;
        let mut updated = 0;
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(_) => updated += 1,
                Err(e) => warn!(token = ?key.token, router = ?key.router, error = %e, "allowance mantida em cache"),
            }
        }
        updated
    }

    /// Refresh completo de todas as carteiras
    pub async fn refresh_all(&self) {
        let wallets = self.inner.wallets.clone();
        join_all(wallets.iter().map(|w| async move {
            let balances = self.refresh_balances(*w).await;
            let allowances = self.refresh_allowances(*w).await;
            if let Err(e) = self.sync_nonce(*w).await {
                warn!(wallet = ?w, error = %e, "falha ao sincronizar nonce");
            }
            info!(wallet = ?w, balances, allowances, "estado da carteira atualizado");
        }))
        .await;
    }

    // ---- nonces ----

    /// Lê nonce confirmado e pendente; o próximo utilizável é o pendente
    /// do node, ou o contador local se já estiver adiante
    pub async fn sync_nonce(&self, wallet: Address) -> Result<u64> {
        let slot = self
            .inner
            .nonces
            .get(&wallet)
            .ok_or_else(|| Error::NotFound(format!("wallet {wallet:?} is not managed")))?;
        let connector = &self.inner.connector;
        let (confirmed, pending) = futures::try_join!(
            self.bounded(connector.nonce(wallet)),
            self.bounded(connector.pending_nonce(wallet))
        )?;
        slot.confirmed.store(confirmed, Ordering::Release);
        slot.pending.store(pending, Ordering::Release);
        // após invalidação o contador volta ao pendente do node; fora isso
        // nunca recua abaixo do que já foi reservado
        let next = if slot.synced.load(Ordering::Acquire) {
            slot.next.fetch_max(pending, Ordering::AcqRel).max(pending)
        } else {
            slot.next.store(pending, Ordering::Release);
            pending
        };
        slot.synced.store(true, Ordering::Release);
        debug!(?wallet, confirmed, pending, next, "nonce sincronizado");
        Ok(next)
    }

    pub fn nonce_synced(&self, wallet: Address) -> bool {
        self.inner
            .nonces
            .get(&wallet)
            .map_or(false, |slot| slot.synced.load(Ordering::Acquire))
    }

    /// Força nova sincronização (ex.: envio falhou e deixou lacuna)
    pub fn invalidate_nonce(&self, wallet: Address) {
        if let Some(slot) = self.inner.nonces.get(&wallet) {
            slot.synced.store(false, Ordering::Release);
            self.spawn_refresh(RefreshKey::Nonce(wallet));
        }
    }

    /// Próximo nonce utilizável; só o dono do claim deve chamar
    pub fn advance_nonce(&self, wallet: Address) -> Option<u64> {
        let slot = self.inner.nonces.get(&wallet)?;
        if !slot.synced.load(Ordering::Acquire) {
            self.spawn_refresh(RefreshKey::Nonce(wallet));
            return None;
        }
        Some(slot.next.fetch_add(1, Ordering::AcqRel))
    }

    /// Reserva `(n, n + 1)` num único incremento atômico
    pub fn reserve_nonce_pair(&self, wallet: Address) -> Option<(u64, u64)> {
        let slot = self.inner.nonces.get(&wallet)?;
        if !slot.synced.load(Ordering::Acquire) {
            self.spawn_refresh(RefreshKey::Nonce(wallet));
            return None;
        }
        let first = slot.next.fetch_add(2, Ordering::AcqRel);
        Some((first, first + 1))
    }

    // ---- claim ----

    /// Marca a primeira carteira livre como em ataque
    pub fn try_claim_wallet(&self) -> Option<WalletLease> {
        self.inner
            .wallets
            .iter()
            .find_map(|w| self.try_claim(*w))
    }

    /// Marca uma carteira específica
    pub fn try_claim(&self, wallet: Address) -> Option<WalletLease> {
        let marker = self.inner.in_flight.get(&wallet)?;
        marker
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| WalletLease {
                wallet,
                cache: self.clone(),
                released: false,
            })
    }

    /// Limpa o marcador
    pub fn release_wallet(&self, wallet: Address) {
        if let Some(marker) = self.inner.in_flight.get(&wallet) {
            marker.store(false, Ordering::Release);
        }
    }

    pub fn is_claimed(&self, wallet: Address) -> bool {
        self.inner
            .in_flight
            .get(&wallet)
            .map_or(false, |m| m.load(Ordering::Acquire))
    }

    pub fn claimed_wallets(&self) -> Vec<Address> {
        self.inner
            .wallets
            .iter()
            .copied()
            .filter(|w| self.is_claimed(*w))
            .collect()
    }

    // ---- mutações pós-envio ----

    /// Remove saldos para que a próxima leitura venha do node
    pub fn invalidate_balances(&self, wallet: Address, assets: &[Asset]) {
        for asset in assets {
            self.inner.balances.remove(&(wallet, *asset));
            self.spawn_refresh(RefreshKey::Balance(wallet, *asset));
        }
    }

    /// Desconta o valor gasto de uma allowance
    pub fn consume_allowance(&self, key: AllowanceKey, amount: U256) {
        if let Some(mut entry) = self.inner.allowances.get_mut(&key) {
            *entry = entry.saturating_sub(amount);
        }
    }

    pub fn set_allowance(&self, key: AllowanceKey, amount: U256) {
        self.inner.allowances.insert(key, amount);
    }

    pub fn set_balance(&self, wallet: Address, asset: Asset, amount: U256) {
        self.inner.balances.insert((wallet, asset), amount);
    }

    /// Quantidade de entradas (saldos, allowances)
    pub fn entry_counts(&self) -> (usize, usize) {
        (self.inner.balances.len(), self.inner.allowances.len())
    }
}

/// Posse exclusiva de uma carteira; liberada no `drop`
pub struct WalletLease {
    wallet: Address,
    cache: WalletStateCache,
    released: bool,
}

impl std::fmt::Debug for WalletLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletLease")
            .field("wallet", &self.wallet)
            .field("released", &self.released)
            .finish()
    }
}

impl WalletLease {
    pub fn wallet(&self) -> Address {
        self.wallet
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.cache.release_wallet(self.wallet);
            self.released = true;
        }
    }
}

impl Drop for WalletLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}
