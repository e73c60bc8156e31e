//! Montagem do motor: conecta classificador, avaliador e dispatcher ao
//! stream da mempool e registra os workers de fundo.

use async_trait::async_trait;
use ethers::types::Transaction;
use sandwich_core::traits::{SharedAuditSink, SharedConnector};
use sandwich_core::{AuditRecord, Error, Result, TransactionHash};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::approvals::PreApprovalScheduler;
use crate::classifier::{classify, Classification};
use crate::config::ConfigStore;
use crate::dispatcher::{DispatchOptions, DispatchReport, SandwichDispatcher};
use crate::evaluator::{Decision, Evaluator};
use crate::market::MarketFeed;
use crate::mempool::{HashHandler, MempoolScanner, SeenCache};
use crate::signer::Keyring;
use crate::supervisor::{RestartPolicy, Supervisor, WorkerKind};
use crate::wallet::WalletStateCache;

/// Destino de uma candidata
#[derive(Debug)]
pub enum Outcome {
    /// Não é swap em router registrado
    Ignored,
    /// Busca falhou, estourou o prazo ou a transação já foi minerada
    Skipped(String),
    Malformed(String),
    Rejected(String),
    Dispatched(DispatchReport),
    Aborted(Error),
}

#[derive(Debug, Default)]
pub struct EngineStats {
    pub fetched: AtomicU64,
    pub skipped: AtomicU64,
    pub swaps: AtomicU64,
    pub malformed: AtomicU64,
    pub rejected: AtomicU64,
    pub dispatched: AtomicU64,
    pub aborted: AtomicU64,
}

pub struct Engine {
    connector: SharedConnector,
    config: Arc<ConfigStore>,
    config_path: Option<PathBuf>,
    audit: SharedAuditSink,
    market: Arc<MarketFeed>,
    cache: WalletStateCache,
    evaluator: Evaluator,
    approvals: PreApprovalScheduler,
    dispatcher: SandwichDispatcher,
    stats: EngineStats,
}

impl Engine {
    /// Carrega as chaves e monta os componentes a partir do snapshot vigente
    pub fn new(connector: SharedConnector, config: Arc<ConfigStore>, audit: SharedAuditSink) -> Result<Self> {
        let active = config.current();
        let snapshot = &active.snapshot;
        let keyring = Arc::new(Keyring::new(
            &snapshot.wallets,
            snapshot.chain.chain_id(),
            snapshot.legacy_transactions,
        )?);
        let cache = WalletStateCache::new(
            connector.clone(),
            keyring.addresses(),
            snapshot.runtime.lookup_timeout(),
        );
        cache.track(active.registries.tokens.tracked_tokens(), active.registries.dexes.routers());

        let market = Arc::new(MarketFeed::new(connector.clone()));
        let approvals = PreApprovalScheduler::new(
            connector.clone(),
            cache.clone(),
            keyring.clone(),
            config.clone(),
            market.clone(),
            audit.clone(),
        );
        let dispatcher = SandwichDispatcher::new(
            connector.clone(),
            cache.clone(),
            keyring,
            approvals.clone(),
            audit.clone(),
        );
        info!(
            wallets = cache.wallets().len(),
            dexes = active.registries.dexes.len(),
            chain = ?snapshot.chain,
            "motor montado"
        );
        Ok(Self {
            evaluator: Evaluator::new(audit.clone()),
            connector,
            config,
            config_path: None,
            audit,
            market,
            cache,
            approvals,
            dispatcher,
            stats: EngineStats::default(),
        })
    }

    /// Arquivo relido periodicamente pelo worker de configuração
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn cache(&self) -> &WalletStateCache {
        &self.cache
    }

    pub fn market(&self) -> &Arc<MarketFeed> {
        &self.market
    }

    pub fn approvals(&self) -> &PreApprovalScheduler {
        &self.approvals
    }

    pub fn dispatcher(&self) -> &SandwichDispatcher {
        &self.dispatcher
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Busca a transação dentro do orçamento de latência e a processa
    pub async fn process_hash(&self, hash: TransactionHash) -> Outcome {
        let budget = self.config.current().snapshot.settings.ttx_budget();
        let fetched = self.connector.fetch_transaction(hash, budget).await;
        self.stats.fetched.fetch_add(1, Ordering::Relaxed);
        let tx = match fetched {
            Ok(Some((tx, true))) => tx,
            Ok(Some((_, false))) => return self.skip("already mined"),
            Ok(None) => return self.skip("transaction not found"),
            // prazo estourado: descarta sem tentar de novo
            Err(e) => return self.skip(&e.to_string()),
        };
        self.handle_transaction(&tx).await
    }

    fn skip(&self, reason: &str) -> Outcome {
        self.stats.skipped.fetch_add(1, Ordering::Relaxed);
        debug!(reason, "candidata descartada");
        Outcome::Skipped(reason.to_string())
    }

    /// Classifica, avalia e despacha uma transação pendente
    pub async fn handle_transaction(&self, tx: &Transaction) -> Outcome {
        let active = self.config.current();
        let intent = match classify(tx, &active.registries.dexes) {
            Classification::NotASwap => return Outcome::Ignored,
            Classification::Malformed { router, reason } => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(tx = ?tx.hash, ?router, %reason, "transação malformada");
                if let Err(e) = self.audit.record(AuditRecord::reject(tx.hash, Some(router), reason.clone())).await {
                    warn!(error = %e, "falha ao registrar transação malformada");
                }
                return Outcome::Malformed(reason);
            }
            Classification::Swap(intent) => intent,
        };
        self.stats.swaps.fetch_add(1, Ordering::Relaxed);

        let live = self.market.current();
        let opportunity = match self.evaluator.evaluate(&intent, &live, &active).await {
            Decision::Accept(opportunity) => opportunity,
            Decision::Reject(rejection) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                return Outcome::Rejected(rejection.reason);
            }
        };
        info!(
            tx = ?intent.hash(),
            dex = intent.dex_name(),
            method = intent.method().name(),
            value_usd = %opportunity.target_value,
            "oportunidade aceita"
        );

        let options = DispatchOptions {
            dry_run: active.snapshot.dry_run,
            receipt_timeout: active.snapshot.runtime.receipt_timeout(),
        };
        match self.dispatcher.dispatch(opportunity, options).await {
            Ok(report) => {
                self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
                Outcome::Dispatched(report)
            }
            Err(e) => {
                self.stats.aborted.fetch_add(1, Ordering::Relaxed);
                Outcome::Aborted(e)
            }
        }
    }

    /// Relê o arquivo de configuração, quando houver, e atualiza o que o
    /// cache de carteiras acompanha
    pub fn refresh_config(&self) -> Result<()> {
        if let Some(path) = &self.config_path {
            self.config.reload_from(path)?;
        }
        let active = self.config.current();
        self.cache
            .track(active.registries.tokens.tracked_tokens(), active.registries.dexes.routers());
        Ok(())
    }

    async fn config_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            let every = Duration::from_secs(self.config.current().snapshot.runtime.config_refresh_secs.max(1));
            tokio::select! {
                _ = tokio::time::sleep(every) => {}
                _ = shutdown.changed() => return Ok(()),
            }
            match self.refresh_config() {
                Ok(()) => debug!("configuração recarregada"),
                Err(e) => warn!(error = %e, "configuração mantida"),
            }
        }
    }

    async fn wallet_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            self.cache.refresh_all().await;
            let every = Duration::from_secs(self.config.current().snapshot.runtime.config_refresh_secs.max(1));
            tokio::select! {
                _ = tokio::time::sleep(every) => {}
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }

    /// Registra os workers de fundo no supervisor
    pub fn start(self: Arc<Self>) -> Supervisor {
        let runtime = self.config.current().snapshot.runtime.clone();
        let mut supervisor = Supervisor::new(RestartPolicy {
            delay: Duration::from_millis(runtime.worker_restart_delay_ms),
            max_restarts: runtime.worker_max_restarts,
        });

        let seen = SeenCache::new(runtime.dedup_capacity, Duration::from_secs(runtime.dedup_ttl_secs));
        let handler: Arc<dyn HashHandler> = self.clone();
        let scanner = Arc::new(MempoolScanner::new(seen, handler));

        let engine = self.clone();
        supervisor.spawn("pre-approval", WorkerKind::OneShot, move |_| {
            let approvals = engine.approvals.clone();
            async move { approvals.sweep_all().await }
        });

        let engine = self.clone();
        supervisor.spawn("mempool", WorkerKind::Service, move |shutdown| {
            let connector = engine.connector.clone();
            let scanner = scanner.clone();
            async move {
                let stream = connector.subscribe_pending().await?;
                info!("assinatura da mempool ativa");
                scanner.scan(stream, shutdown).await
            }
        });

        let engine = self.clone();
        supervisor.spawn("market", WorkerKind::Service, move |shutdown| {
            engine.market.clone().run(engine.config.clone(), shutdown)
        });

        let engine = self.clone();
        supervisor.spawn("config", WorkerKind::Service, move |shutdown| engine.clone().config_loop(shutdown));

        let engine = self;
        supervisor.spawn("wallet-state", WorkerKind::Service, move |shutdown| engine.clone().wallet_loop(shutdown));

        supervisor
    }
}

#[async_trait]
impl HashHandler for Engine {
    async fn handle(&self, hash: TransactionHash) {
        let outcome = self
            .process_hash(hash)
            .instrument(info_span!("candidate", tx = ?hash))
            .await;
        if let Outcome::Aborted(e) = &outcome {
            debug!(tx = ?hash, error = %e, "ataque abortado");
        }
    }
}
