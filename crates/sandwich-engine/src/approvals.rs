//! Pré-aprovação de allowances das carteiras de ataque para os routers.
//!
//! Moedas negociáveis seguem a regra de draw-down sobre o saldo. Contratos
//! da whitelist recebem uma aprovação fixa, renovada quando cai abaixo da
//! metade.

use chrono::Utc;
use ethereum_types::{Address, U256};
use futures::future::join_all;
use rust_decimal::Decimal;
use sandwich_core::traits::{SharedAuditSink, SharedConnector};
use sandwich_core::utils::{apply_percent, from_decimal_units};
use sandwich_core::{
    Asset, AuditRecord, Error, LegKind, OutboundRecord, ReceiptRecord, Result, TxStatus,
};
use sandwich_rpc::erc20::encode_approve;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ConfigStore;
use crate::market::MarketFeed;
use crate::signer::{Keyring, LegRequest, SignedLeg};
use crate::wallet::{AllowanceKey, WalletStateCache};

/// Allowance mantida para `draw_down`% do saldo
pub fn draw_down_target(balance: U256, draw_down: Decimal) -> U256 {
    apply_percent(balance, draw_down)
}

/// `allowance / balance × 100 < draw_down − margin`; saldo zero nunca aprova
pub fn needs_draw_down(allowance: U256, balance: U256, draw_down: Decimal, margin: Decimal) -> bool {
    if balance.is_zero() {
        return false;
    }
    allowance < apply_percent(balance, draw_down - margin)
}

/// Aprovação fixa renovada abaixo da metade
pub fn needs_fixed_approval(allowance: U256, amount: U256) -> bool {
    allowance < amount / 2
}

/// Aprovação a enviar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalPlan {
    pub token: Address,
    pub router: Address,
    pub amount: U256,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApprovalReport {
    pub planned: usize,
    pub submitted: usize,
    pub confirmed: usize,
}

struct SchedulerInner {
    connector: SharedConnector,
    cache: WalletStateCache,
    keyring: Arc<Keyring>,
    config: Arc<ConfigStore>,
    market: Arc<MarketFeed>,
    audit: SharedAuditSink,
    in_progress: HashMap<Address, AtomicBool>,
    runs: AtomicUsize,
}

#[derive(Clone)]
pub struct PreApprovalScheduler {
    inner: Arc<SchedulerInner>,
}

impl PreApprovalScheduler {
    pub fn new(
        connector: SharedConnector,
        cache: WalletStateCache,
        keyring: Arc<Keyring>,
        config: Arc<ConfigStore>,
        market: Arc<MarketFeed>,
        audit: SharedAuditSink,
    ) -> Self {
        let in_progress = cache
            .wallets()
            .iter()
            .map(|w| (*w, AtomicBool::new(false)))
            .collect();
        Self {
            inner: Arc::new(SchedulerInner {
                connector,
                cache,
                keyring,
                config,
                market,
                audit,
                in_progress,
                runs: AtomicUsize::new(0),
            }),
        }
    }

    /// Quantas varreduras foram iniciadas
    pub fn runs(&self) -> usize {
        self.inner.runs.load(Ordering::Acquire)
    }

    pub fn is_running(&self, wallet: Address) -> bool {
        self.inner
            .in_progress
            .get(&wallet)
            .map_or(false, |f| f.load(Ordering::Acquire))
    }

    fn begin(&self, wallet: Address) -> bool {
        let Some(flag) = self.inner.in_progress.get(&wallet) else {
            return false;
        };
        let started = flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if started {
            self.inner.runs.fetch_add(1, Ordering::AcqRel);
        }
        started
    }

    fn finish(&self, wallet: Address) {
        if let Some(flag) = self.inner.in_progress.get(&wallet) {
            flag.store(false, Ordering::Release);
        }
    }

    /// Dispara a varredura em segundo plano. `false` quando já há uma em
    /// andamento para a carteira; nada é enviado nesse caso.
    pub fn trigger(&self, wallet: Address) -> bool {
        if !self.begin(wallet) {
            debug!(?wallet, "pré-aprovação já em andamento");
            return false;
        }
        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.ensure_approvals(wallet).await {
                warn!(?wallet, error = %e, "pré-aprovação falhou");
            }
            scheduler.finish(wallet);
        });
        true
    }

    /// Varredura de inicialização: sincroniza nonces e aprova tudo que faltar
    pub async fn sweep_all(&self) -> Result<()> {
        for wallet in self.inner.cache.wallets().to_vec() {
            if let Err(e) = self.inner.cache.sync_nonce(wallet).await {
                warn!(?wallet, error = %e, "falha ao sincronizar nonce na varredura");
            }
            if !self.begin(wallet) {
                continue;
            }
            let result = self.ensure_approvals(wallet).await;
            self.finish(wallet);
            match result {
                Ok(report) => info!(?wallet, ?report, "varredura de pré-aprovação concluída"),
                Err(e) => warn!(?wallet, error = %e, "varredura de pré-aprovação falhou"),
            }
        }
        Ok(())
    }

    /// Aprovações necessárias segundo o estado em cache
    pub fn plan(&self, wallet: Address) -> Result<Vec<ApprovalPlan>> {
        let active = self.inner.config.current();
        let settings = &active.snapshot.settings;
        let cache = &self.inner.cache;
        let routers = active.registries.dexes.routers();
        let mut plans = Vec::new();

        for coin in active.registries.tokens.coins() {
            let balance = cache
                .get_balance(wallet, Asset::Token(coin.address))
                .unwrap_or_default();
            if balance.is_zero() {
                continue;
            }
            for router in &routers {
                let allowance = cache
                    .get_allowance(wallet, coin.address, *router)
                    .unwrap_or_default();
                if needs_draw_down(allowance, balance, settings.draw_down, settings.draw_down_margin) {
                    plans.push(ApprovalPlan {
                        token: coin.address,
                        router: *router,
                        amount: draw_down_target(balance, settings.draw_down),
                    });
                }
            }
        }

        for target in active.registries.tokens.whitelist() {
            let amount = from_decimal_units(settings.contract_approval_amount, target.decimals)?;
            for router in &routers {
                let allowance = cache
                    .get_allowance(wallet, target.address, *router)
                    .unwrap_or_default();
                if needs_fixed_approval(allowance, amount) {
                    plans.push(ApprovalPlan {
                        token: target.address,
                        router: *router,
                        amount,
                    });
                }
            }
        }
        Ok(plans)
    }

    /// Atualiza o estado da carteira, envia as aprovações pendentes e
    /// aguarda os recibos
    pub async fn ensure_approvals(&self, wallet: Address) -> Result<ApprovalReport> {
        let cache = &self.inner.cache;
        cache.refresh_balances(wallet).await;
        cache.refresh_allowances(wallet).await;

        let plans = self.plan(wallet)?;
        let mut report = ApprovalReport {
            planned: plans.len(),
            ..Default::default()
        };
        if plans.is_empty() {
            return Ok(report);
        }

        let active = self.inner.config.current();
        let dry_run = active.snapshot.dry_run;
        let fee_cap = sandwich_core::utils::gwei_to_wei(active.snapshot.settings.gas_fee_max)?;
        let gas_limit = U256::from(active.snapshot.settings.gas_limit);
        let tip = self.approval_tip(fee_cap).await;

        let mut submitted: Vec<(ApprovalPlan, SignedLeg)> = Vec::new();
        {
            // nonce só avança com a carteira em posse exclusiva
            let lease = cache.try_claim(wallet).ok_or(Error::WalletUnavailable)?;
            if !cache.nonce_synced(wallet) {
                cache.sync_nonce(wallet).await?;
            }
            for plan in plans {
                let Some(nonce) = cache.advance_nonce(wallet) else {
                    warn!(?wallet, "nonce não sincronizado; aprovação adiada");
                    break;
                };
                let signed = match self.sign_approval(wallet, &plan, nonce, tip, fee_cap, gas_limit).await {
                    Ok(signed) => signed,
                    Err(e) => {
                        // o nonce reservado não será usado
                        warn!(?wallet, token = ?plan.token, error = %e, "falha ao assinar aprovação");
                        cache.invalidate_nonce(wallet);
                        break;
                    }
                };
                if dry_run {
                    info!(?wallet, token = ?plan.token, router = ?plan.router, amount = %plan.amount, "dry-run: aprovação não enviada");
                    continue;
                }
                match self.inner.connector.submit(signed.raw.clone()).await {
                    Ok(hash) => {
                        info!(?wallet, token = ?plan.token, router = ?plan.router, ?hash, "aprovação enviada");
                        self.audit_outbound(&plan, &signed).await;
                        submitted.push((plan, signed));
                    }
                    Err(e) => {
                        warn!(?wallet, token = ?plan.token, error = %e, "falha ao enviar aprovação");
                        cache.invalidate_nonce(wallet);
                        break;
                    }
                }
            }
            if dry_run {
                // nada foi enviado; devolve os nonces reservados
                cache.invalidate_nonce(wallet);
            }
            lease.release();
        }
        report.submitted = submitted.len();

        let timeout = active.snapshot.runtime.receipt_timeout();
        let outcomes = join_all(submitted.iter().map(|(plan, signed)| async move {
            let receipt = self.inner.connector.poll_receipt(signed.hash, timeout).await;
            (plan, signed, receipt)
        }))
        .await;

        for (plan, signed, receipt) in outcomes {
            let status = match receipt {
                Ok(Some(r)) if r.status.map_or(false, |s| s.as_u64() == 1) => {
                    cache.set_allowance(AllowanceKey::new(wallet, plan.token, plan.router), plan.amount);
                    report.confirmed += 1;
                    TxStatus::Success
                }
                Ok(Some(_)) => TxStatus::Failure,
                Ok(None) => TxStatus::Unconfirmed,
                Err(e) => {
                    warn!(hash = ?signed.hash, error = %e, "falha ao consultar recibo da aprovação");
                    TxStatus::Unconfirmed
                }
            };
            let record = AuditRecord::Receipt(ReceiptRecord {
                hash: signed.hash,
                target_tx: None,
                leg: Some(LegKind::Approval),
                status,
                block_number: None,
                gas_used: None,
                timestamp: Utc::now(),
            });
            if let Err(e) = self.inner.audit.record(record).await {
                warn!(error = %e, "falha ao registrar recibo da aprovação");
            }
        }
        Ok(report)
    }

    async fn sign_approval(
        &self,
        wallet: Address,
        plan: &ApprovalPlan,
        nonce: u64,
        gas_tip: U256,
        fee_cap: U256,
        gas_limit: U256,
    ) -> Result<SignedLeg> {
        let request = LegRequest {
            to: plan.token,
            data: encode_approve(plan.router, plan.amount)?,
            nonce,
            gas_tip,
            fee_cap,
            gas_limit,
        };
        self.inner.keyring.sign(LegKind::Approval, wallet, &request).await
    }

    async fn approval_tip(&self, fee_cap: U256) -> U256 {
        let fast = self.inner.market.current().fast_gas_price;
        let tip = if fast.is_zero() {
            self.inner.connector.gas_price().await.unwrap_or_default()
        } else {
            fast
        };
        tip.min(fee_cap)
    }

    async fn audit_outbound(&self, plan: &ApprovalPlan, signed: &SignedLeg) {
        let record = AuditRecord::OutboundTransaction(OutboundRecord {
            target_tx: None,
            leg: LegKind::Approval,
            hash: signed.hash,
            wallet: signed.wallet,
            nonce: signed.nonce,
            gas_tip: signed.gas_tip,
            fee_cap: signed.fee_cap,
            amount_in: plan.amount,
            amount_out: U256::zero(),
            timestamp: Utc::now(),
        });
        if let Err(e) = self.inner.audit.record(record).await {
            warn!(error = %e, "falha ao registrar aprovação");
        }
    }
}
