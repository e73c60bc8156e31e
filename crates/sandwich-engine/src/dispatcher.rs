//! Execução do sandwich: posse da carteira, montagem e assinatura das duas
//! pernas, envio e rastreamento dos recibos.
//!
//! ```text
//! Accepted -> WalletClaimed -> FrontrunBuilt -> FrontrunSubmitted
//!          -> BackrunBuilt -> BackrunSubmitted -> ReceiptPolled -> Settled
//! ```
//!
//! `Aborted` pode ser alcançado a partir de `Accepted` e de qualquer envio.
//! Os nonces das duas pernas são reservados juntos antes de qualquer I/O.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ethereum_types::{Address, H256, U256};
use ethers::types::{Bytes, TransactionReceipt};
use sandwich_core::traits::{SharedAuditSink, SharedConnector};
use sandwich_core::{
    Asset, AuditRecord, Error, LegKind, OrderRecord, OutboundRecord, ReceiptRecord, Result,
    TransactionHash, TxStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::approvals::PreApprovalScheduler;
use crate::dex::{backrun_calldata, frontrun_calldata, LegParams};
use crate::evaluator::Opportunity;
use crate::signer::{Keyring, LegRequest, SignedLeg};
use crate::wallet::{AllowanceKey, WalletStateCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Accepted,
    WalletClaimed,
    FrontrunBuilt,
    FrontrunSubmitted,
    BackrunBuilt,
    BackrunSubmitted,
    ReceiptPolled,
    Settled,
    Aborted,
}

/// Opções por tentativa, lidas do snapshot vigente
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub dry_run: bool,
    pub receipt_timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            receipt_timeout: Duration::from_secs(30),
        }
    }
}

/// Pernas assinadas de um ataque
#[derive(Debug, Clone)]
pub struct SandwichPlan {
    pub target_tx: TransactionHash,
    pub wallet: Address,
    pub router: Address,
    pub coin: Address,
    pub target: Address,
    pub frontrun_amount_in: U256,
    pub target_amount: U256,
    pub frontrun: SignedLeg,
    /// Ausente quando a montagem ou o envio do backrun falhou
    pub backrun: Option<SignedLeg>,
}

/// Resultado de `dispatch`
#[derive(Debug)]
pub struct DispatchReport {
    pub target_tx: TransactionHash,
    pub wallet: Address,
    pub stage: DispatchStage,
    pub frontrun: Option<H256>,
    pub backrun: Option<H256>,
    pub frontrun_nonce: u64,
    pub backrun_nonce: u64,
    pub dry_run: bool,
    /// Rastreador de recibos, quando algo foi enviado
    pub tracker: Option<JoinHandle<()>>,
}

struct DispatcherInner {
    connector: SharedConnector,
    cache: WalletStateCache,
    keyring: Arc<Keyring>,
    approvals: PreApprovalScheduler,
    audit: SharedAuditSink,
    /// Hashes cujo recibo já foi contabilizado
    settled: DashMap<H256, TxStatus>,
}

#[derive(Clone)]
pub struct SandwichDispatcher {
    inner: Arc<DispatcherInner>,
}

impl SandwichDispatcher {
    pub fn new(
        connector: SharedConnector,
        cache: WalletStateCache,
        keyring: Arc<Keyring>,
        approvals: PreApprovalScheduler,
        audit: SharedAuditSink,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                connector,
                cache,
                keyring,
                approvals,
                audit,
                settled: DashMap::new(),
            }),
        }
    }

    async fn audit(&self, record: AuditRecord) {
        let kind = record.kind();
        if let Err(e) = self.inner.audit.record(record).await {
            warn!(kind, error = %e, "falha ao registrar auditoria");
        }
    }

    async fn abort(&self, opp: &Opportunity, error: Error) -> Error {
        let tx = opp.intent.hash();
        info!(?tx, stage = ?DispatchStage::Aborted, reason = %error, "ataque abortado");
        self.audit(AuditRecord::reject(tx, Some(opp.intent.router()), error.to_string()))
            .await;
        error
    }

    /// Executa um ataque sobre uma oportunidade aceita
    pub async fn dispatch(&self, opp: Opportunity, options: DispatchOptions) -> Result<DispatchReport> {
        let cache = &self.inner.cache;
        let tx = opp.intent.hash();
        let router = opp.intent.router();
        debug!(?tx, stage = ?DispatchStage::Accepted);

        let Some(lease) = cache.try_claim_wallet() else {
            return Err(self.abort(&opp, Error::WalletUnavailable).await);
        };
        let wallet = lease.wallet();
        debug!(?tx, ?wallet, stage = ?DispatchStage::WalletClaimed);

        let allowance = cache
            .get_allowance(wallet, opp.coin.address, router)
            .unwrap_or_default();
        if allowance < opp.frontrun_amount_in {
            drop(lease);
            self.inner.approvals.trigger(wallet);
            let error = Error::InsufficientAllowance {
                have: allowance,
                need: opp.frontrun_amount_in,
            };
            return Err(self.abort(&opp, error).await);
        }

        let balance = cache
            .get_balance(wallet, Asset::Token(opp.coin.address))
            .unwrap_or_default();
        if balance < opp.frontrun_amount_in {
            drop(lease);
            let error = Error::InsufficientBalance {
                have: balance,
                need: opp.frontrun_amount_in,
            };
            return Err(self.abort(&opp, error).await);
        }

        let Some((front_nonce, back_nonce)) = cache.reserve_nonce_pair(wallet) else {
            drop(lease);
            return Err(self.abort(&opp, Error::Other(format!("nonce not synchronized for {wallet:?}"))).await);
        };

        let params = leg_params(&opp, wallet);
        let frontrun = match self.build_frontrun(&opp, &params, front_nonce).await {
            Ok(leg) => leg,
            Err(e) => {
                cache.invalidate_nonce(wallet);
                drop(lease);
                return Err(self.abort(&opp, e).await);
            }
        };
        debug!(?tx, ?wallet, front_nonce, back_nonce, stage = ?DispatchStage::FrontrunBuilt);

        let mut plan = SandwichPlan {
            target_tx: tx,
            wallet,
            router,
            coin: opp.coin.address,
            target: opp.target.address,
            frontrun_amount_in: opp.frontrun_amount_in,
            target_amount: opp.target_amount,
            frontrun,
            backrun: None,
        };
        let mut report = DispatchReport {
            target_tx: tx,
            wallet,
            stage: DispatchStage::FrontrunBuilt,
            frontrun: None,
            backrun: None,
            frontrun_nonce: front_nonce,
            backrun_nonce: back_nonce,
            dry_run: options.dry_run,
            tracker: None,
        };

        if options.dry_run {
            let backrun = self.build_backrun(&opp, &params, back_nonce).await;
            // os nonces reservados não foram usados
            cache.invalidate_nonce(wallet);
            drop(lease);
            let backrun = match backrun {
                Ok(leg) => leg,
                Err(e) => return Err(self.abort(&opp, e).await),
            };
            info!(
                ?tx,
                ?wallet,
                frontrun = ?plan.frontrun.hash,
                backrun = ?backrun.hash,
                "dry-run: pernas assinadas e não enviadas"
            );
            report.stage = DispatchStage::BackrunBuilt;
            self.audit(order_record(&opp, wallet, true)).await;
            return Ok(report);
        }

        if let Err(e) = self.inner.connector.submit(plan.frontrun.raw.clone()).await {
            cache.invalidate_nonce(wallet);
            drop(lease);
            return Err(self.abort(&opp, e).await);
        }
        report.frontrun = Some(plan.frontrun.hash);
        report.stage = DispatchStage::FrontrunSubmitted;
        info!(?tx, ?wallet, hash = ?plan.frontrun.hash, nonce = front_nonce, "frontrun enviado");
        // auditoria só depois do backrun e da liberação da carteira
        let mut records = vec![outbound_record(&plan, &plan.frontrun)];

        // o frontrun já está na mempool; falhas daqui em diante seguem para
        // o rastreamento
        let backrun = match self.build_backrun(&opp, &params, back_nonce).await {
            Ok(leg) => {
                report.stage = DispatchStage::BackrunBuilt;
                self.inner.connector.submit(leg.raw.clone()).await.map(|_| leg)
            }
            Err(e) => Err(e),
        };
        match backrun {
            Ok(leg) => {
                report.backrun = Some(leg.hash);
                report.stage = DispatchStage::BackrunSubmitted;
                info!(?tx, ?wallet, hash = ?leg.hash, nonce = back_nonce, "backrun enviado");
                records.push(outbound_record(&plan, &leg));
                plan.backrun = Some(leg);
            }
            Err(e) => {
                warn!(?tx, ?wallet, error = %e, "backrun abortado");
                cache.invalidate_nonce(wallet);
                records.push(AuditRecord::reject(tx, Some(router), format!("backrun aborted: {e}")));
            }
        }

        cache.invalidate_balances(
            wallet,
            &[Asset::Native, Asset::Token(plan.coin), Asset::Token(plan.target)],
        );
        lease.release();

        let dispatcher = self.clone();
        let timeout = options.receipt_timeout;
        report.tracker = Some(tokio::spawn(async move {
            dispatcher.track(plan, timeout).await;
        }));

        records.push(order_record(&opp, wallet, false));
        for record in records {
            self.audit(record).await;
        }
        Ok(report)
    }

    async fn build_frontrun(&self, opp: &Opportunity, params: &LegParams, nonce: u64) -> Result<SignedLeg> {
        let (method, data) = frontrun_calldata(
            params,
            opp.coin.address,
            opp.target.address,
            opp.target_amount,
            opp.frontrun_amount_in,
        )?;
        debug!(tx = ?opp.intent.hash(), method = method.name(), "frontrun montado");
        self.sign(LegKind::Frontrun, params.recipient, data, nonce, opp.frontrun_gas_tip, opp)
            .await
    }

    async fn build_backrun(&self, opp: &Opportunity, params: &LegParams, nonce: u64) -> Result<SignedLeg> {
        let (method, data) = backrun_calldata(params, opp.target.address, opp.coin.address, opp.target_amount)?;
        debug!(tx = ?opp.intent.hash(), method = method.name(), "backrun montado");
        self.sign(LegKind::Backrun, params.recipient, data, nonce, opp.backrun_gas_tip, opp)
            .await
    }

    async fn sign(
        &self,
        leg: LegKind,
        wallet: Address,
        data: Bytes,
        nonce: u64,
        gas_tip: U256,
        opp: &Opportunity,
    ) -> Result<SignedLeg> {
        let request = LegRequest {
            to: opp.intent.router(),
            data,
            nonce,
            gas_tip,
            fee_cap: opp.fee_cap,
            gas_limit: opp.gas_limit,
        };
        self.inner.keyring.sign(leg, wallet, &request).await
    }

    /// Frontrun, depois backrun, depois a alvo
    async fn track(&self, plan: SandwichPlan, timeout: Duration) {
        let cache = &self.inner.cache;
        let front = self.poll(plan.frontrun.hash, timeout).await;
        self.settle(
            plan.frontrun.hash,
            Some(plan.target_tx),
            Some(LegKind::Frontrun),
            front.as_ref(),
            Some((AllowanceKey::new(plan.wallet, plan.coin, plan.router), plan.frontrun_amount_in)),
        )
        .await;

        if let Some(backrun) = &plan.backrun {
            let back = self.poll(backrun.hash, timeout).await;
            self.settle(
                backrun.hash,
                Some(plan.target_tx),
                Some(LegKind::Backrun),
                back.as_ref(),
                Some((AllowanceKey::new(plan.wallet, plan.target, plan.router), plan.target_amount)),
            )
            .await;
        }

        let target = self.poll(plan.target_tx, timeout).await;
        self.settle(plan.target_tx, Some(plan.target_tx), None, target.as_ref(), None)
            .await;
        cache.invalidate_balances(plan.wallet, &[Asset::Token(plan.coin), Asset::Token(plan.target)]);
        debug!(tx = ?plan.target_tx, stage = ?DispatchStage::Settled);
    }

    async fn poll(&self, hash: H256, timeout: Duration) -> Option<TransactionReceipt> {
        match self.inner.connector.poll_receipt(hash, timeout).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(?hash, error = %e, "falha ao consultar recibo");
                None
            }
        }
    }

    /// Contabiliza um recibo uma única vez por hash. Retorna `false` se o
    /// hash já tinha sido contabilizado.
    pub async fn settle(
        &self,
        hash: H256,
        target_tx: Option<TransactionHash>,
        leg: Option<LegKind>,
        receipt: Option<&TransactionReceipt>,
        consumes: Option<(AllowanceKey, U256)>,
    ) -> bool {
        let status = match receipt {
            None => TxStatus::Unconfirmed,
            Some(r) if r.status.map_or(false, |s| s.as_u64() == 1) => TxStatus::Success,
            Some(_) => TxStatus::Failure,
        };
        if status == TxStatus::Unconfirmed {
            info!(?hash, ?leg, "recibo não apareceu no prazo");
        } else {
            match self.inner.settled.entry(hash) {
                Entry::Occupied(_) => {
                    debug!(?hash, "recibo já contabilizado");
                    return false;
                }
                Entry::Vacant(slot) => {
                    slot.insert(status);
                }
            }
            if status == TxStatus::Success {
                if let Some((key, amount)) = consumes {
                    self.inner.cache.consume_allowance(key, amount);
                }
            }
        }
        debug!(?hash, ?status, stage = ?DispatchStage::ReceiptPolled);
        self.audit(AuditRecord::Receipt(ReceiptRecord {
            hash,
            target_tx,
            leg,
            status,
            block_number: receipt.and_then(|r| r.block_number).map(|b| b.as_u64()),
            gas_used: receipt.and_then(|r| r.gas_used),
            timestamp: Utc::now(),
        }))
        .await;
        true
    }

    pub fn is_settled(&self, hash: &H256) -> bool {
        self.inner.settled.contains_key(hash)
    }
}

fn outbound_record(plan: &SandwichPlan, leg: &SignedLeg) -> AuditRecord {
    let (amount_in, amount_out) = match leg.leg {
        LegKind::Frontrun => (plan.frontrun_amount_in, plan.target_amount),
        _ => (plan.target_amount, U256::zero()),
    };
    AuditRecord::OutboundTransaction(OutboundRecord {
        target_tx: Some(plan.target_tx),
        leg: leg.leg,
        hash: leg.hash,
        wallet: leg.wallet,
        nonce: leg.nonce,
        gas_tip: leg.gas_tip,
        fee_cap: leg.fee_cap,
        amount_in,
        amount_out,
        timestamp: Utc::now(),
    })
}

fn order_record(opp: &Opportunity, wallet: Address, dry_run: bool) -> AuditRecord {
    let intent = &opp.intent;
    AuditRecord::Order(OrderRecord {
        target_tx: intent.hash(),
        router: intent.router(),
        dex: intent.dex_name().to_string(),
        method: intent.method().name().to_string(),
        token_in: intent.token_in(),
        token_out: intent.token_out(),
        amount_in: intent.amount_in().best(),
        amount_out: intent.amount_out().best(),
        frontrun_amount_in: opp.frontrun_amount_in,
        backrun_amount_in: opp.target_amount,
        gas_tip: intent.gas_tip(),
        wallet: Some(wallet),
        dry_run,
        timestamp: Utc::now(),
    })
}

fn leg_params(opp: &Opportunity, wallet: Address) -> LegParams {
    LegParams {
        kind: opp.intent.dex_kind(),
        recipient: wallet,
        deadline: U256::from(deadline_after(Utc::now().timestamp(), opp.deadline_minutes)),
        fee_tier: opp.fee_tier,
    }
}

/// Prazo em segundos unix, saturado
fn deadline_after(now: i64, minutes: u64) -> u64 {
    (now.max(0) as u64).saturating_add(minutes.saturating_mul(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_saturates() {
        assert_eq!(deadline_after(1_700_000_000, 5), 1_700_000_300);
        assert_eq!(deadline_after(-10, 1), 60);
        assert_eq!(deadline_after(1_700_000_000, u64::MAX), u64::MAX);
    }
}
