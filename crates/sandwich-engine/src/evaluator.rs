//! Avaliação de oportunidades: pipeline de filtros seguido do
//! dimensionamento das duas pernas.
//!
//! O avaliador só lê o snapshot e o contexto de mercado. Nunca toca o
//! cache de carteiras.

use ethereum_types::U256;
use rust_decimal::Decimal;
use sandwich_core::traits::SharedAuditSink;
use sandwich_core::utils::{apply_percent, gwei_to_wei, wei_to_gwei};
use sandwich_core::AuditRecord;
use tracing::{debug, warn};

use crate::classifier::SwapIntent;
use crate::config::{ActiveConfig, CoinEntry, TokenEntry};
use crate::filters::{Candidate, FilterPipeline, Rejection, TradeSizeFilter};
use crate::market::LiveContext;

/// Entradas de dimensionamento de uma oportunidade aceita
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub intent: SwapIntent,
    pub coin: CoinEntry,
    pub target: TokenEntry,
    /// Valor da alvo em USD
    pub target_value: Decimal,
    /// Teto de moeda gasto no frontrun (unidades base)
    pub frontrun_amount_in: U256,
    /// Quantidade exata do contrato comprada e depois vendida (unidades base)
    pub target_amount: U256,
    /// Tip do frontrun em wei
    pub frontrun_gas_tip: U256,
    /// Tip do backrun em wei
    pub backrun_gas_tip: U256,
    /// Teto de taxa em wei
    pub fee_cap: U256,
    pub gas_limit: U256,
    pub fee_tier: u32,
    pub deadline_minutes: u64,
}

#[derive(Debug, Clone)]
pub enum Decision {
    Accept(Opportunity),
    Reject(Rejection),
}

impl Decision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Decision::Reject(r) => Some(r),
            Decision::Accept(_) => None,
        }
    }
}

/// `pct − pct × tolerance / 100`
pub fn output_share(usd_per_trade: Decimal, tolerance: Decimal) -> Decimal {
    usd_per_trade - usd_per_trade * tolerance / Decimal::ONE_HUNDRED
}

/// `tip × (1 + tolerance/100)` limitado a `max` (gwei)
pub fn attack_gas_fee(tip_gwei: Decimal, tolerance: Decimal, max: Decimal) -> Decimal {
    (tip_gwei * (Decimal::ONE + tolerance / Decimal::ONE_HUNDRED)).min(max)
}

/// `tip × exit/100` limitado a `max` (gwei)
pub fn exit_gas_fee(tip_gwei: Decimal, exit_percent: Decimal, max: Decimal) -> Decimal {
    (tip_gwei * exit_percent / Decimal::ONE_HUNDRED).min(max)
}

pub struct Evaluator {
    pipeline: FilterPipeline,
    audit: SharedAuditSink,
}

impl Evaluator {
    pub fn new(audit: SharedAuditSink) -> Self {
        Self::with_pipeline(FilterPipeline::standard(), audit)
    }

    pub fn with_pipeline(pipeline: FilterPipeline, audit: SharedAuditSink) -> Self {
        Self { pipeline, audit }
    }

    /// Avalia e registra a rejeição, quando houver
    pub async fn evaluate(&self, intent: &SwapIntent, live: &LiveContext, config: &ActiveConfig) -> Decision {
        let decision = self.decide(intent, live, config);
        if let Decision::Reject(rejection) = &decision {
            debug!(
                tx = ?intent.hash(),
                filter = rejection.filter,
                reason = %rejection.reason,
                "candidata rejeitada"
            );
            let record = AuditRecord::reject(intent.hash(), Some(intent.router()), rejection.reason.clone());
            if let Err(e) = self.audit.record(record).await {
                warn!(tx = ?intent.hash(), error = %e, "falha ao registrar rejeição");
            }
        }
        decision
    }

    /// Decisão sem efeitos colaterais
    pub fn decide(&self, intent: &SwapIntent, live: &LiveContext, config: &ActiveConfig) -> Decision {
        let candidate = Candidate { intent, config, live };
        if let Err(rejection) = self.pipeline.run(&candidate) {
            return Decision::Reject(rejection);
        }
        match size(&candidate) {
            Ok(opportunity) => Decision::Accept(opportunity),
            Err(reason) => Decision::Reject(Rejection::new("sizing", reason)),
        }
    }
}

fn size(c: &Candidate<'_>) -> Result<Opportunity, String> {
    let settings = &c.config.snapshot.settings;
    let tokens = &c.config.registries.tokens;
    let intent = c.intent;

    let coin = tokens
        .coin(&intent.token_in())
        .cloned()
        .ok_or_else(|| "coin is not supported".to_string())?;
    let target = tokens
        .whitelisted(&intent.target())
        .cloned()
        .ok_or_else(|| "contract is not in the whitelist".to_string())?;
    let target_value = TradeSizeFilter::target_value(c)?;

    let malformed = |e: sandwich_core::Error| format!("malformed tx: {e}");

    // pernas dimensionadas em unidades base, sem passar pela mantissa decimal
    let frontrun_amount_in = apply_percent(intent.amount_in().best(), settings.usd_per_trade);
    let share = output_share(settings.usd_per_trade, settings.amount_out_tolerance);
    let target_amount = apply_percent(intent.amount_out().best(), share);
    if frontrun_amount_in.is_zero() || target_amount.is_zero() {
        return Err("trade size rounds to zero".to_string());
    }

    let tip = wei_to_gwei(intent.gas_tip()).map_err(malformed)?;
    let frontrun_gas = attack_gas_fee(tip, settings.gas_tolerance, settings.gas_fee_max);
    let backrun_gas = exit_gas_fee(tip, settings.exit_gas, settings.gas_fee_max);

    Ok(Opportunity {
        intent: intent.clone(),
        frontrun_amount_in,
        target_amount,
        frontrun_gas_tip: gwei_to_wei(frontrun_gas).map_err(malformed)?,
        backrun_gas_tip: gwei_to_wei(backrun_gas).map_err(malformed)?,
        fee_cap: gwei_to_wei(settings.gas_fee_max).map_err(malformed)?,
        gas_limit: U256::from(settings.gas_limit),
        fee_tier: intent.fee_tier().unwrap_or(settings.default_fee_tier),
        deadline_minutes: settings.deadline_minutes,
        target_value,
        coin,
        target,
    })
}
