//! Filtros encadeáveis aplicados a uma candidata a sandwich. Cada filtro
//! decide se a candidata segue no pipeline ou é rejeitada com um motivo
//! legível, que vai para a trilha de auditoria.

use rust_decimal::Decimal;
use sandwich_core::utils::{to_decimal_units, wei_to_gwei};

use crate::classifier::SwapIntent;
use crate::config::ActiveConfig;
use crate::market::LiveContext;

/// Tudo que um filtro pode consultar
#[derive(Clone, Copy)]
pub struct Candidate<'a> {
    pub intent: &'a SwapIntent,
    pub config: &'a ActiveConfig,
    pub live: &'a LiveContext,
}

/// Motivo de descarte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub filter: &'static str,
    pub reason: String,
}

impl Rejection {
    pub fn new(filter: &'static str, reason: impl Into<String>) -> Self {
        Self {
            filter,
            reason: reason.into(),
        }
    }
}

/// Trait para filtros de candidatas
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok` mantém a candidata no pipeline
    fn apply(&self, candidate: &Candidate<'_>) -> Result<(), String>;
}

/// Pipeline de filtros executados em sequência, parando na primeira rejeição
#[derive(Default)]
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self { filters: Vec::new() }
    }

    /// Ordem usada pelo motor
    pub fn standard() -> Self {
        Self::new()
            .push(KillSwitchFilter)
            .push(BlacklistFilter)
            .push(WhitelistFilter)
            .push(SupportedCoinFilter)
            .push(GasMarkupFilter)
            .push(TradeSizeFilter)
    }

    pub fn push<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn run(&self, candidate: &Candidate<'_>) -> Result<(), Rejection> {
        for f in &self.filters {
            f.apply(candidate).map_err(|reason| Rejection::new(f.name(), reason))?;
        }
        Ok(())
    }
}

/// Interrompe qualquer ataque
pub struct KillSwitchFilter;

impl Filter for KillSwitchFilter {
    fn name(&self) -> &'static str {
        "kill_switch"
    }

    fn apply(&self, c: &Candidate<'_>) -> Result<(), String> {
        if c.config.snapshot.kill_switch {
            return Err("kill switch is on".to_string());
        }
        Ok(())
    }
}

pub struct BlacklistFilter;

impl Filter for BlacklistFilter {
    fn name(&self) -> &'static str {
        "blacklist"
    }

    fn apply(&self, c: &Candidate<'_>) -> Result<(), String> {
        if c.config.registries.tokens.is_blacklisted(&c.intent.target()) {
            return Err("contract is in the blacklist".to_string());
        }
        Ok(())
    }
}

pub struct WhitelistFilter;

impl Filter for WhitelistFilter {
    fn name(&self) -> &'static str {
        "whitelist"
    }

    fn apply(&self, c: &Candidate<'_>) -> Result<(), String> {
        if c.config.registries.tokens.whitelisted(&c.intent.target()).is_none() {
            return Err("contract is not in the whitelist".to_string());
        }
        Ok(())
    }
}

/// O lado de entrada precisa ser uma moeda negociável
pub struct SupportedCoinFilter;

impl Filter for SupportedCoinFilter {
    fn name(&self) -> &'static str {
        "supported_coin"
    }

    fn apply(&self, c: &Candidate<'_>) -> Result<(), String> {
        if c.config.registries.tokens.coin(&c.intent.token_in()).is_none() {
            return Err("coin is not supported".to_string());
        }
        Ok(())
    }
}

/// Percentual de markup do tip da alvo sobre o gas rápido da rede
pub fn gas_markup_percent(tip_gwei: Decimal, fast_gwei: Decimal) -> Option<Decimal> {
    if tip_gwei.is_zero() {
        return None;
    }
    Some((tip_gwei - fast_gwei) / tip_gwei * Decimal::ONE_HUNDRED)
}

/// Alvo "quente" demais para ser superada com segurança
pub struct GasMarkupFilter;

impl Filter for GasMarkupFilter {
    fn name(&self) -> &'static str {
        "gas_markup"
    }

    fn apply(&self, c: &Candidate<'_>) -> Result<(), String> {
        let tip = wei_to_gwei(c.intent.gas_tip()).map_err(|e| format!("malformed tx: {e}"))?;
        let fast = wei_to_gwei(c.live.fast_gas_price).map_err(|e| format!("malformed tx: {e}"))?;
        let Some(markup) = gas_markup_percent(tip, fast) else {
            return Err("target transaction has no gas tip".to_string());
        };
        let allowed = c.config.snapshot.settings.target_gas_markup_allowed;
        if markup > allowed {
            return Err(format!(
                "gas price difference percentage {}% is greater than the target gas markup allowed {}%",
                markup.round_dp(2).normalize(),
                allowed.normalize()
            ));
        }
        Ok(())
    }
}

/// Valor em USD da entrada da alvo dentro da faixa configurada
pub struct TradeSizeFilter;

impl TradeSizeFilter {
    /// Valor em USD da alvo, usando o melhor limite de entrada conhecido
    pub fn target_value(c: &Candidate<'_>) -> Result<Decimal, String> {
        let amount_in = c.intent.amount_in().best();
        let amount_out = c.intent.amount_out().best();
        if amount_in.is_zero() && amount_out.is_zero() {
            return Err("malformed tx".to_string());
        }
        if amount_out.is_zero() {
            return Err("missing output amount".to_string());
        }
        let coin = c
            .config
            .registries
            .tokens
            .coin(&c.intent.token_in())
            .ok_or_else(|| "coin is not supported".to_string())?;
        let price = c
            .live
            .price_of(coin)
            .ok_or_else(|| format!("no price available for {}", coin.symbol))?;
        let units = to_decimal_units(amount_in, coin.decimals).map_err(|e| format!("malformed tx: {e}"))?;
        units
            .checked_mul(price)
            .ok_or_else(|| format!("target value overflows for {}", coin.symbol))
    }
}

impl Filter for TradeSizeFilter {
    fn name(&self) -> &'static str {
        "trade_size"
    }

    fn apply(&self, c: &Candidate<'_>) -> Result<(), String> {
        let value = Self::target_value(c)?;
        let settings = &c.config.snapshot.settings;
        if value < settings.target_value_min || value > settings.target_value_max {
            return Err(format!(
                "target value {} USD is outside the band [{}, {}]",
                value.round_dp(4).normalize(),
                settings.target_value_min.normalize(),
                settings.target_value_max.normalize()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_matches_reference_values() {
        let ten = gas_markup_percent(Decimal::from(50), Decimal::from(45)).unwrap();
        assert_eq!(ten, Decimal::from(10));
        let eighty = gas_markup_percent(Decimal::from(50), Decimal::from(10)).unwrap();
        assert_eq!(eighty, Decimal::from(80));
    }

    #[test]
    fn cheaper_target_has_negative_markup() {
        let markup = gas_markup_percent(Decimal::from(30), Decimal::from(45)).unwrap();
        assert!(markup < Decimal::ZERO);
    }

    #[test]
    fn zero_tip_has_no_markup() {
        assert!(gas_markup_percent(Decimal::ZERO, Decimal::from(45)).is_none());
    }

    #[test]
    fn standard_pipeline_has_every_rule() {
        assert!(FilterPipeline::new().is_empty());
        assert_eq!(FilterPipeline::standard().len(), 6);
    }
}
