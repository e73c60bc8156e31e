//! Snapshot de configuração consumido pelo motor.
//!
//! O colaborador de administração grava um JSON; qualquer campo ausente
//! assume o valor padrão documentado em cada `Default`. O snapshot é
//! substituído por inteiro a cada recarga, nunca alterado parcialmente.

use ethereum_types::Address;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use sandwich_core::{DexKind, Error, Result};
use sandwich_rpc::{ChainKind, RpcConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::registry::Registries;

/// Configuração completa
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSnapshot {
    pub chain: ChainKind,
    pub nodes: NodeSettings,
    pub settings: TradeSettings,
    pub kill_switch: bool,
    /// Monta e assina as pernas sem enviá-las
    pub dry_run: bool,
    /// Usa envelope legado (EIP-155) em vez de EIP-1559
    pub legacy_transactions: bool,
    pub wallets: Vec<WalletCredential>,
    pub dexes: Vec<DexEntry>,
    /// Moedas negociáveis (lado de entrada do frontrun)
    pub coins: Vec<CoinEntry>,
    /// Contratos alvo permitidos
    pub whitelist: Vec<TokenEntry>,
    /// Contratos alvo proibidos
    pub blacklist: Vec<Address>,
    pub market: MarketSettings,
    pub audit: AuditSettings,
    pub runtime: RuntimeSettings,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            chain: ChainKind::Polygon,
            nodes: NodeSettings::default(),
            settings: TradeSettings::default(),
            kill_switch: false,
            dry_run: false,
            legacy_transactions: false,
            wallets: Vec::new(),
            dexes: Vec::new(),
            coins: Vec::new(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            market: MarketSettings::default(),
            audit: AuditSettings::default(),
            runtime: RuntimeSettings::default(),
        }
    }
}

impl ConfigSnapshot {
    /// Lê e valida um snapshot a partir de um arquivo JSON
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: ConfigSnapshot = serde_json::from_str(raw)
            .map_err(|e| Error::ConfigError(format!("invalid config: {e}")))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Regras que impediriam o motor de operar com segurança
    pub fn validate(&self) -> Result<()> {
        let s = &self.settings;
        if s.target_value_min > s.target_value_max {
            return Err(Error::ConfigError(format!(
                "target_value_min {} is greater than target_value_max {}",
                s.target_value_min, s.target_value_max
            )));
        }
        if s.usd_per_trade <= Decimal::ZERO {
            return Err(Error::ConfigError("usd_per_trade must be positive".to_string()));
        }
        if s.gas_fee_max <= Decimal::ZERO {
            return Err(Error::ConfigError("gas_fee_max must be positive".to_string()));
        }
        // limiar de reaprovação é draw_down - margin
        if s.draw_down <= s.draw_down_margin || s.draw_down_margin < Decimal::ZERO {
            return Err(Error::ConfigError(format!(
                "draw_down {} must be greater than draw_down_margin {}",
                s.draw_down, s.draw_down_margin
            )));
        }
        for coin in &self.coins {
            if coin.decimals > 28 {
                return Err(Error::ConfigError(format!("coin {} has unsupported decimals", coin.symbol)));
            }
        }
        for token in &self.whitelist {
            if token.decimals > 28 {
                return Err(Error::ConfigError(format!("token {} has unsupported decimals", token.name)));
            }
        }
        Ok(())
    }

    /// Configuração do conector derivada do snapshot
    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            chain: self.chain,
            ws_endpoints: self.nodes.ws.clone(),
            http_endpoints: self.nodes.http.clone(),
            lookup_timeout: self.runtime.lookup_timeout(),
            retry_delay: Duration::from_millis(self.runtime.subscription_backoff_ms),
            max_retries: self.runtime.subscription_max_retries,
            receipt_poll_interval: Duration::from_millis(self.runtime.receipt_poll_interval_ms),
        }
    }
}

/// Endpoints dos nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub ws: Vec<String>,
    /// Vazio deriva dos endpoints WebSocket
    pub http: Vec<String>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            ws: vec!["ws://localhost:8546".to_string()],
            http: Vec::new(),
        }
    }
}

/// Parâmetros de gas, dimensionamento e aprovação
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeSettings {
    /// Teto de taxa (gwei)
    pub gas_fee_max: Decimal,
    /// Limite de gas por perna
    pub gas_limit: u64,
    /// Orçamento de latência da busca da transação alvo (ms)
    #[serde(alias = "ttx_max_latency")]
    pub ttx_max_latency_ms: u64,
    /// Gas da saída como percentual do tip da alvo
    pub exit_gas: Decimal,
    /// Faixa aceita do valor da alvo (USD)
    pub target_value_min: Decimal,
    pub target_value_max: Decimal,
    /// Diferença máxima entre tip da alvo e gas rápido da rede (%)
    pub target_gas_markup_allowed: Decimal,
    /// Tamanho do frontrun como percentual do amountIn da alvo
    pub usd_per_trade: Decimal,
    /// Redução relativa aplicada a `usd_per_trade` no lado de saída (%)
    pub amount_out_tolerance: Decimal,
    /// Prazo das pernas (minutos)
    #[serde(alias = "deadline")]
    pub deadline_minutes: u64,
    /// Percentual do saldo mantido pré-aprovado
    pub draw_down: Decimal,
    /// Margem abaixo de `draw_down` que dispara nova aprovação
    pub draw_down_margin: Decimal,
    /// Acréscimo sobre o tip da alvo (%)
    pub gas_tolerance: Decimal,
    /// Aprovação fixa, em unidades inteiras, para contratos da whitelist
    pub contract_approval_amount: Decimal,
    /// Tier usado quando a alvo não informa taxa
    pub default_fee_tier: u32,
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            gas_fee_max: Decimal::from(500),
            gas_limit: 300_000,
            ttx_max_latency_ms: 280,
            exit_gas: Decimal::from(100),
            target_value_min: Decimal::from(40),
            target_value_max: Decimal::from(1_000),
            target_gas_markup_allowed: Decimal::from(70),
            usd_per_trade: Decimal::from(10),
            amount_out_tolerance: Decimal::from(10),
            deadline_minutes: 5,
            draw_down: Decimal::from(200),
            draw_down_margin: Decimal::from(10),
            gas_tolerance: Decimal::from(20),
            contract_approval_amount: Decimal::from(500_000_000u64),
            default_fee_tier: 500,
        }
    }
}

impl TradeSettings {
    pub fn ttx_budget(&self) -> Duration {
        Duration::from_millis(self.ttx_max_latency_ms)
    }
}

/// Credencial de carteira de ataque
#[derive(Clone, Serialize, Deserialize)]
pub struct WalletCredential {
    pub private_key: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl fmt::Debug for WalletCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletCredential")
            .field("label", &self.label)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Router registrado
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexEntry {
    pub name: String,
    pub kind: DexKind,
    pub router: Address,
}

/// Moeda negociável
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinEntry {
    pub symbol: String,
    pub address: Address,
    pub decimals: u32,
    /// Identificador no feed de preços; sem ele o preço é 1 USD
    #[serde(default)]
    pub price_id: Option<String>,
}

/// Contrato alvo com casas decimais
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    pub name: String,
    pub address: Address,
    pub decimals: u32,
}

/// Fontes de dados de mercado
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    /// URL completa do gas oracle; sem ela usa `eth_gasPrice`
    pub gas_oracle_url: Option<String>,
    /// Base do endpoint `simple/price`
    pub price_api_url: Option<String>,
    pub native_price_id: String,
    pub poll_interval_ms: u64,
    pub gas_cache_ttl_ms: u64,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            gas_oracle_url: None,
            price_api_url: None,
            native_price_id: "matic-network".to_string(),
            poll_interval_ms: 5_000,
            gas_cache_ttl_ms: 10_000,
        }
    }
}

/// Destino dos registros de auditoria
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// Sem endpoint os registros vão para o log
    pub endpoint: Option<String>,
}

/// Parâmetros operacionais
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub dedup_ttl_secs: u64,
    pub dedup_capacity: usize,
    pub subscription_backoff_ms: u64,
    pub subscription_max_retries: u32,
    pub lookup_timeout_ms: u64,
    pub receipt_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
    pub config_refresh_secs: u64,
    pub worker_restart_delay_ms: u64,
    pub worker_max_restarts: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            dedup_ttl_secs: 60,
            dedup_capacity: 100_000,
            subscription_backoff_ms: 2_000,
            subscription_max_retries: 10,
            lookup_timeout_ms: 5_000,
            receipt_timeout_secs: 30,
            receipt_poll_interval_ms: 100,
            config_refresh_secs: 30,
            worker_restart_delay_ms: 1_000,
            worker_max_restarts: 100,
        }
    }
}

impl RuntimeSettings {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

/// Snapshot vigente junto com os registros derivados dele
#[derive(Debug)]
pub struct ActiveConfig {
    pub snapshot: ConfigSnapshot,
    pub registries: Registries,
}

/// Guarda o snapshot vigente; leitores obtêm um `Arc` imutável
pub struct ConfigStore {
    current: RwLock<Arc<ActiveConfig>>,
    /// `--dry-run` da linha de comando vale também para recargas
    force_dry_run: bool,
}

impl ConfigStore {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        let registries = Registries::from_snapshot(&snapshot);
        Self {
            current: RwLock::new(Arc::new(ActiveConfig { snapshot, registries })),
            force_dry_run: false,
        }
    }

    pub fn with_forced_dry_run(snapshot: ConfigSnapshot) -> Self {
        let store = Self {
            force_dry_run: true,
            ..Self::new(ConfigSnapshot::default())
        };
        store.replace(snapshot);
        store
    }

    /// Snapshot vigente
    pub fn current(&self) -> Arc<ActiveConfig> {
        self.current.read().clone()
    }

    /// Substitui o snapshot inteiro
    pub fn replace(&self, mut snapshot: ConfigSnapshot) {
        snapshot.dry_run |= self.force_dry_run;
        let registries = Registries::from_snapshot(&snapshot);
        *self.current.write() = Arc::new(ActiveConfig { snapshot, registries });
    }

    /// Recarrega do arquivo; em caso de erro mantém o snapshot anterior
    pub fn reload_from(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = ConfigSnapshot::from_file(path)?;
        self.replace(snapshot);
        Ok(())
    }
}
