/*!
 * Sandwich RPC
 *
 * Conector para nodes EVM: assinatura da mempool via WebSocket, pool de
 * clientes HTTP para consultas pontuais e envio de transações assinadas.
 */

mod client;
pub mod erc20;
mod pool;
mod subscription;

pub use client::EvmChainClient;
pub use pool::{PoolStats, RpcConnectionPool};

use sandwich_core::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Redes suportadas. A escolha é feita na inicialização pela configuração.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    #[default]
    Polygon,
}

impl ChainKind {
    pub fn chain_id(&self) -> u64 {
        match self {
            ChainKind::Polygon => 137,
        }
    }
}

impl FromStr for ChainKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "polygon" | "matic" | "137" => Ok(ChainKind::Polygon),
            other => Err(Error::ConfigError(format!("unsupported chain `{other}`"))),
        }
    }
}

/// Configuração do conector
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub chain: ChainKind,
    /// Endpoints WebSocket usados para a assinatura da mempool
    pub ws_endpoints: Vec<String>,
    /// Endpoints HTTP usados para consultas e envio
    pub http_endpoints: Vec<String>,
    /// Prazo padrão das consultas pontuais
    pub lookup_timeout: Duration,
    /// Intervalo fixo entre tentativas de reassinatura
    pub retry_delay: Duration,
    /// Falhas consecutivas toleradas antes do sinal fatal
    pub max_retries: u32,
    /// Intervalo de polling de recibos
    pub receipt_poll_interval: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            chain: ChainKind::Polygon,
            ws_endpoints: vec!["ws://localhost:8546".to_string()],
            http_endpoints: Vec::new(),
            lookup_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(2),
            max_retries: 10,
            receipt_poll_interval: Duration::from_millis(100),
        }
    }
}

impl RpcConfig {
    /// Endpoints HTTP efetivos. Sem configuração explícita, deriva dos
    /// endpoints WebSocket (`wss://` -> `https://`).
    pub fn effective_http_endpoints(&self) -> Vec<String> {
        if !self.http_endpoints.is_empty() {
            return self.http_endpoints.clone();
        }
        self.ws_endpoints
            .iter()
            .map(|url| {
                if let Some(rest) = url.strip_prefix("wss://") {
                    format!("https://{rest}")
                } else if let Some(rest) = url.strip_prefix("ws://") {
                    format!("http://{rest}")
                } else {
                    url.clone()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_endpoints_derive_from_ws() {
        let cfg = RpcConfig {
            ws_endpoints: vec![
                "wss://polygon.node/abc".to_string(),
                "ws://127.0.0.1:8546".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(
            cfg.effective_http_endpoints(),
            vec!["https://polygon.node/abc".to_string(), "http://127.0.0.1:8546".to_string()]
        );
    }

    #[test]
    fn explicit_http_endpoints_win() {
        let cfg = RpcConfig {
            http_endpoints: vec!["https://rpc.example".to_string()],
            ..Default::default()
        };
        assert_eq!(cfg.effective_http_endpoints(), vec!["https://rpc.example".to_string()]);
    }

    #[test]
    fn polygon_chain_id() {
        assert_eq!("polygon".parse::<ChainKind>().unwrap().chain_id(), 137);
        assert!("solana".parse::<ChainKind>().is_err());
    }
}
