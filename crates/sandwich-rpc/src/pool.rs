use ethers::providers::{Http, Provider};
use sandwich_core::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Pool de clientes HTTP com seleção round-robin
pub struct RpcConnectionPool {
    clients: Vec<Arc<Provider<Http>>>,
    endpoints: Vec<String>,
    current_index: AtomicUsize,
}

impl RpcConnectionPool {
    /// Cria o pool. Nenhuma conexão é aberta aqui; o transporte HTTP
    /// conecta sob demanda.
    pub fn new(endpoints: &[String]) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::ConfigError("no http endpoint configured".to_string()));
        }
        let mut clients = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let provider = Provider::<Http>::try_from(endpoint.as_str())
                .map_err(|e| Error::ConfigError(format!("invalid endpoint {endpoint}: {e}")))?;
            clients.push(Arc::new(provider));
        }
        Ok(Self {
            clients,
            endpoints: endpoints.to_vec(),
            current_index: AtomicUsize::new(0),
        })
    }

    /// Obtém o próximo cliente do pool (round-robin)
    pub fn get_client(&self) -> Arc<Provider<Http>> {
        let index = self.next_index();
        self.clients[index].clone()
    }

    fn next_index(&self) -> usize {
        self.current_index.fetch_add(1, Ordering::Relaxed) % self.clients.len()
    }

    /// Endpoint que será usado na próxima chamada (sem avançar o cursor)
    pub fn peek_endpoint(&self) -> &str {
        let index = self.current_index.load(Ordering::Relaxed) % self.clients.len();
        &self.endpoints[index]
    }

    /// Obtém estatísticas do pool
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            total_clients: self.clients.len(),
            requests_routed: self.current_index.load(Ordering::Relaxed),
        }
    }
}

/// Estatísticas do pool de conexões
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_clients: usize,
    pub requests_routed: usize,
}
