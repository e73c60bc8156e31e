//! Leitura da mempool: deduplicação de hashes e uma tarefa por hash novo.

use async_trait::async_trait;
use futures::StreamExt;
use lru::LruCache;
use parking_lot::Mutex;
use sandwich_core::traits::PendingStream;
use sandwich_core::{Error, Result, TransactionHash};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Conjunto de hashes vistos com tempo de vida limitado
pub struct SeenCache {
    entries: Mutex<LruCache<TransactionHash, Instant>>,
    ttl: Duration,
}

impl SeenCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Registra o hash e diz se ele é novo dentro da janela
    pub fn observe(&self, hash: TransactionHash) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.put(hash, now) {
            Some(previous) => now.duration_since(previous) >= self.ttl,
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Destino de cada hash novo
#[async_trait]
pub trait HashHandler: Send + Sync {
    async fn handle(&self, hash: TransactionHash);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub observed: u64,
    pub duplicates: u64,
}

pub struct MempoolScanner {
    seen: SeenCache,
    handler: Arc<dyn HashHandler>,
    observed: AtomicU64,
    duplicates: AtomicU64,
}

impl MempoolScanner {
    pub fn new(seen: SeenCache, handler: Arc<dyn HashHandler>) -> Self {
        Self {
            seen,
            handler,
            observed: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> ScanStats {
        ScanStats {
            observed: self.observed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
        }
    }

    /// Deduplica e despacha; `None` quando o hash é repetido
    pub fn offer(&self, hash: TransactionHash) -> Option<tokio::task::JoinHandle<()>> {
        self.observed.fetch_add(1, Ordering::Relaxed);
        if !self.seen.observe(hash) {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(?hash, "hash duplicado");
            return None;
        }
        let handler = self.handler.clone();
        Some(tokio::spawn(async move { handler.handle(hash).await }))
    }

    /// Consome o stream até o encerramento. Esgotar as reconexões é fatal.
    pub async fn scan(&self, mut stream: PendingStream, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                item = stream.next() => match item {
                    Some(Ok(hash)) => {
                        self.offer(hash);
                    }
                    Some(Err(e)) if e.is_fatal() => return Err(e),
                    Some(Err(e)) => warn!(error = %e, "erro na assinatura da mempool"),
                    None => return Err(Error::ConnectionError("pending transaction stream closed".to_string())),
                },
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::H256;

    #[test]
    fn second_sighting_is_duplicate() {
        let seen = SeenCache::new(16, Duration::from_secs(60));
        let hash = H256::repeat_byte(1);
        assert!(seen.observe(hash));
        assert!(!seen.observe(hash));
        assert!(seen.observe(H256::repeat_byte(2)));
    }

    #[test]
    fn expired_entry_is_new_again() {
        let seen = SeenCache::new(16, Duration::ZERO);
        let hash = H256::repeat_byte(1);
        assert!(seen.observe(hash));
        assert!(seen.observe(hash));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let seen = SeenCache::new(2, Duration::from_secs(60));
        seen.observe(H256::repeat_byte(1));
        seen.observe(H256::repeat_byte(2));
        seen.observe(H256::repeat_byte(3));
        assert_eq!(seen.len(), 2);
        assert!(seen.observe(H256::repeat_byte(1)));
    }
}
