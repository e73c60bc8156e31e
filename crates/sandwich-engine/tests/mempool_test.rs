mod common;

use async_trait::async_trait;
use common::*;
use ethereum_types::{H256, U256};
use futures::stream;
use parking_lot::Mutex;
use sandwich_core::traits::{PendingStream, SharedAuditSink};
use sandwich_core::{Error, TransactionHash};
use sandwich_engine::mempool::{HashHandler, MempoolScanner, SeenCache};
use sandwich_engine::{ConfigStore, Engine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Default)]
struct CountingHandler {
    seen: Mutex<Vec<TransactionHash>>,
}

#[async_trait]
impl HashHandler for CountingHandler {
    async fn handle(&self, hash: TransactionHash) {
        self.seen.lock().push(hash);
    }
}

fn scanner() -> (Arc<CountingHandler>, MempoolScanner) {
    let handler = Arc::new(CountingHandler::default());
    let scanner = MempoolScanner::new(SeenCache::new(1024, Duration::from_secs(60)), handler.clone());
    (handler, scanner)
}

#[tokio::test]
async fn repeated_hash_is_processed_once() {
    let (handler, scanner) = scanner();
    let hash = H256::repeat_byte(0x42);

    scanner.offer(hash).unwrap().await.unwrap();
    assert!(scanner.offer(hash).is_none());

    assert_eq!(handler.seen.lock().as_slice(), &[hash]);
    let stats = scanner.stats();
    assert_eq!((stats.observed, stats.duplicates), (2, 1));
}

#[tokio::test]
async fn closed_stream_is_reported() {
    let (handler, scanner) = scanner();
    let hashes = vec![H256::repeat_byte(1), H256::repeat_byte(2), H256::repeat_byte(1)];
    let pending: PendingStream = Box::pin(stream::iter(hashes.into_iter().map(Ok::<_, Error>)));
    let (_tx, rx) = watch::channel(false);

    let result = scanner.scan(pending, rx).await;
    assert!(matches!(result, Err(Error::ConnectionError(_))));
    assert_eq!(scanner.stats().duplicates, 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handler.seen.lock().len(), 2);
}

#[tokio::test]
async fn exhausted_reconnects_end_the_scan() {
    let (_, scanner) = scanner();
    let items: Vec<sandwich_core::Result<TransactionHash>> = vec![
        Err(Error::ConnectionError("reset".to_string())),
        Err(Error::RetriesExhausted {
            attempts: 10,
            last: "refused".to_string(),
        }),
    ];
    let pending: PendingStream = Box::pin(stream::iter(items));
    let (_tx, rx) = watch::channel(false);

    let result = scanner.scan(pending, rx).await;
    assert!(result.unwrap_err().is_fatal());
}

#[tokio::test]
async fn shutdown_stops_the_scan() {
    let (_, scanner) = scanner();
    let pending: PendingStream = Box::pin(stream::pending::<sandwich_core::Result<TransactionHash>>());
    let (tx, rx) = watch::channel(false);

    let scan = scanner.scan(pending, rx);
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), scan)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn engine_handles_offered_hashes() {
    let connector = Arc::new(MockConnector::new());
    let sink = Arc::new(RecordingSink::default());
    let audit: SharedAuditSink = sink.clone();
    let engine = Arc::new(
        Engine::new(connector.clone(), Arc::new(ConfigStore::new(snapshot(&[KEY_A]))), audit).unwrap(),
    );

    let hash = H256::repeat_byte(0x55);
    let input = v2_exact_in(U256::from(1), U256::from(1), &[usdt()]);
    connector
        .state
        .lock()
        .transactions
        .insert(hash, (pending_tx(hash, router_v2(), input, gwei(50)), true));

    let handler: Arc<dyn HashHandler> = engine.clone();
    let scanner = MempoolScanner::new(SeenCache::new(16, Duration::from_secs(60)), handler);
    scanner.offer(hash).unwrap().await.unwrap();
    assert!(scanner.offer(hash).is_none());

    // uma busca e um registro de malformada, apesar do hash repetido
    assert_eq!(connector.calls(), 1);
    assert_eq!(sink.count("reject"), 1);
    assert_eq!(engine.stats().malformed.load(std::sync::atomic::Ordering::Relaxed), 1);
}
