mod common;

use common::*;
use ethereum_types::{H256, U256};
use rust_decimal::Decimal;
use sandwich_core::traits::SharedAuditSink;
use sandwich_engine::config::{CoinEntry, ConfigSnapshot};
use sandwich_engine::market::LiveContext;
use sandwich_engine::{classify, Classification, ConfigStore, Decision, Engine, Evaluator, Outcome, SwapIntent};
use std::sync::Arc;

fn intent_for(store: &ConfigStore, amount_in: U256, min_out: U256, tip: U256) -> SwapIntent {
    let input = v2_exact_in(amount_in, min_out, &[usdt(), target()]);
    let tx = pending_tx(H256::repeat_byte(0x0a), router_v2(), input, tip);
    match classify(&tx, &store.current().registries.dexes) {
        Classification::Swap(intent) => intent,
        other => panic!("expected swap, got {other:?}"),
    }
}

fn one_usdt_swap(store: &ConfigStore, tip: U256) -> SwapIntent {
    intent_for(store, U256::from(1_000_000), U256::exp10(17) * 5, tip)
}

fn reason(decision: &Decision) -> String {
    decision
        .rejection()
        .map(|r| r.reason.clone())
        .unwrap_or_else(|| "accepted".to_string())
}

#[tokio::test]
async fn accepts_and_sizes_small_swap() {
    let store = ConfigStore::new(snapshot(&[KEY_A]));
    let sink = Arc::new(RecordingSink::default());
    let evaluator = Evaluator::new(sink.clone());
    let intent = one_usdt_swap(&store, gwei(50));

    let decision = evaluator
        .evaluate(&intent, &LiveContext::new(gwei(45)), &store.current())
        .await;
    let Decision::Accept(opp) = decision else {
        panic!("rejected: {}", reason(&decision));
    };

    // 10% de 1 USDT entra; 90% de 10% de 0.5 TARGET é comprado
    assert_eq!(opp.frontrun_amount_in, U256::from(100_000));
    assert_eq!(opp.target_amount, U256::exp10(15) * 45);
    assert_eq!(opp.target_value, Decimal::ONE);
    // tip 50 com 20% de tolerância; saída a 100%
    assert_eq!(opp.frontrun_gas_tip, gwei(60));
    assert_eq!(opp.backrun_gas_tip, gwei(50));
    assert_eq!(opp.fee_cap, gwei(500));
    assert_eq!(opp.fee_tier, 500);
    assert_eq!(opp.coin.address, usdt());
    assert_eq!(opp.target.address, target());
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn large_swap_of_cheap_coin_is_sized() {
    let mut snap = snapshot(&[KEY_A]);
    snap.coins.push(CoinEntry {
        symbol: "meme".to_string(),
        address: other_token(),
        decimals: 18,
        price_id: Some("meme".to_string()),
    });
    let store = ConfigStore::new(snap);
    let evaluator = Evaluator::new(Arc::new(RecordingSink::default()));

    // 1e11 tokens de 18 casas a 1e-9 USD cada
    let amount_in = U256::exp10(29);
    let input = v2_exact_in(amount_in, U256::exp10(18), &[other_token(), target()]);
    let tx = pending_tx(H256::repeat_byte(0x0b), router_v2(), input, gwei(50));
    let Classification::Swap(intent) = classify(&tx, &store.current().registries.dexes) else {
        panic!("fixture is not a swap");
    };
    let live = LiveContext::new(gwei(45)).with_price("meme", Decimal::new(1, 9));

    let decision = evaluator.decide(&intent, &live, &store.current());
    let Decision::Accept(opp) = decision else {
        panic!("rejected: {}", reason(&decision));
    };
    assert_eq!(opp.target_value, Decimal::from(100));
    assert_eq!(opp.frontrun_amount_in, U256::exp10(28));
    assert_eq!(opp.target_amount, U256::exp10(16) * 9);
}

#[tokio::test]
async fn blacklisted_target_is_rejected() {
    let mut snap = snapshot(&[KEY_A]);
    snap.blacklist.push(target());
    let store = ConfigStore::new(snap);
    let sink = Arc::new(RecordingSink::default());
    let evaluator = Evaluator::new(sink.clone());
    let intent = one_usdt_swap(&store, gwei(50));

    let decision = evaluator
        .evaluate(&intent, &LiveContext::new(gwei(45)), &store.current())
        .await;
    assert_eq!(reason(&decision), "contract is in the blacklist");
    assert_eq!(sink.reject_reasons(), vec!["contract is in the blacklist".to_string()]);
}

#[tokio::test]
async fn hot_target_exceeds_gas_markup() {
    let store = ConfigStore::new(snapshot(&[KEY_A]));
    let evaluator = Evaluator::new(Arc::new(RecordingSink::default()));
    let intent = one_usdt_swap(&store, gwei(50));

    let decision = evaluator.decide(&intent, &LiveContext::new(gwei(10)), &store.current());
    assert_eq!(
        reason(&decision),
        "gas price difference percentage 80% is greater than the target gas markup allowed 70%"
    );
}

#[test]
fn zero_tip_is_rejected() {
    let store = ConfigStore::new(snapshot(&[KEY_A]));
    let evaluator = Evaluator::new(Arc::new(RecordingSink::default()));
    let intent = one_usdt_swap(&store, U256::zero());

    let decision = evaluator.decide(&intent, &LiveContext::new(gwei(10)), &store.current());
    assert_eq!(reason(&decision), "target transaction has no gas tip");
}

#[test]
fn value_outside_band_is_rejected() {
    let store = ConfigStore::new(snapshot(&[KEY_A]));
    let evaluator = Evaluator::new(Arc::new(RecordingSink::default()));
    // 5000 USDT
    let intent = intent_for(&store, U256::from(5_000_000_000u64), U256::exp10(18), gwei(50));

    let decision = evaluator.decide(&intent, &LiveContext::new(gwei(45)), &store.current());
    assert_eq!(reason(&decision), "target value 5000 USD is outside the band [0.5, 1000]");
}

#[test]
fn unsupported_coin_is_rejected() {
    let mut snap = snapshot(&[KEY_A]);
    snap.coins.clear();
    let store = ConfigStore::new(snap);
    let evaluator = Evaluator::new(Arc::new(RecordingSink::default()));
    let intent = one_usdt_swap(&store, gwei(50));

    let decision = evaluator.decide(&intent, &LiveContext::new(gwei(45)), &store.current());
    assert_eq!(reason(&decision), "coin is not supported");
}

#[test]
fn target_outside_whitelist_is_rejected() {
    let mut snap = snapshot(&[KEY_A]);
    snap.whitelist.clear();
    let store = ConfigStore::new(snap);
    let evaluator = Evaluator::new(Arc::new(RecordingSink::default()));
    let intent = one_usdt_swap(&store, gwei(50));

    let decision = evaluator.decide(&intent, &LiveContext::new(gwei(45)), &store.current());
    assert_eq!(reason(&decision), "contract is not in the whitelist");
}

fn engine_with(snap: ConfigSnapshot) -> (Arc<MockConnector>, Arc<RecordingSink>, Engine) {
    let connector = Arc::new(MockConnector::new());
    let sink = Arc::new(RecordingSink::default());
    let audit: SharedAuditSink = sink.clone();
    let engine = Engine::new(connector.clone(), Arc::new(ConfigStore::new(snap)), audit).unwrap();
    (connector, sink, engine)
}

#[tokio::test]
async fn kill_switch_stops_before_any_lookup() {
    let mut snap = snapshot(&[KEY_A]);
    snap.kill_switch = true;
    let (connector, sink, engine) = engine_with(snap);
    engine.market().publish(LiveContext::new(gwei(45)));

    let input = v2_exact_in(U256::from(1_000_000), U256::exp10(17) * 5, &[usdt(), target()]);
    let tx = pending_tx(H256::repeat_byte(0x0b), router_v2(), input, gwei(50));
    let outcome = engine.handle_transaction(&tx).await;

    match outcome {
        Outcome::Rejected(reason) => assert_eq!(reason, "kill switch is on"),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(connector.calls(), 0);
    assert!(connector.submitted().is_empty());
    assert!(engine.cache().claimed_wallets().is_empty());
    assert_eq!(sink.reject_reasons(), vec!["kill switch is on".to_string()]);
}

#[tokio::test]
async fn malformed_swap_is_audited() {
    let (_, sink, engine) = engine_with(snapshot(&[KEY_A]));
    let input = v2_exact_in(U256::from(1), U256::from(1), &[usdt()]);
    let tx = pending_tx(H256::repeat_byte(0x0c), router_v2(), input, gwei(50));

    assert!(matches!(engine.handle_transaction(&tx).await, Outcome::Malformed(_)));
    assert_eq!(sink.count("reject"), 1);
}

#[tokio::test]
async fn mined_transaction_is_skipped() {
    let (connector, _, engine) = engine_with(snapshot(&[KEY_A]));
    let hash = H256::repeat_byte(0x0d);
    let input = v2_exact_in(U256::from(1_000_000), U256::exp10(17) * 5, &[usdt(), target()]);
    let tx = pending_tx(hash, router_v2(), input, gwei(50));
    connector.state.lock().transactions.insert(hash, (tx, false));

    match engine.process_hash(hash).await {
        Outcome::Skipped(reason) => assert_eq!(reason, "already mined"),
        other => panic!("expected skip, got {other:?}"),
    }
}
