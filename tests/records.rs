//! Integration tests for `RecordIndexer` and the clear-value cache.

mod common;

use std::sync::Arc;

use common::*;
use fhevm_session::backend::local::{GET_CIPHERTEXT_METHOD, STORE_CIPHERTEXT_METHOD};
use fhevm_session::contract::ResultSubmitted;
use fhevm_session::{
    decrypt_missing, merge_clear_values, Address, CiphertextHandle, ClearValueCache,
    DecryptionAuthorizationManager, LogEntry, RecordIndexer, SubmissionCoordinator, TxHash,
    WalletSigner, RESULT_SUBMITTED_SIGNATURE,
};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helpers
// ============================================================================

/// Encode and submit `values` to contract X in order, one block each.
async fn submit_all(env: &LocalEnv, values: &[u64]) -> Vec<CiphertextHandle> {
    let coordinator = SubmissionCoordinator::new(env.ledger.clone(), 1);
    let mut handles = Vec::new();
    for &value in values {
        let payload = env
            .session
            .encoder()
            .encode(value, contract_x(), env.wallet.address())
            .await
            .unwrap();
        handles.push(payload.handles[0]);
        coordinator
            .submit(&env.session, payload, contract_x(), env.wallet.as_ref(), &CancellationToken::new())
            .await
            .unwrap();
    }
    handles
}

fn foreign_log(player: Address, block: u64) -> LogEntry {
    let event = ResultSubmitted {
        player,
        input_handle: CiphertextHandle([0x5a; 32]),
        timestamp: GENESIS_TIMESTAMP + block,
    };
    LogEntry {
        address: contract_x(),
        topics: event.topics(),
        data: event.encode_data(),
        block_number: block,
        log_index: 0,
        transaction_hash: TxHash([0x5a; 32]),
    }
}

// ============================================================================
// Indexing
// ============================================================================

#[tokio::test]
async fn records_are_newest_first() {
    let env = local_env().await;
    let handles = submit_all(&env, &[10, 20, 30]).await;
    let indexer = RecordIndexer::new(env.ledger.clone());

    let records = indexer
        .list_records(contract_x(), RESULT_SUBMITTED_SIGNATURE, env.wallet.address())
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    assert!(records
        .windows(2)
        .all(|w| w[0].block_height > w[1].block_height));
    let listed: Vec<_> = records.iter().map(|r| r.handle).collect();
    assert_eq!(listed, handles.into_iter().rev().collect::<Vec<_>>());
    for record in &records {
        assert_eq!(record.contract, contract_x());
        assert_eq!(record.submission_timestamp, GENESIS_TIMESTAMP + record.block_height);
        assert_eq!(record.clear_value, None);
    }
}

#[tokio::test]
async fn only_the_submitters_records_are_listed() {
    let env = local_env().await;
    submit_all(&env, &[1]).await;
    env.ledger.push_log(foreign_log(Address([0x44; 20]), 50));
    let indexer = RecordIndexer::new(env.ledger.clone());

    let mine = indexer
        .list_records(contract_x(), RESULT_SUBMITTED_SIGNATURE, env.wallet.address())
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_ne!(mine[0].handle, CiphertextHandle([0x5a; 32]));

    let theirs = indexer
        .list_records(contract_x(), RESULT_SUBMITTED_SIGNATURE, Address([0x44; 20]))
        .await
        .unwrap();
    assert_eq!(theirs.len(), 1);
    assert_eq!(theirs[0].block_height, 50);
}

#[tokio::test]
async fn other_contracts_are_not_listed() {
    let env = local_env().await;
    submit_all(&env, &[1, 2]).await;
    let indexer = RecordIndexer::new(env.ledger.clone());

    let records = indexer
        .list_records(contract_y(), RESULT_SUBMITTED_SIGNATURE, env.wallet.address())
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn no_submissions_is_empty_not_error() {
    let env = local_env().await;
    let records = RecordIndexer::new(env.ledger.clone())
        .list_records(contract_x(), RESULT_SUBMITTED_SIGNATURE, env.wallet.address())
        .await
        .unwrap();
    assert!(records.is_empty());
    assert_eq!(env.ledger.get_logs_calls(), 1);
}

// ============================================================================
// Clear values
// ============================================================================

#[tokio::test]
async fn missing_values_are_decrypted_once() {
    let env = local_env().await;
    submit_all(&env, &[300, 200, 100]).await;
    let indexer = RecordIndexer::new(env.ledger.clone());
    let manager = DecryptionAuthorizationManager::new(365);
    let cache = ClearValueCache::new();

    let mut records = indexer
        .list_records(contract_x(), RESULT_SUBMITTED_SIGNATURE, env.wallet.address())
        .await
        .unwrap();
    let decrypted = decrypt_missing(
        &mut records,
        &cache,
        &env.session,
        &manager,
        env.wallet.as_ref(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(decrypted, 3);
    assert_eq!(env.wallet.signature_count(), 1);
    let values: Vec<_> = records.iter().map(|r| r.clear_value).collect();
    assert_eq!(values, vec![Some(100), Some(200), Some(300)]);

    // A fresh listing is filled from the cache without another prompt.
    let mut again = indexer
        .list_records(contract_x(), RESULT_SUBMITTED_SIGNATURE, env.wallet.address())
        .await
        .unwrap();
    let decrypted = decrypt_missing(
        &mut again,
        &cache,
        &env.session,
        &manager,
        env.wallet.as_ref(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(decrypted, 0);
    assert_eq!(env.wallet.signature_count(), 1);
    assert!(again.iter().all(|r| r.clear_value.is_some()));
}

#[tokio::test]
async fn only_new_records_are_sent_for_decryption() {
    let env = local_env().await;
    submit_all(&env, &[1, 2]).await;
    let indexer = RecordIndexer::new(env.ledger.clone());
    let manager = DecryptionAuthorizationManager::new(365);
    let cache = ClearValueCache::new();

    let mut records = indexer
        .list_records(contract_x(), RESULT_SUBMITTED_SIGNATURE, env.wallet.address())
        .await
        .unwrap();
    decrypt_missing(&mut records, &cache, &env.session, &manager, env.wallet.as_ref(), &CancellationToken::new())
        .await
        .unwrap();

    submit_all(&env, &[3]).await;
    let mut records = indexer
        .list_records(contract_x(), RESULT_SUBMITTED_SIGNATURE, env.wallet.address())
        .await
        .unwrap();
    let decrypted = decrypt_missing(&mut records, &cache, &env.session, &manager, env.wallet.as_ref(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(decrypted, 1);
    assert_eq!(env.wallet.signature_count(), 2);
    assert_eq!(records[0].clear_value, Some(3));
    assert_eq!(cache.len(), 3);
}

#[tokio::test]
async fn merge_leaves_unknown_handles_empty() {
    let env = local_env().await;
    submit_all(&env, &[8]).await;
    let mut records = RecordIndexer::new(env.ledger.clone())
        .list_records(contract_x(), RESULT_SUBMITTED_SIGNATURE, env.wallet.address())
        .await
        .unwrap();

    let cache = ClearValueCache::new();
    cache.insert(CiphertextHandle([0x01; 32]), 99);
    merge_clear_values(&mut records, &cache);
    assert_eq!(records[0].clear_value, None);
}

#[tokio::test]
async fn replacement_session_decrypts_earlier_submissions() {
    let probe = MockProbe::reachable();
    let env = local_env_with(probe.clone()).await;
    submit_all(&env, &[40, 50]).await;
    assert_eq!(probe.node.method_count(STORE_CIPHERTEXT_METHOD), 2);

    // e.g. after an account switch and back, or a page reload
    env.session.invalidate();
    let replacement = local_session(probe.clone()).await;
    assert!(!Arc::ptr_eq(replacement.backend(), env.session.backend()));

    let mut records = RecordIndexer::new(env.ledger.clone())
        .list_records(contract_x(), RESULT_SUBMITTED_SIGNATURE, env.wallet.address())
        .await
        .unwrap();
    let decrypted = decrypt_missing(
        &mut records,
        &ClearValueCache::new(),
        &replacement,
        &DecryptionAuthorizationManager::new(365),
        env.wallet.as_ref(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(decrypted, 2);
    let values: Vec<_> = records.iter().map(|r| r.clear_value).collect();
    assert_eq!(values, vec![Some(50), Some(40)]);
    assert_eq!(probe.node.method_count(GET_CIPHERTEXT_METHOD), 2);
}
