//! Integration Tests - Dispatch, Proof Retry and Keeper Cycles
//!
//! Tests the interaction between usecases, ports, and mock adapters.
//! Uses mockall for trait mocking and tokio::test for async tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::mock;
use mockall::predicate::*;
use rust_decimal_macros::dec;

use oracle_keeper_bot::adapters::metrics::MetricsRegistry;
use oracle_keeper_bot::config::credentials::CredentialStore;
use oracle_keeper_bot::domain::backoff::BackoffPolicy;
use oracle_keeper_bot::domain::credential::Credential;
use oracle_keeper_bot::domain::instrument::{InstrumentId, ItemId};
use oracle_keeper_bot::domain::proof::Proof;
use oracle_keeper_bot::domain::range::{ExecMode, RangeSnapshot};
use oracle_keeper_bot::domain::slot::PriceBand;
use oracle_keeper_bot::domain::suppression::SuppressionStore;
use oracle_keeper_bot::ports::error::{ApiError, ExecutorError, ProofError};
use oracle_keeper_bot::ports::executor::ExecutionReport;
use oracle_keeper_bot::ports::handler::{CycleHandler, CycleTrigger};
use oracle_keeper_bot::ports::verify::VerifyReport;
use oracle_keeper_bot::usecases::{
    fetch_proof_forever, BatchDispatcher, DispatchRequest, DispatchSettings, KeeperCycle,
    KeeperSettings, PingOutcome, SkipReason,
};

// ---- Mock Definitions ----

mock! {
    pub Exec {}

    #[async_trait::async_trait]
    impl oracle_keeper_bot::ports::executor::TxExecutor for Exec {
        async fn submit(
            &self,
            mode: ExecMode,
            instrument: InstrumentId,
            ids: &[ItemId],
            credential: &Credential,
            proof: &Proof,
        ) -> Result<ExecutionReport, ExecutorError>;
    }
}

mock! {
    pub Verify {}

    #[async_trait::async_trait]
    impl oracle_keeper_bot::ports::verify::VerifyService for Verify {
        async fn verify(&self, ids: &[ItemId]) -> Option<VerifyReport>;
    }
}

mock! {
    pub Proofs {}

    #[async_trait::async_trait]
    impl oracle_keeper_bot::ports::proof::ProofSource for Proofs {
        async fn fetch_proof(&self, instrument: InstrumentId) -> Result<Proof, ProofError>;
    }
}

mock! {
    pub Ranges {}

    #[async_trait::async_trait]
    impl oracle_keeper_bot::ports::range::RangeSource for Ranges {
        async fn fetch_range(
            &self,
            instrument: InstrumentId,
            band: PriceBand,
        ) -> Result<RangeSnapshot, ApiError>;
    }
}

// ---- Helpers ----

fn metrics() -> Arc<MetricsRegistry> {
    Arc::new(MetricsRegistry::new().unwrap())
}

fn proof() -> Proof {
    Proof::from_hex("0xc0ffee").unwrap()
}

fn fast_settings() -> DispatchSettings {
    DispatchSettings {
        batch_size: 200,
        inter_batch_delay: Duration::ZERO,
    }
}

fn request(slot: i64, ids: Vec<ItemId>) -> DispatchRequest {
    DispatchRequest {
        instrument: 0,
        slot,
        ids,
        credential: Some(Credential::new("0xkey")),
        proof: Some(proof()),
    }
}

fn dispatcher(
    exec: MockExec,
    verify: MockVerify,
    store: Arc<SuppressionStore>,
) -> BatchDispatcher<MockExec, MockVerify> {
    BatchDispatcher::new(Arc::new(exec), Arc::new(verify), store, fast_settings(), metrics())
}

fn noop_report() -> VerifyReport {
    VerifyReport {
        ok: true,
        checked: 1,
        ..Default::default()
    }
}

// ---- Dispatcher ----

#[tokio::test]
async fn test_missing_credential_or_proof_never_reaches_executor() {
    let mut exec = MockExec::new();
    exec.expect_submit().times(0);
    let mut verify = MockVerify::new();
    verify.expect_verify().times(0);

    let d = dispatcher(exec, verify, Arc::new(SuppressionStore::new(3, 64)));

    let mut no_cred = request(7, vec![1, 2]);
    no_cred.credential = None;
    let summary = d.run(ExecMode::Limit, no_cred).await;
    assert_eq!(summary.skip, Some(SkipReason::MissingCredential));

    let mut empty_cred = request(7, vec![1, 2]);
    empty_cred.credential = Some(Credential::new("   "));
    let summary = d.run(ExecMode::Limit, empty_cred).await;
    assert_eq!(summary.skip, Some(SkipReason::MissingCredential));

    let mut no_proof = request(7, vec![1, 2]);
    no_proof.proof = None;
    let summary = d.run(ExecMode::StopLoss, no_proof).await;
    assert_eq!(summary.skip, Some(SkipReason::MissingProof));

    let summary = d.run(ExecMode::Limit, request(7, vec![])).await;
    assert_eq!(summary.skip, Some(SkipReason::NoIds));
    assert_eq!(summary.batches, 0);
}

#[tokio::test]
async fn test_large_dispatch_is_split_into_batches() {
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&sizes);

    let mut exec = MockExec::new();
    exec.expect_submit()
        .times(3)
        .returning(move |_, _, ids, _, _| {
            seen.lock().unwrap().push(ids.len());
            Ok(ExecutionReport {
                count: ids.len() as u64,
                ..Default::default()
            })
        });
    let mut verify = MockVerify::new();
    verify.expect_verify().times(0);

    let d = dispatcher(exec, verify, Arc::new(SuppressionStore::new(3, 64)));
    let summary = d.run(ExecMode::Limit, request(7, (1..=450).collect())).await;

    assert_eq!(*sizes.lock().unwrap(), vec![200, 200, 50]);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.executed, 450);
    assert_eq!(summary.failed_batches, 0);
    assert!(summary.skip.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_batches_are_paced() {
    let mut exec = MockExec::new();
    exec.expect_submit()
        .times(2)
        .returning(|_, _, _, _, _| Ok(ExecutionReport::default()));
    let verify = MockVerify::new();

    let d = BatchDispatcher::new(
        Arc::new(exec),
        Arc::new(verify),
        Arc::new(SuppressionStore::new(3, 64)),
        DispatchSettings {
            batch_size: 2,
            inter_batch_delay: Duration::from_millis(1_000),
        },
        metrics(),
    );

    let started = tokio::time::Instant::now();
    d.run(ExecMode::Limit, request(1, vec![1, 2, 3])).await;
    // One pause between two batches, none after the last.
    assert_eq!(started.elapsed(), Duration::from_millis(1_000));
}

#[tokio::test]
async fn test_repeated_clean_noops_suppress_until_slot_moves() {
    let mut exec = MockExec::new();
    exec.expect_submit()
        .times(4)
        .returning(|_, _, ids, _, _| {
            Ok(ExecutionReport {
                count: 0,
                skipped: ids.len() as u64,
                touched_ids: vec![],
            })
        });
    let mut verify = MockVerify::new();
    verify
        .expect_verify()
        .with(eq(vec![42u64]))
        .times(4)
        .returning(|_| Some(noop_report()));

    let store = Arc::new(SuppressionStore::new(3, 64));
    let d = dispatcher(exec, verify, Arc::clone(&store));

    for attempt in 1..=3 {
        let summary = d.run(ExecMode::Limit, request(7, vec![42])).await;
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.incremented, 1);
        assert_eq!(store.count(0, 7, 42), attempt);
    }

    let summary = d.run(ExecMode::Limit, request(7, vec![42])).await;
    assert_eq!(summary.skip, Some(SkipReason::FullySuppressed));
    assert_eq!(summary.batches, 0);

    // A new slot starts with a fresh budget.
    let summary = d.run(ExecMode::Limit, request(8, vec![42])).await;
    assert_eq!(summary.batches, 1);
    assert_eq!(store.count(0, 8, 42), 1);
}

#[tokio::test]
async fn test_executor_failure_verifies_and_clears_on_change() {
    let mut exec = MockExec::new();
    exec.expect_submit()
        .times(1)
        .returning(|_, _, _, _, _| {
            Err(ExecutorError::Failed {
                code: Some(1),
                stderr: "reverted".into(),
            })
        });
    let mut verify = MockVerify::new();
    verify.expect_verify().times(1).returning(|_| {
        Some(VerifyReport {
            ok: true,
            checked: 2,
            updated: 1,
            mismatches: vec![],
        })
    });

    let store = Arc::new(SuppressionStore::new(3, 64));
    store.increment(0, 7, &[1, 2]);
    let d = dispatcher(exec, verify, Arc::clone(&store));

    let summary = d.run(ExecMode::TakeProfit, request(7, vec![1, 2])).await;

    assert_eq!(summary.failed_batches, 1);
    assert_eq!(summary.cleared, 2);
    assert_eq!(store.count(0, 7, 1), 0);
    assert_eq!(store.count(0, 7, 2), 0);
}

#[tokio::test]
async fn test_noop_then_update_increments_then_clears() {
    let mut exec = MockExec::new();
    exec.expect_submit().times(2).returning(|_, _, ids, _, _| {
        Ok(ExecutionReport {
            count: 0,
            skipped: ids.len() as u64,
            touched_ids: vec![],
        })
    });
    let mut verify = MockVerify::new();
    let mut seq = mockall::Sequence::new();
    verify
        .expect_verify()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Some(noop_report()));
    verify
        .expect_verify()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| {
            Some(VerifyReport {
                ok: true,
                checked: 1,
                updated: 2,
                mismatches: vec![],
            })
        });

    let store = Arc::new(SuppressionStore::new(3, 64));
    let d = dispatcher(exec, verify, Arc::clone(&store));

    d.run(ExecMode::Limit, request(7, vec![42])).await;
    assert_eq!(store.count(0, 7, 42), 1);

    let summary = d.run(ExecMode::Limit, request(7, vec![42])).await;
    assert_eq!(summary.cleared, 1);
    assert_eq!(store.count(0, 7, 42), 0);
}

#[tokio::test]
async fn test_unavailable_verify_leaves_counters_alone() {
    let mut exec = MockExec::new();
    exec.expect_submit()
        .returning(|_, _, _, _, _| Err(ExecutorError::Timeout(Duration::from_secs(120))));
    let mut verify = MockVerify::new();
    verify.expect_verify().times(1).returning(|_| None);

    let store = Arc::new(SuppressionStore::new(3, 64));
    store.increment(0, 7, &[5]);
    let d = dispatcher(exec, verify, Arc::clone(&store));

    let summary = d.run(ExecMode::Liquidation, request(7, vec![5])).await;
    assert_eq!(summary.incremented, 0);
    assert_eq!(summary.cleared, 0);
    assert_eq!(store.count(0, 7, 5), 1);
}

#[tokio::test]
async fn test_touched_ids_get_a_detached_ping() {
    let mut exec = MockExec::new();
    exec.expect_submit().returning(|_, _, _, _, _| {
        Ok(ExecutionReport {
            count: 2,
            skipped: 0,
            touched_ids: vec![10, 11],
        })
    });
    let mut verify = MockVerify::new();
    verify
        .expect_verify()
        .with(eq(vec![10u64, 11]))
        .times(1)
        .returning(|_| Some(noop_report()));

    let d = dispatcher(exec, verify, Arc::new(SuppressionStore::new(3, 64)));
    let mut summary = d.run(ExecMode::StopLoss, request(3, vec![10, 11])).await;

    assert_eq!(summary.executed, 2);
    assert_eq!(summary.incremented, 0);
    assert_eq!(summary.pings.len(), 1);
    let outcome = summary.pings.pop().unwrap().await.unwrap();
    assert_eq!(outcome, PingOutcome::Delivered);
}

// ---- Proof retry ----

#[tokio::test(start_paused = true)]
async fn test_proof_retry_backs_off_until_success() {
    let mut proofs = MockProofs::new();
    let mut seq = mockall::Sequence::new();
    proofs
        .expect_fetch_proof()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(ApiError::Timeout.into()));
    proofs
        .expect_fetch_proof()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(ProofError::Missing));
    proofs
        .expect_fetch_proof()
        .with(eq(5500u32))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(proof()));

    let metrics = metrics();
    let started = tokio::time::Instant::now();
    let got = fetch_proof_forever(&proofs, 5500, &BackoffPolicy::PROOF, &metrics).await;
    let elapsed = started.elapsed();

    assert_eq!(got, proof());
    // 200ms and 360ms base delays, each with ±30% jitter.
    assert!(elapsed >= Duration::from_millis(392), "elapsed {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(728), "elapsed {elapsed:?}");
    assert_eq!(
        metrics.proof_retries.with_label_values(&["5500"]).get(),
        2
    );
}

// ---- Keeper cycle ----

fn keeper_settings() -> KeeperSettings {
    KeeperSettings {
        range_rate: 0.0002,
        request_delay: Duration::ZERO,
        proof_policy: BackoffPolicy::PROOF,
    }
}

fn credentials() -> Arc<CredentialStore> {
    Arc::new(CredentialStore::resolve([0], |key| {
        (key == "PK_0").then(|| "0xkey".to_string())
    }))
}

fn trigger() -> CycleTrigger {
    CycleTrigger {
        instrument: 0,
        price: dec!(50000),
        slot: 500_000_000,
    }
}

#[tokio::test]
async fn test_keeper_dispatches_modes_in_order() {
    let mut proofs = MockProofs::new();
    proofs.expect_fetch_proof().times(1).returning(|_| Ok(proof()));

    let mut ranges = MockRanges::new();
    ranges
        .expect_fetch_range()
        .withf(|instrument, band| {
            *instrument == 0 && band.from == dec!(49990) && band.to == dec!(50010)
        })
        .times(1)
        .returning(|_, _| {
            Ok(RangeSnapshot {
                fill_ids: vec![1, 2],
                stop_loss_ids: vec![3],
                take_profit_ids: vec![],
                liquidation_ids: vec![4],
            })
        });

    let modes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&modes);
    let mut exec = MockExec::new();
    exec.expect_submit()
        .times(3)
        .returning(move |mode, _, ids, _, _| {
            seen.lock().unwrap().push((mode, ids.to_vec()));
            Ok(ExecutionReport {
                count: ids.len() as u64,
                ..Default::default()
            })
        });
    let verify = MockVerify::new();

    let dispatcher = Arc::new(dispatcher(exec, verify, Arc::new(SuppressionStore::new(3, 64))));
    let keeper = KeeperCycle::new(
        Arc::new(proofs),
        Arc::new(ranges),
        dispatcher,
        credentials(),
        keeper_settings(),
        metrics(),
    );

    tokio_test::assert_ok!(keeper.run_cycle(trigger()).await);

    assert_eq!(
        *modes.lock().unwrap(),
        vec![
            (ExecMode::Limit, vec![1, 2]),
            (ExecMode::StopLoss, vec![3]),
            (ExecMode::Liquidation, vec![4]),
        ]
    );
}

#[tokio::test]
async fn test_range_failure_aborts_cycle() {
    let mut proofs = MockProofs::new();
    proofs.expect_fetch_proof().returning(|_| Ok(proof()));

    let mut ranges = MockRanges::new();
    ranges.expect_fetch_range().times(1).returning(|_, _| {
        Err(ApiError::Status {
            status: 502,
            body: "bad gateway".into(),
        })
    });

    let mut exec = MockExec::new();
    exec.expect_submit().times(0);
    let verify = MockVerify::new();

    let dispatcher = Arc::new(dispatcher(exec, verify, Arc::new(SuppressionStore::new(3, 64))));
    let keeper = KeeperCycle::new(
        Arc::new(proofs),
        Arc::new(ranges),
        dispatcher,
        credentials(),
        keeper_settings(),
        metrics(),
    );

    let err = keeper.run_cycle(trigger()).await.unwrap_err();
    assert!(err.to_string().contains("Range fetch failed"));
}

#[tokio::test]
async fn test_instrument_without_credential_skips_every_mode() {
    let mut proofs = MockProofs::new();
    proofs.expect_fetch_proof().returning(|_| Ok(proof()));
    let mut ranges = MockRanges::new();
    ranges.expect_fetch_range().returning(|_, _| {
        Ok(RangeSnapshot {
            fill_ids: vec![1],
            ..Default::default()
        })
    });
    let mut exec = MockExec::new();
    exec.expect_submit().times(0);

    let dispatcher = Arc::new(dispatcher(
        exec,
        MockVerify::new(),
        Arc::new(SuppressionStore::new(3, 64)),
    ));
    let keeper = KeeperCycle::new(
        Arc::new(proofs),
        Arc::new(ranges),
        dispatcher,
        Arc::new(CredentialStore::resolve([0], |_| None)),
        keeper_settings(),
        metrics(),
    );

    tokio_test::assert_ok!(keeper.run_cycle(trigger()).await);
}

#[tokio::test]
async fn test_empty_range_dispatches_nothing() {
    let mut proofs = MockProofs::new();
    proofs.expect_fetch_proof().times(1).returning(|_| Ok(proof()));
    let mut ranges = MockRanges::new();
    ranges
        .expect_fetch_range()
        .times(1)
        .returning(|_, _| Ok(RangeSnapshot::default()));
    let mut exec = MockExec::new();
    exec.expect_submit().times(0);
    let mut verify = MockVerify::new();
    verify.expect_verify().times(0);

    let dispatcher = Arc::new(dispatcher(exec, verify, Arc::new(SuppressionStore::new(3, 64))));
    let keeper = KeeperCycle::new(
        Arc::new(proofs),
        Arc::new(ranges),
        dispatcher,
        credentials(),
        keeper_settings(),
        metrics(),
    );

    tokio_test::assert_ok!(keeper.run_cycle(trigger()).await);
}
