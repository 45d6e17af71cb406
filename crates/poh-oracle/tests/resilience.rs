//! # Resilience Tests
//!
//! Drives the oracle through a fault-injecting backend that wraps a real
//! local ledger: lost round trips, hung calls, dropped submissions and an
//! unreachable ledger.

use async_trait::async_trait;
use poh_ledger::abi::OWNER_SIG;
use poh_ledger::{Address, LedgerBackend, LedgerError, Receipt, Selector};
use poh_oracle::{
    CommitFailure, CommitOutcome, Dataset, LocalLedger, Oracle, OracleConfig, Principal,
    RunFailure, VerifyFailure, VerifyOutcome,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const OWNER: &str = "oracle-operator";

// =============================================================================
// Fault Injection
// =============================================================================

/// Wraps a ledger and misbehaves on demand.
#[derive(Default)]
struct Faults {
    /// Submissions that land but report `Timeout`.
    land_then_timeout: AtomicUsize,
    /// Submissions that land and then hang past any deadline.
    land_then_hang: AtomicUsize,
    /// Submissions that are dropped and report `Timeout`.
    drop_submits: AtomicUsize,
    /// Reads that report `Timeout`.
    read_timeouts: AtomicUsize,
    /// Every submission fails as unavailable.
    submits_unavailable: AtomicBool,
    /// Every call fails as unavailable.
    unavailable: AtomicBool,
    /// Owner reported by `owner()` in place of the registry's real owner.
    reported_owner: Mutex<Option<String>>,
    /// Submissions that reached the wrapped ledger.
    submitted: AtomicUsize,
}

struct FaultyBackend {
    inner: Arc<LocalLedger>,
    faults: Arc<Faults>,
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl LedgerBackend for FaultyBackend {
    async fn submit(
        &self,
        contract: &Address,
        selector: Selector,
        args: Value,
        caller: &Principal,
    ) -> Result<Receipt, LedgerError> {
        let f = &self.faults;
        if f.unavailable.load(Ordering::SeqCst) || f.submits_unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("connection refused".into()));
        }
        if take(&f.drop_submits) {
            return Err(LedgerError::Timeout(Duration::from_millis(1)));
        }

        f.submitted.fetch_add(1, Ordering::SeqCst);
        let receipt = self.inner.submit(contract, selector, args, caller).await?;

        if take(&f.land_then_timeout) {
            return Err(LedgerError::Timeout(Duration::from_millis(1)));
        }
        if take(&f.land_then_hang) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(receipt)
    }

    async fn call(
        &self,
        contract: &Address,
        selector: Selector,
        args: Value,
    ) -> Result<Value, LedgerError> {
        let f = &self.faults;
        if f.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("connection refused".into()));
        }
        if take(&f.read_timeouts) {
            return Err(LedgerError::Timeout(Duration::from_millis(1)));
        }
        if selector == Selector::of(OWNER_SIG) {
            if let Some(owner) = f.reported_owner.lock().unwrap().clone() {
                return Ok(Value::String(owner));
            }
        }
        self.inner.call(contract, selector, args).await
    }
}

struct Harness {
    oracle: Oracle,
    faults: Arc<Faults>,
    ledger: Arc<LocalLedger>,
}

async fn harness() -> Harness {
    harness_as(OWNER).await
}

/// Registry owned by `OWNER`, driven by `caller`.
async fn harness_as(caller: &str) -> Harness {
    let ledger = Arc::new(LocalLedger::temporary().unwrap());
    let descriptor = ledger.deploy(&Principal::new(OWNER)).await.unwrap();
    let faults = Arc::new(Faults::default());
    let backend = Arc::new(FaultyBackend {
        inner: Arc::clone(&ledger),
        faults: Arc::clone(&faults),
    });

    let mut config = OracleConfig::default();
    config.client.caller = caller.to_string();
    config.client.submit_timeout_ms = 100;
    config.client.read_timeout_ms = 100;
    config.client.retry_backoff_ms = 1;
    config.client.max_attempts = 3;
    config.client.max_in_flight = 1;

    Harness {
        oracle: Oracle::with_descriptor(config, backend, descriptor).unwrap(),
        faults,
        ledger,
    }
}

fn one_row() -> Dataset {
    Dataset::parse(
        "date,open,high,low,close,volume,Name\n\
         2023-10-25,170.65,173.06,170.65,171.80,57157115,AAPL\n",
    )
    .unwrap()
}

fn three_rows() -> Dataset {
    Dataset::parse(
        "date,open,high,low,close,volume,Name\n\
         2023-10-25,170.65,173.06,170.65,171.80,57157115,AAPL\n\
         2023-10-26,340.54,341.63,326.94,327.89,37828500,MSFT\n\
         2023-10-27,1,2,1,1.5,100,GOOG\n",
    )
    .unwrap()
}

// =============================================================================
// Indeterminate Submissions
// =============================================================================

#[tokio::test]
async fn test_timed_out_submission_that_landed_is_committed() {
    let h = harness().await;
    h.faults.land_then_timeout.store(1, Ordering::SeqCst);

    let report = h.oracle.commit(&one_row()).await;

    assert!(report.is_success());
    match &report.rows[0].outcome {
        CommitOutcome::Committed { tx_hash, .. } => assert!(tx_hash.is_none()),
        other => panic!("expected Committed, got {other:?}"),
    }
    assert_eq!(h.faults.submitted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hung_submission_that_landed_is_committed() {
    let h = harness().await;
    h.faults.land_then_hang.store(1, Ordering::SeqCst);

    let report = h.oracle.commit(&one_row()).await;

    assert!(matches!(
        report.rows[0].outcome,
        CommitOutcome::Committed { tx_hash: None, .. }
    ));
    assert_eq!(h.faults.submitted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropped_submission_is_retried() {
    let h = harness().await;
    h.faults.drop_submits.store(1, Ordering::SeqCst);

    let report = h.oracle.commit(&one_row()).await;

    assert!(matches!(
        report.rows[0].outcome,
        CommitOutcome::Committed { tx_hash: Some(_), .. }
    ));
    assert_eq!(h.faults.submitted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_persistent_loss_ends_indeterminate() {
    let h = harness().await;
    h.faults.drop_submits.store(usize::MAX, Ordering::SeqCst);

    let report = h.oracle.commit(&one_row()).await;

    assert!(report.is_success());
    assert_eq!(
        report.rows[0].outcome,
        CommitOutcome::Failed(CommitFailure::Indeterminate { attempts: 3 })
    );
    assert_eq!(h.ledger.contracts().unwrap().len(), 1);
    assert_eq!(h.oracle.status().await.unwrap().entries, 0);
}

#[tokio::test]
async fn test_indeterminate_row_resolves_on_rerun() {
    let h = harness().await;
    h.faults.drop_submits.store(3, Ordering::SeqCst);

    let first = h.oracle.commit(&one_row()).await;
    assert!(matches!(
        first.rows[0].outcome,
        CommitOutcome::Failed(CommitFailure::Indeterminate { .. })
    ));

    let second = h.oracle.commit(&one_row()).await;
    assert!(second.rows[0].outcome.is_committed());
}

// =============================================================================
// Authority Lost Mid-Run
// =============================================================================

#[tokio::test]
async fn test_unauthorized_revert_mid_run_aborts_remaining() {
    let h = harness_as("mallory").await;
    *h.faults.reported_owner.lock().unwrap() = Some("mallory".to_string());

    let report = h.oracle.commit(&three_rows()).await;

    match &report.failure {
        Some(RunFailure::Unauthorized { caller, owner }) => {
            assert_eq!(caller, &Principal::new("mallory"));
            assert_eq!(owner.as_ref(), Some(&Principal::new(OWNER)));
        }
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    assert_eq!(report.rows.len(), 3);
    assert_eq!(
        report.rows[0].outcome,
        CommitOutcome::Failed(CommitFailure::Unauthorized)
    );
    assert!(report.rows[1..]
        .iter()
        .all(|r| r.outcome == CommitOutcome::Failed(CommitFailure::Aborted)));
    assert_eq!(h.faults.submitted.load(Ordering::SeqCst), 1);
    assert_eq!(h.ledger.block_height().unwrap(), 1);
}

// =============================================================================
// Unreachable Ledger
// =============================================================================

#[tokio::test]
async fn test_unreachable_ledger_aborts_before_submitting() {
    let h = harness().await;
    h.faults.unavailable.store(true, Ordering::SeqCst);

    let report = h.oracle.commit(&three_rows()).await;

    assert!(matches!(report.failure, Some(RunFailure::Backend(_))));
    assert_eq!(report.rows.len(), 3);
    assert!(report
        .rows
        .iter()
        .all(|r| r.outcome == CommitOutcome::Failed(CommitFailure::Aborted)));
    assert_eq!(h.faults.submitted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_backend_failure_mid_run_aborts_remaining() {
    let h = harness().await;
    h.faults.submits_unavailable.store(true, Ordering::SeqCst);

    let report = h.oracle.commit(&three_rows()).await;

    assert!(matches!(report.failure, Some(RunFailure::Backend(_))));
    assert_eq!(report.rows.len(), 3);
    assert!(matches!(
        report.rows[0].outcome,
        CommitOutcome::Failed(CommitFailure::Backend(_))
    ));
    assert!(report.rows[1..]
        .iter()
        .all(|r| r.outcome == CommitOutcome::Failed(CommitFailure::Aborted)));
}

#[tokio::test]
async fn test_verify_unreachable_reports_every_row() {
    let h = harness().await;
    h.faults.unavailable.store(true, Ordering::SeqCst);

    let report = h.oracle.verify(&three_rows()).await;

    assert!(matches!(report.failure, Some(RunFailure::Backend(_))));
    assert_eq!(report.rows.len(), 3);
    assert_eq!(report.summary.failed, 3);
    assert!(matches!(
        report.rows[0].outcome,
        VerifyOutcome::Failed(VerifyFailure::Backend(_))
    ));
}

// =============================================================================
// Slow Reads
// =============================================================================

#[tokio::test]
async fn test_verify_retries_timed_out_reads() {
    let h = harness().await;
    h.oracle.commit(&one_row()).await;
    h.faults.read_timeouts.store(2, Ordering::SeqCst);

    let report = h.oracle.verify(&one_row()).await;
    assert!(matches!(report.rows[0].outcome, VerifyOutcome::Match { .. }));
}

#[tokio::test]
async fn test_verify_gives_up_after_max_attempts() {
    let h = harness().await;
    h.faults.read_timeouts.store(usize::MAX, Ordering::SeqCst);

    let report = h.oracle.verify(&one_row()).await;
    assert!(report.is_success());
    assert_eq!(
        report.rows[0].outcome,
        VerifyOutcome::Failed(VerifyFailure::Indeterminate { attempts: 3 })
    );
}
