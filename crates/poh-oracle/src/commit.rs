//! # Commit Path
//!
//! Turns dataset rows into registry entries.
//!
//! ```text
//! row ──▶ Record ──▶ commitment ──▶ submit ──┬─ receipt ─────────────▶ Committed
//!                                            ├─ AlreadyCommitted ────▶ AlreadySkipped
//!                                            ├─ Unauthorized ────────▶ abort run
//!                                            └─ timeout ──▶ read back ┬─ ours ──▶ Committed
//!                                                                    ├─ other ─▶ AlreadySkipped
//!                                                                    └─ absent ▶ retry
//! ```
//!
//! Before anything is submitted the registry owner is read once; a caller
//! that is not the owner aborts the run without sending transactions.

use crate::config::ClientConfig;
use crate::dataset::Dataset;
use crate::pipeline::{run_bounded, with_deadline, RunState};
use crate::report::{CommitFailure, CommitOutcome, CommitReport, CommitRow, RunFailure};
use poh_ledger::{LedgerError, RegistryContract, RevertReason};
use poh_registry::{Commitment, Identity, Principal, Record};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one commit run against a registry.
#[derive(Debug, Clone)]
pub struct Committer {
    contract: RegistryContract,
    client: ClientConfig,
}

impl Committer {
    pub fn new(contract: RegistryContract, client: ClientConfig) -> Self {
        Committer { contract, client }
    }

    /// Commits every parsable row of `dataset`.
    ///
    /// Rows run concurrently (bounded by `max_in_flight`) and the report
    /// lists them in dataset order. Schema errors stay with their row. A
    /// run-level failure stops new work; rows not yet attempted are reported
    /// as `Failed(Aborted)`.
    pub async fn run(&self, dataset: &Dataset) -> CommitReport {
        let caller = self.client.caller();
        info!(
            rows = dataset.len(),
            %caller,
            registry = %self.contract.address(),
            "commit run started"
        );

        if let Err(failure) = self.preflight(&caller).await {
            warn!(%failure, "commit run aborted before submitting");
            let rows = dataset
                .rows()
                .iter()
                .map(|row| {
                    let outcome = match &row.parsed {
                        Ok(_) => CommitOutcome::Failed(CommitFailure::Aborted),
                        Err(e) => CommitOutcome::Failed(CommitFailure::Schema(e.clone())),
                    };
                    CommitRow::new(row, outcome)
                })
                .collect();
            return CommitReport::new(rows, Some(failure));
        }

        let state = Arc::new(RunState::default());
        let task = Arc::new(CommitTask {
            contract: self.contract.clone(),
            client: self.client.clone(),
            caller,
            state: Arc::clone(&state),
        });

        let records: Vec<Record> = dataset.records().cloned().collect();
        let mut outcomes = run_bounded(records, self.client.max_in_flight, move |record| {
            let task = Arc::clone(&task);
            async move { task.commit_row(record).await }
        })
        .await
        .into_iter();

        let rows = dataset
            .rows()
            .iter()
            .map(|row| {
                let outcome = match &row.parsed {
                    Err(e) => CommitOutcome::Failed(CommitFailure::Schema(e.clone())),
                    Ok(_) => outcomes
                        .next()
                        .flatten()
                        .unwrap_or(CommitOutcome::Failed(CommitFailure::Aborted)),
                };
                CommitRow::new(row, outcome)
            })
            .collect();

        let report = CommitReport::new(rows, state.failure());
        info!(
            committed = report.summary.committed,
            skipped = report.summary.skipped,
            failed = report.summary.failed,
            "commit run finished"
        );
        report
    }

    async fn preflight(&self, caller: &Principal) -> Result<(), RunFailure> {
        let mut last_error = None;
        for attempt in 1..=self.client.max_attempts {
            match with_deadline(self.client.read_timeout(), self.contract.owner()).await {
                Ok(Some(owner)) if owner == *caller => return Ok(()),
                Ok(owner) => {
                    return Err(RunFailure::Unauthorized {
                        caller: caller.clone(),
                        owner,
                    })
                }
                Err(e) if e.is_indeterminate() => {
                    debug!(attempt, "owner lookup timed out");
                    last_error = Some(e);
                }
                Err(e) => return Err(RunFailure::Backend(e.to_string())),
            }
        }
        Err(RunFailure::Backend(
            last_error.map_or("owner lookup failed".to_string(), |e| e.to_string()),
        ))
    }
}

/// Per-run state shared by row tasks.
struct CommitTask {
    contract: RegistryContract,
    client: ClientConfig,
    caller: Principal,
    state: Arc<RunState>,
}

impl CommitTask {
    async fn commit_row(&self, record: Record) -> CommitOutcome {
        let identity = &record.identity;
        let commitment = record.commitment();
        let attempts = self.client.max_attempts;

        for attempt in 1..=attempts {
            if self.state.is_aborted() {
                return CommitOutcome::Failed(CommitFailure::Aborted);
            }
            if attempt > 1 {
                tokio::time::sleep(self.client.backoff_before(attempt)).await;
            }

            let submitted = with_deadline(
                self.client.submit_timeout(),
                self.contract.commit(&self.caller, identity, commitment),
            )
            .await;
            match submitted {
                Ok(receipt) => {
                    info!(%identity, %commitment, block = receipt.block, "committed");
                    return CommitOutcome::Committed {
                        commitment,
                        tx_hash: Some(receipt.tx_hash),
                        block: Some(receipt.block),
                    };
                }
                Err(e) if e.is_indeterminate() => {
                    warn!(
                        %identity,
                        attempt,
                        error = %e,
                        "submission outcome unknown, reading back"
                    );
                }
                Err(e) => return self.classify(identity, commitment, e),
            }

            match with_deadline(self.client.read_timeout(), self.contract.get(identity)).await {
                Ok(Some(stored)) if stored == commitment => {
                    info!(%identity, %commitment, "commit confirmed by read-back");
                    return CommitOutcome::Committed {
                        commitment,
                        tx_hash: None,
                        block: None,
                    };
                }
                Ok(Some(stored)) => {
                    warn!(
                        %identity,
                        %stored,
                        ours = %commitment,
                        "identity holds another commitment, skipping"
                    );
                    return CommitOutcome::AlreadySkipped { commitment };
                }
                Ok(None) => debug!(%identity, attempt, "submission did not land"),
                Err(e) if e.is_indeterminate() => debug!(%identity, attempt, "read-back timed out"),
                Err(e) => return self.classify(identity, commitment, e),
            }
        }

        warn!(%identity, attempts, "giving up, outcome indeterminate");
        CommitOutcome::Failed(CommitFailure::Indeterminate { attempts })
    }

    fn classify(
        &self,
        identity: &Identity,
        commitment: Commitment,
        err: LedgerError,
    ) -> CommitOutcome {
        match err {
            LedgerError::Reverted(RevertReason::AlreadyCommitted) => {
                warn!(%identity, "already committed, skipping");
                CommitOutcome::AlreadySkipped { commitment }
            }
            LedgerError::Reverted(RevertReason::Unauthorized { caller, owner }) => {
                self.state.abort(RunFailure::Unauthorized {
                    caller,
                    owner: Some(owner),
                });
                CommitOutcome::Failed(CommitFailure::Unauthorized)
            }
            LedgerError::Reverted(reason) => {
                warn!(%identity, %reason, "commit rejected");
                CommitOutcome::Failed(CommitFailure::Rejected(reason.to_string()))
            }
            e @ (LedgerError::InvalidArguments(_) | LedgerError::UnknownSelector(_)) => {
                warn!(%identity, error = %e, "commit rejected");
                CommitOutcome::Failed(CommitFailure::Rejected(e.to_string()))
            }
            e => {
                self.state.abort(RunFailure::Backend(e.to_string()));
                CommitOutcome::Failed(CommitFailure::Backend(e.to_string()))
            }
        }
    }
}
