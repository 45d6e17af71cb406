//! # Verification Path
//!
//! Recomputes each row's commitment with the same canonical encoder used at
//! commit time and compares it with what the registry holds. Read-only and
//! repeatable: running it twice against unchanged inputs gives the same
//! report.

use crate::config::ClientConfig;
use crate::dataset::Dataset;
use crate::pipeline::{run_bounded, with_deadline, RunState};
use crate::report::{RunFailure, VerifyFailure, VerifyOutcome, VerifyReport, VerifyRow};
use poh_ledger::RegistryContract;
use poh_registry::Record;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one verification run against a registry.
#[derive(Debug, Clone)]
pub struct Verifier {
    contract: RegistryContract,
    client: ClientConfig,
}

impl Verifier {
    pub fn new(contract: RegistryContract, client: ClientConfig) -> Self {
        Verifier { contract, client }
    }

    /// Verifies every parsable row of `dataset`, in dataset order.
    pub async fn run(&self, dataset: &Dataset) -> VerifyReport {
        info!(rows = dataset.len(), registry = %self.contract.address(), "verification started");

        let state = Arc::new(RunState::default());
        let task = Arc::new(VerifyTask {
            contract: self.contract.clone(),
            client: self.client.clone(),
            state: Arc::clone(&state),
        });

        let records: Vec<Record> = dataset.records().cloned().collect();
        let mut outcomes = run_bounded(records, self.client.max_in_flight, move |record| {
            let task = Arc::clone(&task);
            async move { task.verify_row(record).await }
        })
        .await
        .into_iter();

        let rows = dataset
            .rows()
            .iter()
            .map(|row| {
                let outcome = match &row.parsed {
                    Err(e) => VerifyOutcome::Failed(VerifyFailure::Schema(e.clone())),
                    Ok(_) => outcomes
                        .next()
                        .flatten()
                        .unwrap_or(VerifyOutcome::Failed(VerifyFailure::Aborted)),
                };
                VerifyRow::new(row, outcome)
            })
            .collect();

        let report = VerifyReport::new(rows, state.failure());
        let s = &report.summary;
        if s.mismatched > 0 {
            warn!(mismatched = s.mismatched, "verification found mismatched records");
        }
        info!(
            matched = s.matched,
            mismatched = s.mismatched,
            never_committed = s.never_committed,
            failed = s.failed,
            "verification finished"
        );
        report
    }
}

struct VerifyTask {
    contract: RegistryContract,
    client: ClientConfig,
    state: Arc<RunState>,
}

impl VerifyTask {
    async fn verify_row(&self, record: Record) -> VerifyOutcome {
        let identity = &record.identity;
        let recomputed = record.commitment();
        let attempts = self.client.max_attempts;

        for attempt in 1..=attempts {
            if self.state.is_aborted() {
                return VerifyOutcome::Failed(VerifyFailure::Aborted);
            }
            if attempt > 1 {
                tokio::time::sleep(self.client.backoff_before(attempt)).await;
            }

            match with_deadline(self.client.read_timeout(), self.contract.get(identity)).await {
                Ok(None) => {
                    debug!(%identity, "never committed");
                    return VerifyOutcome::NeverCommitted { recomputed };
                }
                Ok(Some(stored)) if stored == recomputed => {
                    debug!(%identity, "match");
                    return VerifyOutcome::Match {
                        commitment: stored,
                    };
                }
                Ok(Some(stored)) => {
                    warn!(
                        %identity,
                        %stored,
                        %recomputed,
                        "MISMATCH: local record differs from committed history"
                    );
                    return VerifyOutcome::Mismatch { stored, recomputed };
                }
                Err(e) if e.is_indeterminate() => {
                    debug!(%identity, attempt, "read timed out");
                }
                Err(e) => {
                    self.state.abort(RunFailure::Backend(e.to_string()));
                    return VerifyOutcome::Failed(VerifyFailure::Backend(e.to_string()));
                }
            }
        }

        warn!(%identity, attempts, "no answer from ledger");
        VerifyOutcome::Failed(VerifyFailure::Indeterminate { attempts })
    }
}
