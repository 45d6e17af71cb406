//! Bounded, order-preserving task pipeline shared by the commit and
//! verification paths.

use poh_ledger::LedgerError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};

use crate::report::RunFailure;

/// Abort flag plus the first run-level failure that raised it.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    aborted: AtomicBool,
    failure: Mutex<Option<RunFailure>>,
}

impl RunState {
    /// Raises the abort flag. Only the first failure is kept.
    pub(crate) fn abort(&self, failure: RunFailure) {
        let mut slot = self.failure.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            tracing::error!(%failure, "run aborted");
            *slot = Some(failure);
        }
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub(crate) fn failure(&self) -> Option<RunFailure> {
        self.failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Runs `work` over `inputs` with at most `max_in_flight` tasks alive.
///
/// Output `i` belongs to input `i` whatever the completion order. A slot is
/// `None` only if its task was cancelled; a panicking task re-raises its
/// panic here.
pub(crate) async fn run_bounded<I, O, F, Fut>(
    inputs: Vec<I>,
    max_in_flight: usize,
    work: F,
) -> Vec<Option<O>>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    let work = Arc::new(work);
    let mut slots: Vec<Option<O>> = (0..inputs.len()).map(|_| None).collect();
    let mut tasks = JoinSet::new();

    for (index, input) in inputs.into_iter().enumerate() {
        while tasks.len() >= max_in_flight.max(1) {
            match tasks.join_next().await {
                Some(joined) => settle(&mut slots, joined),
                None => break,
            }
        }
        let work = Arc::clone(&work);
        tasks.spawn(async move { (index, work(input).await) });
    }

    while let Some(joined) = tasks.join_next().await {
        settle(&mut slots, joined);
    }
    slots
}

fn settle<O>(slots: &mut [Option<O>], joined: Result<(usize, O), JoinError>) {
    match joined {
        Ok((index, output)) => slots[index] = Some(output),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => tracing::warn!(error = %e, "pipeline task cancelled"),
    }
}

/// Awaits a ledger round trip, mapping an elapsed deadline to
/// `LedgerError::Timeout`.
pub(crate) async fn with_deadline<T, Fut>(deadline: Duration, fut: Fut) -> Result<T, LedgerError>
where
    Fut: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout(deadline)),
    }
}
