//! Background mean-spectrum computation.
//!
//! The dataset hands an `Arc` snapshot of its spectra to a named thread,
//! which aggregates it on its own rayon pool and sends the result back
//! over a bounded channel. The output carries the processing generation
//! of that snapshot, so the dataset can refuse results computed before a
//! later transformation.

use std::sync::Arc;
use std::thread::{
    self,
    JoinHandle,
};
use std::time::Duration;

use crossbeam_channel::{
    Receiver,
    RecvTimeoutError,
    TryRecvError,
    bounded,
};
use indicatif::ProgressBar;
use tracing::{
    debug,
    warn,
};

use super::config::AggregationConfig;
use super::engine::{
    AggregationPlan,
    AggregationStats,
    CancellationToken,
    run_batched,
};
use crate::errors::{
    MsiQueryError,
    Result,
};
use crate::models::Spectrum;

/// Result of a background aggregation.
#[derive(Debug, Clone)]
pub struct AggregationOutput {
    pub spectrum: Spectrum,
    /// Cache key of the processing state of the snapshot.
    pub cache_key: String,
    /// Processing generation of the snapshot.
    pub generation: u64,
    pub config: AggregationConfig,
    pub stats: AggregationStats,
}

/// Handle to an aggregation running on its own thread.
///
/// Dropping the handle cancels the job.
pub struct AggregationJob {
    receiver: Receiver<Result<AggregationOutput>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl AggregationJob {
    /// Starts aggregating `indices` of `snapshot` in the background.
    pub fn spawn(
        snapshot: Arc<Vec<Spectrum>>,
        indices: Vec<usize>,
        cache_key: String,
        generation: u64,
        config: AggregationConfig,
        progress: ProgressBar,
    ) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = bounded::<Result<AggregationOutput>>(1);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name("msiquery-aggregator".to_string())
            .spawn(move || {
                let plan = AggregationPlan::new(&snapshot, &indices);
                let result = run_batched(&plan, &config, &worker_cancel, &progress).map(
                    |(spectrum, stats)| AggregationOutput {
                        spectrum,
                        cache_key,
                        generation,
                        config,
                        stats,
                    },
                );
                // The receiver is gone when the handle was dropped
                if sender.send(result).is_err() {
                    debug!("Aggregation result discarded, nobody is waiting for it");
                }
            })
            .map_err(|e| {
                MsiQueryError::Worker(format!("Failed to spawn aggregation thread: {}", e))
            })?;

        Ok(Self {
            receiver,
            cancel,
            handle: Some(handle),
            generation,
        })
    }

    /// Stops the job before its next batch.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Non-blocking poll, `None` while the job is still running.
    pub fn try_result(&mut self) -> Option<Result<AggregationOutput>> {
        match self.receiver.try_recv() {
            Ok(result) => {
                self.join();
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join();
                Some(Err(MsiQueryError::Worker(
                    "Aggregation thread exited without a result".to_string(),
                )))
            }
        }
    }

    /// Blocks until the job is done.
    pub fn wait(mut self) -> Result<AggregationOutput> {
        let result = self.receiver.recv().map_err(|_| {
            MsiQueryError::Worker("Aggregation thread exited without a result".to_string())
        });
        self.join();
        result?
    }

    /// Blocks for at most `timeout`. On timeout the job is cancelled and
    /// [`MsiQueryError::Cancelled`] returned once the worker has stopped.
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<AggregationOutput> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => {
                self.join();
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Aggregation timed out after {:#.2?}, cancelling", timeout);
                self.cancel();
                // Stops at the next batch boundary
                let _ = self.receiver.recv();
                self.join();
                Err(MsiQueryError::Cancelled)
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.join();
                Err(MsiQueryError::Worker(
                    "Aggregation thread exited without a result".to_string(),
                ))
            }
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Aggregation thread panicked");
            }
        }
    }
}

impl Drop for AggregationJob {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
        }
    }
}
