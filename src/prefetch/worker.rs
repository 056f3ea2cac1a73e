// Background download workers - keep fetching off the UI thread
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::fetcher::{CancelToken, FetchRequest, MediaFetcher};
use crate::cache::CachedMedia;
use crate::error::FetchError;

/// Message sent to the worker threads
enum WorkerMessage {
    /// Download one item
    Fetch { request: FetchRequest, token: CancelToken },
    /// Stop one worker thread
    Stop,
}

/// Result handed back to the owning thread
pub(crate) struct FetchOutcome {
    pub request: FetchRequest,
    pub token: CancelToken,
    pub result: Result<CachedMedia, FetchError>,
}

/// Pool of download threads that never touches the cache.
///
/// Architecture:
/// - Owner sends fetch jobs via channel (non-blocking)
/// - Workers run the fetcher and send outcomes back
/// - Owner polls outcomes via try_recv and updates the cache itself
pub(crate) struct WorkerPool {
    job_tx: Sender<WorkerMessage>,
    outcome_rx: Receiver<FetchOutcome>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads sharing one fetcher
    pub fn spawn<F: MediaFetcher>(fetcher: F, workers: usize) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();
        let fetcher = Arc::new(fetcher);

        let threads = (0..workers.max(1))
            .map(|id| {
                let fetcher = Arc::clone(&fetcher);
                let job_rx = job_rx.clone();
                let outcome_tx = outcome_tx.clone();
                thread::Builder::new()
                    .name(format!("predownload-{}", id))
                    .spawn(move || worker_main(id, fetcher, job_rx, outcome_tx))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!("Failed to spawn predownload worker: {}", e);
                    None
                }
            })
            .collect();

        Self {
            job_tx,
            outcome_rx,
            threads,
        }
    }

    /// Queue a download (non-blocking)
    pub fn submit(&self, request: FetchRequest, token: CancelToken) {
        // Send only fails once every worker is gone; the request then just never completes
        if self.job_tx.send(WorkerMessage::Fetch { request, token }).is_err() {
            tracing::warn!("Predownload workers are gone, dropping request");
        }
    }

    /// Poll for a finished download (non-blocking)
    pub fn try_next(&self) -> Option<FetchOutcome> {
        match self.outcome_rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for a finished download
    pub fn next_timeout(&self, timeout: Duration) -> Option<FetchOutcome> {
        match self.outcome_rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Signal every thread to stop
        for _ in &self.threads {
            let _ = self.job_tx.send(WorkerMessage::Stop);
        }

        // Wait for threads to finish
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Worker thread main loop
fn worker_main<F: MediaFetcher>(
    id: usize,
    fetcher: Arc<F>,
    job_rx: Receiver<WorkerMessage>,
    outcome_tx: Sender<FetchOutcome>,
) {
    tracing::trace!("Predownload worker {} started", id);

    loop {
        // Block waiting for next job
        let message = match job_rx.recv() {
            Ok(message) => message,
            Err(_) => break, // Channel closed
        };

        match message {
            WorkerMessage::Stop => break,

            WorkerMessage::Fetch { request, token } => {
                // Skip work the owner already gave up on
                if token.is_cancelled() {
                    tracing::trace!("Skipping cancelled predownload {}", request.key);
                    continue;
                }

                tracing::debug!("Worker {} downloading {}", id, request.key);
                let result = fetcher.fetch(&request, &token);

                // Ignore send errors - the owner may have been dropped
                let _ = outcome_tx.send(FetchOutcome {
                    request,
                    token,
                    result,
                });
            }
        }
    }

    tracing::trace!("Predownload worker {} stopped", id);
}
