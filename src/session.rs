//! Lifecycle of capture sessions.
//!
//! [`SessionController`] owns the flow table and the capture worker. Control
//! calls (`start`, `stop`, `harvest`, `status`) may come from any task; they
//! serialise on one async mutex. The worker is the only task that routes
//! packets. It observes cancellation only while waiting for the next packet,
//! so a packet is either applied in full or not at all.
//!
//! The flow table is replaced, never cleared in place, whenever a session
//! starts, stops, or is harvested.

use std::{collections::HashMap, sync::Arc};

use log::{error, info, warn};
use thiserror::Error;
use tokio::{select, sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    demux::FlowTable,
    source::{PacketSource, SourceError, SourceFactory},
    stream::{LatencyRecord, RecordKey, StreamStats},
};

/// Errors returned by session control operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `start` was called while a capture is running.
    #[error("capture session already running")]
    AlreadyRunning,
    /// The packet source could not be opened.
    #[error("failed to open packet source: {0}")]
    Source(#[from] SourceError),
    /// The capture worker panicked.
    #[error("capture worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Snapshot of the controller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// A capture worker is pulling packets.
    pub running: bool,
    /// Flows in the current table.
    pub flows: usize,
    /// Counters summed over the current table.
    pub stats: StreamStats,
    /// Why the most recent session ended early, if it did.
    pub last_failure: Option<String>,
}

/// Why a capture worker returned.
#[derive(Debug)]
enum WorkerExit {
    EndOfStream { packets: u64 },
    Cancelled { packets: u64 },
    Failed { packets: u64, error: SourceError },
}

struct Worker {
    shutdown: CancellationToken,
    handle: JoinHandle<WorkerExit>,
}

struct SessionState {
    table: Arc<FlowTable>,
    worker: Option<Worker>,
    last_failure: Option<String>,
}

impl SessionState {
    fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Cancel the worker, if any, and wait for it to return.
    async fn halt(&mut self) -> Result<(), SessionError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.shutdown.cancel();
        self.join(worker).await
    }

    /// Collect a worker that already returned on its own.
    async fn reap_finished(&mut self) -> Result<(), SessionError> {
        match self.worker.take() {
            Some(worker) if worker.handle.is_finished() => self.join(worker).await,
            other => {
                self.worker = other;
                Ok(())
            }
        }
    }

    async fn join(&mut self, worker: Worker) -> Result<(), SessionError> {
        match worker.handle.await {
            Ok(WorkerExit::EndOfStream { packets }) => {
                info!("capture ended: reason=end_of_stream, packets={packets}");
                Ok(())
            }
            Ok(WorkerExit::Cancelled { packets }) => {
                info!("capture ended: reason=stopped, packets={packets}");
                Ok(())
            }
            Ok(WorkerExit::Failed { packets, error }) => {
                error!("capture ended: reason=source_failure, packets={packets}, error={error}");
                self.last_failure = Some(error.to_string());
                Ok(())
            }
            Err(join_error) => {
                let message = join_error.to_string();
                error!("capture worker panicked: error={message}");
                self.last_failure = Some(message.clone());
                Err(SessionError::WorkerPanicked(message))
            }
        }
    }

    fn reset_table(&mut self) -> Arc<FlowTable> {
        std::mem::replace(&mut self.table, Arc::new(FlowTable::new()))
    }
}

/// Owner of the capture session and its flow table.
pub struct SessionController {
    factory: Arc<dyn SourceFactory>,
    state: Mutex<SessionState>,
}

impl SessionController {
    /// Controller that opens packet sources through `factory`.
    #[must_use]
    pub fn new(factory: Arc<dyn SourceFactory>) -> Self {
        Self {
            factory,
            state: Mutex::new(SessionState {
                table: Arc::new(FlowTable::new()),
                worker: None,
                last_failure: None,
            }),
        }
    }

    /// Open a new packet source and start capturing into an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyRunning`] if a capture is in progress
    /// and [`SessionError::Source`] if the source cannot be opened.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if state.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        if let Err(err) = state.reap_finished().await {
            warn!("previous capture worker failed: error={err}");
        }

        let description = self.factory.describe();
        let source = self.factory.open().await?;
        state.reset_table();
        state.last_failure = None;

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            run_capture(source, Arc::clone(&state.table), shutdown.clone())
                .instrument(tracing::info_span!("capture", source = %description)),
        );
        state.worker = Some(Worker { shutdown, handle });
        info!("capture started: source={description}");
        Ok(())
    }

    /// Stop capturing and discard the flow table.
    ///
    /// Frames still being decoded are abandoned. Calling this while idle
    /// succeeds without effect.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WorkerPanicked`] if the worker panicked. The
    /// table is discarded regardless.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let halted = state.halt().await;
        state.reset_table();
        halted
    }

    /// Stop capturing and return every latency record of the session.
    ///
    /// The flow table is discarded afterwards, so each record is returned by
    /// exactly one harvest.
    pub async fn harvest(&self) -> HashMap<RecordKey, LatencyRecord> {
        let mut state = self.state.lock().await;
        if let Err(err) = state.halt().await {
            warn!("harvesting after worker failure: error={err}");
        }
        let table = state.reset_table();
        let stats = table.stats();
        let records = table.take_records();
        info!(
            "harvest complete: flows={}, records={}, frames={}, ignored={}, malformed={}, \
             orphan_responses={}, overwritten_requests={}",
            table.len(),
            records.len(),
            stats.frames_decoded,
            stats.frames_ignored,
            stats.frames_malformed,
            stats.orphan_responses,
            stats.overwritten_requests,
        );
        records
    }

    /// Report whether a capture is running and what it has seen.
    pub async fn status(&self) -> SessionStatus {
        let mut state = self.state.lock().await;
        if let Err(err) = state.reap_finished().await {
            warn!("capture worker failed: error={err}");
        }
        SessionStatus {
            running: state.is_running(),
            flows: state.table.len(),
            stats: state.table.stats(),
            last_failure: state.last_failure.clone(),
        }
    }
}

/// Pull packets from `source` into `table` until cancelled, exhausted, or
/// failed.
async fn run_capture(
    mut source: Box<dyn PacketSource>,
    table: Arc<FlowTable>,
    shutdown: CancellationToken,
) -> WorkerExit {
    let mut packets = 0u64;
    let exit = loop {
        let next = select! {
            biased;
            () = shutdown.cancelled() => break WorkerExit::Cancelled { packets },
            next = source.next_packet() => next,
        };
        match next {
            Ok(Some(packet)) => {
                table.route(&packet);
                packets += 1;
            }
            Ok(None) => {
                table.abandon_pending();
                break WorkerExit::EndOfStream { packets };
            }
            Err(error) => break WorkerExit::Failed { packets, error },
        }
    };
    source.close();
    exit
}

#[cfg(test)]
mod tests;
