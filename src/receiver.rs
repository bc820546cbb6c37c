// SPDX-License-Identifier: Apache-2.0

//! Async wrapper around the tail engine.
//!
//! Construction validates the configuration up front: a bad layout or an
//! unreadable position file fails here, before anything is spawned. The
//! engine itself runs its blocking poll loop on a dedicated blocking
//! task; path updates arrive over a small channel so discovery can live
//! anywhere.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flume::RecvTimeoutError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::TailConfig;
use crate::engine::TailEngine;
use crate::error::{Error, Result};
use crate::layout::RecordLayout;
use crate::output::{record_channel, RecordOutput, RecordReceiver};
use crate::position::PositionStore;

/// Handle for pushing tracked path updates into a running receiver.
#[derive(Clone)]
pub struct DiscoverySender {
    tx: flume::Sender<Vec<PathBuf>>,
}

impl DiscoverySender {
    /// Replace the tracked path set. Fails once the receiver has shut
    /// down.
    pub fn provide_paths(&self, paths: Vec<PathBuf>) -> Result<()> {
        self.tx.send(paths).map_err(|_| Error::ChannelSend)
    }
}

#[derive(Debug)]
pub struct BinaryTailReceiver {
    config: TailConfig,
    layout: Arc<RecordLayout>,
    positions: PositionStore,
    output: RecordOutput,
    host: String,
    paths_tx: flume::Sender<Vec<PathBuf>>,
    paths_rx: flume::Receiver<Vec<PathBuf>>,
}

impl BinaryTailReceiver {
    /// Build a receiver and the channel its records arrive on.
    ///
    /// Fails fast on invalid configuration, an invalid record layout, or
    /// unreadable position state.
    pub fn new(config: TailConfig) -> Result<(Self, RecordReceiver)> {
        config.validate().map_err(Error::Config)?;

        let layout = Arc::new(RecordLayout::new(config.fields.clone())?);
        let positions = PositionStore::open(&config.position_path)?;
        let host = match &config.host {
            Some(host) => host.clone(),
            None => gethostname::gethostname().to_string_lossy().into_owned(),
        };

        let (output, records) = record_channel(config.channel_capacity);
        let (paths_tx, paths_rx) = flume::bounded(8);

        Ok((
            Self {
                config,
                layout,
                positions,
                output,
                host,
                paths_tx,
                paths_rx,
            },
            records,
        ))
    }

    pub fn discovery_sender(&self) -> DiscoverySender {
        DiscoverySender {
            tx: self.paths_tx.clone(),
        }
    }

    /// Spawn the tail loop onto `task_set`. It runs until `cancel` fires,
    /// then performs a final position flush and exits.
    pub fn start(self, task_set: &mut JoinSet<Result<()>>, cancel: &CancellationToken) {
        let cancel = cancel.clone();
        task_set.spawn(async move {
            let engine = TailEngine::new(
                &self.config,
                self.layout,
                self.positions,
                self.output,
                self.host,
            );
            let tick = self.config.tick_interval();
            let paths_rx = self.paths_rx;

            info!(
                block_size = engine.block_size(),
                tick_ms = tick.as_millis() as u64,
                "starting binary tail loop"
            );

            tokio::task::spawn_blocking(move || run_tail_loop(engine, paths_rx, tick, cancel))
                .await
                .map_err(|e| Error::Task(format!("tail loop panicked: {}", e)))?;
            Ok(())
        });
    }
}

/// Blocking poll loop: apply pending path updates, tick the engine,
/// repeat until cancelled. The path channel doubles as the tick timer.
fn run_tail_loop(
    mut engine: TailEngine,
    paths_rx: flume::Receiver<Vec<PathBuf>>,
    tick: Duration,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        match paths_rx.recv_timeout(tick) {
            Ok(paths) => {
                // Coalesce queued updates; only the latest set matters.
                let mut latest = paths;
                while let Ok(next) = paths_rx.try_recv() {
                    latest = next;
                }
                debug!(paths = latest.len(), "updating tracked paths");
                engine.provide_paths(latest);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // All discovery handles dropped; keep tailing the
                // current set.
                thread::sleep(tick);
            }
        }

        engine.tick();
    }

    debug!("tail loop cancelled, shutting down");
    engine.shutdown();
}
