// SPDX-License-Identifier: Apache-2.0

//! Bounded channel carrying decoded records to the consumer.
//!
//! Emission never blocks the tail loop: when the consumer falls behind
//! and the channel fills, records are dropped with a warning rather than
//! stalling reads.

use std::time::Duration;

use flume::r#async::RecvFut;
use flume::{Receiver, Sender, TryRecvError, TrySendError};
use tracing::{debug, warn};

use crate::record::DecodedRecord;

pub fn record_channel(capacity: usize) -> (RecordOutput, RecordReceiver) {
    let (tx, rx) = flume::bounded(capacity);
    (RecordOutput { tx }, RecordReceiver { rx })
}

#[derive(Clone)]
#[derive(Debug)]
pub struct RecordOutput {
    tx: Sender<DecodedRecord>,
}

impl RecordOutput {
    /// Hand a record to the consumer without blocking. Full or closed
    /// channel drops the record.
    pub fn emit(&self, record: DecodedRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                warn!(path = %record.path.display(), "record channel full, dropping record");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("record channel closed, dropping record");
            }
        }
    }
}

#[derive(Debug)]
pub struct RecordReceiver {
    rx: Receiver<DecodedRecord>,
}

impl RecordReceiver {
    pub fn next(&self) -> RecvFut<'_, DecodedRecord> {
        self.rx.recv_async()
    }

    pub fn recv_blocking(&self) -> Option<DecodedRecord> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<DecodedRecord> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<DecodedRecord> {
        match self.rx.try_recv() {
            Ok(record) => Some(record),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Take everything currently buffered.
    pub fn drain(&self) -> Vec<DecodedRecord> {
        self.rx.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
