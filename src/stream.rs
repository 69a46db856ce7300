//! One-shot row stream shared by both transports.
//!
//! A producer task (HTTP body decoder or JSONL-RPC dispatcher) pushes rows through a
//! [`RowSender`]; the consumer pulls them from the matching [`RowStream`]. The channel holds
//! at most one row, so every send waits for the consumer to take the previous row.
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::DbProxyError;

pub(crate) type RawRow = Vec<JsonValue>;
pub(crate) type RowItem = Result<RawRow, DbProxyError>;

/// Producer half of a row stream.
#[derive(Clone)]
pub(crate) struct RowSender {
    tx: mpsc::Sender<RowItem>,
    cancel: CancellationToken,
}

impl RowSender {
    /// Hand one row to the consumer, waiting until it has room.
    ///
    /// Returns `false` once the consumer has closed or dropped the stream; the producer is
    /// expected to stop at that point.
    pub(crate) async fn send(&self, row: RowItem) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.tx.send(row) => sent.is_ok(),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    pub(crate) async fn cancelled(&self) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = self.tx.closed() => {}
        }
    }

    /// Put an unbounded queue in front of this sender.
    ///
    /// Pushing onto the returned queue never waits; a spawned task hands queued items to the
    /// consumer one at a time and drops the queue once the consumer goes away. Dropping the
    /// queue ends the stream after everything already queued was delivered.
    pub(crate) fn buffered(self) -> mpsc::UnboundedSender<RowItem> {
        let (queue, mut pending) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(item) = tokio::select! {
                biased;
                () = self.cancelled() => None,
                item = pending.recv() => item,
            } {
                if !self.send(item).await {
                    break;
                }
            }
        });
        queue
    }
}

/// Consumer half: the lazy, non-restartable sequence of rows produced by one query.
#[derive(Debug)]
pub struct RowStream {
    rx: mpsc::Receiver<RowItem>,
    cancel: CancellationToken,
}

impl RowStream {
    pub(crate) fn channel() -> (RowSender, RowStream) {
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        (
            RowSender {
                tx,
                cancel: cancel.clone(),
            },
            RowStream { rx, cancel },
        )
    }

    /// Receive the next raw row, or `None` once the producer has finished.
    pub async fn recv(&mut self) -> Option<Result<Vec<JsonValue>, DbProxyError>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.recv().await
    }

    /// Signal the producer to stop and refuse any further rows.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
