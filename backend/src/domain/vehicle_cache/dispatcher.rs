//! Fire-and-forget delivery of change-log entries.
//!
//! Entries go through a bounded channel to a single worker task that appends
//! them to the log repository. A full queue drops the entry; a failed append
//! is logged. Neither outcome reaches the writer that produced the entry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::domain::UpdateLogDraft;
use crate::domain::ports::UpdateLogRepository;

/// Default number of entries that may wait for delivery.
pub const DEFAULT_LOG_QUEUE_CAPACITY: usize = 1024;

/// Delivery counters since the dispatcher started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LogDeliveryStats {
    /// Entries accepted onto the queue.
    pub enqueued: u64,
    /// Entries appended to the log.
    pub delivered: u64,
    /// Entries discarded because the queue was full or closed.
    pub dropped: u64,
    /// Entries whose append failed.
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> LogDeliveryStats {
        LogDeliveryStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

enum Message {
    Entry(Box<UpdateLogDraft>),
    Flush(oneshot::Sender<()>),
}

/// Handle onto the change-log delivery worker. Clones share the worker.
#[derive(Clone)]
pub struct UpdateLogDispatcher {
    sender: mpsc::Sender<Message>,
    counters: Arc<Counters>,
}

impl UpdateLogDispatcher {
    /// Start the worker on the current Tokio runtime.
    ///
    /// The worker exits once every handle has been dropped and the queue has
    /// drained.
    pub fn spawn(log: Arc<dyn UpdateLogRepository>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        tokio::spawn(deliver(log, receiver, Arc::clone(&counters)));
        Self { sender, counters }
    }

    /// Queue `entry` without waiting; drops it when the queue is full.
    pub fn dispatch(&self, entry: UpdateLogDraft) {
        let vehicle_id = entry.vehicle_id;
        let update_type = entry.update_type;
        match self.sender.try_send(Message::Entry(Box::new(entry))) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    vehicle_id = %vehicle_id,
                    update_type = %update_type,
                    "update log queue full; entry dropped"
                );
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    vehicle_id = %vehicle_id,
                    update_type = %update_type,
                    "update log worker stopped; entry dropped"
                );
            }
        }
    }

    /// Wait until every entry queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Message::Flush(done)).await.is_err() {
            return;
        }
        // A dropped sender means the worker is gone; nothing left to wait for.
        let _ = wait.await;
    }

    /// Current delivery counters.
    pub fn stats(&self) -> LogDeliveryStats {
        self.counters.snapshot()
    }
}

async fn deliver(
    log: Arc<dyn UpdateLogRepository>,
    mut receiver: mpsc::Receiver<Message>,
    counters: Arc<Counters>,
) {
    while let Some(message) = receiver.recv().await {
        match message {
            Message::Entry(entry) => match log.append(&entry).await {
                Ok(id) => {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        id,
                        vehicle_id = %entry.vehicle_id,
                        changed = entry.changes.len(),
                        "update log entry stored"
                    );
                }
                Err(error) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        vehicle_id = %entry.vehicle_id,
                        update_type = %entry.update_type,
                        error = %error,
                        "update log append failed"
                    );
                }
            },
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("update log worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use rstest::rstest;
    use serde_json::json;

    use crate::domain::ports::{MockUpdateLogRepository, UpdateLogRepositoryError};
    use crate::domain::{UpdateKind, VehicleId};
    use crate::test_support::fixed_now;

    fn draft(vehicle: i64) -> UpdateLogDraft {
        UpdateLogDraft {
            vehicle_id: VehicleId::new(vehicle),
            update_type: UpdateKind::VehicleInfo,
            old_value: None,
            new_value: json!({ "state": "online" }),
            changes: BTreeMap::new(),
            actor: None,
            created_at: fixed_now(),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn failed_appends_are_counted_not_raised() {
        let mut log = MockUpdateLogRepository::new();
        log.expect_append()
            .times(2)
            .returning(|entry| match entry.vehicle_id.get() {
                1 => Ok(10),
                _ => Err(UpdateLogRepositoryError::connection("down")),
            });
        let dispatcher = UpdateLogDispatcher::spawn(Arc::new(log), 8);

        dispatcher.dispatch(draft(1));
        dispatcher.dispatch(draft(2));
        dispatcher.flush().await;

        assert_eq!(
            dispatcher.stats(),
            LogDeliveryStats {
                enqueued: 2,
                delivered: 1,
                dropped: 0,
                failed: 1,
            }
        );
    }

    #[rstest]
    #[tokio::test(flavor = "current_thread")]
    async fn full_queue_drops_entries() {
        let mut log = MockUpdateLogRepository::new();
        log.expect_append().returning(|_| Ok(1));
        let dispatcher = UpdateLogDispatcher::spawn(Arc::new(log), 1);

        // The worker cannot run until this task yields, so the second entry
        // finds the single slot occupied.
        dispatcher.dispatch(draft(1));
        dispatcher.dispatch(draft(2));
        dispatcher.flush().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.delivered, 1);
    }
}
