// src/sync.rs
//! Connectivity-driven reconciliation of the durable queue with the backend

use crate::backend::Backend;
use crate::error::Result;
use crate::events::TrackerEvent;
use crate::queue::QueueHandle;
use log::{info, warn};
use tokio::sync::{broadcast, watch};

/// Result of a manual sync request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No Pending records existed; nothing was attempted
    NothingToSync,
    Drained { sent: usize, remaining: usize },
}

/// Watches connectivity transitions and drains Pending queue records to the
/// backend in insertion order. A failed submission stops the drain so order
/// is preserved and a failing backend is not hammered; the next transition
/// or a manual sync retries from the first remaining Pending record.
///
/// The coordinator owns its connectivity subscription; dropping the
/// coordinator (or the watch sender) ends `run` cleanly, so no callback can
/// outlive it.
pub struct SyncCoordinator<B: Backend> {
    queue: QueueHandle,
    backend: B,
    connectivity: watch::Receiver<bool>,
    events: broadcast::Sender<TrackerEvent>,
    offline_notified: bool,
    failure_notified: bool,
}

impl<B: Backend> SyncCoordinator<B> {
    pub fn new(
        queue: QueueHandle,
        backend: B,
        connectivity: watch::Receiver<bool>,
        events: broadcast::Sender<TrackerEvent>,
    ) -> Self {
        Self {
            queue,
            backend,
            connectivity,
            events,
            offline_notified: false,
            failure_notified: false,
        }
    }

    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// React to connectivity transitions until the watch sender is dropped
    pub async fn run(mut self) {
        let mut was_online = self.is_online();

        // Records left over from a previous run are drained right away when
        // the device comes up online
        if was_online {
            if let Err(e) = self.drain().await {
                warn!("Startup drain failed: {}", e);
            }
        }

        loop {
            if self.connectivity.changed().await.is_err() {
                info!("Connectivity watch closed, sync coordinator shutting down");
                break;
            }

            let online = self.is_online();
            if online == was_online {
                continue;
            }
            was_online = online;

            if online {
                self.offline_notified = false;
                self.failure_notified = false;
                let _ = self.events.send(TrackerEvent::BackOnline);
                if let Err(e) = self.drain().await {
                    warn!("Drain after reconnect failed: {}", e);
                }
            } else if !self.offline_notified {
                self.offline_notified = true;
                let _ = self.events.send(TrackerEvent::WentOffline);
            }
        }
    }

    /// Manual "sync now": the same drain, reporting a summary to the caller
    pub async fn sync_now(&mut self) -> Result<SyncOutcome> {
        let (pending, _) = self.queue.partition().await?;
        if pending.is_empty() {
            return Ok(SyncOutcome::NothingToSync);
        }

        let (sent, remaining) = self.drain().await?;
        Ok(SyncOutcome::Drained { sent, remaining })
    }

    /// Push Pending records in insertion order, stopping at the first
    /// failure or when connectivity drops mid-drain. Returns (sent,
    /// remaining).
    async fn drain(&mut self) -> Result<(usize, usize)> {
        let (pending, _) = self.queue.partition().await?;
        let total = pending.len();
        let mut sent = 0;

        for record in pending {
            if !self.is_online() {
                info!("Connectivity lost mid-drain, {} of {} sent", sent, total);
                break;
            }

            match self.backend.submit_record(&record).await {
                Ok(()) => {
                    self.queue.mark_sent(&record.id).await?;
                    sent += 1;
                }
                Err(e) => {
                    warn!("Submission of record {} failed: {}", record.id, e);
                    if !self.failure_notified {
                        self.failure_notified = true;
                        let _ = self.events.send(TrackerEvent::SyncFailed {
                            detail: e.to_string(),
                        });
                    }
                    break;
                }
            }
        }

        if sent == total {
            self.failure_notified = false;
        }
        Ok((sent, total - sent))
    }
}
