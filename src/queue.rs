// src/queue.rs
//! Durable offline queue for accepted samples and pending submissions
//!
//! All writes funnel through a single worker task that owns the backing
//! store, so a background sampler and a manual entry can never interleave
//! read-modify-write cycles on the same document.

use crate::error::{Result, TrackerError};
use crate::store::JsonStore;
use crate::track::sample::{Assignment, PositionSample};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// Document holding the ordered list of accepted samples
pub const LOCATIONS_DOC: &str = "locations";
/// Document holding the active assignment
pub const ASSIGNMENT_DOC: &str = "assignment";
/// Document holding queue records awaiting backend acknowledgment
pub const FORM_DATA_DOC: &str = "formDataList";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordStatus {
    Pending,
    Sent,
}

/// What a queue record carries to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "data")]
pub enum RecordPayload {
    Sample(PositionSample),
    Form(serde_json::Value),
}

/// One submission awaiting backend acknowledgment. The payload never changes
/// after creation; only the status transitions Pending -> Sent. Records are
/// kept after acknowledgment for inspection and removed only on explicit
/// user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub id: String,
    pub payload: RecordPayload,
    pub status: RecordStatus,
}

impl QueueRecord {
    pub fn is_pending(&self) -> bool {
        self.status == RecordStatus::Pending
    }
}

enum Command {
    Append {
        sample: PositionSample,
        reply: oneshot::Sender<Result<QueueRecord>>,
    },
    EnqueueForm {
        payload: serde_json::Value,
        reply: oneshot::Sender<Result<QueueRecord>>,
    },
    LoadAll {
        reply: oneshot::Sender<Vec<QueueRecord>>,
    },
    Locations {
        reply: oneshot::Sender<Vec<PositionSample>>,
    },
    Partition {
        reply: oneshot::Sender<(Vec<QueueRecord>, Vec<QueueRecord>)>,
    },
    MarkSent {
        id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Remove {
        id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Clear {
        reply: oneshot::Sender<Result<()>>,
    },
    SizeBytes {
        reply: oneshot::Sender<u64>,
    },
    SaveAssignment {
        assignment: Assignment,
        reply: oneshot::Sender<Result<()>>,
    },
    LoadAssignment {
        reply: oneshot::Sender<Option<Assignment>>,
    },
}

/// Cloneable handle to the queue worker. Dropping every handle shuts the
/// worker down after it has drained its mailbox.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<Command>,
}

/// Worker state: in-memory copies of the persisted documents
struct QueueWorker {
    store: JsonStore,
    locations: Vec<PositionSample>,
    records: Vec<QueueRecord>,
    next_seq: u64,
}

/// Spawn the queue worker on the current tokio runtime and return its handle
pub fn spawn_queue(store: JsonStore) -> QueueHandle {
    let (tx, rx) = mpsc::channel(64);
    let worker = QueueWorker::load(store);
    tokio::spawn(worker.run(rx));
    QueueHandle { tx }
}

impl QueueWorker {
    fn load(store: JsonStore) -> Self {
        // Corrupt or missing documents load as empty; the condition is
        // logged inside the store
        let locations: Vec<PositionSample> = store.get(LOCATIONS_DOC).unwrap_or_default();
        let records: Vec<QueueRecord> = store.get(FORM_DATA_DOC).unwrap_or_default();
        if !records.is_empty() {
            info!(
                "Durable queue loaded {} records ({} pending)",
                records.len(),
                records.iter().filter(|r| r.is_pending()).count()
            );
        }
        Self {
            store,
            locations,
            records,
            next_seq: 0,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Append { sample, reply } => {
                let _ = reply.send(self.append(sample));
            }
            Command::EnqueueForm { payload, reply } => {
                let _ = reply.send(self.enqueue(RecordPayload::Form(payload)));
            }
            Command::LoadAll { reply } => {
                let _ = reply.send(self.records.clone());
            }
            Command::Locations { reply } => {
                let _ = reply.send(self.locations.clone());
            }
            Command::Partition { reply } => {
                let (pending, sent) = self
                    .records
                    .iter()
                    .cloned()
                    .partition(|r| r.is_pending());
                let _ = reply.send((pending, sent));
            }
            Command::MarkSent { id, reply } => {
                let _ = reply.send(self.mark_sent(&id));
            }
            Command::Remove { id, reply } => {
                let _ = reply.send(self.remove(&id));
            }
            Command::Clear { reply } => {
                let _ = reply.send(self.clear());
            }
            Command::SizeBytes { reply } => {
                let size = self.store.size_bytes(LOCATIONS_DOC)
                    + self.store.size_bytes(FORM_DATA_DOC)
                    + self.store.size_bytes(ASSIGNMENT_DOC);
                let _ = reply.send(size);
            }
            Command::SaveAssignment { assignment, reply } => {
                let _ = reply.send(self.store.put(ASSIGNMENT_DOC, &assignment));
            }
            Command::LoadAssignment { reply } => {
                let _ = reply.send(self.store.get(ASSIGNMENT_DOC));
            }
        }
    }

    fn next_record_id(&mut self) -> String {
        self.next_seq += 1;
        format!("rec-{}-{}", Utc::now().timestamp_millis(), self.next_seq)
    }

    fn append(&mut self, sample: PositionSample) -> Result<QueueRecord> {
        self.locations.push(sample.clone());
        if let Err(e) = self.store.put(LOCATIONS_DOC, &self.locations) {
            warn!("Failed to persist locations: {}", e);
            self.locations.pop();
            return Err(e);
        }
        self.enqueue(RecordPayload::Sample(sample))
    }

    fn enqueue(&mut self, payload: RecordPayload) -> Result<QueueRecord> {
        let record = QueueRecord {
            id: self.next_record_id(),
            payload,
            status: RecordStatus::Pending,
        };
        self.records.push(record.clone());
        if let Err(e) = self.store.put(FORM_DATA_DOC, &self.records) {
            warn!("Failed to persist queue records: {}", e);
            self.records.pop();
            return Err(e);
        }
        Ok(record)
    }

    fn mark_sent(&mut self, id: &str) -> Result<()> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| TrackerError::Persistence(format!("Unknown queue record: {}", id)))?;
        record.status = RecordStatus::Sent;
        self.store.put(FORM_DATA_DOC, &self.records)
    }

    fn remove(&mut self, id: &str) -> Result<()> {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        if self.records.len() == before {
            return Err(TrackerError::Persistence(format!(
                "Unknown queue record: {}",
                id
            )));
        }
        self.store.put(FORM_DATA_DOC, &self.records)
    }

    fn clear(&mut self) -> Result<()> {
        self.locations.clear();
        self.records.clear();
        self.store.put(LOCATIONS_DOC, &self.locations)?;
        self.store.put(FORM_DATA_DOC, &self.records)?;
        self.store.remove(ASSIGNMENT_DOC)
    }
}

impl QueueHandle {
    async fn request<T>(
        &self,
        cmd: Command,
        rx: oneshot::Receiver<T>,
    ) -> Result<T> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| TrackerError::Persistence("Queue worker stopped".to_string()))?;
        rx.await
            .map_err(|_| TrackerError::Persistence("Queue worker stopped".to_string()))
    }

    /// Durably append an accepted sample. Creates both the location entry
    /// and a Pending queue record for the sync coordinator.
    pub async fn append(&self, sample: PositionSample) -> Result<QueueRecord> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Append { sample, reply }, rx).await?
    }

    /// Enqueue a generic form payload for later submission
    pub async fn enqueue_form(&self, payload: serde_json::Value) -> Result<QueueRecord> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::EnqueueForm { payload, reply }, rx)
            .await?
    }

    /// All queue records in insertion order
    pub async fn load_all(&self) -> Result<Vec<QueueRecord>> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::LoadAll { reply }, rx).await
    }

    /// All accepted samples in insertion order
    pub async fn locations(&self) -> Result<Vec<PositionSample>> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Locations { reply }, rx).await
    }

    /// Split records into (pending, sent), each in insertion order
    pub async fn partition(&self) -> Result<(Vec<QueueRecord>, Vec<QueueRecord>)> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Partition { reply }, rx).await
    }

    /// Flip a record to Sent after backend acknowledgment
    pub async fn mark_sent(&self, id: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(
            Command::MarkSent {
                id: id.to_string(),
                reply,
            },
            rx,
        )
        .await?
    }

    /// Explicitly delete one record (user action only)
    pub async fn remove(&self, id: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(
            Command::Remove {
                id: id.to_string(),
                reply,
            },
            rx,
        )
        .await?
    }

    /// Drop everything, including the stored assignment
    pub async fn clear(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Clear { reply }, rx).await?
    }

    /// Total on-disk footprint of the queue documents
    pub async fn size_bytes(&self) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SizeBytes { reply }, rx).await
    }

    pub async fn save_assignment(&self, assignment: Assignment) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SaveAssignment { assignment, reply }, rx)
            .await?
    }

    pub async fn load_assignment(&self) -> Result<Option<Assignment>> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::LoadAssignment { reply }, rx).await
    }
}
