// src/tracker.rs
//! Session coordination: position source -> validator -> durable queue

use crate::backend::Backend;
use crate::error::Result;
use crate::events::{event_channel, TrackerEvent};
use crate::queue::QueueHandle;
use crate::track::sample::{Assignment, CapacityReport, PositionSample};
use crate::track::source::PositionUpdate;
use crate::track::validator::{TrackingSession, ValidationPolicy};
use chrono::Utc;
use log::{info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tokio::sync::{broadcast, mpsc, watch};

/// Wires the pieces of the engine together for one live tracking session.
/// Each accepted sample is written durably first; pushing it to the backend
/// is opportunistic and only flips the record to Sent on acknowledgment, so
/// a crash between the two cannot lose a sample.
pub struct Tracker<B: Backend> {
    session: Arc<Mutex<TrackingSession>>,
    queue: QueueHandle,
    backend: B,
    connectivity: watch::Receiver<bool>,
    events: broadcast::Sender<TrackerEvent>,
    running: Arc<AtomicBool>,
    source_warned: AtomicBool,
    policy: ValidationPolicy,
}

impl<B: Backend> Tracker<B> {
    pub fn new(
        assignment_id: impl Into<String>,
        policy: ValidationPolicy,
        queue: QueueHandle,
        backend: B,
        connectivity: watch::Receiver<bool>,
    ) -> Self {
        let (events, _) = event_channel();
        Self {
            session: Arc::new(Mutex::new(TrackingSession::new(assignment_id, policy))),
            queue,
            backend,
            connectivity,
            events,
            running: Arc::new(AtomicBool::new(true)),
            source_warned: AtomicBool::new(false),
            policy,
        }
    }

    /// Subscribe to the engine's event stream
    pub fn events(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Sender side of the event stream, for wiring a `SyncCoordinator`
    /// onto the same channel
    pub fn event_sender(&self) -> broadcast::Sender<TrackerEvent> {
        self.events.clone()
    }

    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop consuming position updates
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Snapshot of the session counters for display
    pub fn session_snapshot(&self) -> TrackingSession {
        self.session.lock().unwrap().clone()
    }

    /// Consume position updates until the channel closes or `stop` is called
    pub async fn run(&self, mut rx: mpsc::Receiver<PositionUpdate>) {
        while let Some(update) = rx.recv().await {
            if !self.is_running() {
                break;
            }
            if let Err(e) = self.handle_update(update, false).await {
                warn!("Failed to process position update: {}", e);
            }
        }
    }

    /// Validate one update and durably record it when accepted. Returns the
    /// stored sample, or None when the update was rejected.
    pub async fn handle_update(
        &self,
        update: PositionUpdate,
        is_return_event: bool,
    ) -> Result<Option<PositionSample>> {
        if update.is_fallback {
            // Warn once per outage; a real update re-arms the warning
            if !self.source_warned.swap(true, Ordering::Relaxed) {
                let _ = self.events.send(TrackerEvent::PositionSourceUnavailable {
                    detail: "Position source degraded to default coordinate".to_string(),
                });
            }
        } else {
            self.source_warned.store(false, Ordering::Relaxed);
        }

        let candidate = {
            let session = self.session.lock().unwrap();
            let mut sample = PositionSample::new(
                update.latitude,
                update.longitude,
                update.timestamp,
                update.speed_kmh,
                session.assignment_id.clone(),
            );
            sample.accuracy_meters = update.accuracy_meters;
            sample.is_return_event = is_return_event;
            sample
        };

        let validation = {
            let mut session = self.session.lock().unwrap();
            session.validate(&candidate, Utc::now())
        };

        if !validation.accepted {
            let _ = self.events.send(TrackerEvent::SampleRejected {
                reason: validation.reason.to_string(),
            });
            return Ok(None);
        }

        let record = self.queue.append(candidate.clone()).await?;
        let _ = self
            .events
            .send(TrackerEvent::SampleAccepted(candidate.clone()));

        // Opportunistic push; failure just leaves the record Pending for the
        // sync coordinator. A later push can succeed while an earlier record
        // is still Pending, so backend arrival order is guaranteed only for
        // the coordinator's drain, not for this path.
        if self.is_online() {
            match self.backend.submit_record(&record).await {
                Ok(()) => self.queue.mark_sent(&record.id).await?,
                Err(e) => warn!("Opportunistic push failed, record stays queued: {}", e),
            }
        }

        Ok(Some(candidate))
    }

    /// Record a return-to-station event, optionally with a capacity reading.
    /// Return events skip the stationary-jitter gate in the validator.
    pub async fn record_return(
        &self,
        update: PositionUpdate,
        capacity: Option<CapacityReport>,
    ) -> Result<Option<PositionSample>> {
        let stored = self.handle_update(update, true).await?;
        if let Some(report) = capacity {
            let _ = self.events.send(TrackerEvent::CapacityReported(report));
        }
        Ok(stored)
    }

    /// Adopt an assignment fetched from the backend. A differing id
    /// supersedes the local session: queued samples reference an assignment
    /// that no longer exists and are discarded.
    pub async fn adopt_assignment(&self, remote: Assignment) -> Result<()> {
        let superseded = {
            let session = self.session.lock().unwrap();
            session.assignment_id != remote.id
        };

        if superseded {
            info!(
                "Assignment superseded by backend ({}), discarding local queue",
                remote.id
            );
            self.queue.clear().await?;
            let mut session = self.session.lock().unwrap();
            *session = TrackingSession::new(remote.id.clone(), self.policy);
        }

        self.queue.save_assignment(remote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AssignmentFilter, FleetDevice};
    use crate::error::TrackerError;
    use crate::queue::spawn_queue;
    use crate::store::JsonStore;
    use crate::track::sample::OperatorRef;
    use chrono::{NaiveDate, TimeZone};
    use std::sync::atomic::AtomicUsize;

    /// Backend that accepts or rejects every submission wholesale
    struct FlatBackend {
        accept: bool,
        submissions: AtomicUsize,
    }

    impl FlatBackend {
        fn accepting() -> Self {
            Self {
                accept: true,
                submissions: AtomicUsize::new(0),
            }
        }

        fn rejecting() -> Self {
            Self {
                accept: false,
                submissions: AtomicUsize::new(0),
            }
        }
    }

    impl Backend for FlatBackend {
        async fn fetch_assignment(&self, _filter: &AssignmentFilter) -> Result<Assignment> {
            Err(TrackerError::Other("not used".to_string()))
        }

        async fn submit_route(
            &self,
            _assignment_id: &str,
            _collection_points: &[PositionSample],
        ) -> Result<()> {
            self.submissions.fetch_add(1, Ordering::Relaxed);
            if self.accept {
                Ok(())
            } else {
                Err(TrackerError::Sync("rejected".to_string()))
            }
        }

        async fn submit_form(&self, _payload: &serde_json::Value) -> Result<()> {
            Ok(())
        }

        async fn fetch_devices(&self) -> Result<Vec<FleetDevice>> {
            Ok(Vec::new())
        }
    }

    fn update(lat: f64, lon: f64, secs: i64) -> PositionUpdate {
        PositionUpdate {
            latitude: lat,
            longitude: lon,
            speed_kmh: 18.0,
            heading_degrees: None,
            accuracy_meters: Some(5.0),
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            is_fallback: false,
        }
    }

    fn tracker_with(
        dir: &std::path::Path,
        backend: FlatBackend,
        online: bool,
    ) -> (Tracker<FlatBackend>, QueueHandle) {
        let queue = spawn_queue(JsonStore::new(dir.to_path_buf()).unwrap());
        // The receiver keeps reporting the last value after the sender drops
        let (_online_tx, online_rx) = watch::channel(online);
        let tracker = Tracker::new(
            "a-1",
            ValidationPolicy::default(),
            queue.clone(),
            backend,
            online_rx,
        );
        (tracker, queue)
    }

    #[tokio::test]
    async fn test_accepted_sample_is_queued_and_pushed_when_online() {
        let dir = tempfile::tempdir().unwrap();
        let (tracker, queue) = tracker_with(dir.path(), FlatBackend::accepting(), true);
        let mut events = tracker.events();

        let stored = tracker.handle_update(update(47.0, 8.0, 0), false).await.unwrap();
        assert!(stored.is_some());

        let event = events.recv().await.unwrap();
        assert!(matches!(event, TrackerEvent::SampleAccepted(_)));

        // Opportunistic push acknowledged, so the record is already Sent
        let (pending, sent) = queue.partition().await.unwrap();
        assert!(pending.is_empty());
        assert_eq!(sent.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_sample_is_dropped_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        let (tracker, queue) = tracker_with(dir.path(), FlatBackend::accepting(), true);
        let mut events = tracker.events();

        tracker.handle_update(update(47.0, 8.0, 0), false).await.unwrap();
        events.recv().await.unwrap();

        // ~11 m of jitter one second later
        let stored = tracker
            .handle_update(update(47.0, 8.0001, 1), false)
            .await
            .unwrap();
        assert!(stored.is_none());

        let event = events.recv().await.unwrap();
        match event {
            TrackerEvent::SampleRejected { reason } => {
                assert_eq!(reason, "no movement detected")
            }
            other => panic!("unexpected event {:?}", other),
        }

        assert_eq!(queue.locations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_sample_stays_pending() {
        let dir = tempfile::tempdir().unwrap();
        let (tracker, queue) = tracker_with(dir.path(), FlatBackend::accepting(), false);

        tracker.handle_update(update(47.0, 8.0, 0), false).await.unwrap();

        let (pending, sent) = queue.partition().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_failed_push_leaves_record_pending() {
        let dir = tempfile::tempdir().unwrap();
        let (tracker, queue) = tracker_with(dir.path(), FlatBackend::rejecting(), true);

        tracker.handle_update(update(47.0, 8.0, 0), false).await.unwrap();

        let (pending, sent) = queue.partition().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_adopt_same_assignment_keeps_queue() {
        let dir = tempfile::tempdir().unwrap();
        let (tracker, queue) = tracker_with(dir.path(), FlatBackend::accepting(), false);
        tracker.handle_update(update(47.0, 8.0, 0), false).await.unwrap();

        let remote = Assignment::new(
            "a-1",
            "truck-7",
            OperatorRef::Internal("staff-3".to_string()),
            NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        );
        tracker.adopt_assignment(remote).await.unwrap();

        assert_eq!(queue.locations().await.unwrap().len(), 1);
        assert!(queue.load_assignment().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_adopt_different_assignment_discards_queue() {
        let dir = tempfile::tempdir().unwrap();
        let (tracker, queue) = tracker_with(dir.path(), FlatBackend::accepting(), false);
        tracker.handle_update(update(47.0, 8.0, 0), false).await.unwrap();

        let remote = Assignment::new(
            "a-2",
            "truck-7",
            OperatorRef::Internal("staff-3".to_string()),
            NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        );
        tracker.adopt_assignment(remote).await.unwrap();

        assert!(queue.locations().await.unwrap().is_empty());
        assert_eq!(tracker.session_snapshot().assignment_id, "a-2");
        // The superseding assignment itself is stored
        assert_eq!(queue.load_assignment().await.unwrap().unwrap().id, "a-2");
    }

    #[tokio::test]
    async fn test_return_event_with_capacity_report() {
        let dir = tempfile::tempdir().unwrap();
        let (tracker, _queue) = tracker_with(dir.path(), FlatBackend::accepting(), false);
        let mut events = tracker.events();

        tracker.handle_update(update(47.0, 8.0, 0), false).await.unwrap();
        events.recv().await.unwrap();

        // Stationary return report passes the jitter gate
        let report = CapacityReport {
            label: "full".to_string(),
            value: 1.0,
            timestamp: Utc.timestamp_opt(1_700_000_060, 0).unwrap(),
        };
        let stored = tracker
            .record_return(update(47.0, 8.0, 60), Some(report))
            .await
            .unwrap();
        assert!(stored.is_some());
        assert!(stored.unwrap().is_return_event);

        let event = events.recv().await.unwrap();
        assert!(matches!(event, TrackerEvent::SampleAccepted(_)));
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TrackerEvent::CapacityReported(_)));
    }

    #[tokio::test]
    async fn test_fallback_update_warns_once_per_outage() {
        let dir = tempfile::tempdir().unwrap();
        let (tracker, _queue) = tracker_with(dir.path(), FlatBackend::accepting(), false);
        let mut events = tracker.events();

        let mut fallback = update(47.0, 8.0, 0);
        fallback.is_fallback = true;
        tracker.handle_update(fallback.clone(), false).await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(matches!(event, TrackerEvent::PositionSourceUnavailable { .. }));
        // First fix, so the fallback coordinate itself was accepted
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TrackerEvent::SampleAccepted(_)));

        // A second fallback in the same outage stays quiet about the source
        let mut second = fallback;
        second.timestamp = Utc.timestamp_opt(1_700_000_010, 0).unwrap();
        tracker.handle_update(second, false).await.unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TrackerEvent::SampleRejected { .. }));
    }
}
