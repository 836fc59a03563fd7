// src/track/source.rs
//! Position sources: device GPS abstraction and the fleet-GPS poller

use crate::backend::Backend;
use chrono::{DateTime, Utc};
use log::warn;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

/// One position delivery from a source. `is_fallback` marks updates
/// synthesized from the configured default coordinate after a source
/// failure, so downstream code can warn the user once per outage.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: f64,
    pub heading_degrees: Option<f64>,
    pub accuracy_meters: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub is_fallback: bool,
}

/// Something that can report where the vehicle is. Implementations never
/// fail the caller: a denied permission or timeout degrades to the
/// configured default coordinate.
pub trait PositionSource {
    /// Single-shot position read
    fn current(&self) -> impl std::future::Future<Output = PositionUpdate> + Send;

    /// Continuous tracking: push updates into `tx` until the receiver goes
    /// away
    fn run(&self, tx: mpsc::Sender<PositionUpdate>) -> impl std::future::Future<Output = ()> + Send;
}

/// Polls a third-party fleet-GPS provider for the tracked device and turns
/// its reports into position updates. Devices whose status is not "online"
/// are treated the same as a provider failure.
pub struct FleetGpsSource<B: Backend> {
    backend: B,
    device_id: String,
    poll_interval: Duration,
    fallback_latitude: f64,
    fallback_longitude: f64,
}

impl<B: Backend> FleetGpsSource<B> {
    pub fn new(
        backend: B,
        device_id: impl Into<String>,
        poll_interval_secs: u64,
        fallback_latitude: f64,
        fallback_longitude: f64,
    ) -> Self {
        Self {
            backend,
            device_id: device_id.into(),
            poll_interval: Duration::from_secs(poll_interval_secs),
            fallback_latitude,
            fallback_longitude,
        }
    }

    fn fallback_update(&self) -> PositionUpdate {
        PositionUpdate {
            latitude: self.fallback_latitude,
            longitude: self.fallback_longitude,
            speed_kmh: 0.0,
            heading_degrees: None,
            accuracy_meters: None,
            timestamp: Utc::now(),
            is_fallback: true,
        }
    }

    async fn poll_once(&self) -> PositionUpdate {
        let devices = match self.backend.fetch_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Fleet-GPS poll failed, using default coordinate: {}", e);
                return self.fallback_update();
            }
        };

        match devices
            .iter()
            .find(|d| d.id == self.device_id && d.is_online())
        {
            Some(device) => PositionUpdate {
                latitude: device.latitude,
                longitude: device.longitude,
                speed_kmh: device.speed_kmh,
                heading_degrees: None,
                accuracy_meters: None,
                timestamp: Utc::now(),
                is_fallback: false,
            },
            None => {
                warn!(
                    "Device {} not reported online, using default coordinate",
                    self.device_id
                );
                self.fallback_update()
            }
        }
    }
}

impl<B: Backend> PositionSource for FleetGpsSource<B> {
    async fn current(&self) -> PositionUpdate {
        self.poll_once().await
    }

    async fn run(&self, tx: mpsc::Sender<PositionUpdate>) {
        let mut ticker = interval(self.poll_interval);

        loop {
            ticker.tick().await;
            let update = self.poll_once().await;

            match tx.try_send(update) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => break,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Consumer is behind, drop this update
                }
            }
        }
    }
}

/// Convenience for sources that are not polled but pushed externally (e.g.
/// a platform GPS callback feeding the channel directly)
pub fn position_channel(capacity: usize) -> (mpsc::Sender<PositionUpdate>, mpsc::Receiver<PositionUpdate>) {
    mpsc::channel(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AssignmentFilter, FleetDevice};
    use crate::error::{Result, TrackerError};
    use crate::track::sample::{Assignment, PositionSample};

    struct FixedDevices {
        devices: Option<Vec<FleetDevice>>,
    }

    impl Backend for FixedDevices {
        async fn fetch_assignment(&self, _filter: &AssignmentFilter) -> Result<Assignment> {
            Err(TrackerError::Other("not used".to_string()))
        }

        async fn submit_route(
            &self,
            _assignment_id: &str,
            _collection_points: &[PositionSample],
        ) -> Result<()> {
            Ok(())
        }

        async fn submit_form(&self, _payload: &serde_json::Value) -> Result<()> {
            Ok(())
        }

        async fn fetch_devices(&self) -> Result<Vec<FleetDevice>> {
            self.devices
                .clone()
                .ok_or_else(|| TrackerError::Connection("provider down".to_string()))
        }
    }

    fn device(id: &str, status: &str) -> FleetDevice {
        FleetDevice {
            id: id.to_string(),
            name: format!("Truck {}", id),
            status: status.to_string(),
            latitude: 47.5,
            longitude: 8.7,
            speed_kmh: 22.0,
        }
    }

    #[tokio::test]
    async fn test_online_device_becomes_update() {
        let backend = FixedDevices {
            devices: Some(vec![device("d-1", "online"), device("d-2", "offline")]),
        };
        let source = FleetGpsSource::new(backend, "d-1", 30, 47.0, 8.0);

        let update = source.current().await;
        assert!(!update.is_fallback);
        assert_eq!(update.latitude, 47.5);
        assert_eq!(update.speed_kmh, 22.0);
    }

    #[tokio::test]
    async fn test_offline_device_falls_back() {
        let backend = FixedDevices {
            devices: Some(vec![device("d-1", "offline")]),
        };
        let source = FleetGpsSource::new(backend, "d-1", 30, 47.0, 8.0);

        let update = source.current().await;
        assert!(update.is_fallback);
        assert_eq!(update.latitude, 47.0);
        assert_eq!(update.longitude, 8.0);
        assert_eq!(update.speed_kmh, 0.0);
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back_instead_of_erroring() {
        let _ = env_logger::builder().is_test(true).try_init();

        let backend = FixedDevices { devices: None };
        let source = FleetGpsSource::new(backend, "d-1", 30, 47.0, 8.0);

        let update = source.current().await;
        assert!(update.is_fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_pushes_updates_until_receiver_drops() {
        let backend = FixedDevices {
            devices: Some(vec![device("d-1", "online")]),
        };
        let source = FleetGpsSource::new(backend, "d-1", 1, 47.0, 8.0);
        let (tx, mut rx) = position_channel(4);

        let worker = tokio::spawn(async move { source.run(tx).await });

        let update = rx.recv().await.unwrap();
        assert!(!update.is_fallback);
        assert_eq!(update.latitude, 47.5);

        // Dropping the receiver ends the polling loop at the next tick
        drop(rx);
        worker.await.unwrap();
    }
}
