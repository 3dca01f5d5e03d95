use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::geo::{address_or_unavailable, GeoPoint, Geocoder};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionFix {
    pub point: GeoPoint,
    /// Radius in meters.
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::ZERO,
        }
    }
}

#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self, options: PositionOptions) -> Result<PositionFix, ClientError>;

    fn watch(&self, options: PositionOptions) -> Result<PositionWatch, ClientError>;
}

/// A continuous stream of fixes. Dropping it stops the producer.
pub struct PositionWatch {
    fixes: ReceiverStream<Result<PositionFix, ClientError>>,
    producer: Option<JoinHandle<()>>,
}

impl PositionWatch {
    pub fn new(
        rx: mpsc::Receiver<Result<PositionFix, ClientError>>,
        producer: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            fixes: ReceiverStream::new(rx),
            producer,
        }
    }
}

impl Stream for PositionWatch {
    type Item = Result<PositionFix, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.fixes).poll_next(cx)
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

/// Emits the same fix at a fixed interval. Stands in for a GPS on stationary
/// terminals.
pub struct StaticPositionSource {
    fix: PositionFix,
    interval: Duration,
}

impl StaticPositionSource {
    pub fn new(fix: PositionFix, interval: Duration) -> Self {
        Self { fix, interval }
    }
}

#[async_trait]
impl PositionSource for StaticPositionSource {
    async fn current_position(
        &self,
        _options: PositionOptions,
    ) -> Result<PositionFix, ClientError> {
        Ok(self.fix)
    }

    fn watch(&self, _options: PositionOptions) -> Result<PositionWatch, ClientError> {
        let (tx, rx) = mpsc::channel(4);
        let fix = self.fix;
        let interval = self.interval;

        let producer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if tx.send(Ok(fix)).await.is_err() {
                    break;
                }
            }
        });

        Ok(PositionWatch::new(rx, Some(producer)))
    }
}

/// For devices without geolocation.
pub struct UnsupportedPositionSource;

#[async_trait]
impl PositionSource for UnsupportedPositionSource {
    async fn current_position(
        &self,
        _options: PositionOptions,
    ) -> Result<PositionFix, ClientError> {
        Err(ClientError::Capture("geolocation not supported".to_string()))
    }

    fn watch(&self, _options: PositionOptions) -> Result<PositionWatch, ClientError> {
        Err(ClientError::Capture("geolocation not supported".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedLocation {
    pub fix: PositionFix,
    /// `None` while the address lookup is still running.
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationSnapshot {
    pub location: Option<TrackedLocation>,
    pub error: Option<String>,
}

/// Follows a position watch and resolves each fix to an address.
pub struct LocationTracker {
    snapshot_rx: watch::Receiver<LocationSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl LocationTracker {
    pub fn start(
        source: &dyn PositionSource,
        geocoder: Arc<dyn Geocoder>,
        options: PositionOptions,
    ) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(LocationSnapshot::default());

        let mut fixes = match source.watch(options) {
            Ok(fixes) => fixes,
            Err(err) => {
                warn!(error = %err, "location watch unavailable");
                snapshot_tx.send_modify(|snapshot| {
                    snapshot.error = Some("Geolocation not supported by your device.".to_string())
                });
                return Self {
                    snapshot_rx,
                    task: None,
                };
            }
        };

        let task = tokio::spawn(async move {
            while let Some(item) = fixes.next().await {
                match item {
                    Ok(fix) => {
                        debug!(
                            lat = fix.point.lat,
                            lng = fix.point.lng,
                            accuracy = fix.accuracy,
                            "position fix"
                        );
                        snapshot_tx.send_modify(|snapshot| {
                            snapshot.location = Some(TrackedLocation { fix, address: None });
                            snapshot.error = None;
                        });

                        let address = address_or_unavailable(geocoder.as_ref(), fix.point).await;
                        snapshot_tx.send_modify(|snapshot| {
                            if let Some(location) = snapshot.location.as_mut() {
                                if location.fix == fix {
                                    location.address = Some(address);
                                }
                            }
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "geolocation error");
                        snapshot_tx.send_modify(|snapshot| {
                            snapshot.error = Some("Unable to fetch location.".to_string())
                        });
                    }
                }
            }
        });

        Self {
            snapshot_rx,
            task: Some(task),
        }
    }

    pub fn snapshot(&self) -> LocationSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LocationSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn stop(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        self.abort();
    }
}
