use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ClientError;
use crate::models::{OrderId, RouteId};
use crate::notify::Notifier;

pub const PHOTO_FILE_NAME: &str = "photo.png";
pub const PHOTO_MIME: &str = "image/png";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum FacingMode {
    /// Back camera.
    #[default]
    Environment,
    /// Front camera.
    User,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::Environment => FacingMode::User,
            FacingMode::User => FacingMode::Environment,
        }
    }

    pub fn toggle_label(self) -> &'static str {
        match self {
            FacingMode::Environment => "Switch to Front Camera",
            FacingMode::User => "Switch to Back Camera",
        }
    }
}

/// The step and action a capture belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureTarget {
    pub route_id: RouteId,
    pub position: usize,
    pub order_id: Option<OrderId>,
    pub action: String,
    pub next_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPhoto {
    pub id: Uuid,
    pub target: CaptureTarget,
    pub bytes: Vec<u8>,
    pub file_name: &'static str,
    pub mime: &'static str,
}

impl CapturedPhoto {
    pub fn png(target: CaptureTarget, bytes: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            bytes,
            file_name: PHOTO_FILE_NAME,
            mime: PHOTO_MIME,
        }
    }
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn start(&self, facing: FacingMode) -> Result<Box<dyn VideoStream>, ClientError>;
}

pub trait VideoStream: Send {
    /// Grabs the current frame encoded as PNG.
    fn grab_png(&mut self) -> Result<Vec<u8>, ClientError>;

    fn stop(&mut self);
}

/// One open camera: preview stream plus the step it will capture for.
///
/// The stream is stopped on capture, on cancel and on drop.
pub struct CameraSession {
    device: Arc<dyn CameraDevice>,
    stream: Option<Box<dyn VideoStream>>,
    facing: FacingMode,
    target: CaptureTarget,
    notifier: Notifier,
}

impl CameraSession {
    pub async fn open(
        device: Arc<dyn CameraDevice>,
        target: CaptureTarget,
        notifier: Notifier,
    ) -> Result<Self, ClientError> {
        let facing = FacingMode::default();
        let stream = match device.start(facing).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "camera start failed");
                notifier.error("Unable to access camera");
                return Err(err);
            }
        };

        debug!(route_id = target.route_id, position = target.position, "camera opened");

        Ok(Self {
            device,
            stream: Some(stream),
            facing,
            target,
            notifier,
        })
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    /// Stops the current stream and restarts on the other camera.
    pub async fn toggle_facing(&mut self) -> Result<(), ClientError> {
        self.stop_stream();

        let next = self.facing.toggled();
        match self.device.start(next).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.facing = next;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, ?next, "camera restart failed");
                self.notifier.error("Unable to access camera");
                Err(err)
            }
        }
    }

    /// Takes one still and closes the camera.
    pub fn capture(mut self) -> Result<CapturedPhoto, ClientError> {
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| ClientError::Capture("camera is not streaming".to_string()))?;

        let frame = stream.grab_png();
        stream.stop();

        match frame {
            Ok(bytes) if !bytes.is_empty() => Ok(CapturedPhoto::png(self.target.clone(), bytes)),
            Ok(_) => {
                self.notifier.error("Failed to capture photo.");
                Err(ClientError::Capture("empty frame".to_string()))
            }
            Err(err) => {
                self.notifier.error("Failed to capture photo.");
                Err(err)
            }
        }
    }

    /// Closes the camera without producing a photo.
    pub fn cancel(self) {
        debug!(
            route_id = self.target.route_id,
            position = self.target.position,
            "camera capture cancelled"
        );
    }

    fn stop_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

/// For hosts without any capture device.
pub struct NoCamera;

#[async_trait]
impl CameraDevice for NoCamera {
    async fn start(&self, _facing: FacingMode) -> Result<Box<dyn VideoStream>, ClientError> {
        Err(ClientError::Capture("no camera available".to_string()))
    }
}

/// Camera backed by an image file on disk, for kiosks and test rigs without
/// a capture device.
pub struct FileCamera {
    path: PathBuf,
}

impl FileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CameraDevice for FileCamera {
    async fn start(&self, _facing: FacingMode) -> Result<Box<dyn VideoStream>, ClientError> {
        if !self.path.is_file() {
            return Err(ClientError::Capture(format!(
                "no image at {}",
                self.path.display()
            )));
        }
        Ok(Box::new(FileStream {
            path: self.path.clone(),
            stopped: false,
        }))
    }
}

struct FileStream {
    path: PathBuf,
    stopped: bool,
}

impl VideoStream for FileStream {
    fn grab_png(&mut self) -> Result<Vec<u8>, ClientError> {
        if self.stopped {
            return Err(ClientError::Capture("stream stopped".to_string()));
        }
        fs::read(&self.path).map_err(|err| ClientError::Capture(err.to_string()))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::{CameraDevice, CameraSession, CaptureTarget, FacingMode, FileCamera, VideoStream};
    use crate::error::ClientError;
    use crate::notify::{NotificationLevel, Notifier};

    #[derive(Default)]
    struct CountingCamera {
        started: AtomicUsize,
        stopped: Arc<AtomicUsize>,
        frame: Vec<u8>,
    }

    struct CountingStream {
        stopped: Arc<AtomicUsize>,
        frame: Vec<u8>,
    }

    impl VideoStream for CountingStream {
        fn grab_png(&mut self) -> Result<Vec<u8>, ClientError> {
            Ok(self.frame.clone())
        }

        fn stop(&mut self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CameraDevice for CountingCamera {
        async fn start(&self, _facing: FacingMode) -> Result<Box<dyn VideoStream>, ClientError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingStream {
                stopped: self.stopped.clone(),
                frame: self.frame.clone(),
            }))
        }
    }

    fn target() -> CaptureTarget {
        CaptureTarget {
            route_id: 1,
            position: 2,
            order_id: Some(77),
            action: "picked_up".to_string(),
            next_status: Some("Picked Up".to_string()),
        }
    }

    #[tokio::test]
    async fn capture_stops_the_stream_and_keeps_the_target() {
        let camera = Arc::new(CountingCamera {
            frame: vec![0x89, b'P', b'N', b'G'],
            ..Default::default()
        });
        let session = CameraSession::open(camera.clone(), target(), Notifier::new(4))
            .await
            .unwrap();

        let photo = session.capture().unwrap();

        assert_eq!(photo.target, target());
        assert_eq!(photo.file_name, "photo.png");
        assert_eq!(photo.mime, "image/png");
        assert_eq!(camera.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_an_open_session_releases_the_camera() {
        let camera = Arc::new(CountingCamera {
            frame: vec![1],
            ..Default::default()
        });
        let session = CameraSession::open(camera.clone(), target(), Notifier::new(4))
            .await
            .unwrap();
        session.cancel();

        assert_eq!(camera.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn toggling_restarts_on_the_other_camera() {
        let camera = Arc::new(CountingCamera {
            frame: vec![1],
            ..Default::default()
        });
        let mut session = CameraSession::open(camera.clone(), target(), Notifier::new(4))
            .await
            .unwrap();
        assert_eq!(session.facing().toggle_label(), "Switch to Front Camera");

        session.toggle_facing().await.unwrap();

        assert_eq!(session.facing(), FacingMode::User);
        assert_eq!(camera.started.load(Ordering::SeqCst), 2);
        assert_eq!(camera.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_frame_is_reported() {
        let camera = Arc::new(CountingCamera::default());
        let notifier = Notifier::new(4);
        let mut rx = notifier.subscribe();
        let session = CameraSession::open(camera, target(), notifier).await.unwrap();

        assert!(matches!(session.capture(), Err(ClientError::Capture(_))));
        let toast = rx.recv().await.unwrap();
        assert_eq!(toast.level, NotificationLevel::Error);
        assert_eq!(toast.message, "Failed to capture photo.");
    }

    #[tokio::test]
    async fn missing_device_surfaces_unable_to_access_camera() {
        let notifier = Notifier::new(4);
        let mut rx = notifier.subscribe();
        let camera = Arc::new(FileCamera::new("/nonexistent/frame.png"));

        let result = CameraSession::open(camera, target(), notifier).await;

        assert!(result.is_err());
        assert_eq!(rx.recv().await.unwrap().message, "Unable to access camera");
    }
}
