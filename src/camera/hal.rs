use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use crate::camera::capture_request::CaptureRequestDescriptor;
use crate::camera::image_reader::ImageReader;
use crate::camera::preview_surface::PreviewTarget;
use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CameraIdentity(String);

impl CameraIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        CameraIdentity(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct StreamGeometry {
    pub width: u32,
    pub height: u32,
}

impl StreamGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        StreamGeometry { width, height }
    }
}

impl fmt::Display for StreamGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraEvent {
    DeviceOpened,
    DeviceDisconnected,
    DeviceError(i32),
    SessionConfigured,
    SessionConfigFailed,
    CaptureCompleted,
    ImageAvailable,
}

/// Callback handle for hardware events. Cloned into every device, session
/// and image reader so all callbacks funnel through one dispatch path.
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(CameraEvent) + Send + Sync>);

impl EventSink {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(CameraEvent) + Send + Sync + 'static,
    {
        EventSink(Arc::new(callback))
    }

    pub fn emit(&self, event: CameraEvent) {
        (self.0)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

#[derive(Clone, Debug)]
pub enum SurfaceTarget {
    Preview(PreviewTarget),
    StillImage(Arc<ImageReader>),
}

impl SurfaceTarget {
    pub fn geometry(&self) -> StreamGeometry {
        match self {
            SurfaceTarget::Preview(target) => target.geometry(),
            SurfaceTarget::StillImage(reader) => reader.geometry(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SurfaceTarget::Preview(_) => "preview",
            SurfaceTarget::StillImage(_) => "still-image",
        }
    }

    /// Identity comparison: true when both refer to the same underlying surface.
    pub fn same_surface(&self, other: &SurfaceTarget) -> bool {
        match (self, other) {
            (SurfaceTarget::Preview(a), SurfaceTarget::Preview(b)) => a.same_surface(b),
            (SurfaceTarget::StillImage(a), SurfaceTarget::StillImage(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

pub trait CameraBackend: Send + Sync {
    fn camera_ids(&self) -> Result<Vec<CameraIdentity>, AppError>;

    fn output_sizes(&self, id: &CameraIdentity) -> Result<Vec<StreamGeometry>, AppError>;

    /// Requests exclusive access. `DeviceOpened`, `DeviceDisconnected` or
    /// `DeviceError` follows on `events`.
    fn open_camera(
        &self,
        id: &CameraIdentity,
        events: EventSink,
    ) -> Result<Box<dyn CameraDevice>, AppError>;
}

pub trait CameraDevice: Send {
    fn id(&self) -> &CameraIdentity;

    /// Negotiates a pipeline over `outputs`. `SessionConfigured` or
    /// `SessionConfigFailed` follows on `events`.
    fn create_capture_session(
        &mut self,
        outputs: Vec<SurfaceTarget>,
        events: EventSink,
    ) -> Result<Box<dyn CaptureSession>, AppError>;

    fn close(&mut self);
}

pub trait CaptureSession: Send {
    fn set_repeating_request(&mut self, request: &CaptureRequestDescriptor) -> Result<(), AppError>;

    fn stop_repeating(&mut self) -> Result<(), AppError>;

    /// Submits a one-shot request. `CaptureCompleted` follows on the
    /// session's sink; encoded output lands in the target's image reader.
    fn capture(&mut self, request: &CaptureRequestDescriptor) -> Result<(), AppError>;

    fn close(&mut self);
}
