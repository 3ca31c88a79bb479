use log::debug;
use std::fmt;
use std::sync::Arc;

use crate::camera::hal::StreamGeometry;

/// One tick of the live preview stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewFrame {
    pub sequence: u64,
    pub geometry: StreamGeometry,
}

/// A drawing surface owned by the UI that preview frames are rendered into.
pub trait PreviewSurface: Send + Sync {
    fn set_default_buffer_size(&self, geometry: StreamGeometry);
    fn render_frame(&self, frame: PreviewFrame);
}

/// A UI surface sized for the camera's preview stream.
#[derive(Clone)]
pub struct PreviewTarget {
    surface: Arc<dyn PreviewSurface>,
    geometry: StreamGeometry,
}

impl PreviewTarget {
    pub fn geometry(&self) -> StreamGeometry {
        self.geometry
    }

    pub fn render(&self, frame: PreviewFrame) {
        self.surface.render_frame(frame)
    }

    pub fn same_surface(&self, other: &PreviewTarget) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.surface), Arc::as_ptr(&other.surface))
    }
}

impl fmt::Debug for PreviewTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewTarget")
            .field("geometry", &self.geometry)
            .finish()
    }
}

pub struct PreviewSurfaceBinding;

impl PreviewSurfaceBinding {
    /// Resizes the surface's buffers to `geometry` and wraps it as a session output.
    pub fn bind(surface: Arc<dyn PreviewSurface>, geometry: StreamGeometry) -> PreviewTarget {
        debug!("🖼️ Binding preview surface at {}", geometry);
        surface.set_default_buffer_size(geometry);
        PreviewTarget { surface, geometry }
    }
}
