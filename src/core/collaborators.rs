use std::path::{Path, PathBuf};

use crate::camera::capture_request::DisplayRotation;
use crate::core::image_persistor::PersistedImage;
use crate::errors::AppError;

/// Called exactly once with the user's answer.
pub type PermissionReply = Box<dyn FnOnce(bool) + Send>;

pub trait PermissionProvider: Send + Sync {
    fn has_camera_permission(&self) -> bool;
    fn request_camera_permission(&self, reply: PermissionReply);
}

pub trait Navigator: Send + Sync {
    /// Hands a saved capture to whatever screen comes next.
    fn show_capture_result(&self, image: &PersistedImage);
    /// Terminates the camera screen.
    fn finish_screen(&self);
}

pub trait ImageStorage: Send + Sync {
    /// Creates a fresh, uniquely named image file under `directory_hint`.
    fn create_unique_image_file(&self, directory_hint: &Path) -> Result<PathBuf, AppError>;
}

pub trait DisplayRotationProvider: Send + Sync {
    fn current_display_rotation(&self) -> DisplayRotation;
}

pub trait UiFeedback: Send + Sync {
    /// Shows or hides the "processing" indicator (and the capture trigger with it).
    fn set_capture_in_progress(&self, in_progress: bool);
    /// Transient user notification.
    fn notify(&self, message: &str);
}

/// Rotation that never changes, for headless runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedDisplayRotation(pub DisplayRotation);

impl DisplayRotationProvider for FixedDisplayRotation {
    fn current_display_rotation(&self) -> DisplayRotation {
        self.0
    }
}
