use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::camera::hal::StreamGeometry;
use crate::camera::preview_surface::{PreviewFrame, PreviewSurface};
use crate::camera_config::SimulatedCameraConfig;
use crate::common::file_utils::PictureStorage;
use crate::core::collaborators::{ImageStorage, Navigator, PermissionProvider, PermissionReply, UiFeedback};
use crate::core::image_persistor::{CapturedImagePersistor, PersistedImage};
use crate::core::still_receiver::StillImageReceiver;
use crate::errors::AppError;

pub fn tiny_sim() -> SimulatedCameraConfig {
    SimulatedCameraConfig {
        output_sizes: vec![StreamGeometry::new(24, 16)],
        preview_fps: 200,
        ..SimulatedCameraConfig::default()
    }
}

pub fn test_receiver(dir: &Path, storage: Option<Arc<dyn ImageStorage>>) -> StillImageReceiver {
    let storage = storage.unwrap_or_else(|| Arc::new(PictureStorage::new("JPEG_", "%Y%m%d_%H%M%S")));
    StillImageReceiver::new(CapturedImagePersistor::new(storage, dir, 90), 90)
}

#[derive(Default)]
pub struct RecordingUi {
    indicator: Mutex<Vec<bool>>,
    notes: Mutex<Vec<String>>,
}

impl RecordingUi {
    pub fn indicator_history(&self) -> Vec<bool> {
        self.indicator.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notes.lock().unwrap().clone()
    }
}

impl UiFeedback for RecordingUi {
    fn set_capture_in_progress(&self, in_progress: bool) {
        self.indicator.lock().unwrap().push(in_progress);
    }

    fn notify(&self, message: &str) {
        self.notes.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    shown: Mutex<Vec<PersistedImage>>,
    finished: Mutex<u32>,
}

impl RecordingNavigator {
    pub fn results(&self) -> Vec<PersistedImage> {
        self.shown.lock().unwrap().clone()
    }

    pub fn finished(&self) -> u32 {
        *self.finished.lock().unwrap()
    }
}

impl Navigator for RecordingNavigator {
    fn show_capture_result(&self, image: &PersistedImage) {
        self.shown.lock().unwrap().push(image.clone());
    }

    fn finish_screen(&self) {
        *self.finished.lock().unwrap() += 1;
    }
}

pub struct StaticPermissions {
    granted: bool,
    pub requests: Mutex<u32>,
}

impl StaticPermissions {
    pub fn new(granted: bool) -> Self {
        StaticPermissions {
            granted,
            requests: Mutex::new(0),
        }
    }
}

impl PermissionProvider for StaticPermissions {
    fn has_camera_permission(&self) -> bool {
        self.granted
    }

    fn request_camera_permission(&self, reply: PermissionReply) {
        *self.requests.lock().unwrap() += 1;
        reply(self.granted);
    }
}

pub struct NullSurface;

impl PreviewSurface for NullSurface {
    fn set_default_buffer_size(&self, _geometry: StreamGeometry) {}
    fn render_frame(&self, _frame: PreviewFrame) {}
}

pub struct FailingStorage;

impl ImageStorage for FailingStorage {
    fn create_unique_image_file(&self, _directory_hint: &Path) -> Result<PathBuf, AppError> {
        Err(AppError::Io("storage unavailable".to_string()))
    }
}
