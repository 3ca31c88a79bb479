pub mod app_config;
pub mod camera;
pub mod camera_config;
pub mod cli;
pub mod common;
pub mod config_loader;
pub mod core;
pub mod errors;
pub mod operations;

pub use crate::camera::capture_request::{CaptureRequestFactory, DisplayRotation};
pub use crate::camera::preview_surface::PreviewSurfaceBinding;
pub use crate::core::background_context::{BackgroundExecutionContext, StopOutcome};
pub use crate::core::camera_screen::CameraScreen;
pub use crate::core::image_persistor::{CapturedImagePersistor, PersistedImage};
pub use crate::core::session_controller::{CameraSessionController, ControllerDependencies, SessionState};
pub use crate::core::still_receiver::StillImageReceiver;
pub use crate::errors::AppError;
