use serde::Deserialize;

use crate::camera::hal::StreamGeometry;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Simulated,
    Opencv,
}

/// How the CLI answers the camera permission prompt.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionPolicy {
    Granted,
    Denied,
    Prompt,
}

impl std::str::FromStr for PermissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "granted" => Ok(PermissionPolicy::Granted),
            "denied" => Ok(PermissionPolicy::Denied),
            "prompt" => Ok(PermissionPolicy::Prompt),
            other => Err(format!("unknown permission policy '{}'", other)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CameraConfig {
    pub backend: BackendKind,
    pub display_rotation: u32, // 0, 90, 180 or 270
    pub permission: PermissionPolicy,
    pub simulated: SimulatedCameraConfig,
    pub opencv: OpenCvCameraConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            backend: BackendKind::Simulated,
            display_rotation: 0,
            permission: PermissionPolicy::Granted,
            simulated: SimulatedCameraConfig::default(),
            opencv: OpenCvCameraConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulatedCameraConfig {
    pub camera_ids: Vec<String>,
    pub output_sizes: Vec<StreamGeometry>,
    pub preview_fps: u32,
    pub fail_open: bool,
    pub fail_session_configure: bool,
    pub corrupt_still_frames: bool,
    pub disconnect_after_stills: Option<u32>,
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        SimulatedCameraConfig {
            camera_ids: vec!["0".to_string(), "1".to_string()],
            output_sizes: vec![
                StreamGeometry::new(640, 480),
                StreamGeometry::new(1280, 720),
            ],
            preview_fps: 30,
            fail_open: false,
            fail_session_configure: false,
            corrupt_still_frames: false,
            disconnect_after_stills: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OpenCvCameraConfig {
    pub device_indices: Vec<i32>,
    pub preview_fps: u32,
}

impl Default for OpenCvCameraConfig {
    fn default() -> Self {
        OpenCvCameraConfig {
            device_indices: vec![0],
            preview_fps: 30,
        }
    }
}
