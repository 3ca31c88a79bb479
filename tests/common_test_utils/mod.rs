// Shared helpers for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Once;

use skincam::camera::hal::StreamGeometry;
use skincam::camera_config::SimulatedCameraConfig;
use skincam::config_loader::MasterConfig;

static LOGGER: Once = Once::new();

pub fn init_test_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Defaults with a small, fast simulated camera writing under `output_dir`.
pub fn simulated_config(output_dir: &Path) -> MasterConfig {
    let mut config = MasterConfig::default();
    config.app_settings.output_directory = output_dir.display().to_string();
    config.app_settings.worker_shutdown_timeout_ms = 5000;
    config.camera.simulated = SimulatedCameraConfig {
        output_sizes: vec![StreamGeometry::new(48, 32)],
        preview_fps: 120,
        ..SimulatedCameraConfig::default()
    };
    config
}

pub fn jpegs_in(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    files.retain(|p| p.extension().map_or(false, |ext| ext == "jpg"));
    files.sort();
    files
}
