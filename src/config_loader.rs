use serde::Deserialize;
use std::fs;
use std::path::Path;
use crate::app_config::ApplicationConfig;
use crate::camera_config::{BackendKind, CameraConfig};
use crate::camera::capture_request::DisplayRotation;
use anyhow::{Result, Context, bail};
use std::collections::HashSet;
use log::{debug, info};
use std::time::Instant;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MasterConfig {
    #[serde(rename = "application")]
    pub app_settings: ApplicationConfig,
    pub camera: CameraConfig,
}

pub fn load_config(path: &str) -> Result<MasterConfig> {
    debug!("📄 Attempting to load config from: {}", path);
    let start_time = Instant::now();

    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file '{}'. 📖", path))?;
    debug!("Read config file in {:?}", start_time.elapsed());

    let config = parse_config(&config_str)
        .with_context(|| format!("Invalid configuration in '{}'", path))?;

    info!("✅ Successfully loaded and validated configuration from '{}' in {:?}", path, start_time.elapsed());
    Ok(config)
}

/// Loads `path` when it exists, otherwise falls back to built-in defaults.
/// Only used for the implicit default path; an explicit `--config` must exist.
pub fn load_config_or_default(path: &str) -> Result<MasterConfig> {
    if Path::new(path).exists() {
        return load_config(path);
    }
    info!("ℹ️ No configuration file at '{}', using built-in defaults.", path);
    let config = MasterConfig::default();
    validate_master_config(&config)?;
    Ok(config)
}

pub fn parse_config(yaml: &str) -> Result<MasterConfig> {
    let parse_start_time = Instant::now();
    let config: MasterConfig = serde_yaml::from_str(yaml)
        .context("Failed to parse YAML configuration. 💔")?;
    debug!("Parsed YAML in {:?}", parse_start_time.elapsed());

    validate_master_config(&config).context("Master configuration validation failed 👎")?;
    Ok(config)
}

pub fn validate_master_config(config: &MasterConfig) -> Result<()> {
    debug!("🕵️ Validating master configuration...");
    let validation_start_time = Instant::now();
    let app = &config.app_settings;

    if app.output_directory.trim().is_empty() {
        bail!("❌ Application output_directory cannot be empty.");
    }
    let output_path = Path::new(&app.output_directory);
    if output_path.exists() && !output_path.is_dir() {
        bail!("❌ Output directory '{}' exists but is not a directory.", app.output_directory);
    }
    if app.filename_prefix.is_empty() {
        bail!("❌ Application filename_prefix cannot be empty.");
    }
    if app.filename_timestamp_format.is_empty() {
        bail!("❌ Application filename_timestamp_format cannot be empty.");
    }
    if !(1..=100).contains(&app.jpeg_quality) {
        bail!("❌ jpeg_quality must be within 1..=100, got {}.", app.jpeg_quality);
    }
    if app.still_rotation_degrees % 90 != 0 {
        bail!("❌ still_rotation_degrees must be a multiple of 90, got {}.", app.still_rotation_degrees);
    }

    let camera = &config.camera;
    if DisplayRotation::from_degrees(camera.display_rotation).is_none() {
        bail!("❌ display_rotation must be one of 0, 90, 180, 270, got {}.", camera.display_rotation);
    }

    match camera.backend {
        BackendKind::Simulated => {
            let sim = &camera.simulated;
            if sim.camera_ids.is_empty() {
                bail!("❌ No camera ids defined for the simulated backend.");
            }
            let mut ids = HashSet::new();
            for id in &sim.camera_ids {
                if id.is_empty() {
                    bail!("❌ Simulated camera id cannot be empty.");
                }
                if !ids.insert(id) {
                    bail!("❌ Duplicate simulated camera id found: {}", id);
                }
            }
            if sim.output_sizes.is_empty() {
                bail!("❌ No output sizes defined for the simulated backend.");
            }
            if let Some(size) = sim.output_sizes.iter().find(|s| s.width == 0 || s.height == 0) {
                bail!("❌ Simulated output size {} has a zero dimension.", size);
            }
            if sim.preview_fps == 0 {
                bail!("❌ Simulated preview_fps must be greater than zero.");
            }
        }
        BackendKind::Opencv => {
            if camera.opencv.device_indices.is_empty() {
                bail!("❌ No device indices defined for the opencv backend.");
            }
            if camera.opencv.preview_fps == 0 {
                bail!("❌ OpenCV preview_fps must be greater than zero.");
            }
        }
    }

    info!("👍 Master configuration validated successfully in {:?}.", validation_start_time.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_config::PermissionPolicy;

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.app_settings.jpeg_quality, 90);
        assert_eq!(config.app_settings.still_rotation_degrees, 90);
        assert_eq!(config.app_settings.filename_prefix, "JPEG_");
        assert_eq!(config.camera.backend, BackendKind::Simulated);
        assert_eq!(config.camera.permission, PermissionPolicy::Granted);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let yaml = r#"
application:
  output_directory: /tmp/skincam-test
  jpeg_quality: 75
camera:
  display_rotation: 270
  permission: prompt
  simulated:
    camera_ids: ["back", "front"]
    output_sizes:
      - { width: 320, height: 240 }
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.app_settings.jpeg_quality, 75);
        assert_eq!(config.app_settings.worker_shutdown_timeout_ms, 2000);
        assert_eq!(config.camera.display_rotation, 270);
        assert_eq!(config.camera.permission, PermissionPolicy::Prompt);
        assert_eq!(config.camera.simulated.camera_ids, vec!["back", "front"]);
        assert_eq!(config.camera.simulated.output_sizes[0].width, 320);
        assert_eq!(config.camera.simulated.preview_fps, 30);
    }

    #[test]
    fn rejects_unsupported_display_rotation() {
        let err = parse_config("camera:\n  display_rotation: 45\n").unwrap_err();
        assert!(format!("{:#}", err).contains("display_rotation"));
    }

    #[test]
    fn rejects_out_of_range_quality() {
        assert!(parse_config("application:\n  jpeg_quality: 0\n").is_err());
        assert!(parse_config("application:\n  jpeg_quality: 101\n").is_err());
    }

    #[test]
    fn rejects_odd_still_rotation() {
        assert!(parse_config("application:\n  still_rotation_degrees: 45\n").is_err());
    }

    #[test]
    fn rejects_simulated_backend_without_sizes() {
        let yaml = "camera:\n  simulated:\n    output_sizes: []\n";
        assert!(parse_config(yaml).is_err());
    }

    #[test]
    fn rejects_duplicate_simulated_ids() {
        let yaml = "camera:\n  simulated:\n    camera_ids: [\"0\", \"0\"]\n";
        assert!(parse_config(yaml).is_err());
    }
}
