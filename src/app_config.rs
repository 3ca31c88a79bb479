use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApplicationConfig {
    pub output_directory: String,
    pub filename_prefix: String, // e.g., "JPEG_"
    pub filename_timestamp_format: String, // strftime format string
    pub jpeg_quality: u8, // JPEG quality (1-100)
    pub still_rotation_degrees: u32, // Fixed correction applied to every still
    pub worker_shutdown_timeout_ms: u64,
    pub log_level: Option<String>, // Making it optional to potentially use CLI or env var as primary
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        ApplicationConfig {
            output_directory: "./output/pictures".to_string(),
            filename_prefix: "JPEG_".to_string(),
            filename_timestamp_format: "%Y%m%d_%H%M%S".to_string(),
            jpeg_quality: 90,
            still_rotation_degrees: 90,
            worker_shutdown_timeout_ms: 2000,
            log_level: Some("info".to_string()),
        }
    }
}

impl ApplicationConfig {
    pub fn worker_shutdown_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.worker_shutdown_timeout_ms)
    }
}
