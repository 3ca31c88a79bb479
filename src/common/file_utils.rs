use crate::common::timestamp_utils;
use crate::core::collaborators::ImageStorage;
use crate::errors::AppError;
use log::debug;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const MAX_UNIQUE_NAME_ATTEMPTS: u32 = 16;

pub fn generate_timestamped_prefix(
    prefix: &str,           // e.g., "JPEG_"
    timestamp_format: &str, // from config, e.g., "%Y%m%d_%H%M%S"
) -> String {
    let timestamp = timestamp_utils::current_local_timestamp_str(timestamp_format);
    format!("{}{}_", prefix, timestamp)
}

pub fn ensure_output_directory(dir_path: &Path) -> Result<PathBuf, AppError> {
    let dir_path = dir_path.to_path_buf();
    if !dir_path.exists() {
        debug!("Output directory '{}' does not exist, attempting to create it.", dir_path.display());
        std::fs::create_dir_all(&dir_path).map_err(|e| {
            AppError::Io(format!(
                "Failed to create output directory '{}': {}",
                dir_path.display(),
                e
            ))
        })?;
    } else if !dir_path.is_dir() {
        return Err(AppError::Io(format!(
            "Output path '{}' exists but is not a directory.",
            dir_path.display()
        )));
    }
    Ok(dir_path)
}

/// Picture storage on the local filesystem. Names follow
/// `<prefix><timestamp>_<random>.jpg` and are reserved with create-new
/// semantics, so two captures in the same second never share a file.
#[derive(Debug, Clone)]
pub struct PictureStorage {
    prefix: String,
    timestamp_format: String,
    suffix: String,
}

impl PictureStorage {
    pub fn new(prefix: impl Into<String>, timestamp_format: impl Into<String>) -> Self {
        PictureStorage {
            prefix: prefix.into(),
            timestamp_format: timestamp_format.into(),
            suffix: ".jpg".to_string(),
        }
    }
}

impl ImageStorage for PictureStorage {
    fn create_unique_image_file(&self, directory_hint: &Path) -> Result<PathBuf, AppError> {
        let dir = ensure_output_directory(directory_hint)?;
        let stem = generate_timestamped_prefix(&self.prefix, &self.timestamp_format);

        for _ in 0..MAX_UNIQUE_NAME_ATTEMPTS {
            let candidate = dir.join(format!("{}{}{}", stem, rand::random::<u32>(), self.suffix));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(_) => {
                    debug!("📝 Reserved image file {}", candidate.display());
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("Name collision on {}, retrying.", candidate.display());
                }
                Err(e) => {
                    return Err(AppError::Io(format!(
                        "Failed to create image file in '{}': {}",
                        dir.display(),
                        e
                    )));
                }
            }
        }
        Err(AppError::Io(format!(
            "Could not find a free image file name in '{}' after {} attempts",
            dir.display(),
            MAX_UNIQUE_NAME_ATTEMPTS
        )))
    }
}
