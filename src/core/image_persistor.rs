use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::core::collaborators::ImageStorage;
use crate::errors::AppError;

/// A JPEG written by the persistor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedImage {
    pub path: PathBuf,
}

impl PersistedImage {
    pub fn file_path(&self) -> String {
        self.path.display().to_string()
    }
}

pub struct CapturedImagePersistor {
    storage: Arc<dyn ImageStorage>,
    directory: PathBuf,
    jpeg_quality: u8,
}

impl CapturedImagePersistor {
    pub fn new(storage: Arc<dyn ImageStorage>, directory: impl Into<PathBuf>, jpeg_quality: u8) -> Self {
        CapturedImagePersistor {
            storage,
            directory: directory.into(),
            jpeg_quality,
        }
    }

    /// Encodes `image` as JPEG into a freshly reserved file. On failure the
    /// reserved file is removed so no partial image is left behind.
    pub fn persist(&self, image: &DynamicImage) -> Result<PersistedImage, AppError> {
        let start_time = Instant::now();
        let path = self.storage.create_unique_image_file(&self.directory)?;

        if let Err(e) = self.write_jpeg(&path, image) {
            if let Err(remove_err) = std::fs::remove_file(&path) {
                warn!("Failed to remove partial image {}: {}", path.display(), remove_err);
            }
            return Err(e);
        }

        info!(
            "💾 Saved {}x{} capture to {} in {:?}",
            image.width(),
            image.height(),
            path.display(),
            start_time.elapsed()
        );
        Ok(PersistedImage { path })
    }

    fn write_jpeg(&self, path: &Path, image: &DynamicImage) -> Result<(), AppError> {
        let file = File::create(path).map_err(|e| {
            AppError::ImagePersist(format!("cannot open {}: {}", path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);

        let rgb = image.to_rgb8();
        let encoder = JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality);
        rgb.write_with_encoder(encoder)
            .map_err(|e| AppError::ImagePersist(format!("JPEG encoding failed: {}", e)))?;
        writer.flush().map_err(|e| {
            AppError::ImagePersist(format!("cannot flush {}: {}", path.display(), e))
        })?;
        debug!("Encoded JPEG at quality {} into {}", self.jpeg_quality, path.display());
        Ok(())
    }
}
