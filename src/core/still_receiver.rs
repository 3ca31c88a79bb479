use image::DynamicImage;
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

use crate::camera::image_reader::ImageReader;
use crate::core::image_persistor::{CapturedImagePersistor, PersistedImage};
use crate::errors::AppError;

/// Consumes one encoded still from the image reader: copy out, decode,
/// rotate, persist.
pub struct StillImageReceiver {
    persistor: CapturedImagePersistor,
    rotation_degrees: u32,
}

impl StillImageReceiver {
    pub fn new(persistor: CapturedImagePersistor, rotation_degrees: u32) -> Self {
        StillImageReceiver {
            persistor,
            rotation_degrees,
        }
    }

    pub fn on_image_available(&self, reader: &Arc<ImageReader>) -> Result<PersistedImage, AppError> {
        let start_time = Instant::now();

        let encoded = {
            let image = reader
                .acquire_latest_image()
                .ok_or_else(|| AppError::ImageDecode("no frame available in image reader".to_string()))?;
            image.bytes().to_vec()
            // slot released here
        };
        debug!("📥 Copied {} encoded bytes out of the image reader", encoded.len());

        let decoded = image::load_from_memory(&encoded)
            .map_err(|e| AppError::ImageDecode(e.to_string()))?;
        let corrected = rotate_image(decoded, self.rotation_degrees);

        let saved = self.persistor.persist(&corrected)?;
        info!("📸 Still processed in {:?}", start_time.elapsed());
        Ok(saved)
    }
}

/// Clockwise rotation by a multiple of 90 degrees.
pub fn rotate_image(image: DynamicImage, degrees: u32) -> DynamicImage {
    match degrees % 360 {
        90 => image.rotate90(),
        180 => image.rotate180(),
        270 => image.rotate270(),
        _ => image,
    }
}
