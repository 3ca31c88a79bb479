use anyhow::{Context, Result};
use log::{info, warn};
use std::time::Instant;

use crate::camera::hal::{CameraBackend, CameraIdentity, StreamGeometry};
use crate::config_loader::MasterConfig;
use crate::operations::op_helper;

/// One row of `list-cameras` output. `preview` is the geometry the camera
/// screen would bind (the first reported size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraListing {
    pub id: CameraIdentity,
    pub sizes: Vec<StreamGeometry>,
    pub preview: Option<StreamGeometry>,
}

pub async fn handle_list_cameras_cli(master_config: &MasterConfig) -> Result<()> {
    let start_time = Instant::now();
    let backend = op_helper::build_backend(master_config)?;
    let listings = list_cameras(backend.as_ref())?;
    if listings.is_empty() {
        warn!("⚠️ The {:?} backend reports no cameras.", master_config.camera.backend);
        return Ok(());
    }

    for (index, listing) in listings.iter().enumerate() {
        let sizes = listing.sizes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        let marker = if index == 0 { " (used by the camera screen)" } else { "" };
        match listing.preview {
            Some(preview) => println!("{}: preview {} [{}]{}", listing.id, preview, sizes, marker),
            None => println!("{}: no preview sizes{}", listing.id, marker),
        }
    }
    info!("📋 Listed {} camera(s) in {:?}", listings.len(), start_time.elapsed());
    Ok(())
}

pub fn list_cameras(backend: &dyn CameraBackend) -> Result<Vec<CameraListing>> {
    let ids = backend.camera_ids().context("Failed to enumerate cameras")?;
    let mut listings = Vec::with_capacity(ids.len());
    for id in ids {
        let sizes = match backend.output_sizes(&id) {
            Ok(sizes) => sizes,
            Err(e) => {
                warn!("Could not query output sizes of camera '{}': {}", id, e);
                Vec::new()
            }
        };
        listings.push(CameraListing {
            preview: sizes.first().copied(),
            id,
            sizes,
        });
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::simulated_device::SimulatedCameraBackend;
    use crate::camera_config::SimulatedCameraConfig;

    #[test]
    fn first_size_is_the_preview_geometry() {
        let backend = SimulatedCameraBackend::new(SimulatedCameraConfig::default());
        let listings = list_cameras(&backend).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].id.as_str(), "0");
        assert_eq!(listings[0].preview, Some(StreamGeometry::new(640, 480)));
        assert_eq!(listings[1].sizes.len(), 2);
    }
}
