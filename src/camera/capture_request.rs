use std::fmt;

use crate::camera::hal::SurfaceTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Auto,
}

/// Rotation of the display relative to its natural orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayRotation {
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl DisplayRotation {
    pub const ALL: [DisplayRotation; 4] = [
        DisplayRotation::Rotation0,
        DisplayRotation::Rotation90,
        DisplayRotation::Rotation180,
        DisplayRotation::Rotation270,
    ];

    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(DisplayRotation::Rotation0),
            90 => Some(DisplayRotation::Rotation90),
            180 => Some(DisplayRotation::Rotation180),
            270 => Some(DisplayRotation::Rotation270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            DisplayRotation::Rotation0 => 0,
            DisplayRotation::Rotation90 => 90,
            DisplayRotation::Rotation180 => 180,
            DisplayRotation::Rotation270 => 270,
        }
    }

    /// JPEG orientation to request for a still taken at this display rotation.
    /// Fixed sensor-to-display offsets for a sensor mounted at 90 degrees.
    pub fn jpeg_orientation(self) -> u32 {
        match self {
            DisplayRotation::Rotation0 => 90,
            DisplayRotation::Rotation90 => 0,
            DisplayRotation::Rotation180 => 270,
            DisplayRotation::Rotation270 => 180,
        }
    }
}

impl fmt::Display for DisplayRotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Immutable description of one capture request. Built fresh for every
/// submission; there are no setters.
#[derive(Debug, Clone)]
pub struct CaptureRequestDescriptor {
    template: RequestTemplate,
    target: SurfaceTarget,
    control_mode: ControlMode,
    jpeg_orientation: u32,
}

impl CaptureRequestDescriptor {
    pub fn template(&self) -> RequestTemplate {
        self.template
    }

    pub fn target(&self) -> &SurfaceTarget {
        &self.target
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    pub fn jpeg_orientation(&self) -> u32 {
        self.jpeg_orientation
    }
}

pub struct CaptureRequestFactory;

impl CaptureRequestFactory {
    pub fn preview_request(target: SurfaceTarget) -> CaptureRequestDescriptor {
        CaptureRequestDescriptor {
            template: RequestTemplate::Preview,
            target,
            control_mode: ControlMode::Auto,
            jpeg_orientation: 0,
        }
    }

    pub fn still_capture_request(
        target: SurfaceTarget,
        display_rotation: DisplayRotation,
    ) -> CaptureRequestDescriptor {
        CaptureRequestDescriptor {
            template: RequestTemplate::StillCapture,
            target,
            control_mode: ControlMode::Auto,
            jpeg_orientation: display_rotation.jpeg_orientation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::hal::StreamGeometry;
    use crate::camera::image_reader::ImageReader;

    #[test]
    fn orientation_table_matches_sensor_offsets() {
        let expected = [90, 0, 270, 180];
        for (rotation, want) in DisplayRotation::ALL.iter().zip(expected) {
            assert_eq!(rotation.jpeg_orientation(), want, "rotation {}", rotation);
        }
    }

    #[test]
    fn degrees_round_trip_and_reject_others() {
        for rotation in DisplayRotation::ALL {
            assert_eq!(DisplayRotation::from_degrees(rotation.degrees()), Some(rotation));
        }
        assert_eq!(DisplayRotation::from_degrees(45), None);
        assert_eq!(DisplayRotation::from_degrees(360), None);
    }

    #[test]
    fn still_request_carries_orientation_and_auto_control() {
        let reader = ImageReader::new(StreamGeometry::new(8, 8), 1);
        let request = CaptureRequestFactory::still_capture_request(
            SurfaceTarget::StillImage(reader),
            DisplayRotation::Rotation180,
        );

        assert_eq!(request.template(), RequestTemplate::StillCapture);
        assert_eq!(request.control_mode(), ControlMode::Auto);
        assert_eq!(request.jpeg_orientation(), 270);
        assert_eq!(request.target().kind_name(), "still-image");
    }
}
