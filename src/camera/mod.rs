pub mod capture_request;
pub mod hal;
pub mod image_reader;
#[cfg(feature = "opencv")]
pub mod opencv_device;
pub mod preview_surface;
pub mod simulated_device;
