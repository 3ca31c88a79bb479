use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera Access Error: {0}")]
    DeviceAccess(String),

    #[error("Capture Session Configuration Failed: {0}")]
    ConfigurationFailed(String),

    #[error("Capture Submission Error: {0}")]
    CaptureSubmission(String),

    #[error("Image Decode Error: {0}")]
    ImageDecode(String),

    #[error("Image Persist Error: {0}")]
    ImagePersist(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("File I/O Error: {0}")]
    Io(String),

    #[error("Background worker '{0}' is not running")]
    WorkerStopped(String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Short text shown to the user when this error reaches the screen.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::PermissionDenied => "Camera permission required",
            AppError::DeviceAccess(_) => "Camera unavailable",
            AppError::ConfigurationFailed(_) => "Configuration failed",
            AppError::CaptureSubmission(_) => "Capture failed, please retry",
            AppError::ImageDecode(_) => "Failed to process image",
            AppError::ImagePersist(_) | AppError::Io(_) => "Failed to save image",
            AppError::Config(_) => "Invalid camera settings",
            AppError::WorkerStopped(_) => "Camera not ready",
            AppError::NotFound(_) => "No camera found",
        }
    }

    /// Errors after which the screen must terminate.
    pub fn is_fatal_for_screen(&self) -> bool {
        matches!(self, AppError::PermissionDenied)
    }
}

// Allow conversion from std::io::Error to AppError::Io
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_permission_denial_terminates_the_screen() {
        assert!(AppError::PermissionDenied.is_fatal_for_screen());
        assert!(!AppError::DeviceAccess("busy".into()).is_fatal_for_screen());
        assert!(!AppError::ConfigurationFailed("x".into()).is_fatal_for_screen());
        assert!(!AppError::ImagePersist("disk full".into()).is_fatal_for_screen());
    }

    #[test]
    fn io_errors_surface_as_save_failures() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err.user_message(), "Failed to save image");
    }
}
