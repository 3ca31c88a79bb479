pub mod background_context;
pub mod camera_screen;
pub mod collaborators;
pub mod image_persistor;
pub mod session_controller;
pub mod still_receiver;

#[cfg(test)]
pub(crate) mod test_support;
