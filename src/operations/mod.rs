pub mod camera_list_op;
pub mod diagnostic_op;
pub mod image_capture_op;
pub mod op_helper;
