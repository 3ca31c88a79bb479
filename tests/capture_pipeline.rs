mod common_test_utils;

use common_test_utils::{init_test_logging, jpegs_in, simulated_config};
use std::time::Duration;

use skincam::camera_config::PermissionPolicy;
use skincam::config_loader;
use skincam::operations::image_capture_op::{run_capture_session, CaptureRun};
use skincam::operations::op_helper::{self, ScreenOverrides};
use skincam::SessionState;

fn run(count: u32) -> CaptureRun {
    CaptureRun {
        count,
        preview_time: Duration::from_millis(50),
        overrides: ScreenOverrides::default(),
    }
}

#[tokio::test]
async fn captures_are_rotated_named_and_handed_off() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = simulated_config(dir.path());
    let backend = op_helper::build_backend(&config).unwrap();

    let summary = run_capture_session(&config, backend, dir.path().to_path_buf(), &run(2))
        .await
        .unwrap();

    assert_eq!(summary.saved.len(), 2);
    assert_eq!(summary.failed, 0);
    assert!(summary.stopped_early.is_none());
    assert_ne!(summary.saved[0].path, summary.saved[1].path);
    for saved in &summary.saved {
        assert!(saved.path.is_absolute());
        let name = saved.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("JPEG_"), "unexpected name {}", name);
        assert!(name.ends_with(".jpg"));
        let image = image::open(&saved.path).unwrap();
        assert_eq!((image.width(), image.height()), (32, 48));
    }
    assert_eq!(jpegs_in(dir.path()).len(), 2);
}

#[tokio::test]
async fn denied_permission_ends_the_run_without_files() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = simulated_config(dir.path());
    let backend = op_helper::build_backend(&config).unwrap();
    let mut capture = run(1);
    capture.overrides.permission = Some(PermissionPolicy::Denied);

    let err = run_capture_session(&config, backend, dir.path().to_path_buf(), &capture)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("Camera permission required"), "{:#}", err);
    assert!(jpegs_in(dir.path()).is_empty());
}

#[tokio::test]
async fn session_configure_failure_is_reported() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut config = simulated_config(dir.path());
    config.camera.simulated.fail_session_configure = true;
    let backend = op_helper::build_backend(&config).unwrap();

    let err = run_capture_session(&config, backend, dir.path().to_path_buf(), &run(1))
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("camera"), "{:#}", err);
    assert!(jpegs_in(dir.path()).is_empty());
}

#[tokio::test]
async fn disconnect_after_first_still_keeps_the_saved_image() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut config = simulated_config(dir.path());
    config.camera.simulated.disconnect_after_stills = Some(1);
    let backend = op_helper::build_backend(&config).unwrap();

    let summary = run_capture_session(&config, backend, dir.path().to_path_buf(), &run(2))
        .await
        .unwrap();

    assert_eq!(summary.saved.len(), 1);
    assert!(summary.saved[0].path.exists());
    let reason = summary.stopped_early.clone().unwrap_or_default();
    assert!(!reason.is_empty(), "early stop not recorded: {:?}", summary);
    let disconnect_seen =
        reason.contains("Camera unavailable") || summary.notifications.iter().any(|n| n == "Camera unavailable");
    assert!(disconnect_seen, "{:?}", summary);
    assert_eq!(jpegs_in(dir.path()).len(), 1);
}

#[tokio::test]
async fn screen_state_is_observable_through_watch() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = simulated_config(dir.path());
    let backend = op_helper::build_backend(&config).unwrap();
    let mut handle =
        op_helper::build_camera_screen(&config, backend, dir.path().to_path_buf(), &ScreenOverrides::default()).unwrap();

    let mut state_rx = handle.screen.subscribe();
    assert_eq!(*state_rx.borrow(), SessionState::Closed);
    handle.screen.on_resume().unwrap();
    op_helper::wait_for_preview(&mut state_rx, &mut handle.events, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(handle.preview.buffer_size().width > 0);

    let screen = handle.screen.clone();
    tokio::task::spawn_blocking(move || screen.on_pause()).await.unwrap();
    assert_eq!(handle.screen.state(), SessionState::Closed);
    assert!(!handle.screen.is_worker_running());
}

#[test]
fn bundled_config_file_is_valid() {
    let config = config_loader::load_config("config/skincam.yaml").unwrap();
    assert_eq!(config.app_settings.jpeg_quality, 90);
    assert_eq!(config.camera.permission, PermissionPolicy::Granted);
}
