mod common_test_utils;

use common_test_utils::{init_test_logging, simulated_config};

use skincam::operations::camera_list_op::list_cameras;
use skincam::operations::diagnostic_op::run_diagnostics;
use skincam::operations::op_helper;

#[tokio::test]
async fn diagnostic_suite_passes_on_the_simulated_camera() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = simulated_config(dir.path());

    let results = run_diagnostics(&config, dir.path()).await.unwrap();
    assert_eq!(results.len(), 5);
    for result in &results {
        assert!(result.success, "{} failed: {}", result.test_name, result.details);
    }
}

#[tokio::test]
async fn diagnostic_suite_flags_a_broken_camera() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut config = simulated_config(dir.path());
    config.camera.simulated.fail_open = true;

    let results = run_diagnostics(&config, dir.path()).await.unwrap();
    let capture = results.iter().find(|r| r.test_name == "Preview and Still Capture").unwrap();
    assert!(!capture.success);
    let enumeration = results.iter().find(|r| r.test_name == "Camera Enumeration").unwrap();
    assert!(enumeration.success);
}

#[test]
fn listing_reports_configured_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let config = simulated_config(dir.path());
    let backend = op_helper::build_backend(&config).unwrap();
    let listings = list_cameras(backend.as_ref()).unwrap();
    assert_eq!(listings[0].preview.map(|g| (g.width, g.height)), Some((48, 32)));
}
