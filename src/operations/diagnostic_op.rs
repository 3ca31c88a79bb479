use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::capture_request::{CaptureRequestFactory, DisplayRotation};
use crate::camera::hal::{CameraBackend, StreamGeometry, SurfaceTarget};
use crate::camera::image_reader::ImageReader;
use crate::config_loader::MasterConfig;
use crate::core::background_context::{BackgroundExecutionContext, StopOutcome};
use crate::core::camera_screen::WORKER_THREAD_NAME;
use crate::operations::image_capture_op::{self, CaptureRun};
use crate::operations::op_helper::{self, ScreenOverrides};

pub struct DiagnosticResult {
    pub test_name: String,
    pub success: bool,
    pub details: String,
}

impl DiagnosticResult {
    fn from_outcome(test_name: &str, started: Instant, outcome: Result<String>) -> Self {
        match outcome {
            Ok(details) => {
                info!("    DIAGNOSTIC: {} PASSED in {:?}. {}", test_name, started.elapsed(), details);
                DiagnosticResult {
                    test_name: test_name.to_string(),
                    success: true,
                    details,
                }
            }
            Err(e) => {
                error!("    DIAGNOSTIC: {} FAILED in {:?}: {:#}", test_name, started.elapsed(), e);
                DiagnosticResult {
                    test_name: test_name.to_string(),
                    success: false,
                    details: format!("Failed: {:#}", e),
                }
            }
        }
    }
}

pub async fn handle_diagnostic_cli(master_config: &MasterConfig, args: &ArgMatches) -> Result<()> {
    let overall_diag_start_time = Instant::now();
    info!("🩺 Starting diagnostic test suite...");

    let diagnostic_output_dir =
        op_helper::determine_operation_output_dir(master_config, args, "output", Some("diagnostics"), "Diagnostics")?;
    info!("💾 Diagnostic outputs will be saved to: {}", diagnostic_output_dir.display());

    let results = run_diagnostics(master_config, &diagnostic_output_dir).await?;

    info!("\n\n📋 ----- Diagnostic Test Summary (Total Suite Time: {:?}) -----", overall_diag_start_time.elapsed());
    let mut overall_success = true;
    for result in &results {
        let status_emoji = if result.success { "✅ PASS" } else { "❌ FAIL" };
        info!("Test: {:<40} | Status: {:<10} | Details: {}", result.test_name, status_emoji, result.details);
        overall_success &= result.success;
    }
    info!("----------------------------------------------------------------------");
    info!("🏁 Diagnostic test suite finished in {:?}.", overall_diag_start_time.elapsed());
    if !overall_success {
        error!("🔥 One or more diagnostic tests failed. Please review logs above.");
        bail!("{} of {} diagnostic test(s) failed", results.iter().filter(|r| !r.success).count(), results.len());
    }
    info!("🎉 All diagnostic tests passed.");
    Ok(())
}

pub async fn run_diagnostics(master_config: &MasterConfig, output_dir: &Path) -> Result<Vec<DiagnosticResult>> {
    let backend = op_helper::build_backend(master_config)?;
    let mut results = Vec::new();

    info!("  DIAGNOSTIC: Enumerating cameras... 🔎");
    let started = Instant::now();
    results.push(DiagnosticResult::from_outcome(
        "Camera Enumeration",
        started,
        check_enumeration(backend.as_ref()),
    ));

    info!("  DIAGNOSTIC: Checking JPEG orientation table... 🧭");
    let started = Instant::now();
    results.push(DiagnosticResult::from_outcome("Orientation Table", started, check_orientation_table()));

    info!("  DIAGNOSTIC: Checking background worker drain... 🧵");
    let started = Instant::now();
    let worker_outcome = tokio::task::spawn_blocking(check_worker_drain)
        .await
        .context("worker check task failed")
        .and_then(|r| r);
    results.push(DiagnosticResult::from_outcome("Background Worker Drain", started, worker_outcome));

    info!("  DIAGNOSTIC: Running preview + still capture... 📸");
    let started = Instant::now();
    let capture_outcome = check_capture(master_config, Arc::clone(&backend), output_dir).await;
    results.push(DiagnosticResult::from_outcome("Preview and Still Capture", started, capture_outcome));

    info!("  DIAGNOSTIC: Checking repeated teardown... 🔁");
    let started = Instant::now();
    let teardown_outcome = check_repeated_teardown(master_config, backend, output_dir).await;
    results.push(DiagnosticResult::from_outcome("Idempotent Teardown", started, teardown_outcome));

    Ok(results)
}

fn check_enumeration(backend: &dyn CameraBackend) -> Result<String> {
    let ids = backend.camera_ids()?;
    let Some(first) = ids.first() else {
        bail!("no camera reported");
    };
    let sizes = backend.output_sizes(first)?;
    let Some(preview) = sizes.first() else {
        bail!("camera '{}' reports no preview sizes", first);
    };
    Ok(format!("{} camera(s); '{}' previews at {}", ids.len(), first, preview))
}

fn check_orientation_table() -> Result<String> {
    let reader = ImageReader::new(StreamGeometry::new(1, 1), 1);
    let mut pairs = Vec::new();
    for rotation in DisplayRotation::ALL {
        let expected = match rotation.degrees() {
            0 => 90,
            90 => 0,
            180 => 270,
            _ => 180,
        };
        let request = CaptureRequestFactory::still_capture_request(SurfaceTarget::StillImage(Arc::clone(&reader)), rotation);
        if request.jpeg_orientation() != expected {
            bail!("display {} produced orientation {}, expected {}", rotation, request.jpeg_orientation(), expected);
        }
        pairs.push(format!("{}->{}", rotation.degrees(), expected));
    }
    Ok(pairs.join(", "))
}

fn check_worker_drain() -> Result<String> {
    let worker = BackgroundExecutionContext::new(format!("{}-diag", WORKER_THREAD_NAME));
    worker.start()?;
    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..16 {
        let ran = Arc::clone(&ran);
        worker.post(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        })?;
    }
    match worker.stop(Duration::from_secs(2)) {
        StopOutcome::Drained if ran.load(Ordering::SeqCst) == 16 => Ok("16/16 queued jobs ran before stop".to_string()),
        other => bail!("stop returned {:?} after {} job(s)", other, ran.load(Ordering::SeqCst)),
    }
}

async fn check_capture(master_config: &MasterConfig, backend: Arc<dyn CameraBackend>, output_dir: &Path) -> Result<String> {
    let run = CaptureRun {
        count: 1,
        preview_time: Duration::from_millis(200),
        overrides: ScreenOverrides::default(),
    };
    let summary = image_capture_op::run_capture_session(master_config, backend, output_dir.to_path_buf(), &run).await?;
    let Some(saved) = summary.saved.first() else {
        bail!(
            "no image saved ({:?}, stopped early: {:?})",
            summary.notifications,
            summary.stopped_early
        );
    };
    let decoded = image::open(&saved.path).with_context(|| format!("saved file {} does not decode", saved.file_path()))?;
    debug!("Diagnostic capture decoded at {}x{}", decoded.width(), decoded.height());
    Ok(format!("{} ({}x{})", saved.file_path(), decoded.width(), decoded.height()))
}

async fn check_repeated_teardown(master_config: &MasterConfig, backend: Arc<dyn CameraBackend>, output_dir: &Path) -> Result<String> {
    let mut handle =
        op_helper::build_camera_screen(master_config, backend, output_dir.to_path_buf(), &ScreenOverrides::default())?;
    handle.screen.on_resume()?;
    let mut state_rx = handle.screen.subscribe();
    op_helper::wait_for_preview(&mut state_rx, &mut handle.events, Duration::from_secs(10)).await?;

    let screen = Arc::clone(&handle.screen);
    let (first, second) = tokio::task::spawn_blocking(move || (screen.on_pause(), screen.on_pause()))
        .await
        .context("teardown task failed")?;
    if second != StopOutcome::NotRunning {
        warn!("Second pause returned {:?}", second);
        bail!("second pause was not a no-op ({:?})", second);
    }
    Ok(format!("first pause {:?}, second pause {:?}, final state {:?}", first, second, handle.screen.state()))
}
