use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

use crate::camera::hal::CameraBackend;
use crate::camera_config::PermissionPolicy;
use crate::config_loader::MasterConfig;
use crate::core::camera_screen::CameraScreen;
use crate::core::image_persistor::PersistedImage;
use crate::core::session_controller::SessionState;
use crate::operations::op_helper::{self, ScreenEvent, ScreenOverrides};

const PREVIEW_START_TIMEOUT: Duration = Duration::from_secs(10);
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PREVIEW_MS: u64 = 500;

/// Parameters of one `capture-image` run.
#[derive(Debug, Clone)]
pub struct CaptureRun {
    pub count: u32,
    pub preview_time: Duration,
    pub overrides: ScreenOverrides,
}

/// What a capture run produced. Individual failures do not abort the run;
/// losing the camera part way through ends it with `stopped_early` set.
#[derive(Debug, Default)]
pub struct CaptureSummary {
    pub saved: Vec<PersistedImage>,
    pub failed: u32,
    pub notifications: Vec<String>,
    pub stopped_early: Option<String>,
}

pub async fn handle_capture_image_cli(master_config: &MasterConfig, args: &ArgMatches) -> Result<()> {
    let op_start_time = Instant::now();
    let operation_display_name = "Image Capture";

    let permission = match args.get_one::<String>("permission") {
        Some(raw) => Some(raw.parse::<PermissionPolicy>().map_err(|e| anyhow!(e))?),
        None => None,
    };
    let run = CaptureRun {
        count: args.get_one::<u32>("count").copied().unwrap_or(1),
        preview_time: Duration::from_millis(args.get_one::<u64>("preview-ms").copied().unwrap_or(DEFAULT_PREVIEW_MS)),
        overrides: ScreenOverrides {
            display_rotation: args.get_one::<u32>("display-rotation").copied(),
            permission,
        },
    };
    debug!("Capture image CLI: {:?}, output_arg: {:?}", run, args.get_one::<String>("output"));

    let output_dir = op_helper::determine_operation_output_dir(master_config, args, "output", None, operation_display_name)?;
    let backend = op_helper::build_backend(master_config)?;

    let summary = run_capture_session(master_config, backend, output_dir, &run).await?;
    for saved in &summary.saved {
        println!("{}", saved.file_path());
    }
    if summary.failed > 0 {
        warn!("⚠️ {} of {} capture(s) failed", summary.failed, run.count);
    }
    if let Some(reason) = &summary.stopped_early {
        warn!("⚠️ Run stopped after {} of {} capture(s): {}", summary.saved.len(), run.count, reason);
    }
    if summary.saved.is_empty() {
        bail!("No image was saved ({} notification(s): {:?})", summary.notifications.len(), summary.notifications);
    }
    info!(
        "🏁 '{}' saved {} image(s) in {:?}.",
        operation_display_name,
        summary.saved.len(),
        op_start_time.elapsed()
    );
    Ok(())
}

/// Runs the camera screen through resume, `run.count` sequential captures
/// and pause.
pub async fn run_capture_session(
    master_config: &MasterConfig,
    backend: Arc<dyn CameraBackend>,
    output_dir: PathBuf,
    run: &CaptureRun,
) -> Result<CaptureSummary> {
    let session_start = Instant::now();
    let op_helper::ScreenHandle {
        screen,
        mut events,
        preview,
    } = op_helper::build_camera_screen(master_config, backend, output_dir, &run.overrides)?;

    let mut summary = CaptureSummary::default();
    let result = drive_captures(&screen, &mut events, run, &mut summary).await;

    let pause_screen = Arc::clone(&screen);
    let outcome = tokio::task::spawn_blocking(move || pause_screen.on_pause())
        .await
        .context("camera screen shutdown task failed")?;
    debug!("Screen paused with {:?}; {} preview frame(s) rendered", outcome, preview.frames_rendered());

    result?;
    while let Ok(event) = events.try_recv() {
        if let ScreenEvent::Notification(message) = event {
            summary.notifications.push(message);
        }
    }
    info!("📷 Capture session finished in {:?}", session_start.elapsed());
    Ok(summary)
}

/// Fails only when the preview never comes up. Once captures have started,
/// a lost camera is recorded in `summary.stopped_early` and the run ends.
async fn drive_captures(
    screen: &CameraScreen,
    events: &mut mpsc::UnboundedReceiver<ScreenEvent>,
    run: &CaptureRun,
    summary: &mut CaptureSummary,
) -> Result<()> {
    screen.on_resume().context("Failed to start the camera screen")?;
    let mut state_rx = screen.subscribe();
    op_helper::wait_for_preview(&mut state_rx, events, PREVIEW_START_TIMEOUT).await?;

    for index in 1..=run.count {
        if let Err(e) = capture_once(screen, events, &mut state_rx, run, index, summary).await {
            error!("🛑 Stopping after capture {}/{}: {:#}", index, run.count, e);
            summary.stopped_early = Some(format!("{:#}", e));
            break;
        }
    }
    Ok(())
}

async fn capture_once(
    screen: &CameraScreen,
    events: &mut mpsc::UnboundedReceiver<ScreenEvent>,
    state_rx: &mut watch::Receiver<SessionState>,
    run: &CaptureRun,
    index: u32,
    summary: &mut CaptureSummary,
) -> Result<()> {
    tokio::time::sleep(run.preview_time).await;
    if index > 1 {
        op_helper::wait_for_preview(state_rx, events, PREVIEW_START_TIMEOUT).await?;
    }

    let capture_start = Instant::now();
    info!("📸 Capture {}/{}", index, run.count);
    screen.on_capture_pressed().context("Capture trigger rejected")?;

    match tokio::time::timeout(CAPTURE_TIMEOUT, await_capture_result(events, summary)).await {
        Ok(Ok(Some(saved))) => {
            info!("✅ Capture {}/{} saved to {} in {:?}", index, run.count, saved.file_path(), capture_start.elapsed());
            summary.saved.push(saved);
            Ok(())
        }
        Ok(Ok(None)) => {
            error!("❌ Capture {}/{} produced no image", index, run.count);
            summary.failed += 1;
            match screen.state() {
                state @ (SessionState::Closed | SessionState::Error) => {
                    bail!("camera left the preview ({:?}) during capture {}", state, index)
                }
                _ => Ok(()),
            }
        }
        Ok(Err(e)) => Err(e),
        Err(_) => bail!("capture {} did not finish within {:?}", index, CAPTURE_TIMEOUT),
    }
}

/// Consumes screen events until the processing indicator is cleared.
async fn await_capture_result(
    events: &mut mpsc::UnboundedReceiver<ScreenEvent>,
    summary: &mut CaptureSummary,
) -> Result<Option<PersistedImage>> {
    let mut saved = None;
    let mut started = false;
    loop {
        match events.recv().await {
            Some(ScreenEvent::CaptureInProgress(true)) => started = true,
            Some(ScreenEvent::CaptureInProgress(false)) => return Ok(saved),
            Some(ScreenEvent::CaptureSaved(image)) => saved = Some(image),
            Some(ScreenEvent::Notification(message)) => {
                let not_ready = !started;
                summary.notifications.push(message);
                if not_ready {
                    // Trigger refused before any capture began.
                    return Ok(None);
                }
            }
            Some(ScreenEvent::Finished) | None => bail!("camera screen finished during capture"),
        }
    }
}
