//! Shared plumbing for the CLI operations: backend selection, output
//! directories, and the terminal-side collaborators the camera screen talks to.

use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use log::{debug, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

use crate::app_config::ApplicationConfig;
use crate::camera::capture_request::DisplayRotation;
use crate::camera::hal::{CameraBackend, StreamGeometry};
use crate::camera::preview_surface::{PreviewFrame, PreviewSurface};
use crate::camera::simulated_device::SimulatedCameraBackend;
use crate::camera_config::{BackendKind, CameraConfig, PermissionPolicy};
use crate::common::file_utils::PictureStorage;
use crate::common::lock_or_recover;
use crate::config_loader::MasterConfig;
use crate::core::camera_screen::CameraScreen;
use crate::core::collaborators::{FixedDisplayRotation, Navigator, PermissionProvider, PermissionReply, UiFeedback};
use crate::core::image_persistor::{CapturedImagePersistor, PersistedImage};
use crate::core::session_controller::{ControllerDependencies, SessionState};
use crate::core::still_receiver::StillImageReceiver;

/// Everything the camera screen reports back to the operation driving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenEvent {
    CaptureSaved(PersistedImage),
    CaptureInProgress(bool),
    Notification(String),
    Finished,
}

pub fn build_backend(master_config: &MasterConfig) -> Result<Arc<dyn CameraBackend>> {
    let camera = &master_config.camera;
    match camera.backend {
        BackendKind::Simulated => {
            debug!("Using simulated camera backend ({} camera(s))", camera.simulated.camera_ids.len());
            Ok(Arc::new(SimulatedCameraBackend::new(camera.simulated.clone())))
        }
        #[cfg(feature = "opencv")]
        BackendKind::Opencv => {
            debug!("Using OpenCV camera backend on devices {:?}", camera.opencv.device_indices);
            Ok(Arc::new(crate::camera::opencv_device::OpenCvCameraBackend::new(
                camera.opencv.clone(),
                master_config.app_settings.jpeg_quality,
            )))
        }
        #[cfg(not(feature = "opencv"))]
        BackendKind::Opencv => {
            bail!("The 'opencv' camera backend requires building with `--features opencv`.")
        }
    }
}

/// CLI value when given, otherwise the configured directory plus `default_subdir`.
pub fn determine_operation_output_dir(
    master_config: &MasterConfig,
    args: &ArgMatches,
    output_cli_arg_key: &str,
    default_subdir: Option<&str>,
    operation_display_name: &str,
) -> Result<PathBuf> {
    let start_time = Instant::now();
    let dir = match args.try_get_one::<String>(output_cli_arg_key).ok().flatten() {
        Some(path_str) => {
            debug!("  Output directory specified via CLI for '{}': {}", operation_display_name, path_str);
            PathBuf::from(path_str)
        }
        None => {
            let mut dir = PathBuf::from(&master_config.app_settings.output_directory);
            if let Some(subdir) = default_subdir {
                dir.push(subdir);
            }
            dir
        }
    };

    if !dir.exists() {
        info!("📁 Output directory {} does not exist. Creating it for '{}'.", dir.display(), operation_display_name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("❌ Failed to create output directory '{}' for '{}'", dir.display(), operation_display_name))?;
    }
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve output directory '{}'", dir.display()))?;
    debug!("  Output directory for '{}' is '{}' ({:?}).", operation_display_name, dir.display(), start_time.elapsed());
    Ok(dir)
}

pub fn build_receiver(app: &ApplicationConfig, output_dir: PathBuf) -> StillImageReceiver {
    let storage = Arc::new(PictureStorage::new(&app.filename_prefix, &app.filename_timestamp_format));
    let persistor = CapturedImagePersistor::new(storage, output_dir, app.jpeg_quality);
    StillImageReceiver::new(persistor, app.still_rotation_degrees)
}

/// Overrides applied on top of the `camera` config section for one run.
#[derive(Debug, Clone, Default)]
pub struct ScreenOverrides {
    pub display_rotation: Option<u32>,
    pub permission: Option<PermissionPolicy>,
}

pub struct ScreenHandle {
    pub screen: Arc<CameraScreen>,
    pub events: mpsc::UnboundedReceiver<ScreenEvent>,
    pub preview: Arc<TerminalPreviewSurface>,
}

pub fn build_camera_screen(
    master_config: &MasterConfig,
    backend: Arc<dyn CameraBackend>,
    output_dir: PathBuf,
    overrides: &ScreenOverrides,
) -> Result<ScreenHandle> {
    let camera: &CameraConfig = &master_config.camera;
    let degrees = overrides.display_rotation.unwrap_or(camera.display_rotation);
    let Some(rotation) = DisplayRotation::from_degrees(degrees) else {
        bail!("Display rotation must be 0, 90, 180 or 270, got {}", degrees);
    };
    let policy = overrides.permission.unwrap_or(camera.permission);

    let (tx, rx) = mpsc::unbounded_channel();
    let preview = Arc::new(TerminalPreviewSurface::default());
    let deps = ControllerDependencies {
        backend,
        permissions: Arc::new(PolicyPermissionProvider::new(policy)),
        navigator: Arc::new(ChannelNavigator::new(tx.clone())),
        display: Arc::new(FixedDisplayRotation(rotation)),
        ui: Arc::new(ChannelUiFeedback::new(tx)),
        preview_surface: preview.clone(),
    };
    let receiver = build_receiver(&master_config.app_settings, output_dir);
    let screen = CameraScreen::new(deps, receiver, master_config.app_settings.worker_shutdown_timeout());
    info!("🖥️ Camera screen ready (display rotation {}, permission {:?})", rotation, policy);

    Ok(ScreenHandle {
        screen: Arc::new(screen),
        events: rx,
        preview,
    })
}

/// Waits until the preview is running. Fails when the controller lands in
/// `Error`, when the screen finishes first (permission denied), or on timeout.
pub async fn wait_for_preview(
    state_rx: &mut watch::Receiver<SessionState>,
    events: &mut mpsc::UnboundedReceiver<ScreenEvent>,
    timeout: Duration,
) -> Result<()> {
    let start_time = Instant::now();
    let waited = tokio::time::timeout(timeout, preview_or_failure(state_rx, events)).await;

    match waited {
        Ok(result) => {
            result?;
            info!("▶️ Preview running after {:?}", start_time.elapsed());
            Ok(())
        }
        Err(_) => bail!("preview did not start within {:?}", timeout),
    }
}

async fn preview_or_failure(
    state_rx: &mut watch::Receiver<SessionState>,
    events: &mut mpsc::UnboundedReceiver<ScreenEvent>,
) -> Result<()> {
    loop {
        let current = *state_rx.borrow_and_update();
        match current {
            SessionState::PreviewRunning => return Ok(()),
            SessionState::Error => bail!("camera failed to start"),
            _ => {}
        }
        tokio::select! {
            changed = state_rx.changed() => {
                changed.context("camera controller went away")?;
            }
            event = events.recv() => match event {
                Some(ScreenEvent::Finished) | None => bail!("camera screen finished before the preview started"),
                Some(ScreenEvent::Notification(message)) => {
                    let now = *state_rx.borrow();
                    if matches!(now, SessionState::Closed | SessionState::Error) {
                        bail!("camera is not running: {}", message);
                    }
                    debug!("Notification while waiting for preview: {}", message);
                }
                Some(other) => debug!("Ignoring {:?} while waiting for preview", other),
            },
        }
    }
}

/// Logs preview ticks, one line per second of simulated stream.
#[derive(Default)]
pub struct TerminalPreviewSurface {
    frames: AtomicU64,
    buffer_width: AtomicU64,
    buffer_height: AtomicU64,
}

impl TerminalPreviewSurface {
    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn buffer_size(&self) -> StreamGeometry {
        StreamGeometry::new(
            self.buffer_width.load(Ordering::Relaxed) as u32,
            self.buffer_height.load(Ordering::Relaxed) as u32,
        )
    }
}

impl PreviewSurface for TerminalPreviewSurface {
    fn set_default_buffer_size(&self, geometry: StreamGeometry) {
        self.buffer_width.store(u64::from(geometry.width), Ordering::Relaxed);
        self.buffer_height.store(u64::from(geometry.height), Ordering::Relaxed);
    }

    fn render_frame(&self, frame: PreviewFrame) {
        let count = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if frame.sequence % 30 == 0 {
            debug!("🎞️ Preview frame #{} ({}), {} rendered so far", frame.sequence, frame.geometry, count);
        }
    }
}

pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<ScreenEvent>,
}

impl ChannelNavigator {
    pub fn new(tx: mpsc::UnboundedSender<ScreenEvent>) -> Self {
        ChannelNavigator { tx }
    }
}

impl Navigator for ChannelNavigator {
    fn show_capture_result(&self, image: &PersistedImage) {
        info!("➡️ Handing {} to the result screen", image.file_path());
        if self.tx.send(ScreenEvent::CaptureSaved(image.clone())).is_err() {
            warn!("Result screen is gone; {} not handed off", image.file_path());
        }
    }

    fn finish_screen(&self) {
        let _ = self.tx.send(ScreenEvent::Finished);
    }
}

pub struct ChannelUiFeedback {
    tx: mpsc::UnboundedSender<ScreenEvent>,
}

impl ChannelUiFeedback {
    pub fn new(tx: mpsc::UnboundedSender<ScreenEvent>) -> Self {
        ChannelUiFeedback { tx }
    }
}

impl UiFeedback for ChannelUiFeedback {
    fn set_capture_in_progress(&self, in_progress: bool) {
        if in_progress {
            info!("⏳ Processing...");
        }
        let _ = self.tx.send(ScreenEvent::CaptureInProgress(in_progress));
    }

    fn notify(&self, message: &str) {
        warn!("🔔 {}", message);
        let _ = self.tx.send(ScreenEvent::Notification(message.to_string()));
    }
}

/// Answers the camera permission question from the configured policy.
/// `Prompt` asks on stdin from a helper thread.
pub struct PolicyPermissionProvider {
    policy: PermissionPolicy,
}

impl PolicyPermissionProvider {
    pub fn new(policy: PermissionPolicy) -> Self {
        PolicyPermissionProvider { policy }
    }
}

impl PermissionProvider for PolicyPermissionProvider {
    fn has_camera_permission(&self) -> bool {
        self.policy == PermissionPolicy::Granted
    }

    fn request_camera_permission(&self, reply: PermissionReply) {
        match self.policy {
            PermissionPolicy::Granted => reply(true),
            PermissionPolicy::Denied => reply(false),
            PermissionPolicy::Prompt => {
                let reply = OnceReply::new(reply);
                let prompt_reply = reply.clone();
                let spawned = std::thread::Builder::new()
                    .name("permission-prompt".to_string())
                    .spawn(move || {
                        eprint!("Allow camera access? [y/N] ");
                        let mut answer = String::new();
                        let granted = match std::io::stdin().lock().read_line(&mut answer) {
                            Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
                            Err(e) => {
                                warn!("Could not read permission answer: {}", e);
                                false
                            }
                        };
                        prompt_reply.answer(granted);
                    });
                settle_prompt_spawn(spawned, &reply);
            }
        }
    }
}

/// A permission reply answered at most once, by whichever side reaches it first.
#[derive(Clone)]
struct OnceReply(Arc<Mutex<Option<PermissionReply>>>);

impl OnceReply {
    fn new(reply: PermissionReply) -> Self {
        OnceReply(Arc::new(Mutex::new(Some(reply))))
    }

    fn answer(&self, granted: bool) {
        let reply = lock_or_recover(&self.0).take();
        if let Some(reply) = reply {
            reply(granted);
        }
    }
}

fn settle_prompt_spawn(spawned: std::io::Result<JoinHandle<()>>, reply: &OnceReply) {
    if let Err(e) = spawned {
        warn!("Failed to spawn permission prompt ({}); treating it as denied", e);
        reply.answer(false);
    }
}
