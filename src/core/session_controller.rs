use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use crate::camera::capture_request::CaptureRequestFactory;
use crate::camera::hal::{
    CameraBackend, CameraDevice, CameraEvent, CameraIdentity, CaptureSession, EventSink,
    StreamGeometry, SurfaceTarget,
};
use crate::camera::image_reader::ImageReader;
use crate::camera::preview_surface::{PreviewSurface, PreviewSurfaceBinding, PreviewTarget};
use crate::core::collaborators::{DisplayRotationProvider, Navigator, PermissionProvider, UiFeedback};
use crate::core::still_receiver::StillImageReceiver;
use crate::errors::AppError;

pub const STILL_IMAGE_POOL_CAPACITY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    PendingPermission,
    Opening,
    PreviewRunning,
    Capturing,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStatus {
    Opening,
    AwaitingPermission,
    AlreadyActive,
    Failed,
}

pub struct ControllerDependencies {
    pub backend: Arc<dyn CameraBackend>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub navigator: Arc<dyn Navigator>,
    pub display: Arc<dyn DisplayRotationProvider>,
    pub ui: Arc<dyn UiFeedback>,
    pub preview_surface: Arc<dyn PreviewSurface>,
}

pub struct CameraSessionController {
    deps: ControllerDependencies,
    receiver: StillImageReceiver,
    events: EventSink,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    camera_id: Option<CameraIdentity>,
    device: Option<Box<dyn CameraDevice>>,
    session: Option<Box<dyn CaptureSession>>,
    preview_target: Option<PreviewTarget>,
    still_reader: Option<Arc<ImageReader>>,
}

impl CameraSessionController {
    /// `events` is handed to every device, session and image reader the
    /// controller creates; it must route back into [`Self::handle_event`].
    pub fn new(deps: ControllerDependencies, receiver: StillImageReceiver, events: EventSink) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Closed);
        CameraSessionController {
            deps,
            receiver,
            events,
            state: SessionState::Closed,
            state_tx,
            camera_id: None,
            device: None,
            session: None,
            preview_target: None,
            still_reader: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn camera_id(&self) -> Option<&CameraIdentity> {
        self.camera_id.as_ref()
    }

    pub fn preview_geometry(&self) -> Option<StreamGeometry> {
        self.preview_target.as_ref().map(PreviewTarget::geometry)
    }

    pub fn still_reader(&self) -> Option<Arc<ImageReader>> {
        self.still_reader.clone()
    }

    /// Requests the first reported camera. Without camera permission the
    /// controller parks in `PendingPermission` until
    /// [`Self::on_permission_result`] is called.
    pub fn open(&mut self) -> OpenStatus {
        match self.state {
            SessionState::Closed | SessionState::Error => {}
            SessionState::PendingPermission => {
                debug!("open() while a permission request is outstanding");
                return OpenStatus::AlreadyActive;
            }
            other => {
                debug!("open() ignored in state {:?}", other);
                return OpenStatus::AlreadyActive;
            }
        }

        if !self.deps.permissions.has_camera_permission() {
            info!("🔐 Camera permission not granted yet; waiting for the user");
            self.set_state(SessionState::PendingPermission);
            return OpenStatus::AwaitingPermission;
        }

        match self.open_first_camera() {
            Ok(()) => OpenStatus::Opening,
            Err(e) => {
                self.fail(e);
                OpenStatus::Failed
            }
        }
    }

    pub fn on_permission_result(&mut self, granted: bool) {
        if self.state != SessionState::PendingPermission {
            warn!("Permission result ({}) arrived in state {:?}; ignoring", granted, self.state);
            return;
        }
        self.set_state(SessionState::Closed);
        if granted {
            info!("🔓 Camera permission granted");
            if let Err(e) = self.open_first_camera() {
                self.fail(e);
            }
        } else {
            self.report(&AppError::PermissionDenied);
        }
    }

    /// Takes one still. Only acts in `PreviewRunning`; returns whether a
    /// request was submitted.
    pub fn capture(&mut self) -> bool {
        match self.state {
            SessionState::PreviewRunning => {}
            SessionState::Capturing => {
                debug!("Still capture already in flight; ignoring trigger");
                return false;
            }
            other => {
                debug!("Capture requested in state {:?}", other);
                self.deps.ui.notify("Camera not ready");
                return false;
            }
        }

        self.deps.ui.set_capture_in_progress(true);
        match self.submit_still_capture() {
            Ok(()) => {
                self.set_state(SessionState::Capturing);
                true
            }
            Err(e) => {
                self.report(&e);
                self.deps.ui.set_capture_in_progress(false);
                if let Err(rearm_err) = self.rearm_preview() {
                    self.fail(rearm_err);
                }
                false
            }
        }
    }

    pub fn handle_event(&mut self, event: CameraEvent) {
        debug!("📨 {:?} in state {:?}", event, self.state);
        match event {
            CameraEvent::DeviceOpened => self.on_device_opened(),
            CameraEvent::DeviceDisconnected => self.on_device_lost(None),
            CameraEvent::DeviceError(code) => self.on_device_lost(Some(code)),
            CameraEvent::SessionConfigured => self.on_session_configured(),
            CameraEvent::SessionConfigFailed => self.on_session_config_failed(),
            CameraEvent::CaptureCompleted => {
                // The encoded buffer arrives separately through ImageAvailable.
                debug!("Still capture completed by hardware");
            }
            CameraEvent::ImageAvailable => self.on_image_available(),
        }
    }

    /// Stops streaming and releases session, device and image reader.
    /// Safe from any state and safe to repeat.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed && self.device.is_none() && self.session.is_none() {
            debug!("close() on an already closed controller");
            return;
        }
        let start_time = Instant::now();
        let was_capturing = self.state == SessionState::Capturing;
        self.release_resources();
        if was_capturing {
            info!("🗑️ In-flight still capture abandoned by teardown");
            self.deps.ui.set_capture_in_progress(false);
        }
        self.set_state(SessionState::Closed);
        info!("📴 Camera closed in {:?}", start_time.elapsed());
    }

    fn open_first_camera(&mut self) -> Result<(), AppError> {
        let start_time = Instant::now();
        let camera_id = self
            .deps
            .backend
            .camera_ids()?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("no camera reported by the platform".to_string()))?;
        let geometry = self
            .deps
            .backend
            .output_sizes(&camera_id)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::DeviceAccess(format!("camera '{}' reports no preview sizes", camera_id)))?;
        debug!("Using camera '{}' at {}", camera_id, geometry);

        let preview = PreviewSurfaceBinding::bind(Arc::clone(&self.deps.preview_surface), geometry);
        let reader = ImageReader::new(geometry, STILL_IMAGE_POOL_CAPACITY);
        reader.set_on_image_available(self.events.clone());

        self.camera_id = Some(camera_id.clone());
        self.preview_target = Some(preview);
        self.still_reader = Some(reader);
        self.set_state(SessionState::Opening);

        let device = self.deps.backend.open_camera(&camera_id, self.events.clone())?;
        self.device = Some(device);
        info!("📷 Opening camera '{}' ({}) requested in {:?}", camera_id, geometry, start_time.elapsed());
        Ok(())
    }

    fn on_device_opened(&mut self) {
        if self.state != SessionState::Opening {
            debug!("Stale DeviceOpened in state {:?}", self.state);
            return;
        }
        let (Some(preview), Some(reader)) = (self.preview_target.clone(), self.still_reader.clone()) else {
            self.fail(AppError::DeviceAccess("device opened without bound outputs".to_string()));
            return;
        };
        let Some(device) = self.device.as_mut() else {
            debug!("DeviceOpened before the device handle was stored; ignoring");
            return;
        };

        let outputs = vec![SurfaceTarget::Preview(preview), SurfaceTarget::StillImage(reader)];
        match device.create_capture_session(outputs, self.events.clone()) {
            Ok(session) => {
                debug!("Capture session requested; awaiting configuration");
                self.session = Some(session);
            }
            Err(e) => self.fail(e),
        }
    }

    fn on_session_configured(&mut self) {
        if self.state != SessionState::Opening || self.session.is_none() {
            debug!("Stale SessionConfigured in state {:?}", self.state);
            return;
        }
        match self.rearm_preview() {
            Ok(()) => info!("▶️ Preview running"),
            Err(e) => self.fail(e),
        }
    }

    fn on_session_config_failed(&mut self) {
        if self.state != SessionState::Opening {
            debug!("Stale SessionConfigFailed in state {:?}", self.state);
            return;
        }
        self.fail(AppError::ConfigurationFailed("capture session negotiation failed".to_string()));
    }

    fn on_device_lost(&mut self, code: Option<i32>) {
        if self.device.is_none() {
            debug!("Device loss reported in state {:?} with no open device; ignoring", self.state);
            return;
        }
        match code {
            Some(code) => self.fail(AppError::DeviceAccess(format!("camera device error {}", code))),
            None => {
                let was_capturing = self.state == SessionState::Capturing;
                self.release_resources();
                self.set_state(SessionState::Closed);
                if was_capturing {
                    self.deps.ui.set_capture_in_progress(false);
                }
                self.report(&AppError::DeviceAccess("camera disconnected".to_string()));
            }
        }
    }

    fn on_image_available(&mut self) {
        let Some(reader) = self.still_reader.clone() else {
            debug!("ImageAvailable with no image reader; ignoring");
            return;
        };
        if self.state != SessionState::Capturing {
            let dropped = reader.discard_pending();
            warn!("Discarded {} frame(s) delivered outside a still capture", dropped);
            return;
        }

        match self.receiver.on_image_available(&reader) {
            Ok(saved) => {
                info!("✅ Capture saved to {}", saved.path.display());
                self.deps.navigator.show_capture_result(&saved);
            }
            Err(e) => self.report(&e),
        }
        self.deps.ui.set_capture_in_progress(false);

        if let Err(e) = self.rearm_preview() {
            self.fail(e);
        }
    }

    fn submit_still_capture(&mut self) -> Result<(), AppError> {
        let reader = self
            .still_reader
            .clone()
            .ok_or_else(|| AppError::CaptureSubmission("no image reader bound".to_string()))?;
        let rotation = self.deps.display.current_display_rotation();
        let request = CaptureRequestFactory::still_capture_request(SurfaceTarget::StillImage(reader), rotation);

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| AppError::CaptureSubmission("no active capture session".to_string()))?;
        session.stop_repeating()?;
        session.capture(&request)?;
        info!(
            "📸 Still capture submitted (display {}, jpeg orientation {}°)",
            rotation,
            request.jpeg_orientation()
        );
        Ok(())
    }

    fn rearm_preview(&mut self) -> Result<(), AppError> {
        let preview = self
            .preview_target
            .clone()
            .ok_or_else(|| AppError::DeviceAccess("no preview target bound".to_string()))?;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| AppError::DeviceAccess("no active capture session".to_string()))?;
        session.set_repeating_request(&CaptureRequestFactory::preview_request(SurfaceTarget::Preview(preview)))?;
        self.set_state(SessionState::PreviewRunning);
        Ok(())
    }

    fn release_resources(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.stop_repeating() {
                debug!("stop_repeating during teardown: {}", e);
            }
            session.close();
        }
        if let Some(mut device) = self.device.take() {
            debug!("Closing camera device '{}'", device.id());
            device.close();
        }
        if let Some(reader) = self.still_reader.take() {
            let dropped = reader.close();
            if dropped > 0 {
                info!("Discarded {} pending still frame(s) during teardown", dropped);
            }
        }
        self.preview_target = None;
        self.camera_id = None;
    }

    fn fail(&mut self, err: AppError) {
        let was_capturing = self.state == SessionState::Capturing;
        self.release_resources();
        self.set_state(SessionState::Error);
        if was_capturing {
            self.deps.ui.set_capture_in_progress(false);
        }
        self.report(&err);
    }

    fn report(&self, err: &AppError) {
        error!("❌ {}", err);
        self.deps.ui.notify(err.user_message());
        if err.is_fatal_for_screen() {
            self.deps.navigator.finish_screen();
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            info!("🔁 Camera state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
        self.state_tx.send_replace(next);
    }
}
