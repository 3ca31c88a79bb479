use log::{debug, info, warn};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;

use crate::camera::hal::{CameraEvent, EventSink};
use crate::common::lock_or_recover;
use crate::core::background_context::{BackgroundExecutionContext, StopOutcome};
use crate::core::collaborators::PermissionProvider;
use crate::core::session_controller::{CameraSessionController, ControllerDependencies, OpenStatus, SessionState};
use crate::core::still_receiver::StillImageReceiver;
use crate::errors::AppError;

pub const WORKER_THREAD_NAME: &str = "CameraBackground";

pub struct CameraScreen {
    worker: Arc<BackgroundExecutionContext>,
    controller: Arc<Mutex<CameraSessionController>>,
    permissions: Arc<dyn PermissionProvider>,
    state_rx: watch::Receiver<SessionState>,
    shutdown_timeout: Duration,
}

impl CameraScreen {
    pub fn new(deps: ControllerDependencies, receiver: StillImageReceiver, shutdown_timeout: Duration) -> Self {
        let worker = Arc::new(BackgroundExecutionContext::new(WORKER_THREAD_NAME));
        let permissions = Arc::clone(&deps.permissions);

        let sink_worker = Arc::clone(&worker);
        let controller = Arc::new_cyclic(|weak: &Weak<Mutex<CameraSessionController>>| {
            let target = weak.clone();
            let events = EventSink::new(move |event| dispatch_event(&sink_worker, &target, event));
            Mutex::new(CameraSessionController::new(deps, receiver, events))
        });
        let state_rx = lock_or_recover(&controller).subscribe();

        CameraScreen {
            worker,
            controller,
            permissions,
            state_rx,
            shutdown_timeout,
        }
    }

    /// Screen became visible: start the worker and open the camera on it.
    pub fn on_resume(&self) -> Result<(), AppError> {
        self.worker.start()?;

        let controller = Arc::clone(&self.controller);
        let permissions = Arc::clone(&self.permissions);
        let worker = Arc::clone(&self.worker);
        self.worker.post(move || {
            let status = lock_or_recover(&controller).open();
            debug!("open() -> {:?}", status);
            if status == OpenStatus::AwaitingPermission {
                let target = Arc::downgrade(&controller);
                permissions.request_camera_permission(Box::new(move |granted| {
                    let posted = worker.post(move || {
                        if let Some(controller) = target.upgrade() {
                            lock_or_recover(&controller).on_permission_result(granted);
                        }
                    });
                    if let Err(e) = posted {
                        warn!("Permission answer arrived after the screen was hidden: {}", e);
                    }
                }));
            }
        })
    }

    /// Capture trigger pressed.
    pub fn on_capture_pressed(&self) -> Result<(), AppError> {
        let controller = Arc::clone(&self.controller);
        self.worker.post(move || {
            lock_or_recover(&controller).capture();
        })
    }

    /// Screen hidden: close the camera, then drain and stop the worker
    /// within the configured bound.
    pub fn on_pause(&self) -> StopOutcome {
        let controller = Arc::clone(&self.controller);
        if let Err(e) = self.worker.post(move || lock_or_recover(&controller).close()) {
            debug!("Worker already stopped ({}); closing inline", e);
            lock_or_recover(&self.controller).close();
        }

        let outcome = self.worker.stop(self.shutdown_timeout);
        match outcome {
            StopOutcome::TimedOut => warn!("⏱️ Camera worker overran {:?} while shutting down", self.shutdown_timeout),
            other => info!("🛑 Camera screen paused ({:?})", other),
        }
        outcome
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn is_worker_running(&self) -> bool {
        self.worker.is_running()
    }
}

impl Drop for CameraScreen {
    fn drop(&mut self) {
        if self.worker.is_running() {
            self.on_pause();
        }
    }
}

fn dispatch_event(
    worker: &BackgroundExecutionContext,
    target: &Weak<Mutex<CameraSessionController>>,
    event: CameraEvent,
) {
    let target = target.clone();
    let posted = worker.post(move || {
        if let Some(controller) = target.upgrade() {
            lock_or_recover(&controller).handle_event(event);
        }
    });
    if let Err(e) = posted {
        debug!("Dropping {:?}: {}", event, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::capture_request::DisplayRotation;
    use crate::camera::simulated_device::SimulatedCameraBackend;
    use crate::camera_config::SimulatedCameraConfig;
    use crate::core::collaborators::FixedDisplayRotation;
    use crate::core::test_support::*;
    use std::time::Instant;

    struct Fixture {
        screen: CameraScreen,
        backend: Arc<SimulatedCameraBackend>,
        navigator: Arc<RecordingNavigator>,
        ui: Arc<RecordingUi>,
        permissions: Arc<StaticPermissions>,
        _dir: tempfile::TempDir,
    }

    fn fixture(sim: SimulatedCameraConfig, granted: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(SimulatedCameraBackend::new(sim));
        let navigator = Arc::new(RecordingNavigator::default());
        let ui = Arc::new(RecordingUi::default());
        let permissions = Arc::new(StaticPermissions::new(granted));
        let deps = ControllerDependencies {
            backend: backend.clone(),
            permissions: permissions.clone(),
            navigator: navigator.clone(),
            display: Arc::new(FixedDisplayRotation(DisplayRotation::Rotation0)),
            ui: ui.clone(),
            preview_surface: Arc::new(NullSurface),
        };
        let screen = CameraScreen::new(deps, test_receiver(dir.path(), None), Duration::from_secs(5));
        Fixture {
            screen,
            backend,
            navigator,
            ui,
            permissions,
            _dir: dir,
        }
    }

    fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn resume_capture_pause_round_trip() {
        let f = fixture(tiny_sim(), true);
        f.screen.on_resume().unwrap();
        wait_until("preview", || f.screen.state() == SessionState::PreviewRunning);

        f.screen.on_capture_pressed().unwrap();
        wait_until("saved capture", || f.navigator.results().len() == 1);
        wait_until("preview re-armed", || f.screen.state() == SessionState::PreviewRunning);

        assert_eq!(f.screen.on_pause(), StopOutcome::Drained);
        assert_eq!(f.screen.state(), SessionState::Closed);
        assert!(!f.screen.is_worker_running());
        assert_eq!(f.backend.stats().devices_closed, 1);
        assert_eq!(f.ui.indicator_history(), vec![true, false]);
    }

    #[test]
    fn trigger_while_hidden_is_rejected() {
        let f = fixture(tiny_sim(), true);
        assert!(matches!(f.screen.on_capture_pressed(), Err(AppError::WorkerStopped(_))));
        assert_eq!(f.screen.on_pause(), StopOutcome::NotRunning);
    }

    #[test]
    fn denied_permission_finishes_the_screen() {
        let f = fixture(tiny_sim(), false);
        f.screen.on_resume().unwrap();
        wait_until("finish", || f.navigator.finished() == 1);

        assert_eq!(*f.permissions.requests.lock().unwrap(), 1);
        assert_eq!(f.backend.stats().open_attempts, 0);
        assert_eq!(f.screen.state(), SessionState::Closed);
        f.screen.on_pause();
    }

    #[test]
    fn pause_during_capture_leaves_no_pending_frame() {
        let f = fixture(tiny_sim(), true);
        f.screen.on_resume().unwrap();
        wait_until("preview", || f.screen.state() == SessionState::PreviewRunning);

        f.screen.on_capture_pressed().unwrap();
        f.screen.on_pause();
        assert_eq!(f.screen.state(), SessionState::Closed);
        assert_eq!(f.ui.indicator_history().last(), Some(&false));
        assert!(f.navigator.results().len() <= 1);
    }

    #[test]
    fn screen_can_be_resumed_again_after_pause() {
        let f = fixture(tiny_sim(), true);
        for _ in 0..2 {
            f.screen.on_resume().unwrap();
            wait_until("preview", || f.screen.state() == SessionState::PreviewRunning);
            assert_eq!(f.screen.on_pause(), StopOutcome::Drained);
        }
        assert_eq!(f.backend.stats().open_attempts, 2);
        assert_eq!(f.backend.stats().devices_closed, 2);
    }
}
