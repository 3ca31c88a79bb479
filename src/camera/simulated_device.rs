use image::{DynamicImage, ImageFormat, RgbImage};
use log::{debug, info, warn};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::camera::capture_request::{CaptureRequestDescriptor, RequestTemplate};
use crate::camera::hal::{
    CameraBackend, CameraDevice, CameraEvent, CameraIdentity, CaptureSession, EventSink,
    StreamGeometry, SurfaceTarget,
};
use crate::camera::preview_surface::{PreviewFrame, PreviewTarget};
use crate::camera_config::SimulatedCameraConfig;
use crate::common::lock_or_recover;
use crate::errors::AppError;

/// Simulated hardware error code reported when the device is already closed.
pub const ERROR_CAMERA_DEVICE: i32 = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedStats {
    pub open_attempts: u32,
    pub sessions_created: u32,
    pub repeating_requests: u32,
    pub stop_repeating_calls: u32,
    pub still_requests: u32,
    pub last_still_orientation: Option<u32>,
    pub preview_frames_rendered: u64,
    pub devices_closed: u32,
    pub sessions_closed: u32,
}

pub struct SimulatedCameraBackend {
    config: SimulatedCameraConfig,
    stats: Arc<Mutex<SimulatedStats>>,
}

impl SimulatedCameraBackend {
    pub fn new(config: SimulatedCameraConfig) -> Self {
        SimulatedCameraBackend {
            config,
            stats: Arc::new(Mutex::new(SimulatedStats::default())),
        }
    }

    pub fn stats(&self) -> SimulatedStats {
        lock_or_recover(&self.stats).clone()
    }

    fn knows(&self, id: &CameraIdentity) -> bool {
        self.config.camera_ids.iter().any(|known| known == id.as_str())
    }
}

impl CameraBackend for SimulatedCameraBackend {
    fn camera_ids(&self) -> Result<Vec<CameraIdentity>, AppError> {
        Ok(self.config.camera_ids.iter().map(CameraIdentity::new).collect())
    }

    fn output_sizes(&self, id: &CameraIdentity) -> Result<Vec<StreamGeometry>, AppError> {
        if !self.knows(id) {
            return Err(AppError::NotFound(format!("simulated camera '{}'", id)));
        }
        Ok(self.config.output_sizes.clone())
    }

    fn open_camera(
        &self,
        id: &CameraIdentity,
        events: EventSink,
    ) -> Result<Box<dyn CameraDevice>, AppError> {
        lock_or_recover(&self.stats).open_attempts += 1;
        if !self.knows(id) {
            return Err(AppError::NotFound(format!("simulated camera '{}'", id)));
        }
        if self.config.fail_open {
            return Err(AppError::DeviceAccess(format!(
                "simulated camera '{}' is in use by another client",
                id
            )));
        }

        info!("🎥 Simulated camera '{}' opened", id);
        events.emit(CameraEvent::DeviceOpened);
        Ok(Box::new(SimulatedDevice {
            id: id.clone(),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            events,
            closed: false,
        }))
    }
}

struct SimulatedDevice {
    id: CameraIdentity,
    config: SimulatedCameraConfig,
    stats: Arc<Mutex<SimulatedStats>>,
    events: EventSink,
    closed: bool,
}

impl CameraDevice for SimulatedDevice {
    fn id(&self) -> &CameraIdentity {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        outputs: Vec<SurfaceTarget>,
        events: EventSink,
    ) -> Result<Box<dyn CaptureSession>, AppError> {
        if self.closed {
            self.events.emit(CameraEvent::DeviceError(ERROR_CAMERA_DEVICE));
            return Err(AppError::DeviceAccess(format!("camera '{}' is closed", self.id)));
        }
        if outputs.is_empty() {
            return Err(AppError::ConfigurationFailed("no outputs supplied".to_string()));
        }
        lock_or_recover(&self.stats).sessions_created += 1;

        let configured = !self.config.fail_session_configure;
        debug!(
            "Simulated session over [{}] -> {}",
            outputs.iter().map(|o| format!("{} {}", o.kind_name(), o.geometry())).collect::<Vec<_>>().join(", "),
            if configured { "configured" } else { "configure failed" }
        );
        events.emit(if configured {
            CameraEvent::SessionConfigured
        } else {
            CameraEvent::SessionConfigFailed
        });

        Ok(Box::new(SimulatedSession {
            outputs,
            events,
            device_events: self.events.clone(),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            pump: None,
            configured,
            closed: false,
        }))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            lock_or_recover(&self.stats).devices_closed += 1;
            info!("🔌 Simulated camera '{}' closed", self.id);
        }
    }
}

struct SimulatedSession {
    outputs: Vec<SurfaceTarget>,
    events: EventSink,
    device_events: EventSink,
    config: SimulatedCameraConfig,
    stats: Arc<Mutex<SimulatedStats>>,
    pump: Option<PreviewPump>,
    configured: bool,
    closed: bool,
}

impl SimulatedSession {
    fn ensure_usable(&self) -> Result<(), AppError> {
        if self.closed {
            return Err(AppError::CaptureSubmission("capture session is closed".to_string()));
        }
        if !self.configured {
            return Err(AppError::CaptureSubmission("capture session is not configured".to_string()));
        }
        Ok(())
    }

    fn owns(&self, target: &SurfaceTarget) -> bool {
        self.outputs.iter().any(|o| o.same_surface(target))
    }
}

impl CaptureSession for SimulatedSession {
    fn set_repeating_request(&mut self, request: &CaptureRequestDescriptor) -> Result<(), AppError> {
        self.ensure_usable()?;
        if !self.owns(request.target()) {
            return Err(AppError::CaptureSubmission("request target is not a session output".to_string()));
        }
        let SurfaceTarget::Preview(target) = request.target() else {
            return Err(AppError::CaptureSubmission("repeating requests need a preview target".to_string()));
        };
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
        self.pump = Some(PreviewPump::start(
            target.clone(),
            self.config.preview_fps,
            Arc::clone(&self.stats),
        ));
        lock_or_recover(&self.stats).repeating_requests += 1;
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<(), AppError> {
        if self.closed {
            return Err(AppError::CaptureSubmission("capture session is closed".to_string()));
        }
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
        lock_or_recover(&self.stats).stop_repeating_calls += 1;
        Ok(())
    }

    fn capture(&mut self, request: &CaptureRequestDescriptor) -> Result<(), AppError> {
        self.ensure_usable()?;
        if request.template() != RequestTemplate::StillCapture {
            return Err(AppError::CaptureSubmission("one-shot capture needs a still template".to_string()));
        }
        if !self.owns(request.target()) {
            return Err(AppError::CaptureSubmission("request target is not a session output".to_string()));
        }
        let SurfaceTarget::StillImage(reader) = request.target() else {
            return Err(AppError::CaptureSubmission("still capture needs an image reader target".to_string()));
        };
        if self.pump.is_some() {
            return Err(AppError::CaptureSubmission(
                "a repeating request still owns the stream; stop it first".to_string(),
            ));
        }

        let still_number = {
            let mut stats = lock_or_recover(&self.stats);
            stats.still_requests += 1;
            stats.last_still_orientation = Some(request.jpeg_orientation());
            stats.still_requests
        };

        let bytes = if self.config.corrupt_still_frames {
            warn!("Simulated camera producing a corrupt still frame");
            vec![0xFF, 0xD8, 0x00, 0x13, 0x37]
        } else {
            synthesize_jpeg(reader.geometry(), still_number)?
        };
        reader.queue_image(bytes)?;
        self.events.emit(CameraEvent::CaptureCompleted);

        if let Some(limit) = self.config.disconnect_after_stills {
            if still_number >= limit {
                warn!("Simulated camera disconnecting after {} still(s)", still_number);
                self.device_events.emit(CameraEvent::DeviceDisconnected);
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
        if !self.closed {
            self.closed = true;
            lock_or_recover(&self.stats).sessions_closed += 1;
        }
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
    }
}

/// Feeds frame ticks to the preview surface while a repeating request runs.
struct PreviewPump {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PreviewPump {
    fn start(target: PreviewTarget, fps: u32, stats: Arc<Mutex<SimulatedStats>>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let interval = Duration::from_millis(1000 / u64::from(fps.max(1)));
        let spawned = thread::Builder::new()
            .name("simulated-preview".to_string())
            .spawn(move || {
                let mut sequence = 0u64;
                while !stop_flag.load(Ordering::SeqCst) {
                    target.render(PreviewFrame {
                        sequence,
                        geometry: target.geometry(),
                    });
                    lock_or_recover(&stats).preview_frames_rendered += 1;
                    sequence += 1;
                    thread::sleep(interval);
                }
            });
        let thread = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to spawn preview pump: {}", e);
                None
            }
        };
        PreviewPump { stop, thread }
    }

    fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Preview pump thread panicked");
            }
        }
    }
}

/// Renders a gradient test card and encodes it as JPEG.
fn synthesize_jpeg(geometry: StreamGeometry, still_number: u32) -> Result<Vec<u8>, AppError> {
    let tint = (still_number.wrapping_mul(37) % 256) as u8;
    let (w, h) = (geometry.width.max(1), geometry.height.max(1));
    let card = RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([
            (x * 255 / w) as u8,
            (y * 255 / h) as u8,
            tint,
        ])
    });
    let mut encoded = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(card)
        .write_to(&mut encoded, ImageFormat::Jpeg)
        .map_err(|e| AppError::CaptureSubmission(format!("simulated encoder failed: {}", e)))?;
    Ok(encoded.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::capture_request::{CaptureRequestFactory, DisplayRotation};
    use crate::camera::image_reader::ImageReader;
    use crate::camera::preview_surface::{PreviewSurface, PreviewSurfaceBinding};
    use std::sync::atomic::AtomicU64;

    #[derive(Default)]
    struct CountingSurface {
        frames: AtomicU64,
    }

    impl PreviewSurface for CountingSurface {
        fn set_default_buffer_size(&self, _geometry: StreamGeometry) {}
        fn render_frame(&self, _frame: PreviewFrame) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn small_config() -> SimulatedCameraConfig {
        SimulatedCameraConfig {
            output_sizes: vec![StreamGeometry::new(16, 12)],
            preview_fps: 200,
            ..SimulatedCameraConfig::default()
        }
    }

    fn collecting_sink() -> (EventSink, Arc<Mutex<Vec<CameraEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        (EventSink::new(move |e| sink_events.lock().unwrap().push(e)), events)
    }

    #[test]
    fn first_enumerated_camera_and_size_come_from_config() {
        let backend = SimulatedCameraBackend::new(SimulatedCameraConfig::default());
        let ids = backend.camera_ids().unwrap();
        assert_eq!(ids[0].as_str(), "0");
        assert_eq!(backend.output_sizes(&ids[0]).unwrap()[0], StreamGeometry::new(640, 480));
        assert!(backend.output_sizes(&CameraIdentity::new("nope")).is_err());
    }

    #[test]
    fn still_capture_is_refused_while_preview_repeats() {
        let backend = SimulatedCameraBackend::new(small_config());
        let (sink, events) = collecting_sink();
        let id = CameraIdentity::new("0");
        let mut device = backend.open_camera(&id, sink.clone()).unwrap();

        let surface = Arc::new(CountingSurface::default());
        let preview = PreviewSurfaceBinding::bind(surface.clone(), StreamGeometry::new(16, 12));
        let reader = ImageReader::new(StreamGeometry::new(16, 12), 1);
        let outputs = vec![
            SurfaceTarget::Preview(preview.clone()),
            SurfaceTarget::StillImage(Arc::clone(&reader)),
        ];
        let mut session = device.create_capture_session(outputs, sink).unwrap();

        session
            .set_repeating_request(&CaptureRequestFactory::preview_request(SurfaceTarget::Preview(preview)))
            .unwrap();
        let still = CaptureRequestFactory::still_capture_request(
            SurfaceTarget::StillImage(Arc::clone(&reader)),
            DisplayRotation::Rotation90,
        );
        assert!(session.capture(&still).is_err());

        session.stop_repeating().unwrap();
        session.capture(&still).unwrap();
        assert_eq!(reader.pending_count(), 1);

        let stats = backend.stats();
        assert_eq!(stats.still_requests, 1);
        assert_eq!(stats.last_still_orientation, Some(0));
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                CameraEvent::DeviceOpened,
                CameraEvent::SessionConfigured,
                CameraEvent::CaptureCompleted
            ]
        );

        session.close();
        device.close();
        device.close();
        assert_eq!(backend.stats().devices_closed, 1);
    }

    #[test]
    fn stop_repeating_halts_preview_frames() {
        let backend = SimulatedCameraBackend::new(small_config());
        let (sink, _events) = collecting_sink();
        let mut device = backend.open_camera(&CameraIdentity::new("0"), sink.clone()).unwrap();

        let surface = Arc::new(CountingSurface::default());
        let preview = PreviewSurfaceBinding::bind(surface.clone(), StreamGeometry::new(16, 12));
        let mut session = device
            .create_capture_session(vec![SurfaceTarget::Preview(preview.clone())], sink)
            .unwrap();
        session
            .set_repeating_request(&CaptureRequestFactory::preview_request(SurfaceTarget::Preview(preview)))
            .unwrap();
        thread::sleep(Duration::from_millis(60));

        session.stop_repeating().unwrap();
        let rendered = backend.stats().preview_frames_rendered;
        let drawn = surface.frames.load(Ordering::SeqCst);
        assert!(rendered > 0);
        assert_eq!(drawn, rendered);

        thread::sleep(Duration::from_millis(40));
        assert_eq!(backend.stats().preview_frames_rendered, rendered);
        assert_eq!(surface.frames.load(Ordering::SeqCst), drawn);
    }

    #[test]
    fn failed_open_reports_device_access() {
        let backend = SimulatedCameraBackend::new(SimulatedCameraConfig {
            fail_open: true,
            ..small_config()
        });
        let (sink, events) = collecting_sink();
        let err = backend.open_camera(&CameraIdentity::new("0"), sink).err().unwrap();
        assert!(matches!(err, AppError::DeviceAccess(_)));
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn synthetic_still_decodes_at_reader_geometry() {
        let bytes = synthesize_jpeg(StreamGeometry::new(20, 10), 1).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 10));
    }
}
