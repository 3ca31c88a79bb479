use log::{debug, error, info, warn};
use opencv::{core as opencv_core, imgcodecs, prelude::*, videoio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::camera::capture_request::{CaptureRequestDescriptor, RequestTemplate};
use crate::camera::hal::{
    CameraBackend, CameraDevice, CameraEvent, CameraIdentity, CaptureSession, EventSink,
    StreamGeometry, SurfaceTarget,
};
use crate::camera::preview_surface::{PreviewFrame, PreviewTarget};
use crate::camera_config::OpenCvCameraConfig;
use crate::common::lock_or_recover;
use crate::errors::AppError;

pub struct OpenCvCameraBackend {
    config: OpenCvCameraConfig,
    jpeg_quality: u8,
}

impl OpenCvCameraBackend {
    pub fn new(config: OpenCvCameraConfig, jpeg_quality: u8) -> Self {
        OpenCvCameraBackend { config, jpeg_quality }
    }

    fn device_index(&self, id: &CameraIdentity) -> Result<i32, AppError> {
        let index: i32 = id
            .as_str()
            .parse()
            .map_err(|_| AppError::NotFound(format!("'{}' is not a video device index", id)))?;
        if !self.config.device_indices.contains(&index) {
            return Err(AppError::NotFound(format!("video device {} is not configured", index)));
        }
        Ok(index)
    }
}

fn open_capture(index: i32) -> Result<videoio::VideoCapture, AppError> {
    let start_time = Instant::now();
    let cap = videoio::VideoCapture::new(index, videoio::CAP_ANY)
        .map_err(|e| AppError::DeviceAccess(format!("OpenCV: cannot create capture {}: {}", index, e)))?;
    let opened = videoio::VideoCapture::is_opened(&cap)
        .map_err(|e| AppError::DeviceAccess(format!("OpenCV: is_opened failed for {}: {}", index, e)))?;
    if !opened {
        return Err(AppError::DeviceAccess(format!("video device {} could not be opened", index)));
    }
    debug!("VideoCapture {} opened in {:?}", index, start_time.elapsed());
    Ok(cap)
}

impl CameraBackend for OpenCvCameraBackend {
    fn camera_ids(&self) -> Result<Vec<CameraIdentity>, AppError> {
        Ok(self
            .config
            .device_indices
            .iter()
            .map(|i| CameraIdentity::new(i.to_string()))
            .collect())
    }

    fn output_sizes(&self, id: &CameraIdentity) -> Result<Vec<StreamGeometry>, AppError> {
        let mut cap = open_capture(self.device_index(id)?)?;
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0);
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0);
        if let Err(e) = cap.release() {
            warn!("OpenCV: release after probing '{}' failed: {}", id, e);
        }
        if width < 1.0 || height < 1.0 {
            return Err(AppError::DeviceAccess(format!("camera '{}' reports no frame size", id)));
        }
        Ok(vec![StreamGeometry::new(width as u32, height as u32)])
    }

    fn open_camera(&self, id: &CameraIdentity, events: EventSink) -> Result<Box<dyn CameraDevice>, AppError> {
        let cap = open_capture(self.device_index(id)?)?;
        info!("🎥 OpenCV camera '{}' opened", id);
        events.emit(CameraEvent::DeviceOpened);
        Ok(Box::new(OpenCvDevice {
            id: id.clone(),
            capture: Arc::new(Mutex::new(Some(cap))),
            preview_fps: self.config.preview_fps,
            jpeg_quality: self.jpeg_quality,
        }))
    }
}

type SharedCapture = Arc<Mutex<Option<videoio::VideoCapture>>>;

struct OpenCvDevice {
    id: CameraIdentity,
    capture: SharedCapture,
    preview_fps: u32,
    jpeg_quality: u8,
}

impl CameraDevice for OpenCvDevice {
    fn id(&self) -> &CameraIdentity {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        outputs: Vec<SurfaceTarget>,
        events: EventSink,
    ) -> Result<Box<dyn CaptureSession>, AppError> {
        if lock_or_recover(&self.capture).is_none() {
            return Err(AppError::DeviceAccess(format!("camera '{}' is closed", self.id)));
        }
        events.emit(CameraEvent::SessionConfigured);
        Ok(Box::new(OpenCvSession {
            outputs,
            events,
            capture: Arc::clone(&self.capture),
            preview_fps: self.preview_fps,
            jpeg_quality: self.jpeg_quality,
            pump: None,
            closed: false,
        }))
    }

    fn close(&mut self) {
        if let Some(mut cap) = lock_or_recover(&self.capture).take() {
            if let Err(e) = cap.release() {
                warn!("OpenCV: release of '{}' failed: {}", self.id, e);
            }
            info!("🔌 OpenCV camera '{}' closed", self.id);
        }
    }
}

struct OpenCvSession {
    outputs: Vec<SurfaceTarget>,
    events: EventSink,
    capture: SharedCapture,
    preview_fps: u32,
    jpeg_quality: u8,
    pump: Option<FramePump>,
    closed: bool,
}

impl OpenCvSession {
    fn check_target(&self, request: &CaptureRequestDescriptor) -> Result<(), AppError> {
        if self.closed {
            return Err(AppError::CaptureSubmission("capture session is closed".to_string()));
        }
        if !self.outputs.iter().any(|o| o.same_surface(request.target())) {
            return Err(AppError::CaptureSubmission("request target is not a session output".to_string()));
        }
        Ok(())
    }
}

impl CaptureSession for OpenCvSession {
    fn set_repeating_request(&mut self, request: &CaptureRequestDescriptor) -> Result<(), AppError> {
        self.check_target(request)?;
        let SurfaceTarget::Preview(target) = request.target() else {
            return Err(AppError::CaptureSubmission("repeating requests need a preview target".to_string()));
        };
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
        self.pump = Some(FramePump::start(target.clone(), Arc::clone(&self.capture), self.preview_fps));
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<(), AppError> {
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
        Ok(())
    }

    fn capture(&mut self, request: &CaptureRequestDescriptor) -> Result<(), AppError> {
        self.check_target(request)?;
        if request.template() != RequestTemplate::StillCapture {
            return Err(AppError::CaptureSubmission("one-shot capture needs a still template".to_string()));
        }
        let SurfaceTarget::StillImage(reader) = request.target() else {
            return Err(AppError::CaptureSubmission("still capture needs an image reader target".to_string()));
        };

        let start_time = Instant::now();
        let frame = {
            let mut guard = lock_or_recover(&self.capture);
            let cap = guard
                .as_mut()
                .ok_or_else(|| AppError::CaptureSubmission("camera is closed".to_string()))?;
            read_frame(cap)?
        };
        // OpenCV frames are not rotated by the sensor, so the orientation hint
        // is only logged here.
        debug!("Still requested with JPEG orientation {}°", request.jpeg_orientation());

        let mut encoded = opencv_core::Vector::<u8>::new();
        let mut params = opencv_core::Vector::<i32>::new();
        params.push(imgcodecs::IMWRITE_JPEG_QUALITY);
        params.push(i32::from(self.jpeg_quality));
        let ok = imgcodecs::imencode(".jpg", &frame, &mut encoded, &params)
            .map_err(|e| AppError::CaptureSubmission(format!("OpenCV: imencode failed: {}", e)))?;
        if !ok {
            return Err(AppError::CaptureSubmission("OpenCV: imencode produced no data".to_string()));
        }
        reader.queue_image(encoded.to_vec())?;
        debug!("OpenCV still encoded in {:?}", start_time.elapsed());
        self.events.emit(CameraEvent::CaptureCompleted);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
        self.closed = true;
    }
}

impl Drop for OpenCvSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
    }
}

fn read_frame(cap: &mut videoio::VideoCapture) -> Result<opencv_core::Mat, AppError> {
    let mut frame = opencv_core::Mat::default();
    let got = cap
        .read(&mut frame)
        .map_err(|e| AppError::CaptureSubmission(format!("OpenCV: read failed: {}", e)))?;
    if !got || frame.empty() {
        return Err(AppError::CaptureSubmission("OpenCV: captured frame is empty".to_string()));
    }
    Ok(frame)
}

struct FramePump {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FramePump {
    fn start(target: PreviewTarget, capture: SharedCapture, fps: u32) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let interval = Duration::from_millis(1000 / u64::from(fps.max(1)));
        let spawned = thread::Builder::new().name("opencv-preview".to_string()).spawn(move || {
            let mut sequence = 0u64;
            while !stop_flag.load(Ordering::SeqCst) {
                let read = {
                    let mut guard = lock_or_recover(&capture);
                    match guard.as_mut() {
                        Some(cap) => read_frame(cap),
                        None => break,
                    }
                };
                match read {
                    Ok(_) => {
                        target.render(PreviewFrame {
                            sequence,
                            geometry: target.geometry(),
                        });
                        sequence += 1;
                    }
                    Err(e) => error!("Preview frame dropped: {}", e),
                }
                thread::sleep(interval);
            }
        });
        let thread = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to spawn OpenCV preview pump: {}", e);
                None
            }
        };
        FramePump { stop, thread }
    }

    fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("OpenCV preview pump panicked");
            }
        }
    }
}
