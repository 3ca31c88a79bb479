use log::{debug, warn};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::camera::hal::{CameraEvent, EventSink, StreamGeometry};
use crate::common::lock_or_recover;
use crate::errors::AppError;

#[derive(Default)]
struct ReaderState {
    queued: VecDeque<Vec<u8>>,
    acquired: usize,
    closed: bool,
}

pub struct ImageReader {
    geometry: StreamGeometry,
    max_images: usize,
    state: Mutex<ReaderState>,
    listener: Mutex<Option<EventSink>>,
    acquire_count: AtomicU64,
    release_count: AtomicU64,
}

impl ImageReader {
    pub fn new(geometry: StreamGeometry, max_images: usize) -> Arc<Self> {
        Arc::new(ImageReader {
            geometry,
            max_images: max_images.max(1),
            state: Mutex::new(ReaderState::default()),
            listener: Mutex::new(None),
            acquire_count: AtomicU64::new(0),
            release_count: AtomicU64::new(0),
        })
    }

    pub fn geometry(&self) -> StreamGeometry {
        self.geometry
    }

    pub fn set_on_image_available(&self, sink: EventSink) {
        *lock_or_recover(&self.listener) = Some(sink);
    }

    pub fn queue_image(&self, data: Vec<u8>) -> Result<(), AppError> {
        {
            let mut state = lock_or_recover(&self.state);
            if state.closed {
                return Err(AppError::CaptureSubmission("image reader is closed".to_string()));
            }
            if state.queued.len() + state.acquired >= self.max_images {
                warn!(
                    "🚧 Image pool exhausted ({} queued, {} acquired, capacity {}), dropping frame",
                    state.queued.len(),
                    state.acquired,
                    self.max_images
                );
                return Err(AppError::CaptureSubmission(format!(
                    "image buffer pool exhausted (capacity {})",
                    self.max_images
                )));
            }
            state.queued.push_back(data);
        }

        let listener = lock_or_recover(&self.listener).clone();
        if let Some(sink) = listener {
            sink.emit(CameraEvent::ImageAvailable);
        }
        Ok(())
    }

    /// Consumer side: takes the newest queued frame, discarding older ones.
    /// `None` when nothing is queued or every slot is already acquired.
    pub fn acquire_latest_image(self: &Arc<Self>) -> Option<AcquiredImage> {
        let mut state = lock_or_recover(&self.state);
        if state.acquired >= self.max_images {
            warn!("Cannot acquire image: all {} slots are held", self.max_images);
            return None;
        }
        let newest = state.queued.pop_back()?;
        let dropped = state.queued.len();
        state.queued.clear();
        if dropped > 0 {
            debug!("Dropped {} stale frame(s) in favour of the newest", dropped);
        }
        state.acquired += 1;
        self.acquire_count.fetch_add(1, Ordering::SeqCst);

        Some(AcquiredImage {
            reader: Arc::clone(self),
            data: newest,
        })
    }

    /// Drops every queued (not yet acquired) frame. Returns how many were dropped.
    pub fn discard_pending(&self) -> usize {
        let mut state = lock_or_recover(&self.state);
        let dropped = state.queued.len();
        state.queued.clear();
        dropped
    }

    pub fn close(&self) -> usize {
        let dropped = {
            let mut state = lock_or_recover(&self.state);
            state.closed = true;
            let dropped = state.queued.len();
            state.queued.clear();
            dropped
        };
        *lock_or_recover(&self.listener) = None;
        dropped
    }

    pub fn is_closed(&self) -> bool {
        lock_or_recover(&self.state).closed
    }

    pub fn pending_count(&self) -> usize {
        lock_or_recover(&self.state).queued.len()
    }

    pub fn acquired_count(&self) -> usize {
        lock_or_recover(&self.state).acquired
    }

    pub fn total_acquires(&self) -> u64 {
        self.acquire_count.load(Ordering::SeqCst)
    }

    pub fn total_releases(&self) -> u64 {
        self.release_count.load(Ordering::SeqCst)
    }

    fn release(&self) {
        let mut state = lock_or_recover(&self.state);
        state.acquired = state.acquired.saturating_sub(1);
        self.release_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for ImageReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageReader")
            .field("geometry", &self.geometry)
            .field("max_images", &self.max_images)
            .finish()
    }
}

/// A frame checked out of the pool. The slot is returned when this drops,
/// whichever way the holder exits.
pub struct AcquiredImage {
    reader: Arc<ImageReader>,
    data: Vec<u8>,
}

impl AcquiredImage {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for AcquiredImage {
    fn drop(&mut self) {
        self.reader.release();
    }
}
