//! Bounded image buffer pools fed by the hardware and drained by the core.
//!
//! A reader holds at most `capacity` images, counting both the ones waiting in
//! the queue and the ones a consumer has acquired but not yet released. When
//! the pool is full the producer's frame is dropped, which is how a slow
//! consumer stalls the stream without blocking the sensor.

use crate::executor::Handler;
use crate::types::{Size, StreamFormat};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

static NEXT_READER_ID: AtomicU64 = AtomicU64::new(1);

/// Raw frame as produced by the sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: StreamFormat,
    pub timestamp_nanos: i64,
}

/// Called after an image was queued or after the reader closed.
pub type ImageAvailableListener = Arc<dyn Fn(&Arc<ImageReader>) + Send + Sync + 'static>;

struct ListenerSlot {
    listener: ImageAvailableListener,
    handler: Option<Handler>,
}

#[derive(Default)]
struct PoolState {
    queued: VecDeque<Image>,
    acquired: usize,
    closed: bool,
    listener: Option<ListenerSlot>,
    dropped_frames: u64,
}

/// Core-owned buffer pool for one output stream.
pub struct ImageReader {
    id: u64,
    size: Size,
    format: StreamFormat,
    capacity: usize,
    state: Mutex<PoolState>,
}

impl ImageReader {
    pub fn new(size: Size, format: StreamFormat, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_READER_ID.fetch_add(1, Ordering::Relaxed),
            size,
            format,
            capacity: capacity.max(1),
            state: Mutex::new(PoolState::default()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Producer side: offer a frame to the pool.
    ///
    /// Returns false if the reader is closed or every buffer is in use.
    pub fn queue_image(self: &Arc<Self>, image: Image) -> bool {
        let listener = {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            if state.queued.len() + state.acquired >= self.capacity {
                state.dropped_frames += 1;
                log::debug!(
                    "Reader {} full ({} acquired), dropping frame at {}",
                    self.id,
                    state.acquired,
                    image.timestamp_nanos
                );
                return false;
            }
            state.queued.push_back(image);
            clone_listener(&state)
        };

        if let Some((listener, handler)) = listener {
            self.notify(listener, handler);
        }
        true
    }

    /// Take the newest queued image, releasing every older one.
    pub fn acquire_latest_image(self: &Arc<Self>) -> Option<AcquiredImage> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        let latest = state.queued.pop_back()?;
        let skipped = state.queued.len() as u64;
        state.queued.clear();
        state.dropped_frames += skipped;
        state.acquired += 1;
        Some(AcquiredImage {
            image: latest,
            reader: Arc::clone(self),
        })
    }

    /// Take the oldest queued image.
    pub fn acquire_next_image(self: &Arc<Self>) -> Option<AcquiredImage> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        let next = state.queued.pop_front()?;
        state.acquired += 1;
        Some(AcquiredImage {
            image: next,
            reader: Arc::clone(self),
        })
    }

    /// Install or clear the image-available listener.
    ///
    /// With a handler the listener runs on that executor, otherwise on the
    /// producer's thread. Images already queued trigger one notification.
    pub fn set_listener(
        self: &Arc<Self>,
        listener: Option<ImageAvailableListener>,
        handler: Option<Handler>,
    ) {
        let pending = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.listener = listener.map(|listener| ListenerSlot { listener, handler });
            if state.queued.is_empty() {
                None
            } else {
                clone_listener(&state)
            }
        };

        if let Some((listener, handler)) = pending {
            self.notify(listener, handler);
        }
    }

    /// Drop queued images and stop accepting new ones.
    ///
    /// The listener is told one last time so consumers can observe the close.
    /// Images still held by consumers stay valid until they are released.
    pub fn close(self: &Arc<Self>) {
        let listener = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.queued.clear();
            state.listener.take().map(|slot| (slot.listener, slot.handler))
        };
        log::debug!("Closed image reader {} ({:?})", self.id, self.format);

        if let Some((listener, handler)) = listener {
            self.notify(listener, handler);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn acquired_count(&self) -> usize {
        self.lock().acquired
    }

    pub fn queued_count(&self) -> usize {
        self.lock().queued.len()
    }

    /// Frames lost to a full pool or skipped by `acquire_latest_image`.
    pub fn dropped_frames(&self) -> u64 {
        self.lock().dropped_frames
    }

    fn release_one(&self) {
        let mut state = self.lock();
        state.acquired = state.acquired.saturating_sub(1);
    }

    fn notify(self: &Arc<Self>, listener: ImageAvailableListener, handler: Option<Handler>) {
        match handler {
            Some(handler) => {
                let reader = Arc::clone(self);
                let inline = Arc::clone(&listener);
                if !handler.post(move || listener(&reader)) {
                    // Executor already gone; deliver on the caller's thread.
                    inline(self);
                }
            }
            None => listener(self),
        }
    }
}

fn clone_listener(state: &PoolState) -> Option<(ImageAvailableListener, Option<Handler>)> {
    state
        .listener
        .as_ref()
        .map(|slot| (Arc::clone(&slot.listener), slot.handler.clone()))
}

impl std::fmt::Debug for ImageReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageReader")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("format", &self.format)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// An image checked out of a reader. The buffer returns to the pool on drop.
pub struct AcquiredImage {
    image: Image,
    reader: Arc<ImageReader>,
}

impl AcquiredImage {
    pub fn data(&self) -> &Bytes {
        &self.image.data
    }

    pub fn width(&self) -> u32 {
        self.image.width
    }

    pub fn height(&self) -> u32 {
        self.image.height
    }

    pub fn format(&self) -> StreamFormat {
        self.image.format
    }

    pub fn timestamp_nanos(&self) -> i64 {
        self.image.timestamp_nanos
    }

    pub fn reader_id(&self) -> u64 {
        self.reader.id
    }

    /// Return the buffer to the pool now.
    pub fn release(self) {}
}

impl Drop for AcquiredImage {
    fn drop(&mut self) {
        self.reader.release_one();
    }
}

impl std::fmt::Debug for AcquiredImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquiredImage")
            .field("reader", &self.reader.id)
            .field("width", &self.image.width)
            .field("height", &self.image.height)
            .field("timestamp_nanos", &self.image.timestamp_nanos)
            .finish()
    }
}
