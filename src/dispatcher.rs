//! Fan-out of analysis frames to a single pull-based consumer.
//!
//! Frames are handed over only while the consumer is waiting for one. A frame
//! that arrives while the consumer is busy is released straight back to the
//! pool, and an undelivered frame is replaced by a newer one, so a slow
//! consumer always sees the most recent image and never holds up the sensor.

use crate::image_reader::{AcquiredImage, ImageAvailableListener, ImageReader};
use crate::session::{CameraSession, Shared};
use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll, Waker};

/// One analysis frame. Its buffer returns to the pool when dropped.
#[derive(Debug)]
pub struct PreviewFrame {
    pub image: AcquiredImage,
    pub timestamp_nanos: i64,
    /// Clockwise rotation needed to display the frame upright.
    pub rotation_degrees: u32,
}

impl PreviewFrame {
    pub fn data(&self) -> &[u8] {
        self.image.data()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Return the buffer to the pool now.
    pub fn release(self) {}
}

#[derive(Default)]
struct SlotState {
    waker: Option<Waker>,
    frame: Option<PreviewFrame>,
    waiting: bool,
    closed: bool,
    delivered: u64,
    released: u64,
}

/// Meeting point between the image listener and the consumer.
#[derive(Default)]
pub(crate) struct FrameSlot {
    state: Mutex<SlotState>,
}

impl FrameSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Offer a frame; it is either handed over or dropped.
    fn offer(&self, frame: PreviewFrame) {
        let mut state = self.lock();
        if state.closed {
            state.released += 1;
            return;
        }
        if state.frame.is_some() {
            // Consumer has not picked up the previous frame yet; keep the newest.
            state.frame = Some(frame);
            state.released += 1;
            return;
        }
        if state.waiting {
            state.waiting = false;
            state.frame = Some(frame);
            state.delivered += 1;
            if let Some(waker) = state.waker.take() {
                waker.wake();
            }
        } else {
            state.released += 1;
        }
    }

    /// End the stream. Any undelivered frame is released.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.frame = None;
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }
}

/// Listener that releases every analysis image unread.
pub(crate) fn drain_listener() -> ImageAvailableListener {
    Arc::new(|reader: &Arc<ImageReader>| {
        if let Some(image) = reader.acquire_latest_image() {
            image.release();
        }
    })
}

fn dispatch_listener(slot: Weak<FrameSlot>, rotation_degrees: u32) -> ImageAvailableListener {
    Arc::new(move |reader: &Arc<ImageReader>| {
        let Some(slot) = slot.upgrade() else {
            drop(reader.acquire_latest_image());
            return;
        };
        if reader.is_closed() {
            slot.close();
            return;
        }
        if let Some(image) = reader.acquire_latest_image() {
            let timestamp_nanos = image.timestamp_nanos();
            slot.offer(PreviewFrame {
                image,
                timestamp_nanos,
                rotation_degrees,
            });
        }
    })
}

/// Stream of analysis frames from the session's preview.
///
/// Ends when the preview is torn down or another stream is attached. Dropping
/// the stream does not leave the analysis pool without a listener: the idle
/// drain is reinstalled so unread frames keep returning to the pool.
pub struct FrameStream {
    slot: Arc<FrameSlot>,
    shared: Weak<Shared>,
}

impl FrameStream {
    fn closed() -> Self {
        let slot = Arc::new(FrameSlot::default());
        slot.close();
        Self {
            slot,
            shared: Weak::new(),
        }
    }

    /// Frames handed to this consumer so far.
    pub fn delivered(&self) -> u64 {
        self.slot.lock().delivered
    }

    /// Frames released without reaching this consumer.
    pub fn released(&self) -> u64 {
        self.slot.lock().released
    }
}

impl Stream for FrameStream {
    type Item = PreviewFrame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut state = self.slot.lock();
        if let Some(frame) = state.frame.take() {
            return Poll::Ready(Some(frame));
        }
        if state.closed {
            return Poll::Ready(None);
        }
        state.waiting = true;
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.slot.close();
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut inner = shared.lock();
        let attached = inner
            .frame_slot
            .as_ref()
            .map_or(false, |slot| Arc::ptr_eq(slot, &self.slot));
        if !attached {
            return;
        }
        inner.frame_slot = None;
        if let Some(reader) = inner.analysis_reader.clone() {
            reader.set_listener(Some(drain_listener()), inner.handler());
            log::debug!("Frame consumer detached, draining analysis pool");
        }
    }
}

impl std::fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.slot.lock();
        f.debug_struct("FrameStream")
            .field("closed", &state.closed)
            .field("delivered", &state.delivered)
            .field("released", &state.released)
            .finish()
    }
}

impl CameraSession {
    /// Attach the analysis consumer.
    ///
    /// Only one stream is live at a time; attaching ends the previous one.
    /// Without a running preview the returned stream is already finished.
    pub fn preview_frames(&self) -> FrameStream {
        let mut inner = self.shared.lock();
        if let Some(previous) = inner.frame_slot.take() {
            previous.close();
        }
        let Some(reader) = inner.analysis_reader.clone().filter(|r| !r.is_closed()) else {
            return FrameStream::closed();
        };
        let rotation = inner
            .descriptor
            .as_ref()
            .map_or(0, |d| d.sensor_orientation);

        let slot = Arc::new(FrameSlot::default());
        reader.set_listener(
            Some(dispatch_listener(Arc::downgrade(&slot), rotation)),
            inner.handler(),
        );
        inner.frame_slot = Some(Arc::clone(&slot));
        log::debug!("Frame consumer attached to reader {}", reader.id());
        FrameStream {
            slot,
            shared: Arc::downgrade(&self.shared),
        }
    }
}
