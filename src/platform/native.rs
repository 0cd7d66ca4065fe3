//! Desktop webcams through nokhwa.
//!
//! Webcams expose no zoom, flash or exposure controls, so repeating requests
//! only start and stop the stream. Analysis frames are converted to YUV 4:2:0
//! and stills are JPEG-encoded from the most recent frame.

use crate::errors::{CameraError, Result};
use crate::executor::Handler;
use crate::image_reader::{Image, ImageReader};
use crate::platform::{
    CameraDevice, CameraProvider, CaptureCallback, CaptureOutcome, CaptureSession,
    DeviceStateCallback, DeviceStateEvent, SessionStateCallback, SessionStateEvent, Surface,
};
use crate::request::CaptureRequest;
use crate::types::{DeviceDescriptor, FpsRange, LensFacing, Rect, Size, StreamFormat};
use bytes::Bytes;
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, CameraInfo, RequestedFormat, RequestedFormatType},
    CallbackCamera,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

const JPEG_QUALITY: u8 = 90;

fn common_sizes() -> Vec<Size> {
    vec![
        Size::new(1920, 1080),
        Size::new(1280, 720),
        Size::new(640, 480),
    ]
}

/// Guess the facing from the name the OS reports.
pub fn facing_from_name(name: &str) -> LensFacing {
    let name = name.to_lowercase();
    if name.contains("back") || name.contains("rear") {
        LensFacing::Back
    } else if ["front", "user", "facetime", "integrated"]
        .iter()
        .any(|hint| name.contains(hint))
    {
        LensFacing::Front
    } else {
        LensFacing::External
    }
}

/// Provider for the cameras nokhwa can enumerate on this machine.
#[derive(Debug, Default)]
pub struct NativeProvider {
    facing_overrides: HashMap<String, LensFacing>,
}

impl NativeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the facing reported for device `id`.
    pub fn with_facing(mut self, id: impl Into<String>, facing: LensFacing) -> Self {
        self.facing_overrides.insert(id.into(), facing);
        self
    }

    fn cameras(&self) -> Result<Vec<CameraInfo>> {
        query(ApiBackend::Auto)
            .map_err(|e| CameraError::Backend(format!("Failed to query cameras: {}", e)))
    }

    fn describe(&self, info: &CameraInfo) -> DeviceDescriptor {
        let id = info.index().to_string();
        let facing = self
            .facing_overrides
            .get(&id)
            .copied()
            .unwrap_or_else(|| facing_from_name(&info.human_name()));
        DeviceDescriptor::new(id, facing)
            .with_fps_ranges(vec![FpsRange::fixed(15), FpsRange::fixed(30)])
            .with_output_sizes(StreamFormat::Private, common_sizes())
            .with_output_sizes(StreamFormat::Yuv420, common_sizes())
            .with_output_sizes(StreamFormat::Jpeg, common_sizes())
            .with_active_array(Rect::from_size(1920, 1080))
    }
}

impl CameraProvider for NativeProvider {
    fn name(&self) -> &str {
        "native"
    }

    fn device_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .cameras()?
            .iter()
            .map(|info| info.index().to_string())
            .collect())
    }

    fn descriptor(&self, id: &str) -> Result<DeviceDescriptor> {
        self.cameras()?
            .iter()
            .find(|info| info.index().to_string() == id)
            .map(|info| self.describe(info))
            .ok_or_else(|| CameraError::Backend(format!("Camera {} not found", id)))
    }

    fn open_device(
        &self,
        id: &str,
        handler: Handler,
        callback: DeviceStateCallback,
    ) -> Result<()> {
        let index = id
            .parse::<u32>()
            .map_err(|_| CameraError::DeviceOpenFailed(format!("Invalid device ID {}", id)))?;

        let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
        let camera = CallbackCamera::new(CameraIndex::Index(index), requested_format, |_| {})
            .map_err(|e| {
                CameraError::DeviceOpenFailed(format!("Failed to initialize camera: {}", e))
            })?;

        log::info!("Opened native camera {}", id);
        let device = NativeDevice {
            id: id.to_string(),
            camera: Arc::new(Mutex::new(camera)),
            latest: Arc::new(Mutex::new(None)),
            closed: false,
        };
        handler.post_or_run(move || callback(DeviceStateEvent::Opened(Box::new(device))));
        Ok(())
    }
}

struct RgbFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    timestamp_nanos: i64,
}

type LatestFrame = Arc<Mutex<Option<RgbFrame>>>;

fn lock_latest(latest: &LatestFrame) -> MutexGuard<'_, Option<RgbFrame>> {
    latest.lock().unwrap_or_else(|e| e.into_inner())
}

struct NativeDevice {
    id: String,
    camera: Arc<Mutex<CallbackCamera>>,
    latest: LatestFrame,
    closed: bool,
}

impl NativeDevice {
    fn lock_camera(&self) -> Result<MutexGuard<'_, CallbackCamera>> {
        self.camera
            .lock()
            .map_err(|_| CameraError::Backend("Failed to lock camera".to_string()))
    }
}

impl CameraDevice for NativeDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        outputs: Vec<Surface>,
        handler: Handler,
        callback: SessionStateCallback,
    ) -> Result<()> {
        let readers: Vec<Arc<ImageReader>> =
            outputs.iter().filter_map(|s| s.as_reader().cloned()).collect();
        let analysis = readers
            .iter()
            .find(|r| r.format() == StreamFormat::Yuv420)
            .cloned();
        let still = readers
            .iter()
            .find(|r| r.format() == StreamFormat::Jpeg)
            .cloned();

        let latest = Arc::clone(&self.latest);
        let started = Instant::now();
        let frame_callback = move |buffer: nokhwa::Buffer| {
            let decoded = match buffer.decode_image::<RgbFormat>() {
                Ok(decoded) => decoded,
                Err(e) => {
                    log::debug!("Dropping undecodable frame: {}", e);
                    return;
                }
            };
            let (width, height) = (decoded.width(), decoded.height());
            let rgb = decoded.into_raw();
            let timestamp_nanos = started.elapsed().as_nanos() as i64;

            if let Some(reader) = analysis.as_ref() {
                reader.queue_image(Image {
                    data: Bytes::from(rgb_to_yuv420(&rgb, width, height)),
                    width,
                    height,
                    format: StreamFormat::Yuv420,
                    timestamp_nanos,
                });
            }
            *lock_latest(&latest) = Some(RgbFrame {
                data: rgb,
                width,
                height,
                timestamp_nanos,
            });
        };

        let event = match self.lock_camera()?.set_callback(frame_callback) {
            Ok(()) => SessionStateEvent::Configured(Box::new(NativeSession {
                camera: Arc::clone(&self.camera),
                latest: Arc::clone(&self.latest),
                still,
                handler: handler.clone(),
                streaming: false,
            })),
            Err(e) => SessionStateEvent::ConfigureFailed(CameraError::SessionConfigurationFailed(
                format!("Failed to set callback: {}", e),
            )),
        };
        handler.post_or_run(move || callback(event));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut camera = self.lock_camera()?;
        if camera.is_stream_open() {
            camera
                .stop_stream()
                .map_err(|e| CameraError::Backend(format!("Failed to stop stream: {}", e)))?;
        }
        log::info!("Closed native camera {}", self.id);
        Ok(())
    }
}

struct NativeSession {
    camera: Arc<Mutex<CallbackCamera>>,
    latest: LatestFrame,
    still: Option<Arc<ImageReader>>,
    handler: Handler,
    streaming: bool,
}

impl NativeSession {
    fn lock_camera(&self) -> Result<MutexGuard<'_, CallbackCamera>> {
        self.camera
            .lock()
            .map_err(|_| CameraError::Backend("Failed to lock camera".to_string()))
    }
}

impl CaptureSession for NativeSession {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<()> {
        if !self.streaming {
            self.lock_camera()?
                .open_stream()
                .map_err(|e| CameraError::Backend(format!("Failed to start stream: {}", e)))?;
            self.streaming = true;
        }
        log::debug!(
            "Webcam ignores zoom/exposure controls (crop {:?}, ev {})",
            request.crop_region,
            request.exposure_compensation
        );
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<()> {
        if self.streaming {
            self.lock_camera()?
                .stop_stream()
                .map_err(|e| CameraError::Backend(format!("Failed to stop stream: {}", e)))?;
            self.streaming = false;
        }
        Ok(())
    }

    fn capture(&mut self, _request: &CaptureRequest, callback: CaptureCallback) -> Result<()> {
        let still = self
            .still
            .clone()
            .ok_or_else(|| CameraError::CaptureFailed("No still output".to_string()))?;
        let frame = lock_latest(&self.latest).take().ok_or_else(|| {
            CameraError::CaptureFailed("No frame received from camera yet".to_string())
        })?;

        let outcome = match encode_jpeg(&frame) {
            Ok(data) => {
                let queued = still.queue_image(Image {
                    data: Bytes::from(data),
                    width: frame.width,
                    height: frame.height,
                    format: StreamFormat::Jpeg,
                    timestamp_nanos: frame.timestamp_nanos,
                });
                if queued {
                    CaptureOutcome::Completed {
                        timestamp_nanos: frame.timestamp_nanos,
                    }
                } else {
                    CaptureOutcome::Failed(CameraError::CaptureFailed(
                        "Still pool full".to_string(),
                    ))
                }
            }
            Err(e) => CaptureOutcome::Failed(e),
        };
        self.handler.post_or_run(move || callback(outcome));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stop_repeating()
    }
}

fn encode_jpeg(frame: &RgbFrame) -> Result<Vec<u8>> {
    let img = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| CameraError::CaptureFailed("Frame size mismatch".to_string()))?;
    let dynamic_img = image::DynamicImage::ImageRgb8(img);

    let mut buf = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    dynamic_img
        .write_with_encoder(encoder)
        .map_err(|e| CameraError::CaptureFailed(format!("JPEG encoding failed: {}", e)))?;
    Ok(buf)
}

/// Packed RGB24 to planar I420 (BT.601, studio range).
pub fn rgb_to_yuv420(rgb: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let mut out = vec![0u8; w * h + 2 * cw * ch];
    let (y_plane, chroma) = out.split_at_mut(w * h);
    let (u_plane, v_plane) = chroma.split_at_mut(cw * ch);

    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) * 3;
            let Some(px) = rgb.get(i..i + 3) else {
                continue;
            };
            let (r, g, b) = (px[0] as i32, px[1] as i32, px[2] as i32);
            y_plane[y * w + x] = (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8;
            if x % 2 == 0 && y % 2 == 0 {
                let c = (y / 2) * cw + x / 2;
                u_plane[c] = (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
                v_plane[c] = (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
            }
        }
    }
    out
}
