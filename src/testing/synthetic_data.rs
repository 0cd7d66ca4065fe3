//! Synthetic sensor output and device profiles
//!
//! Frames and capability sets shaped like a typical phone camera module,
//! enabling reliable offline testing without requiring hardware.

use crate::image_reader::Image;
use crate::types::{DeviceDescriptor, FpsRange, LensFacing, Rect, Size, StreamFormat};
use bytes::{BufMut, Bytes, BytesMut};

/// Nanoseconds between frames at 30 fps.
pub const FRAME_INTERVAL_NANOS: i64 = 33_333_333;

/// Create a synthetic YUV 4:2:0 frame
///
/// The luma plane is a vertical gradient offset by the frame number so
/// consecutive frames differ; chroma is neutral grey.
pub fn synthetic_yuv_frame(frame_number: u64, width: u32, height: u32) -> Image {
    let (w, h) = (width as usize, height as usize);
    let luma_len = w * h;
    let chroma_len = (w / 2) * (h / 2);
    let mut data = vec![128u8; luma_len + 2 * chroma_len];

    let base = (frame_number % 256) as u8;
    for (row, line) in data[..luma_len].chunks_mut(w.max(1)).enumerate() {
        line.fill(base.wrapping_add((row % 256) as u8));
    }

    Image {
        data: Bytes::from(data),
        width,
        height,
        format: StreamFormat::Yuv420,
        timestamp_nanos: frame_number as i64 * FRAME_INTERVAL_NANOS,
    }
}

/// Create a synthetic JPEG-framed still
///
/// Starts with SOI and a JFIF APP0 segment and ends with EOI; the body
/// encodes the dimensions and frame number. Not decodable as an image.
pub fn synthetic_jpeg(frame_number: u64, width: u32, height: u32) -> Image {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_slice(&[0xFF, 0xD8]);
    buf.put_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    buf.put_slice(b"JFIF\0");
    buf.put_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    buf.put_u32(width);
    buf.put_u32(height);
    buf.put_u64(frame_number);
    buf.put_slice(&[0xFF, 0xD9]);

    Image {
        data: buf.freeze(),
        width,
        height,
        format: StreamFormat::Jpeg,
        timestamp_nanos: frame_number as i64 * FRAME_INTERVAL_NANOS,
    }
}

/// Whether `data` has JPEG start and end markers.
pub fn looks_like_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[..2] == [0xFF, 0xD8] && data[data.len() - 2..] == [0xFF, 0xD9]
}

fn common_sizes() -> Vec<Size> {
    vec![
        Size::new(3840, 2160),
        Size::new(1920, 1080),
        Size::new(1440, 1080),
        Size::new(1280, 720),
        Size::new(640, 480),
    ]
}

/// Rear module: sideways sensor, 8x zoom, flash, 30/60 fps
pub fn back_camera_descriptor(id: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(id, LensFacing::Back)
        .with_sensor_orientation(90)
        .with_max_zoom(8.0)
        .with_flash(true)
        .with_fps_ranges(vec![
            FpsRange::new(15, 30),
            FpsRange::new(30, 30),
            FpsRange::new(24, 60),
            FpsRange::new(60, 60),
        ])
        .with_output_sizes(StreamFormat::Private, common_sizes())
        .with_output_sizes(StreamFormat::Yuv420, common_sizes())
        .with_output_sizes(StreamFormat::Jpeg, vec![Size::new(4000, 3000), Size::new(1920, 1080)])
        .with_active_array(Rect::from_size(4000, 3000))
        .with_exposure_compensation_range(-12, 12)
}

/// Selfie module: no flash, 4x zoom, 30 fps only
pub fn front_camera_descriptor(id: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(id, LensFacing::Front)
        .with_sensor_orientation(270)
        .with_max_zoom(4.0)
        .with_fps_ranges(vec![FpsRange::new(15, 30), FpsRange::new(30, 30)])
        .with_output_sizes(StreamFormat::Private, common_sizes())
        .with_output_sizes(StreamFormat::Yuv420, common_sizes())
        .with_output_sizes(StreamFormat::Jpeg, vec![Size::new(1920, 1080)])
        .with_active_array(Rect::from_size(3264, 2448))
        .with_exposure_compensation_range(-6, 6)
}
