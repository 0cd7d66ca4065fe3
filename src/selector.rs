//! Stream format selection
//!
//! Pure functions that pick a preview size and an auto-exposure frame-rate
//! range from a device's advertised capabilities. Nothing here touches
//! hardware or holds state.

use crate::types::{DeviceDescriptor, FpsRange, Size, StreamFormat};

/// Relative aspect-ratio difference accepted as a match.
pub const ASPECT_RATIO_TOLERANCE: f32 = 0.05;

/// Range used when the device advertises nothing reaching the target.
pub const DEFAULT_FPS_RANGE: FpsRange = FpsRange::fixed(30);

/// Pick the preview size that best matches the requested surface.
///
/// Candidates are the device's render-surface sizes. Requested dimensions are
/// swapped first when the sensor is mounted at 90 or 270 degrees. Sizes larger
/// than `max_width x max_height` are skipped; among the rest, sizes within
/// [`ASPECT_RATIO_TOLERANCE`] of the requested ratio win by pixel count, and
/// otherwise the closest ratio wins. The result always comes from the
/// advertised list; only an empty list yields the requested size unchanged.
pub fn select_preview_size(
    descriptor: &DeviceDescriptor,
    requested_width: u32,
    requested_height: u32,
    max_width: u32,
    max_height: u32,
) -> Size {
    let requested = Size::new(requested_width, requested_height);
    let supported = descriptor.sizes_for(StreamFormat::Private);
    if supported.is_empty() {
        return requested;
    }

    let oriented = if descriptor.swaps_dimensions() {
        requested.swapped()
    } else {
        requested
    };
    let target_ratio = oriented.aspect_ratio();

    let bounded: Vec<Size> = supported
        .iter()
        .copied()
        .filter(|size| size.fits_within(max_width, max_height))
        .collect();

    let best_match = bounded
        .iter()
        .copied()
        .filter(|size| ratio_matches(size.aspect_ratio(), target_ratio))
        .fold(None, |best: Option<Size>, size| match best {
            Some(current) if current.area() >= size.area() => Some(current),
            _ => Some(size),
        });

    if let Some(size) = best_match {
        return size;
    }

    let pool: &[Size] = if bounded.is_empty() {
        supported
    } else {
        &bounded
    };
    closest_ratio(pool, target_ratio).unwrap_or(requested)
}

/// Pick the auto-exposure frame-rate range for `target_fps`.
///
/// An exact `[target, target]` range wins. Otherwise a covering range with the
/// smallest lower bound is used, then the narrowest range whose upper bound
/// still reaches the target, and finally [`DEFAULT_FPS_RANGE`].
pub fn select_frame_rate_range(descriptor: &DeviceDescriptor, target_fps: i32) -> FpsRange {
    let ranges = &descriptor.fps_ranges;

    if let Some(exact) = ranges
        .iter()
        .find(|r| r.lower == target_fps && r.upper == target_fps)
    {
        return *exact;
    }

    let covering = ranges
        .iter()
        .filter(|r| r.contains(target_fps))
        .min_by_key(|r| (r.lower, r.upper));
    if let Some(range) = covering {
        return *range;
    }

    ranges
        .iter()
        .filter(|r| r.upper >= target_fps)
        .min_by_key(|r| (r.width(), r.lower))
        .copied()
        .unwrap_or(DEFAULT_FPS_RANGE)
}

/// Render-surface sizes the device advertises.
pub fn supported_preview_sizes(descriptor: &DeviceDescriptor) -> &[Size] {
    descriptor.sizes_for(StreamFormat::Private)
}

/// Size of the largest box with the preview's aspect ratio that fits the view.
///
/// The preview is rotated into display orientation first when the sensor is
/// mounted sideways.
pub fn fit_surface_size(
    preview: Size,
    view_width: u32,
    view_height: u32,
    sensor_orientation: u32,
) -> Size {
    let oriented = if sensor_orientation == 90 || sensor_orientation == 270 {
        preview.swapped()
    } else {
        preview
    };

    if oriented.width == 0 || oriented.height == 0 || view_width == 0 || view_height == 0 {
        return Size::new(view_width, view_height);
    }

    let (pw, ph) = (oriented.width as u64, oriented.height as u64);
    let (vw, vh) = (view_width as u64, view_height as u64);
    // Compare vw/vh against pw/ph without floating point.
    if vw * ph > pw * vh {
        Size::new((vh * pw / ph) as u32, view_height)
    } else {
        Size::new(view_width, (vw * ph / pw) as u32)
    }
}

/// Size closest to 16:9 within the bounds, if any fits.
pub fn closest_16_by_9(sizes: &[Size], max_width: u32, max_height: u32) -> Option<Size> {
    let bounded: Vec<Size> = sizes
        .iter()
        .copied()
        .filter(|size| size.fits_within(max_width, max_height))
        .collect();
    closest_ratio(&bounded, 16.0 / 9.0)
}

fn ratio_matches(ratio: f32, target: f32) -> bool {
    if target <= 0.0 {
        return false;
    }
    ((ratio - target) / target).abs() <= ASPECT_RATIO_TOLERANCE
}

fn closest_ratio(sizes: &[Size], target: f32) -> Option<Size> {
    sizes.iter().copied().fold(None, |best: Option<Size>, size| {
        let Some(current) = best else {
            return Some(size);
        };
        let current_diff = (current.aspect_ratio() - target).abs();
        let diff = (size.aspect_ratio() - target).abs();
        if diff < current_diff || (diff == current_diff && size.area() > current.area()) {
            Some(size)
        } else {
            Some(current)
        }
    })
}
