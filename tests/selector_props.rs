//! Property tests for stream negotiation and zoom mapping.

use proptest::prelude::*;
use tryangle_camera::request::{clamp_zoom, crop_for_zoom};
use tryangle_camera::selector::{
    fit_surface_size, select_frame_rate_range, select_preview_size, DEFAULT_FPS_RANGE,
};
use tryangle_camera::types::{Rect, StreamFormat};
use tryangle_camera::{DeviceDescriptor, FpsRange, LensFacing, Size};

fn size_strategy() -> impl Strategy<Value = Size> {
    (16u32..4096, 16u32..4096).prop_map(|(w, h)| Size::new(w, h))
}

fn range_strategy() -> impl Strategy<Value = FpsRange> {
    (1i32..120, 0i32..60).prop_map(|(lower, span)| FpsRange::new(lower, lower + span))
}

fn orientation_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![Just(0u32), Just(90), Just(180), Just(270)]
}

proptest! {
    #[test]
    fn preview_size_comes_from_advertised_list(
        sizes in prop::collection::vec(size_strategy(), 1..12),
        requested in size_strategy(),
        max in size_strategy(),
        orientation in orientation_strategy(),
    ) {
        let descriptor = DeviceDescriptor::new("0", LensFacing::Back)
            .with_sensor_orientation(orientation)
            .with_output_sizes(StreamFormat::Private, sizes.clone());
        let chosen = select_preview_size(
            &descriptor,
            requested.width,
            requested.height,
            max.width,
            max.height,
        );
        prop_assert!(sizes.contains(&chosen));

        if sizes.iter().any(|s| s.fits_within(max.width, max.height)) {
            prop_assert!(chosen.fits_within(max.width, max.height));
        }
    }

    #[test]
    fn empty_size_list_returns_request(requested in size_strategy()) {
        let descriptor = DeviceDescriptor::new("0", LensFacing::Front);
        let chosen = select_preview_size(&descriptor, requested.width, requested.height, 1920, 1080);
        prop_assert_eq!(chosen, requested);
    }

    #[test]
    fn frame_rate_range_covers_target_when_possible(
        ranges in prop::collection::vec(range_strategy(), 0..8),
        target in 1i32..120,
    ) {
        let descriptor = DeviceDescriptor::new("0", LensFacing::Back)
            .with_fps_ranges(ranges.clone());
        let chosen = select_frame_rate_range(&descriptor, target);

        if ranges.iter().any(|r| r.contains(target)) {
            prop_assert!(chosen.contains(target));
            prop_assert!(ranges.contains(&chosen));
        } else if ranges.iter().any(|r| r.upper >= target) {
            prop_assert!(chosen.upper >= target);
        } else {
            prop_assert_eq!(chosen, DEFAULT_FPS_RANGE);
        }
    }

    #[test]
    fn exact_frame_rate_range_wins(
        mut ranges in prop::collection::vec(range_strategy(), 0..8),
        target in 1i32..120,
        position in 0usize..8,
    ) {
        let index = position.min(ranges.len());
        ranges.insert(index, FpsRange::fixed(target));
        let descriptor = DeviceDescriptor::new("0", LensFacing::Back).with_fps_ranges(ranges);
        prop_assert_eq!(select_frame_rate_range(&descriptor, target), FpsRange::fixed(target));
    }

    #[test]
    fn zoom_stays_within_device_range(ratio in proptest::num::f32::ANY, max in 1.0f32..20.0) {
        let clamped = clamp_zoom(ratio, max);
        prop_assert!(clamped >= 1.0);
        prop_assert!(clamped <= max);
    }

    #[test]
    fn zoom_crop_is_centered_inside_active_array(
        width in 100i32..8000,
        height in 100i32..6000,
        ratio in 1.0f32..10.0,
    ) {
        let active = Rect::from_size(width, height);
        let crop = crop_for_zoom(active, ratio);
        prop_assert!(crop.left >= 0 && crop.top >= 0);
        prop_assert!(crop.right <= width && crop.bottom <= height);
        prop_assert!((crop.left - (width - crop.right)).abs() <= 1);
        prop_assert!((crop.top - (height - crop.bottom)).abs() <= 1);
    }

    #[test]
    fn fitted_surface_fits_view(
        preview in size_strategy(),
        view in size_strategy(),
        orientation in orientation_strategy(),
    ) {
        let fitted = fit_surface_size(preview, view.width, view.height, orientation);
        prop_assert!(fitted.width <= view.width);
        prop_assert!(fitted.height <= view.height);
        prop_assert!(fitted.width == view.width || fitted.height == view.height);
    }
}
