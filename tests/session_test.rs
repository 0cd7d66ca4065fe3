//! Session lifecycle, controls and capture against the simulated camera stack.

use futures::poll;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tryangle_camera::request::{AeMode, AfMode, FlashState, RequestTemplate};
use tryangle_camera::testing::synthetic_data::FRAME_INTERVAL_NANOS;
use tryangle_camera::testing::{
    back_camera_descriptor, looks_like_jpeg, CaptureBehavior, HardwareEvent, OpenBehavior,
    SessionBehavior, SimulatedProvider,
};
use tryangle_camera::types::Rect;
use tryangle_camera::{
    CameraError, CameraSession, FlashMode, FpsRange, LensFacing, RenderTarget, SessionState,
    Size, StreamConfig,
};

fn phone_session() -> (SimulatedProvider, CameraSession) {
    let provider = SimulatedProvider::phone();
    let session = CameraSession::new(Arc::new(provider.clone()));
    (provider, session)
}

fn portrait_target() -> RenderTarget {
    RenderTarget::new(1080, 1920)
}

async fn streaming_back_camera() -> (SimulatedProvider, CameraSession) {
    let (provider, session) = phone_session();
    session.open(StreamConfig::BACK_CAMERA).await.unwrap();
    session.start_preview(portrait_target()).await.unwrap();
    (provider, session)
}

/// Wait until every job already queued on the camera executor has run.
async fn flush(provider: &SimulatedProvider) {
    let handler = provider.last_handler().expect("camera was opened");
    handler.run(|| ()).await.unwrap();
}

/// Park the camera executor until the returned sender fires or drops.
fn block_executor(provider: &SimulatedProvider) -> mpsc::Sender<()> {
    let (resume, parked) = mpsc::channel::<()>();
    let handler = provider.last_handler().expect("camera was opened");
    assert!(handler.post(move || {
        let _ = parked.recv();
    }));
    resume
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_open_preview_close_lifecycle() {
    let (_provider, session) = phone_session();
    let states = session.subscribe();
    assert_eq!(session.state(), SessionState::Idle);

    session.open(StreamConfig::BACK_CAMERA).await.unwrap();
    assert_eq!(session.state(), SessionState::Opened);
    assert_eq!(session.max_zoom(), 8.0);
    assert_eq!(session.sensor_orientation(), 90);
    assert!(session.has_flash());

    session.start_preview(portrait_target()).await.unwrap();
    assert_eq!(*states.borrow(), SessionState::Streaming);
    assert_eq!(session.preview_size(), Some(Size::new(1920, 1080)));

    let request = session.repeating_request().unwrap();
    assert_eq!(request.template, RequestTemplate::Preview);
    assert_eq!(request.fps_range, FpsRange::new(60, 60));
    assert_eq!(request.af_mode, AfMode::ContinuousPicture);
    assert_eq!(request.targets.len(), 2);

    session.close_camera().await;
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.device_descriptor().is_none());
    assert!(session.repeating_request().is_none());
    assert!(session.control_state().is_none());
}

#[tokio::test]
async fn test_start_preview_requires_open_camera() {
    let (_provider, session) = phone_session();
    let result = session.start_preview(portrait_target()).await;
    assert!(matches!(result, Err(CameraError::InvalidState(_))));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_fit_preview_to_view_letterboxes() {
    let (_provider, session) = streaming_back_camera().await;
    // 1920x1080 sensor output shown upright is 1080x1920.
    assert_eq!(
        session.fit_preview_to_view(1080, 1080),
        Some(Size::new(607, 1080))
    );
    assert_eq!(
        session.optimal_preview_size(1080, 1920),
        Some(Size::new(1920, 1080))
    );
    assert_eq!(session.supported_preview_sizes().len(), 5);
}

#[tokio::test]
async fn test_zoom_is_clamped_to_device_range() {
    let (_provider, session) = phone_session();
    session.set_zoom(4.0);
    assert_eq!(session.zoom_ratio(), 1.0, "zoom ignored without a camera");

    session.open(StreamConfig::BACK_CAMERA).await.unwrap();
    let zoom = session.subscribe_zoom();

    session.set_zoom(100.0);
    assert_eq!(session.zoom_ratio(), 8.0);
    assert_eq!(*zoom.borrow(), 8.0);

    session.set_zoom(0.1);
    assert_eq!(session.zoom_ratio(), 1.0);

    session.set_zoom(f32::NAN);
    assert_eq!(session.zoom_ratio(), 1.0);

    session.close_camera().await;
    assert_eq!(*zoom.borrow(), 1.0);
}

#[tokio::test]
async fn test_zoom_set_before_preview_is_applied_at_start() {
    let (_provider, session) = phone_session();
    session.open(StreamConfig::BACK_CAMERA).await.unwrap();
    session.set_zoom(2.0);
    session.start_preview(portrait_target()).await.unwrap();

    let request = session.repeating_request().unwrap();
    assert_eq!(request.crop_region, Rect::new(1000, 750, 3000, 2250));
}

#[tokio::test]
async fn test_session_configuration_failure_enters_error() {
    let (provider, session) = phone_session();
    provider.set_session_behavior(SessionBehavior::Fail(
        CameraError::SessionConfigurationFailed("outputs rejected".into()),
    ));
    session.open(StreamConfig::BACK_CAMERA).await.unwrap();

    let result = session.start_preview(portrait_target()).await;
    assert!(matches!(
        result,
        Err(CameraError::SessionConfigurationFailed(_))
    ));
    assert!(session.state().is_error());
    assert_eq!(provider.open_readers(), 0);
    assert!(session.capture_image().await.is_none());

    session.close_camera().await;
    assert_eq!(session.state(), SessionState::Idle);

    provider.set_session_behavior(SessionBehavior::Configure);
    session.open(StreamConfig::BACK_CAMERA).await.unwrap();
    session.start_preview(portrait_target()).await.unwrap();
    assert_eq!(session.state(), SessionState::Streaming);
}

#[tokio::test]
async fn test_refused_session_enters_error() {
    let (provider, session) = phone_session();
    provider.set_session_behavior(SessionBehavior::Refuse(CameraError::Backend(
        "no surfaces".into(),
    )));
    session.open(StreamConfig::BACK_CAMERA).await.unwrap();
    assert!(session.start_preview(portrait_target()).await.is_err());
    assert!(session.state().is_error());
}

#[tokio::test]
async fn test_open_from_error_state_reopens() {
    let (provider, session) = phone_session();
    provider.set_open_behavior(OpenBehavior::Disconnect);
    let result = session.open(StreamConfig::BACK_CAMERA).await;
    assert!(matches!(result, Err(CameraError::DeviceOpenFailed(_))));
    assert!(session.state().is_error());

    provider.set_open_behavior(OpenBehavior::Succeed);
    session.open(StreamConfig::BACK_CAMERA).await.unwrap();
    assert_eq!(session.state(), SessionState::Opened);
}

#[tokio::test]
async fn test_disabled_camera_maps_to_permission_denied() {
    let (provider, session) = phone_session();
    provider.set_open_behavior(OpenBehavior::Error(3));
    let result = session.open(StreamConfig::BACK_CAMERA).await;
    assert!(matches!(result, Err(CameraError::PermissionDenied(_))));

    let events = provider.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, HardwareEvent::DeviceClosed { id, .. } if id == "0")));

    provider.set_open_behavior(OpenBehavior::Error(4));
    let result = session.open(StreamConfig::BACK_CAMERA).await;
    assert!(matches!(result, Err(CameraError::DeviceOpenFailed(_))));
}

#[tokio::test]
async fn test_missing_facing_is_device_not_found() {
    let provider = SimulatedProvider::with_devices(vec![back_camera_descriptor("0")]);
    let session = CameraSession::new(Arc::new(provider.clone()));

    let result = session.open(StreamConfig::FRONT_CAMERA).await;
    assert_eq!(result, Err(CameraError::DeviceNotFound(LensFacing::Front)));
    match session.state() {
        SessionState::Error { cause, .. } => {
            assert_eq!(cause, Some(CameraError::DeviceNotFound(LensFacing::Front)))
        }
        other => panic!("expected error state, got {}", other),
    }
    assert!(provider.events().is_empty());

    session.close_camera().await;
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_double_open_keeps_current_camera() {
    let (provider, session) = phone_session();
    session.open(StreamConfig::BACK_CAMERA).await.unwrap();
    session.set_zoom(3.0);
    let controls = session.control_state();

    session.open(StreamConfig::FRONT_CAMERA).await.unwrap();
    assert_eq!(session.state(), SessionState::Opened);
    assert_eq!(
        session.device_descriptor().map(|d| d.facing),
        Some(LensFacing::Back)
    );
    assert_eq!(session.zoom_ratio(), 3.0);
    assert_eq!(session.control_state(), controls);

    let opened = provider
        .events()
        .iter()
        .filter(|e| matches!(e, HardwareEvent::DeviceOpened { .. }))
        .count();
    assert_eq!(opened, 1);
}

#[tokio::test]
async fn test_open_while_streaming_keeps_session() {
    let (provider, session) = streaming_back_camera().await;
    session.set_zoom(2.0);
    session.set_flash_mode(FlashMode::On);
    session.set_frame_rate(30);
    flush(&provider).await;
    let controls = session.control_state();
    let submitted = provider.repeating_requests().len();

    session.open(StreamConfig::FRONT_CAMERA).await.unwrap();
    flush(&provider).await;

    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(session.control_state(), controls);
    assert_eq!(session.zoom_ratio(), 2.0);
    assert_eq!(session.flash_mode(), FlashMode::On);
    assert_eq!(session.preview_size(), Some(Size::new(1920, 1080)));
    assert_eq!(
        session.device_descriptor().map(|d| d.facing),
        Some(LensFacing::Back)
    );
    assert_eq!(provider.repeating_requests().len(), submitted);
    let opened = provider
        .events()
        .iter()
        .filter(|e| matches!(e, HardwareEvent::DeviceOpened { .. }))
        .count();
    assert_eq!(opened, 1);
}

#[tokio::test]
async fn test_dropped_failing_open_reports_error() {
    let (provider, session) = phone_session();
    provider.set_open_behavior(OpenBehavior::Refuse(CameraError::DeviceOpenFailed(
        "busy".into(),
    )));
    {
        let mut open = Box::pin(session.open(StreamConfig::BACK_CAMERA));
        let _ = poll!(&mut open);
    }
    assert!(session.state().is_error());

    provider.set_open_behavior(OpenBehavior::Succeed);
    session.open(StreamConfig::BACK_CAMERA).await.unwrap();
    assert_eq!(session.state(), SessionState::Opened);
}

#[tokio::test]
async fn test_abandoned_preview_start_releases_session() {
    let (provider, session) = phone_session();
    session.open(StreamConfig::BACK_CAMERA).await.unwrap();

    {
        let mut start = Box::pin(session.start_preview(portrait_target()));
        let resume = block_executor(&provider);
        assert!(poll!(&mut start).is_pending());
        drop(resume);
        // Twice: the configuration callback is queued by the first job.
        flush(&provider).await;
        flush(&provider).await;

        let _resume = block_executor(&provider);
        assert!(poll!(&mut start).is_pending());
    }
    flush(&provider).await;

    assert!(provider.repeating_requests().is_empty());
    assert!(provider
        .events()
        .iter()
        .any(|e| matches!(e, HardwareEvent::SessionClosed { .. })));
    assert_eq!(provider.open_readers(), 0);
    assert!(session.preview_size().is_none());
    assert!(session.state().is_error());

    session.open(StreamConfig::BACK_CAMERA).await.unwrap();
    session.start_preview(portrait_target()).await.unwrap();
    assert_eq!(session.state(), SessionState::Streaming);
}

#[tokio::test]
async fn test_capture_ignored_unless_streaming() {
    let provider = SimulatedProvider::phone();
    let session = Arc::new(CameraSession::new(Arc::new(provider.clone())));
    assert!(session.capture_image().await.is_none());

    provider.set_open_behavior(OpenBehavior::Hang);
    let opener = Arc::clone(&session);
    let open = tokio::spawn(async move { opener.open(StreamConfig::BACK_CAMERA).await });
    assert!(wait_for(|| provider.has_pending_open()).await);
    assert_eq!(session.state(), SessionState::Opening);
    assert!(session.capture_image().await.is_none());

    assert!(provider.complete_pending_open());
    open.await.unwrap().unwrap();
    assert_eq!(session.state(), SessionState::Opened);
    assert!(session.capture_image().await.is_none());
    assert_eq!(session.state(), SessionState::Opened);
}

#[tokio::test]
async fn test_capture_delivers_still_and_returns_to_streaming() {
    let (provider, session) = streaming_back_camera().await;
    let states = session.subscribe();

    let image = session.capture_image().await.unwrap();
    assert!(looks_like_jpeg(&image.data));
    assert_eq!((image.width, image.height), (1920, 1080));
    assert_eq!(image.rotation_degrees, 90);
    assert_eq!(*states.borrow(), SessionState::Streaming);

    let capture = provider
        .events()
        .into_iter()
        .find_map(|e| match e {
            HardwareEvent::Capture(request) => Some(request),
            _ => None,
        })
        .unwrap();
    assert_eq!(capture.template, RequestTemplate::StillCapture);
    assert_eq!(capture.targets.len(), 1);

    // The still pool is free again for the next capture.
    assert!(session.capture_image().await.is_some());
    assert!(session.capture_image().await.is_some());
}

#[tokio::test]
async fn test_capture_failure_returns_to_streaming() {
    let (provider, session) = streaming_back_camera().await;

    provider.set_capture_behavior(CaptureBehavior::Fail(CameraError::CaptureFailed(
        "sensor timeout".into(),
    )));
    assert!(session.capture_image().await.is_none());
    assert_eq!(session.state(), SessionState::Streaming);

    provider.set_capture_behavior(CaptureBehavior::Reject(CameraError::Backend(
        "busy".into(),
    )));
    assert!(session.capture_image().await.is_none());
    assert_eq!(session.state(), SessionState::Streaming);
}

#[tokio::test]
async fn test_abandoned_capture_returns_to_streaming() {
    let (provider, session) = streaming_back_camera().await;
    provider.set_capture_behavior(CaptureBehavior::Hang);

    let result = tokio::time::timeout(Duration::from_millis(50), session.capture_image()).await;
    assert!(result.is_err());
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(provider.fail_stalled_captures(), 1);

    provider.set_capture_behavior(CaptureBehavior::Deliver);
    assert!(session.capture_image().await.is_some());
}

#[tokio::test]
async fn test_abandoned_capture_does_not_answer_next_capture() {
    let (provider, session) = streaming_back_camera().await;

    // The abandoned request still produces still #1 once the executor frees up.
    let resume = block_executor(&provider);
    let result = tokio::time::timeout(Duration::from_millis(20), session.capture_image()).await;
    assert!(result.is_err());
    assert_eq!(session.state(), SessionState::Streaming);
    drop(resume);
    flush(&provider).await;

    let first = session.capture_image().await.unwrap();
    let second = session.capture_image().await.unwrap();
    assert_eq!(first.timestamp_nanos, 2 * FRAME_INTERVAL_NANOS);
    assert_eq!(second.timestamp_nanos, 3 * FRAME_INTERVAL_NANOS);

    // Still #4 lands while the next capture is already waiting.
    let resume = block_executor(&provider);
    let result = tokio::time::timeout(Duration::from_millis(20), session.capture_image()).await;
    assert!(result.is_err());
    let waiting = tokio::spawn(async move { session.capture_image().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(resume);
    let image = waiting.await.unwrap().unwrap();
    assert_eq!(image.timestamp_nanos, 5 * FRAME_INTERVAL_NANOS);
}

#[tokio::test]
async fn test_close_releases_in_order() {
    let (provider, session) = streaming_back_camera().await;
    let handler = provider.last_handler().unwrap();
    provider.clear_events();

    session.close_camera().await;

    let closes: Vec<HardwareEvent> = provider
        .events()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                HardwareEvent::SessionClosed { .. } | HardwareEvent::DeviceClosed { .. }
            )
        })
        .collect();
    assert_eq!(
        closes,
        vec![
            HardwareEvent::SessionClosed {
                id: "0".into(),
                open_readers: 2
            },
            HardwareEvent::DeviceClosed {
                id: "0".into(),
                open_readers: 2
            },
        ]
    );
    assert_eq!(provider.open_readers(), 0);
    assert!(!handler.is_running());

    // Closing again is harmless.
    session.close_camera().await;
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_abandoned_open_releases_late_device() {
    let provider = SimulatedProvider::phone();
    let session = Arc::new(CameraSession::new(Arc::new(provider.clone())));
    provider.set_open_behavior(OpenBehavior::Hang);

    let opener = Arc::clone(&session);
    let open = tokio::spawn(async move { opener.open(StreamConfig::BACK_CAMERA).await });
    assert!(wait_for(|| provider.has_pending_open()).await);

    open.abort();
    assert!(open.await.unwrap_err().is_cancelled());
    assert_eq!(session.state(), SessionState::Idle);

    assert!(provider.complete_pending_open());
    assert!(
        wait_for(|| provider
            .events()
            .iter()
            .any(|e| matches!(e, HardwareEvent::DeviceClosed { .. })))
        .await
    );
    assert!(session.device_descriptor().is_none());
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_switch_camera_flips_facing() {
    let (provider, session) = streaming_back_camera().await;

    session.switch_camera(None).await.unwrap();
    assert_eq!(session.state(), SessionState::Streaming);
    let descriptor = session.device_descriptor().unwrap();
    assert_eq!(descriptor.facing, LensFacing::Front);
    assert_eq!(session.sensor_orientation(), 270);
    assert!(!session.has_flash());
    assert!(provider
        .events()
        .contains(&HardwareEvent::DeviceOpened { id: "1".into() }));

    session.switch_camera(Some(RenderTarget::new(720, 1280))).await.unwrap();
    assert_eq!(
        session.device_descriptor().map(|d| d.facing),
        Some(LensFacing::Back)
    );
    assert_eq!(session.preview_size(), Some(Size::new(1920, 1080)));
}

#[tokio::test]
async fn test_switch_camera_without_open_fails() {
    let (_provider, session) = phone_session();
    let result = session.switch_camera(None).await;
    assert!(matches!(result, Err(CameraError::InvalidState(_))));
}

#[tokio::test]
async fn test_control_changes_resubmit_repeating_request() {
    let (provider, session) = streaming_back_camera().await;
    provider.clear_events();

    session.set_flash_mode(FlashMode::On);
    session.set_frame_rate(30);
    session.set_exposure_compensation(100);
    session.set_focus_mode(false);
    flush(&provider).await;

    let requests = provider.repeating_requests();
    assert_eq!(requests.len(), 4);
    let last = requests.last().unwrap();
    assert_eq!(last.flash, FlashState::Torch);
    assert_eq!(last.ae_mode, AeMode::On);
    assert_eq!(last.fps_range, FpsRange::new(30, 30));
    assert_eq!(last.exposure_compensation, 12);
    assert_eq!(last.af_mode, AfMode::Off);
    assert_eq!(session.repeating_request().as_ref(), Some(last));
    assert_eq!(session.flash_mode(), FlashMode::On);

    session.set_frame_rate(45);
    flush(&provider).await;
    assert_eq!(
        provider.repeating_requests().last().unwrap().fps_range,
        FpsRange::new(24, 60)
    );
}

#[tokio::test]
async fn test_rejected_control_is_recorded() {
    let (provider, session) = streaming_back_camera().await;
    provider.reject_repeating_requests(Some(CameraError::Backend("busy".into())));

    session.set_zoom(2.0);
    flush(&provider).await;
    assert_eq!(
        session.last_control_error(),
        Some(CameraError::Backend("busy".into()))
    );
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(session.zoom_ratio(), 2.0);

    session.set_frame_rate(0);
    assert!(matches!(
        session.last_control_error(),
        Some(CameraError::Config(_))
    ));
    assert_eq!(session.control_state().unwrap().target_fps, 60);
}

#[tokio::test]
async fn test_still_flash_mapping() {
    let (provider, session) = streaming_back_camera().await;
    session.set_flash_mode(FlashMode::On);
    assert!(session.capture_image().await.is_some());

    let capture = provider
        .events()
        .into_iter()
        .rev()
        .find_map(|e| match e {
            HardwareEvent::Capture(request) => Some(request),
            _ => None,
        })
        .unwrap();
    assert_eq!(capture.flash, FlashState::Single);
    assert_eq!(capture.ae_mode, AeMode::OnAlwaysFlash);

    session.set_flash_mode(FlashMode::Auto);
    flush(&provider).await;
    let preview = provider.repeating_requests().pop().unwrap();
    assert_eq!(preview.ae_mode, AeMode::OnAutoFlash);
    assert_eq!(preview.flash, FlashState::Off);
}

#[tokio::test]
async fn test_front_camera_ignores_flash() {
    let (provider, session) = phone_session();
    session.open(StreamConfig::FRONT_CAMERA).await.unwrap();
    session.start_preview(portrait_target()).await.unwrap();

    session.set_flash_mode(FlashMode::On);
    flush(&provider).await;
    assert_eq!(session.flash_mode(), FlashMode::On);

    let preview = provider.repeating_requests().pop().unwrap();
    assert_eq!(preview.flash, FlashState::Off);
    assert_eq!(preview.ae_mode, AeMode::On);
    // Front profile tops out at 30 fps; 60 falls back to the default range.
    assert_eq!(preview.fps_range, FpsRange::new(30, 30));
}

#[tokio::test]
async fn test_drop_releases_hardware() {
    let (provider, session) = streaming_back_camera().await;
    drop(session);
    assert!(
        wait_for(|| provider
            .events()
            .iter()
            .any(|e| matches!(e, HardwareEvent::DeviceClosed { .. })))
        .await
    );
    assert_eq!(provider.open_readers(), 0);
}
