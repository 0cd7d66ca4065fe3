//! Turns a single hardware completion callback into an awaitable result.
//!
//! The hardware side holds a [`Completer`], the async side awaits the
//! [`Pending`]. Whatever the completer delivers after the waiting side has
//! gone away is released instead of leaking.

use crate::errors::{CameraError, Result};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Values that own hardware resources and must be freed if nobody takes them.
pub trait Release {
    fn release(self);
}

impl<T: Release> Release for Result<T> {
    fn release(self) {
        if let Ok(value) = self {
            value.release();
        }
    }
}

impl Release for () {
    fn release(self) {}
}

/// Create a linked completer and pending future.
pub fn one_shot<T: Release>(operation: &'static str) -> (Completer<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Completer {
            tx: Some(tx),
            operation,
        },
        Pending { rx, operation },
    )
}

/// Sending half, resolved at most once.
pub struct Completer<T: Release> {
    tx: Option<oneshot::Sender<T>>,
    operation: &'static str,
}

impl<T: Release> Completer<T> {
    /// Resolve the pending side. Returns false when the value had to be released.
    pub fn complete(mut self, value: T) -> bool {
        let Some(tx) = self.tx.take() else {
            value.release();
            return false;
        };
        match tx.send(value) {
            Ok(()) => true,
            Err(value) => {
                log::debug!("{} completed after caller left, releasing", self.operation);
                value.release();
                false
            }
        }
    }

    /// Whether the awaiting side is gone.
    pub fn is_abandoned(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

/// Receiving half. Resolves to an error if the completer is dropped unresolved.
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
    operation: &'static str,
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let operation = self.operation;
        Pin::new(&mut self.rx).poll(cx).map(|result| {
            result.map_err(|_| {
                CameraError::Backend(format!("{} callback dropped without a result", operation))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Handle(Arc<AtomicUsize>);

    impl Release for Handle {
        fn release(self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_delivers_value() {
        let released = Arc::new(AtomicUsize::new(0));
        let (completer, pending) = one_shot::<Handle>("open");
        assert!(completer.complete(Handle(released.clone())));
        let handle = pending.await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 0);
        handle.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_late_value_is_released() {
        let released = Arc::new(AtomicUsize::new(0));
        let (completer, pending) = one_shot::<Handle>("open");
        drop(pending);
        assert!(completer.is_abandoned());
        assert!(!completer.complete(Handle(released.clone())));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pending_until_completed() {
        let (completer, pending) = one_shot::<()>("capture");
        let mut task = tokio_test::task::spawn(pending);
        tokio_test::assert_pending!(task.poll());
        assert!(completer.complete(()));
        assert!(task.is_woken());
        tokio_test::assert_ready_ok!(task.poll());
    }

    #[tokio::test]
    async fn test_dropped_completer_fails_pending() {
        let (completer, pending) = one_shot::<()>("configure");
        drop(completer);
        let err = pending.await.unwrap_err();
        assert!(err.to_string().contains("configure"));
    }

    #[tokio::test]
    async fn test_failed_result_releases_nothing() {
        let released = Arc::new(AtomicUsize::new(0));
        let (completer, pending) = one_shot::<Result<Handle>>("open");
        drop(pending);
        completer.complete(Err(CameraError::DeviceOpenFailed("gone".into())));
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }
}
