//! Dedicated serialized execution context for one camera device.
//!
//! Every hardware call and every hardware callback for a device runs on one
//! OS thread, in submission order. Async code reaches the thread through a
//! cloneable [`Handler`].

use crate::errors::{CameraError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Quit,
}

/// Cloneable submission handle for a [`CameraExecutor`].
#[derive(Clone)]
pub struct Handler {
    tx: Sender<Message>,
    running: Arc<AtomicBool>,
    name: Arc<str>,
}

impl Handler {
    /// Queue `job`. Returns false once the executor has shut down.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(Message::Run(Box::new(job))).is_ok()
    }

    /// Queue `job`, or run it on the calling thread if the executor is gone.
    ///
    /// For callbacks that carry resources which must not be lost.
    pub fn post_or_run<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.running.load(Ordering::Acquire) {
            job();
            return;
        }
        if let Err(crossbeam_channel::SendError(Message::Run(job))) =
            self.tx.send(Message::Run(Box::new(job)))
        {
            job();
        }
    }

    /// Run `f` on the executor thread and await its result.
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let posted = self.post(move || {
            let _ = tx.send(f());
        });
        if !posted {
            return Err(CameraError::InvalidState(format!(
                "executor {} is shut down",
                self.name
            )));
        }
        rx.await.map_err(|_| {
            CameraError::Backend(format!("executor {} dropped a job", self.name))
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Owns the worker thread. Shut down explicitly with [`CameraExecutor::shutdown`];
/// dropping only asks the thread to stop.
pub struct CameraExecutor {
    handler: Handler,
    thread: Option<JoinHandle<()>>,
}

impl CameraExecutor {
    /// Start a worker thread named `camera-<device_id>`.
    pub fn start(device_id: &str) -> Result<Self> {
        let name: Arc<str> = Arc::from(format!("camera-{}", device_id));
        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(rx))
            .map_err(|e| CameraError::Backend(format!("Failed to spawn {}: {}", name, e)))?;

        log::debug!("Started camera executor {}", name);
        Ok(Self {
            handler: Handler { tx, running, name },
            thread: Some(thread),
        })
    }

    pub fn handler(&self) -> Handler {
        self.handler.clone()
    }

    /// Stop accepting work, let already-queued jobs finish, and join the thread.
    pub async fn shutdown(mut self) {
        self.signal_quit();
        if let Some(thread) = self.thread.take() {
            let name = self.handler.name.clone();
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => log::debug!("Camera executor {} stopped", name),
                Ok(Err(_)) => log::warn!("Camera executor {} panicked", name),
                Err(e) => log::warn!("Failed to join camera executor {}: {}", name, e),
            }
        }
    }

    fn signal_quit(&self) {
        if self.handler.running.swap(false, Ordering::AcqRel) {
            let _ = self.handler.tx.send(Message::Quit);
        }
    }
}

impl Drop for CameraExecutor {
    fn drop(&mut self) {
        self.signal_quit();
    }
}

fn worker_loop(rx: Receiver<Message>) {
    while let Ok(message) = rx.recv() {
        match message {
            Message::Run(job) => job(),
            Message::Quit => break,
        }
    }
}
