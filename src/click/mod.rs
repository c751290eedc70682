//! Synthetic tap dispatch
//!
//! A `GestureBackend` performs the tap; the `ClickDispatcher` submits one
//! gesture and waits for it to report back. Backends are reached through a
//! `DispatchSession` handle that is connected and disconnected explicitly
//! by whoever owns it (normally the daemon).
//!
//! Each gesture carries a `GestureCompletion`, a resolve-once handle:
//! the backend either completes it, cancels it, or drops it (which counts
//! as cancelled). Once the dispatcher stops waiting, resolving the handle
//! is a no-op, so a late completion can never reach a caller that has
//! already moved on.

pub mod ydotool;

use crate::error::DispatchError;
use std::sync::{Arc, RwLock};
use tokio::sync::oneshot;

/// A single tap at a screen position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gesture {
    pub x: i32,
    pub y: i32,
    /// How long the contact is held
    pub duration_ms: u64,
}

/// How a submitted gesture ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    Completed,
    Cancelled,
}

/// Resolve-once completion handle handed to a backend with each gesture
#[derive(Debug)]
pub struct GestureCompletion {
    tx: oneshot::Sender<GestureOutcome>,
}

impl GestureCompletion {
    /// Create a handle and the receiver the dispatcher waits on
    pub fn channel() -> (Self, oneshot::Receiver<GestureOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn complete(self) {
        self.resolve(GestureOutcome::Completed);
    }

    pub fn cancel(self) {
        self.resolve(GestureOutcome::Cancelled);
    }

    /// The dispatcher is no longer waiting for this gesture
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }

    fn resolve(self, outcome: GestureOutcome) {
        if self.tx.send(outcome).is_err() {
            tracing::debug!("Gesture {:?} reported after the caller stopped waiting", outcome);
        }
    }
}

/// Trait for platform gesture injection
#[async_trait::async_trait]
pub trait GestureBackend: Send + Sync {
    /// Submit a gesture. Returns immediately; the outcome is reported
    /// through `completion`. An `Err` means the gesture was never started.
    fn dispatch(&self, gesture: Gesture, completion: GestureCompletion) -> Result<(), DispatchError>;

    /// Check whether the backend can inject input right now
    async fn is_available(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Explicit handle to the currently connected gesture backend
///
/// Clones share the same connection slot.
#[derive(Clone, Default)]
pub struct DispatchSession {
    slot: Arc<RwLock<Option<Arc<dyn GestureBackend>>>>,
}

impl DispatchSession {
    /// A session with no backend connected
    pub fn new() -> Self {
        Self::default()
    }

    /// A session already connected to `backend`
    pub fn connected(backend: Arc<dyn GestureBackend>) -> Self {
        let session = Self::new();
        session.connect(backend);
        session
    }

    pub fn connect(&self, backend: Arc<dyn GestureBackend>) {
        tracing::info!("Gesture session connected ({})", backend.name());
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(backend);
    }

    pub fn disconnect(&self) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        if let Some(backend) = slot.take() {
            tracing::info!("Gesture session disconnected ({})", backend.name());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// The connected backend, if any
    pub fn current(&self) -> Option<Arc<dyn GestureBackend>> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Issues single taps through a `DispatchSession`
pub struct ClickDispatcher {
    session: DispatchSession,
    duration_ms: u64,
}

impl ClickDispatcher {
    pub fn new(session: DispatchSession, duration_ms: u64) -> Self {
        Self {
            session,
            duration_ms,
        }
    }

    pub fn session(&self) -> &DispatchSession {
        &self.session
    }

    /// Tap at `(x, y)` and wait for the backend to report back
    ///
    /// Dropping the returned future abandons the gesture.
    pub async fn try_click(&self, x: i32, y: i32) -> Result<(), DispatchError> {
        let backend = self.session.current().ok_or(DispatchError::NotAvailable)?;
        let gesture = Gesture {
            x,
            y,
            duration_ms: self.duration_ms,
        };

        let (completion, outcome) = GestureCompletion::channel();
        tracing::debug!("Dispatching tap at ({}, {}) via {}", x, y, backend.name());
        backend.dispatch(gesture, completion)?;

        match outcome.await {
            Ok(GestureOutcome::Completed) => Ok(()),
            Ok(GestureOutcome::Cancelled) | Err(_) => Err(DispatchError::Cancelled),
        }
    }

    /// Tap at `(x, y)`; true only if the gesture completed
    pub async fn click(&self, x: i32, y: i32) -> bool {
        match self.try_click(x, y).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Tap at ({}, {}) failed: {}", x, y, e);
                false
            }
        }
    }
}
