//! Supervision primitives (C6): cooperative cancellation, bounded joins
//! with detach-on-timeout, and a "never fails the caller" combinator for
//! cleanup steps that must not abort the shutdown path (spec.md §4.6).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

/// A single atomic, cheaply cloned, shared by every worker in a session.
/// Setting it causes every cooperative wait loop to exit at its next
/// tick; in-flight socket sends are allowed to finish (spec.md §5).
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The default per-worker join deadline in the shutdown path (spec.md
/// §4.6: "typically 2 s").
pub const JOIN_DEADLINE: Duration = Duration::from_secs(2);

/// The hard per-peer cap: the peer must terminate within this long of
/// acquisition completion, regardless of the other peer's responsiveness
/// (spec.md §4.6, §8).
pub const PEER_TERMINATION_CAP: Duration = Duration::from_secs(60);

/// Join `handle` within `deadline`, returning whatever it produced. On
/// timeout the wait is abandoned (the nearest async equivalent of
/// "detach" — the task itself keeps running in the background) and a
/// warning is logged; the caller proceeds either way with `None`, so no
/// worker ever blocks shutdown beyond the hard cap.
pub async fn bounded_join<T>(handle: JoinHandle<T>, deadline: Duration, label: &str) -> Option<T> {
    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::warn!(worker = label, error = %e, "worker task panicked during join");
            None
        }
        Err(_) => {
            tracing::warn!(worker = label, deadline_secs = deadline.as_secs(), "worker join timed out, detaching");
            None
        }
    }
}

/// Run a cleanup step that must never fail the caller (spec.md §4.6: DLT
/// `list`/`stop` errors during `close_active_acquisitions` are ignored
/// categorically). Any error is logged at `warn` and swallowed.
pub async fn best_effort<F, Fut, E>(label: &str, f: F)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    if let Err(e) = f().await {
        tracing::warn!(step = label, error = %e, "ignoring error during best-effort cleanup");
    }
}
