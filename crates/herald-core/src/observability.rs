//! Observability - tracing の初期化とディスパッチ統計

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Process-wide dispatch statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCounts {
    pub dispatched: usize,
    pub handled: usize,
    pub unhandled: usize,
    pub rejected: usize,
    pub timed_out: usize,
}

static HANDLED: AtomicUsize = AtomicUsize::new(0);
static UNHANDLED: AtomicUsize = AtomicUsize::new(0);
static REJECTED: AtomicUsize = AtomicUsize::new(0);
static TIMED_OUT: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn record_dispatch(handled: bool) {
    let counter = if handled { &HANDLED } else { &UNHANDLED };
    counter.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_rejection() {
    REJECTED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_timeout() {
    TIMED_OUT.fetch_add(1, Ordering::Relaxed);
}

pub fn counts() -> DispatchCounts {
    let handled = HANDLED.load(Ordering::Relaxed);
    let unhandled = UNHANDLED.load(Ordering::Relaxed);
    DispatchCounts {
        dispatched: handled + unhandled,
        handled,
        unhandled,
        rejected: REJECTED.load(Ordering::Relaxed),
        timed_out: TIMED_OUT.load(Ordering::Relaxed),
    }
}

/// Install a fmt subscriber filtered by `RUST_LOG`, or `directive` when unset.
///
/// Returns false when a global subscriber already exists.
pub fn init_tracing(directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .with_target(true)
        .try_init()
        .is_ok()
}
