//! Sidebar coordinator: the single owner of the global sidebar state.
//!
//! - `machine`: the deterministic state machine (`SidebarCoordinator`)
//! - `registry`: which replicas are reachable and ready
//! - `runtime`: the async actor executing the machine's effects

mod machine;
mod registry;
mod runtime;

pub use machine::{Dispatch, Effect, Handled, OnFailure, Reply, SidebarCoordinator, TabStatus};
pub use registry::{ReplicaEntry, ReplicaRegistry};
pub use runtime::{spawn_coordinator, CoordinatorEvent, CoordinatorHandle, CoordinatorRuntime};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settle delays applied before pushes. They bias against races with page
/// readiness; correctness comes from the readiness handshake and idempotent
/// replica transitions, not from these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    /// `contentScriptReady` → `createSidebar` push.
    pub ready_push: Duration,
    /// Script injection → retried `createSidebar`.
    pub inject_retry: Duration,
    /// Tab finished loading → open re-announcement.
    pub navigation: Duration,
    /// Tab activated → open re-announcement.
    pub activation: Duration,
    /// Deferred push fires anyway if the tab stays silent this long.
    pub readiness_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            ready_push: Duration::from_millis(300),
            inject_retry: Duration::from_millis(500),
            navigation: Duration::from_millis(1000),
            activation: Duration::from_millis(200),
            readiness_timeout: Duration::from_millis(2000),
        }
    }
}

impl Timings {
    /// No settle delays; the readiness timeout stays short but non-zero.
    pub fn immediate() -> Self {
        Self {
            ready_push: Duration::ZERO,
            inject_retry: Duration::ZERO,
            navigation: Duration::ZERO,
            activation: Duration::ZERO,
            readiness_timeout: Duration::from_millis(50),
        }
    }
}
