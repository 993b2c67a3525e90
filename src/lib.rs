//! Snip sidebar: cross-tab sidebar sync, region capture and chat.
//!
//! The crate wires together:
//! - Message vocabulary and in-process bus (protocol/)
//! - The single state owner (coordinator/)
//! - Per-tab overlay replicas (replica/)
//! - Screen capture domain (capture/)
//! - Chat backend client and panel (chat/)
//! - Encrypted settings (settings/) and env config (config.rs)

pub mod capture;
pub mod chat;
pub mod config;
pub mod coordinator;
pub mod protocol;
pub mod replica;
pub mod settings;

pub use config::AppConfig;
pub use coordinator::{spawn_coordinator, CoordinatorHandle, SidebarCoordinator, Timings};
pub use protocol::{GlobalSidebarState, LocalBus, TabId};
pub use replica::{spawn_replica, ReplicaHandle};

/// Install the `env_logger` backend (filter from `RUST_LOG`). Safe to call
/// more than once; later calls are no-ops.
pub fn init_logging() {
    if env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()
        .is_ok()
    {
        log::debug!("Logging initialised");
    }
}
