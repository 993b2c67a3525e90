//! Message bus between the coordinator and the replicas.
//!
//! Delivery is at-most-once with no ordering across recipients. A send to a
//! tab nobody is listening in resolves as a `TransportError`; callers log it
//! and move on. Responses are correlated by the call itself (a oneshot per
//! request), never by an explicit id.

use super::messages::{CoordinatorRequest, CoordinatorResponse, ReplicaCommand, ReplicaResponse, TabId};
use crate::coordinator::CoordinatorEvent;
use crate::replica::ReplicaEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Could not establish connection to tab {0}: receiving end does not exist")]
    NoReceiver(TabId),

    #[error("Tab {0} went away before responding")]
    ResponseDropped(TabId),

    #[error("Coordinator is not running")]
    CoordinatorGone,

    #[error("Script injection into tab {tab} failed: {reason}")]
    InjectionFailed { tab: TabId, reason: String },
}

/// The replica's view of the bus: one request, one eventual response.
#[async_trait]
pub trait CoordinatorLink: Send + Sync {
    fn tab(&self) -> TabId;

    async fn request(
        &self,
        request: CoordinatorRequest,
    ) -> Result<CoordinatorResponse, TransportError>;
}

/// The coordinator's view of the bus: point-to-point sends plus the host's
/// "inject the replica into this tab" primitive.
#[async_trait]
pub trait ReplicaTransport: Send + Sync {
    async fn send(
        &self,
        tab: TabId,
        command: ReplicaCommand,
    ) -> Result<ReplicaResponse, TransportError>;

    async fn inject(&self, tab: TabId) -> Result<(), TransportError>;
}

type Injector = Arc<dyn Fn(TabId) -> Result<(), TransportError> + Send + Sync>;

#[derive(Default)]
struct BusInner {
    coordinator: Option<mpsc::UnboundedSender<CoordinatorEvent>>,
    replicas: HashMap<TabId, mpsc::UnboundedSender<ReplicaEvent>>,
    injector: Option<Injector>,
}

/// In-process bus over tokio channels. Cheap to clone; all clones share
/// the same routing table.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<Mutex<BusInner>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut BusInner) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn attach_coordinator(&self, sender: mpsc::UnboundedSender<CoordinatorEvent>) {
        self.with_inner(|inner| inner.coordinator = Some(sender));
    }

    pub fn attach_replica(&self, tab: TabId, sender: mpsc::UnboundedSender<ReplicaEvent>) {
        log::debug!("[BUS] Replica attached in tab {}", tab);
        self.with_inner(|inner| inner.replicas.insert(tab, sender));
    }

    /// Forget the replica in `tab` (tab closed or navigated away).
    pub fn detach_replica(&self, tab: TabId) -> bool {
        log::debug!("[BUS] Replica detached from tab {}", tab);
        self.with_inner(|inner| inner.replicas.remove(&tab).is_some())
    }

    pub fn has_replica(&self, tab: TabId) -> bool {
        self.with_inner(|inner| inner.replicas.contains_key(&tab))
    }

    /// Install the host's script-injection primitive.
    pub fn set_injector<F>(&self, injector: F)
    where
        F: Fn(TabId) -> Result<(), TransportError> + Send + Sync + 'static,
    {
        self.with_inner(|inner| inner.injector = Some(Arc::new(injector)));
    }

    /// A replica-side handle for talking to the coordinator from `tab`.
    pub fn link(&self, tab: TabId) -> TabLink {
        TabLink {
            tab,
            bus: self.clone(),
        }
    }

    fn coordinator(&self) -> Option<mpsc::UnboundedSender<CoordinatorEvent>> {
        self.with_inner(|inner| inner.coordinator.clone())
    }

    fn replica(&self, tab: TabId) -> Option<mpsc::UnboundedSender<ReplicaEvent>> {
        self.with_inner(|inner| inner.replicas.get(&tab).cloned())
    }
}

#[async_trait]
impl ReplicaTransport for LocalBus {
    async fn send(
        &self,
        tab: TabId,
        command: ReplicaCommand,
    ) -> Result<ReplicaResponse, TransportError> {
        let sender = self.replica(tab).ok_or(TransportError::NoReceiver(tab))?;

        let (reply, response) = oneshot::channel();
        sender
            .send(ReplicaEvent::Command { command, reply })
            .map_err(|_| TransportError::NoReceiver(tab))?;

        response.await.map_err(|_| TransportError::ResponseDropped(tab))
    }

    async fn inject(&self, tab: TabId) -> Result<(), TransportError> {
        let injector = self.with_inner(|inner| inner.injector.clone());
        match injector {
            Some(inject) => inject(tab),
            None => Err(TransportError::InjectionFailed {
                tab,
                reason: "no injector installed".to_string(),
            }),
        }
    }
}

/// Replica-side endpoint bound to one tab.
#[derive(Clone)]
pub struct TabLink {
    tab: TabId,
    bus: LocalBus,
}

#[async_trait]
impl CoordinatorLink for TabLink {
    fn tab(&self) -> TabId {
        self.tab
    }

    async fn request(
        &self,
        request: CoordinatorRequest,
    ) -> Result<CoordinatorResponse, TransportError> {
        let sender = self.bus.coordinator().ok_or(TransportError::CoordinatorGone)?;

        let (reply, response) = oneshot::channel();
        sender
            .send(CoordinatorEvent::Request {
                from: Some(self.tab),
                request,
                reply,
            })
            .map_err(|_| TransportError::CoordinatorGone)?;

        response.await.map_err(|_| TransportError::CoordinatorGone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_to_unknown_tab_fails_without_panicking() {
        let bus = LocalBus::new();
        let err = bus.send(TabId(7), ReplicaCommand::StartCapture).await.unwrap_err();
        assert_eq!(err, TransportError::NoReceiver(TabId(7)));
    }

    #[tokio::test]
    async fn send_to_closed_inbox_is_a_transport_failure() {
        let bus = LocalBus::new();
        let (tx, rx) = mpsc::unbounded_channel();
        bus.attach_replica(TabId(1), tx);
        drop(rx);

        let err = bus.send(TabId(1), ReplicaCommand::StartCapture).await.unwrap_err();
        assert_eq!(err, TransportError::NoReceiver(TabId(1)));
    }

    #[tokio::test]
    async fn request_without_coordinator_reports_gone() {
        let bus = LocalBus::new();
        let err = bus
            .link(TabId(3))
            .request(CoordinatorRequest::GetSidebarState)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::CoordinatorGone);
    }

    #[tokio::test]
    async fn inject_without_injector_fails() {
        let bus = LocalBus::new();
        let err = bus.inject(TabId(2)).await.unwrap_err();
        assert!(matches!(err, TransportError::InjectionFailed { tab: TabId(2), .. }));
    }

    #[tokio::test]
    async fn send_delivers_command_and_correlates_reply() {
        let bus = LocalBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.attach_replica(TabId(4), tx);

        tokio::spawn(async move {
            if let Some(ReplicaEvent::Command { command, reply }) = rx.recv().await {
                assert_eq!(command, ReplicaCommand::StartCapture);
                let _ = reply.send(ReplicaResponse::ack());
            }
        });

        let resp = bus.send(TabId(4), ReplicaCommand::StartCapture).await.unwrap();
        assert_eq!(resp, ReplicaResponse::ack());
    }
}
