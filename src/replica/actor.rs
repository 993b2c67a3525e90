//! Replica event loop: one task per tab draining a single inbox, so the
//! overlay state is only ever touched from one place.

use super::{CaptureOutcome, PageHost, Replica, ReplicaStatus};
use crate::protocol::{
    CoordinatorLink, LocalBus, OverlayEvent, ReplicaCommand, ReplicaResponse, TabId,
};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum ReplicaEvent {
    /// A command from the coordinator or the popup.
    Command {
        command: ReplicaCommand,
        reply: oneshot::Sender<ReplicaResponse>,
    },
    Wire {
        raw: String,
        reply: oneshot::Sender<ReplicaResponse>,
    },
    Overlay(OverlayEvent),
    /// The tab became visible or regained focus.
    Visible,
    OpenLocal,
    PointerDown {
        x: f64,
        y: f64,
    },
    PointerMove {
        x: f64,
        y: f64,
    },
    PointerUp {
        x: f64,
        y: f64,
        outcome: Option<oneshot::Sender<CaptureOutcome>>,
    },
    CancelCapture,
    Inspect {
        reply: oneshot::Sender<ReplicaStatus>,
    },
}

/// Announce readiness, then serve the inbox until every sender is gone.
pub async fn run_replica<P, L>(mut replica: Replica<P, L>, mut inbox: mpsc::UnboundedReceiver<ReplicaEvent>)
where
    P: PageHost,
    L: CoordinatorLink,
{
    replica.announce_ready().await;

    while let Some(event) = inbox.recv().await {
        match event {
            ReplicaEvent::Command { command, reply } => {
                let _ = reply.send(replica.handle_command(command));
            }
            ReplicaEvent::Wire { raw, reply } => {
                let _ = reply.send(replica.handle_wire(&raw));
            }
            ReplicaEvent::Overlay(event) => replica.on_overlay_event(event).await,
            ReplicaEvent::Visible => replica.on_visible().await,
            ReplicaEvent::OpenLocal => replica.open_local().await,
            ReplicaEvent::PointerDown { x, y } => replica.pointer_down(x, y),
            ReplicaEvent::PointerMove { x, y } => {
                replica.pointer_move(x, y);
            }
            ReplicaEvent::PointerUp { x, y, outcome } => {
                let result = replica.pointer_up(x, y).await;
                if let Some(tx) = outcome {
                    let _ = tx.send(result);
                }
            }
            ReplicaEvent::CancelCapture => {
                replica.cancel_capture();
            }
            ReplicaEvent::Inspect { reply } => {
                let _ = reply.send(replica.status());
            }
        }
    }

    log::debug!("[REPLICA] Tab {} inbox closed", replica.tab());
}

/// Mount a replica for `tab` on `bus` and start its loop.
///
/// The inbox is attached before the loop starts, so a push the coordinator
/// sends in answer to the ready announcement always has a receiver.
pub fn spawn_replica<P>(bus: &LocalBus, tab: TabId, page: P) -> ReplicaHandle
where
    P: PageHost + 'static,
{
    let (tx, inbox) = mpsc::unbounded_channel();
    bus.attach_replica(tab, tx.clone());
    let replica = Replica::new(page, bus.link(tab));
    tokio::spawn(run_replica(replica, inbox));
    ReplicaHandle { tab, tx }
}

/// Cloneable sender side of one replica's inbox. Events are processed in
/// the order they are posted.
#[derive(Clone)]
pub struct ReplicaHandle {
    tab: TabId,
    tx: mpsc::UnboundedSender<ReplicaEvent>,
}

impl ReplicaHandle {
    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<ReplicaEvent> {
        self.tx.clone()
    }

    fn post(&self, event: ReplicaEvent) {
        if self.tx.send(event).is_err() {
            log::warn!("[REPLICA] Event dropped, tab {} stopped", self.tab);
        }
    }

    pub fn overlay_event(&self, event: OverlayEvent) {
        self.post(ReplicaEvent::Overlay(event));
    }

    pub fn visible(&self) {
        self.post(ReplicaEvent::Visible);
    }

    pub fn open_local(&self) {
        self.post(ReplicaEvent::OpenLocal);
    }

    pub fn pointer_down(&self, x: f64, y: f64) {
        self.post(ReplicaEvent::PointerDown { x, y });
    }

    pub fn pointer_move(&self, x: f64, y: f64) {
        self.post(ReplicaEvent::PointerMove { x, y });
    }

    /// Release the pointer and wait for the capture to settle.
    pub async fn pointer_up(&self, x: f64, y: f64) -> Option<CaptureOutcome> {
        let (tx, rx) = oneshot::channel();
        self.post(ReplicaEvent::PointerUp {
            x,
            y,
            outcome: Some(tx),
        });
        rx.await.ok()
    }

    pub fn cancel_capture(&self) {
        self.post(ReplicaEvent::CancelCapture);
    }

    /// Deliver a command directly, the way the popup talks to the active tab.
    pub async fn command(&self, command: ReplicaCommand) -> Option<ReplicaResponse> {
        let (reply, rx) = oneshot::channel();
        self.post(ReplicaEvent::Command { command, reply });
        rx.await.ok()
    }

    pub async fn wire(&self, raw: impl Into<String>) -> Option<ReplicaResponse> {
        let (reply, rx) = oneshot::channel();
        self.post(ReplicaEvent::Wire {
            raw: raw.into(),
            reply,
        });
        rx.await.ok()
    }

    /// Status after every event posted so far has been handled.
    pub async fn status(&self) -> Option<ReplicaStatus> {
        let (reply, rx) = oneshot::channel();
        self.post(ReplicaEvent::Inspect { reply });
        rx.await.ok()
    }
}
