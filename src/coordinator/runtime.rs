//! Async shell around `SidebarCoordinator`.
//!
//! One task owns the state machine and drains a single inbox, so the
//! authoritative state needs no locks. Sends, timers and screenshots are
//! spawned so a slow or vanished tab never stalls the inbox.

use super::machine::{Dispatch, Effect, OnFailure, Reply, SidebarCoordinator, TabStatus};
use crate::capture::{crop_viewport_region, encode_png, png_data_url, VisibleSurface};
use crate::protocol::{
    CoordinatorRequest, CoordinatorResponse, LocalBus, ReplicaTransport, ScreenRegion, TabId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Everything that can reach the coordinator: bus requests, host browser
/// events, and the runtime's own feedback.
#[derive(Debug)]
pub enum CoordinatorEvent {
    Request {
        from: Option<TabId>,
        request: CoordinatorRequest,
        reply: oneshot::Sender<CoordinatorResponse>,
    },
    Wire {
        from: Option<TabId>,
        raw: String,
        reply: oneshot::Sender<CoordinatorResponse>,
    },
    IconClicked {
        tab: TabId,
    },
    TabUpdated {
        tab: TabId,
        status: TabStatus,
    },
    TabActivated {
        tab: TabId,
    },
    TabRemoved {
        tab: TabId,
    },
    /// A send to `tab` made at registry `generation` failed.
    DeliveryFailed {
        tab: TabId,
        generation: u64,
    },
    /// A delayed dispatch finished waiting.
    Due {
        dispatch: Dispatch,
    },
    PendingExpired {
        tab: TabId,
    },
}

pub struct CoordinatorRuntime<T: ?Sized, S: ?Sized> {
    core: SidebarCoordinator,
    transport: Arc<T>,
    surface: Arc<S>,
    inbox: mpsc::UnboundedReceiver<CoordinatorEvent>,
    feedback: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl<T, S> CoordinatorRuntime<T, S>
where
    T: ReplicaTransport + ?Sized + 'static,
    S: VisibleSurface + ?Sized + 'static,
{
    pub fn new(
        core: SidebarCoordinator,
        transport: Arc<T>,
        surface: Arc<S>,
    ) -> (Self, CoordinatorHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let runtime = Self {
            core,
            transport,
            surface,
            inbox,
            feedback: tx.clone(),
        };
        (runtime, CoordinatorHandle { tx })
    }

    pub async fn run(mut self) {
        log::info!("[COORD] Coordinator running, state {:?}", self.core.state());
        while let Some(event) = self.inbox.recv().await {
            self.on_event(event);
        }
        log::info!("[COORD] Inbox closed, coordinator stopped");
    }

    fn on_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Request {
                from,
                request,
                reply,
            } => {
                let handled = self.core.handle(from, request);
                self.apply(handled.effects);
                self.respond(handled.reply, reply);
            }
            CoordinatorEvent::Wire { from, raw, reply } => {
                let handled = self.core.handle_wire(from, &raw);
                self.apply(handled.effects);
                self.respond(handled.reply, reply);
            }
            CoordinatorEvent::IconClicked { tab } => {
                let effects = self.core.icon_clicked(tab);
                self.apply(effects);
            }
            CoordinatorEvent::TabUpdated { tab, status } => {
                let effects = self.core.tab_updated(tab, status);
                self.apply(effects);
            }
            CoordinatorEvent::TabActivated { tab } => {
                let effects = self.core.tab_activated(tab);
                self.apply(effects);
            }
            CoordinatorEvent::TabRemoved { tab } => self.core.tab_removed(tab),
            CoordinatorEvent::DeliveryFailed { tab, generation } => {
                self.core.delivery_failed(tab, generation)
            }
            CoordinatorEvent::Due { dispatch } => {
                let effects = self.core.due(dispatch);
                self.apply(effects);
            }
            CoordinatorEvent::PendingExpired { tab } => {
                let effects = self.core.pending_expired(tab);
                self.apply(effects);
            }
        }
    }

    fn respond(&self, reply: Reply, tx: oneshot::Sender<CoordinatorResponse>) {
        match reply {
            Reply::Now(response) => {
                // The requester may have gone away; nothing to do about it.
                let _ = tx.send(response);
            }
            Reply::CaptureVisible => {
                let surface = Arc::clone(&self.surface);
                tokio::spawn(async move {
                    let _ = tx.send(capture_visible(&*surface).await);
                });
            }
            Reply::CaptureRegion(region) => {
                let surface = Arc::clone(&self.surface);
                tokio::spawn(async move {
                    let _ = tx.send(capture_region(&*surface, region).await);
                });
            }
        }
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(dispatch) if !dispatch.after.is_zero() => {
                    let feedback = self.feedback.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(dispatch.after).await;
                        let _ = feedback.send(CoordinatorEvent::Due { dispatch });
                    });
                }
                Effect::Send(dispatch) => {
                    let transport = Arc::clone(&self.transport);
                    let feedback = self.feedback.clone();
                    let generation = self.core.generation(dispatch.to);
                    tokio::spawn(deliver(transport, feedback, dispatch, generation));
                }
                Effect::ExpirePending { tab, after } => {
                    let feedback = self.feedback.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = feedback.send(CoordinatorEvent::PendingExpired { tab });
                    });
                }
            }
        }
    }
}

/// Best-effort delivery of one dispatch. Failures are logged, reported back
/// for registry pruning, and never retried except through `InjectAndRetry`,
/// whose retry goes back through the coordinator once the injected replica
/// had time to start.
async fn deliver<T: ReplicaTransport + ?Sized>(
    transport: Arc<T>,
    feedback: mpsc::UnboundedSender<CoordinatorEvent>,
    dispatch: Dispatch,
    generation: u64,
) {
    let Dispatch {
        to,
        command,
        on_failure,
        ..
    } = dispatch;

    let action = command.action();
    let err = match transport.send(to, command).await {
        Ok(_) => {
            log::debug!("[COORD] {} delivered to tab {}", action, to);
            return;
        }
        Err(e) => e,
    };

    log::info!("[COORD] {} to tab {} failed: {}", action, to, err);
    let _ = feedback.send(CoordinatorEvent::DeliveryFailed {
        tab: to,
        generation,
    });

    if let OnFailure::InjectAndRetry { retry, after } = on_failure {
        log::info!("[COORD] Injecting replica into tab {} and retrying", to);
        if let Err(e) = transport.inject(to).await {
            log::error!("[COORD] Script injection failed: {}", e);
            return;
        }
        tokio::time::sleep(after).await;
        let _ = feedback.send(CoordinatorEvent::Due {
            dispatch: Dispatch {
                to,
                command: retry,
                after: Duration::ZERO,
                on_failure: OnFailure::Log,
            },
        });
    }
}

async fn capture_visible<S: VisibleSurface + ?Sized>(surface: &S) -> CoordinatorResponse {
    let start = std::time::Instant::now();
    let frame = match surface.capture_visible().await {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("[CAPTURE] Visible surface capture failed: {}", e);
            return CoordinatorResponse::error(e.to_string());
        }
    };

    let png = tokio::task::spawn_blocking(move || encode_png(&frame)).await;

    match png {
        Ok(Ok(bytes)) => {
            log::info!(
                "[CAPTURE] Tab captured in {}ms, {} bytes",
                start.elapsed().as_millis(),
                bytes.len()
            );
            CoordinatorResponse::Captured {
                data_url: png_data_url(&bytes),
            }
        }
        Ok(Err(e)) => CoordinatorResponse::error(e.to_string()),
        Err(e) => CoordinatorResponse::error(format!("capture task failed: {}", e)),
    }
}

async fn capture_region<S: VisibleSurface + ?Sized>(
    surface: &S,
    region: ScreenRegion,
) -> CoordinatorResponse {
    let frame = match surface.capture_visible().await {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("[CAPTURE] Screen capture failed: {}", e);
            return CoordinatorResponse::capture_failed(e.to_string());
        }
    };

    let cropped = tokio::task::spawn_blocking(move || crop_viewport_region(&frame, &region)).await;
    match cropped {
        Ok(Ok(bytes)) => CoordinatorResponse::screen_captured(png_data_url(&bytes)),
        Ok(Err(e)) => {
            log::warn!("[CAPTURE] Crop failed: {}", e);
            CoordinatorResponse::capture_failed(e.to_string())
        }
        Err(e) => CoordinatorResponse::capture_failed(format!("crop task failed: {}", e)),
    }
}

/// Cloneable sender side of the coordinator's inbox.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    pub fn sender(&self) -> mpsc::UnboundedSender<CoordinatorEvent> {
        self.tx.clone()
    }

    fn post(&self, event: CoordinatorEvent) {
        if self.tx.send(event).is_err() {
            log::warn!("[COORD] Event dropped, coordinator stopped");
        }
    }

    pub fn icon_clicked(&self, tab: TabId) {
        self.post(CoordinatorEvent::IconClicked { tab });
    }

    pub fn tab_updated(&self, tab: TabId, status: TabStatus) {
        self.post(CoordinatorEvent::TabUpdated { tab, status });
    }

    pub fn tab_activated(&self, tab: TabId) {
        self.post(CoordinatorEvent::TabActivated { tab });
    }

    pub fn tab_removed(&self, tab: TabId) {
        self.post(CoordinatorEvent::TabRemoved { tab });
    }

    /// Send a request as an extension page (no sender tab), e.g. the popup.
    pub async fn request(&self, request: CoordinatorRequest) -> Option<CoordinatorResponse> {
        let (reply, response) = oneshot::channel();
        self.post(CoordinatorEvent::Request {
            from: None,
            request,
            reply,
        });
        response.await.ok()
    }

    /// Send a raw JSON message as an extension page.
    pub async fn request_wire(&self, raw: impl Into<String>) -> Option<CoordinatorResponse> {
        let (reply, response) = oneshot::channel();
        self.post(CoordinatorEvent::Wire {
            from: None,
            raw: raw.into(),
            reply,
        });
        response.await.ok()
    }
}

/// Start a coordinator on `bus` and return its handle.
pub fn spawn_coordinator<S>(
    bus: &LocalBus,
    core: SidebarCoordinator,
    surface: Arc<S>,
) -> CoordinatorHandle
where
    S: VisibleSurface + ?Sized + 'static,
{
    let (runtime, handle) = CoordinatorRuntime::new(core, Arc::new(bus.clone()), surface);
    bus.attach_coordinator(handle.sender());
    tokio::spawn(runtime.run());
    handle
}
