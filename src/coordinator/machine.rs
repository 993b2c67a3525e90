//! Deterministic core of the coordinator.
//!
//! `SidebarCoordinator` owns the single authoritative `GlobalSidebarState`
//! and the replica registry. It never touches the bus itself: every input
//! returns the reply plus a list of effects (sends, timers) for the runtime
//! to execute. That keeps every transition testable without timers or tasks.

use super::registry::ReplicaRegistry;
use super::Timings;
use crate::config::AppConfig;
use crate::protocol::{
    decode_request, CoordinatorRequest, CoordinatorResponse, GlobalSidebarState, ProtocolError,
    ReplicaCommand, ScreenRegion, TabId, DEFAULT_SIDEBAR_WIDTH,
};
use std::time::Duration;

/// What to do when a dispatch cannot be delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum OnFailure {
    Log,
    /// Inject the replica into the tab, wait, then send `retry` once.
    InjectAndRetry { retry: ReplicaCommand, after: Duration },
}

/// A point-to-point send to one replica. A non-zero `after` makes the
/// runtime hand the dispatch back through [`SidebarCoordinator::due`] once
/// the delay has passed, so it is checked against the state of that moment.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub to: TabId,
    pub command: ReplicaCommand,
    pub after: Duration,
    pub on_failure: OnFailure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(Dispatch),
    /// Re-check a deferred push for `tab` once `after` has elapsed.
    ExpirePending { tab: TabId, after: Duration },
}

/// How a request gets answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Now(CoordinatorResponse),
    /// Full visible surface as a data URL (`captureTab`).
    CaptureVisible,
    /// Visible surface cropped to a region (`captureScreen`).
    CaptureRegion(ScreenRegion),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub reply: Reply,
    pub effects: Vec<Effect>,
}

impl Handled {
    fn now(response: CoordinatorResponse) -> Self {
        Self {
            reply: Reply::Now(response),
            effects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabStatus {
    Loading,
    Complete,
}

#[derive(Debug, Clone)]
pub struct SidebarCoordinator {
    state: GlobalSidebarState,
    registry: ReplicaRegistry,
    timings: Timings,
}

impl SidebarCoordinator {
    pub fn new(timings: Timings) -> Self {
        Self::with_state(GlobalSidebarState::default(), timings)
    }

    /// Closed, at the configured width and settle delays.
    pub fn from_config(config: &AppConfig) -> Self {
        let width = if config.sidebar_width == 0 {
            DEFAULT_SIDEBAR_WIDTH
        } else {
            config.sidebar_width
        };
        Self::with_state(
            GlobalSidebarState {
                is_open: false,
                width,
            },
            config.timings,
        )
    }

    pub fn with_state(state: GlobalSidebarState, timings: Timings) -> Self {
        Self {
            state,
            registry: ReplicaRegistry::new(),
            timings,
        }
    }

    pub fn state(&self) -> GlobalSidebarState {
        self.state
    }

    pub fn registry(&self) -> &ReplicaRegistry {
        &self.registry
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Handle a request arriving on the bus. `from` is the sender's tab,
    /// absent for requests from extension pages (popup, settings).
    pub fn handle(&mut self, from: Option<TabId>, request: CoordinatorRequest) -> Handled {
        log::debug!(
            "[COORD] {} from tab {}",
            request.action(),
            from.map(|t| t.to_string()).unwrap_or_else(|| "-".into())
        );

        match request {
            CoordinatorRequest::CaptureTab { area } => {
                log::info!(
                    "[COORD] Capturing visible surface for area {}x{} at {},{}",
                    area.width, area.height, area.left, area.top
                );
                Handled {
                    reply: Reply::CaptureVisible,
                    effects: Vec::new(),
                }
            }
            CoordinatorRequest::CaptureScreen { data } => Handled {
                reply: Reply::CaptureRegion(data),
                effects: Vec::new(),
            },
            CoordinatorRequest::GetSidebarState => {
                Handled::now(CoordinatorResponse::State(self.state))
            }
            CoordinatorRequest::SetSidebarState {
                is_open,
                width,
                manual_close,
            } => self.set_state(from, is_open, width, manual_close == Some(true)),
            CoordinatorRequest::ContentScriptReady => self.replica_ready(from),
        }
    }

    /// Handle a raw wire message. Unknown actions get `{error: "Unknown action"}`.
    pub fn handle_wire(&mut self, from: Option<TabId>, raw: &str) -> Handled {
        match decode_request(raw) {
            Ok(request) => self.handle(from, request),
            Err(ProtocolError::UnknownAction(action)) => {
                log::warn!("[COORD] Unknown action: {}", action);
                Handled::now(CoordinatorResponse::unknown_action())
            }
            Err(e) => {
                log::warn!("[COORD] Rejected message: {}", e);
                Handled::now(CoordinatorResponse::error(e.to_string()))
            }
        }
    }

    fn set_state(
        &mut self,
        from: Option<TabId>,
        is_open: bool,
        width: u32,
        manual_close: bool,
    ) -> Handled {
        let was_open = self.state.is_open;
        self.state = GlobalSidebarState {
            is_open,
            width: if width == 0 { DEFAULT_SIDEBAR_WIDTH } else { width },
        };
        if let Some(tab) = from {
            self.registry.touch(tab);
        }
        log::info!(
            "[COORD] State set by tab {:?}: open={} width={} manual_close={}",
            from.map(|t| t.0),
            self.state.is_open,
            self.state.width,
            manual_close
        );

        let effects = match (was_open, is_open) {
            (true, false) if manual_close => {
                log::info!("[COORD] Manual close, notifying every other tab");
                self.registry.clear_pending();
                self.broadcast(from, ReplicaCommand::manually_closed(self.state.width))
            }
            (false, true) => self.broadcast(from, ReplicaCommand::opened(self.state.width)),
            _ => Vec::new(),
        };

        Handled {
            reply: Reply::Now(CoordinatorResponse::ack()),
            effects,
        }
    }

    fn replica_ready(&mut self, from: Option<TabId>) -> Handled {
        let mut handled = Handled::now(CoordinatorResponse::Ready {
            sidebar_state: self.state,
        });

        let Some(tab) = from else {
            return handled;
        };

        // Any deferred push for this tab is superseded by the ready push below.
        if self.registry.mark_ready(tab).is_some() {
            log::debug!("[COORD] Tab {} ready, dropping deferred push", tab);
        }

        if self.state.is_open {
            log::info!("[COORD] Tab {} ready while open, scheduling create", tab);
            handled.effects.push(Effect::Send(Dispatch {
                to: tab,
                command: ReplicaCommand::CreateSidebar {
                    width: self.state.width,
                },
                after: self.timings.ready_push,
                on_failure: OnFailure::Log,
            }));
        }
        handled
    }

    /// The extension icon was clicked while `tab` was active.
    pub fn icon_clicked(&mut self, tab: TabId) -> Vec<Effect> {
        self.registry.touch(tab);
        let width = self.state.width;

        if self.state.is_open {
            log::info!("[COORD] Icon toggle: closing globally");
            self.state.is_open = false;
            self.registry.clear_pending();
            return self.broadcast(None, ReplicaCommand::manually_closed(width));
        }

        log::info!("[COORD] Icon toggle: opening globally");
        self.state.is_open = true;
        self.registry
            .tabs()
            .into_iter()
            .map(|to| {
                let on_failure = if to == tab {
                    OnFailure::InjectAndRetry {
                        retry: ReplicaCommand::CreateSidebar { width },
                        after: self.timings.inject_retry,
                    }
                } else {
                    OnFailure::Log
                };
                Effect::Send(Dispatch {
                    to,
                    command: ReplicaCommand::opened(width),
                    after: Duration::ZERO,
                    on_failure,
                })
            })
            .collect()
    }

    pub fn tab_updated(&mut self, tab: TabId, status: TabStatus) -> Vec<Effect> {
        match status {
            TabStatus::Loading => {
                self.registry.mark_loading(tab);
                Vec::new()
            }
            TabStatus::Complete => {
                self.registry.touch(tab);
                self.restore_open(tab, self.timings.navigation)
            }
        }
    }

    pub fn tab_activated(&mut self, tab: TabId) -> Vec<Effect> {
        self.registry.touch(tab);
        self.restore_open(tab, self.timings.activation)
    }

    pub fn tab_removed(&mut self, tab: TabId) {
        self.registry.prune(tab);
    }

    /// Generation a send to `tab` made right now belongs to.
    pub fn generation(&self, tab: TabId) -> u64 {
        self.registry.generation(tab)
    }

    /// A send made to `tab` at `generation` failed: stop contacting it until
    /// it shows up again. Ignored if the tab has been heard from since.
    pub fn delivery_failed(&mut self, tab: TabId, generation: u64) {
        if self.registry.prune_stale(tab, generation) {
            log::info!("[COORD] Pruned unreachable tab {}", tab);
        } else {
            log::debug!("[COORD] Stale delivery failure for tab {} ignored", tab);
        }
    }

    /// A delayed dispatch has waited out its settle delay. Open pushes are
    /// dropped if the sidebar was closed in the meantime and otherwise carry
    /// the current width.
    pub fn due(&mut self, dispatch: Dispatch) -> Vec<Effect> {
        let Dispatch {
            to,
            command,
            on_failure,
            ..
        } = dispatch;

        if opens(&command) && !self.state.is_open {
            log::info!(
                "[COORD] Sidebar closed meanwhile, dropping {} to tab {}",
                command.action(),
                to
            );
            return Vec::new();
        }

        let width = self.state.width;
        let command = match command {
            ReplicaCommand::CreateSidebar { .. } => ReplicaCommand::CreateSidebar { width },
            ReplicaCommand::GlobalSidebarStateChanged { is_open: true, .. } => {
                ReplicaCommand::opened(width)
            }
            other => other,
        };

        vec![Effect::Send(Dispatch {
            to,
            command,
            after: Duration::ZERO,
            on_failure,
        })]
    }

    /// The readiness safety net for `tab` fired.
    pub fn pending_expired(&mut self, tab: TabId) -> Vec<Effect> {
        let Some(command) = self.registry.take_pending(tab) else {
            return Vec::new();
        };
        if !self.state.is_open {
            return Vec::new();
        }
        log::info!("[COORD] Tab {} never announced readiness, pushing anyway", tab);
        vec![Effect::Send(Dispatch {
            to: tab,
            command,
            after: Duration::ZERO,
            on_failure: OnFailure::Log,
        })]
    }

    /// Re-announce an open sidebar to one tab after navigation/activation.
    fn restore_open(&mut self, tab: TabId, delay: Duration) -> Vec<Effect> {
        if !self.state.is_open {
            return Vec::new();
        }

        let command = ReplicaCommand::opened(self.state.width);
        if self.registry.is_ready(tab) {
            vec![Effect::Send(Dispatch {
                to: tab,
                command,
                after: delay,
                on_failure: OnFailure::Log,
            })]
        } else {
            log::debug!("[COORD] Tab {} not ready yet, deferring open", tab);
            self.registry.defer(tab, command);
            vec![Effect::ExpirePending {
                tab,
                after: self.timings.readiness_timeout,
            }]
        }
    }

    fn broadcast(&self, except: Option<TabId>, command: ReplicaCommand) -> Vec<Effect> {
        self.registry
            .tabs()
            .into_iter()
            .filter(|tab| Some(*tab) != except)
            .map(|to| {
                Effect::Send(Dispatch {
                    to,
                    command: command.clone(),
                    after: Duration::ZERO,
                    on_failure: OnFailure::Log,
                })
            })
            .collect()
    }
}

fn opens(command: &ReplicaCommand) -> bool {
    matches!(
        command,
        ReplicaCommand::CreateSidebar { .. }
            | ReplicaCommand::GlobalSidebarStateChanged { is_open: true, .. }
    )
}
