//! Message bus and action vocabulary: public API.
//!
//! Both roles (coordinator and replicas) only ever talk through the types
//! exported here.

mod bus;
mod messages;

pub use bus::{CoordinatorLink, LocalBus, ReplicaTransport, TabLink, TransportError};
pub use messages::{
    decode_command, decode_request, CoordinatorRequest, CoordinatorResponse, GlobalSidebarState,
    OverlayEvent, OverlayMessage, ProtocolError, Region, ReplicaCommand, ReplicaResponse,
    ScreenRegion, TabId, DEFAULT_SIDEBAR_WIDTH,
};
