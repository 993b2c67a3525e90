//! Action vocabulary spoken between the coordinator and the per-tab replicas.
//!
//! Every message on the bus is a tagged record with an `action` field.
//! The set is closed: decoding anything outside it yields
//! [`ProtocolError::UnknownAction`] instead of falling through a string switch.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width used whenever a message omits one or carries zero.
pub const DEFAULT_SIDEBAR_WIDTH: u32 = 400;

/// Identifies one browser tab, and with it the replica living in that tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The authoritative sidebar state. Only the coordinator mutates it;
/// replicas hold cached, possibly stale copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSidebarState {
    pub is_open: bool,
    pub width: u32,
}

impl Default for GlobalSidebarState {
    fn default() -> Self {
        Self {
            is_open: false,
            width: DEFAULT_SIDEBAR_WIDTH,
        }
    }
}

/// Rectangle in viewport (CSS pixel) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Viewport rectangle plus the ratio needed to map it onto device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenRegion {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "unit_ratio")]
    pub device_pixel_ratio: f64,
}

fn unit_ratio() -> f64 {
    1.0
}

impl ScreenRegion {
    pub fn new(region: Region, device_pixel_ratio: f64) -> Self {
        Self {
            left: region.left,
            top: region.top,
            width: region.width,
            height: region.height,
            device_pixel_ratio,
        }
    }

    pub fn region(&self) -> Region {
        Region {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
        }
    }
}

/// Replica → coordinator requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum CoordinatorRequest {
    CaptureTab {
        area: Region,
    },
    #[serde(rename_all = "camelCase")]
    SetSidebarState {
        is_open: bool,
        #[serde(default)]
        width: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        manual_close: Option<bool>,
    },
    GetSidebarState,
    ContentScriptReady,
    CaptureScreen {
        data: ScreenRegion,
    },
}

impl CoordinatorRequest {
    pub const ACTIONS: &'static [&'static str] = &[
        "captureTab",
        "setSidebarState",
        "getSidebarState",
        "contentScriptReady",
        "captureScreen",
    ];

    pub fn action(&self) -> &'static str {
        match self {
            Self::CaptureTab { .. } => "captureTab",
            Self::SetSidebarState { .. } => "setSidebarState",
            Self::GetSidebarState => "getSidebarState",
            Self::ContentScriptReady => "contentScriptReady",
            Self::CaptureScreen { .. } => "captureScreen",
        }
    }
}

/// Coordinator (or popup) → replica commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ReplicaCommand {
    CreateSidebar {
        #[serde(default)]
        width: u32,
    },
    #[serde(rename_all = "camelCase")]
    GlobalSidebarStateChanged {
        is_open: bool,
        #[serde(default)]
        width: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        manual_close: Option<bool>,
    },
    StartCapture,
}

impl ReplicaCommand {
    pub const ACTIONS: &'static [&'static str] =
        &["createSidebar", "globalSidebarStateChanged", "startCapture"];

    pub fn action(&self) -> &'static str {
        match self {
            Self::CreateSidebar { .. } => "createSidebar",
            Self::GlobalSidebarStateChanged { .. } => "globalSidebarStateChanged",
            Self::StartCapture => "startCapture",
        }
    }

    pub fn opened(width: u32) -> Self {
        Self::GlobalSidebarStateChanged {
            is_open: true,
            width,
            manual_close: None,
        }
    }

    pub fn manually_closed(width: u32) -> Self {
        Self::GlobalSidebarStateChanged {
            is_open: false,
            width,
            manual_close: Some(true),
        }
    }
}

/// Coordinator replies. Shapes match the wire table; untagged, so variant
/// order matters for decoding (most specific first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordinatorResponse {
    Captured {
        #[serde(rename = "dataUrl")]
        data_url: String,
    },
    ScreenCaptured {
        success: bool,
        #[serde(rename = "imageData")]
        image_data: String,
    },
    CaptureFailed {
        success: bool,
        error: String,
    },
    Ack {
        success: bool,
    },
    Ready {
        #[serde(rename = "sidebarState")]
        sidebar_state: GlobalSidebarState,
    },
    State(GlobalSidebarState),
    Error {
        error: String,
    },
}

impl CoordinatorResponse {
    pub fn ack() -> Self {
        Self::Ack { success: true }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn screen_captured(image_data: String) -> Self {
        Self::ScreenCaptured {
            success: true,
            image_data,
        }
    }

    pub fn capture_failed(message: impl Into<String>) -> Self {
        Self::CaptureFailed {
            success: false,
            error: message.into(),
        }
    }

    pub fn unknown_action() -> Self {
        Self::error("Unknown action")
    }
}

/// Replica replies to coordinator commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplicaResponse {
    Ack { success: bool },
    Error { error: String },
}

impl ReplicaResponse {
    pub fn ack() -> Self {
        Self::Ack { success: true }
    }

    pub fn unknown_action() -> Self {
        Self::Error {
            error: "Unknown action".to_string(),
        }
    }
}

/// Commands the embedded overlay document posts up to its replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum OverlayEvent {
    CloseSidebar,
    StartNewCapture,
}

/// Messages the replica posts down into the overlay document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum OverlayMessage {
    #[serde(rename_all = "camelCase")]
    SetImage { image_data: String },
    RefreshChatHistory,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Message is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Message has no action tag")]
    MissingAction,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Malformed {action} payload: {reason}")]
    Malformed { action: String, reason: String },
}

/// Decode a wire request addressed to the coordinator.
pub fn decode_request(raw: &str) -> Result<CoordinatorRequest, ProtocolError> {
    decode_tagged(raw, CoordinatorRequest::ACTIONS)
}

/// Decode a wire command addressed to a replica.
pub fn decode_command(raw: &str) -> Result<ReplicaCommand, ProtocolError> {
    decode_tagged(raw, ReplicaCommand::ACTIONS)
}

fn decode_tagged<T: DeserializeOwned>(raw: &str, known: &[&str]) -> Result<T, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let action = value
        .get("action")
        .and_then(serde_json::Value::as_str)
        .ok_or(ProtocolError::MissingAction)?
        .to_string();

    if !known.contains(&action.as_str()) {
        return Err(ProtocolError::UnknownAction(action));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
        action,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_state_uses_camel_case_fields() {
        let req = CoordinatorRequest::SetSidebarState {
            is_open: false,
            width: 400,
            manual_close: Some(true),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"action": "setSidebarState", "isOpen": false, "width": 400, "manualClose": true})
        );
    }

    #[test]
    fn open_broadcast_omits_manual_close() {
        let value = serde_json::to_value(ReplicaCommand::opened(400)).unwrap();
        assert_eq!(
            value,
            json!({"action": "globalSidebarStateChanged", "isOpen": true, "width": 400})
        );
    }

    #[test]
    fn decodes_unit_actions() {
        let req = decode_request(r#"{"action":"contentScriptReady"}"#).unwrap();
        assert_eq!(req, CoordinatorRequest::ContentScriptReady);
    }

    #[test]
    fn decodes_capture_screen_payload() {
        let raw = r#"{"action":"captureScreen","data":{"left":1,"top":2,"width":30,"height":40,"devicePixelRatio":2}}"#;
        match decode_request(raw).unwrap() {
            CoordinatorRequest::CaptureScreen { data } => {
                assert_eq!(data.device_pixel_ratio, 2.0);
                assert_eq!(data.width, 30.0);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn unknown_action_is_reported_by_name() {
        let err = decode_request(r#"{"action":"sendToAPI"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownAction(ref a) if a == "sendToAPI"));
    }

    #[test]
    fn missing_action_is_rejected() {
        let err = decode_command(r#"{"width": 400}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingAction));
    }

    #[test]
    fn malformed_payload_names_the_action() {
        let err = decode_command(r#"{"action":"globalSidebarStateChanged"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { ref action, .. } if action == "globalSidebarStateChanged"));
    }

    #[test]
    fn capture_failure_decodes_before_plain_ack() {
        let resp: CoordinatorResponse =
            serde_json::from_str(r#"{"success":false,"error":"denied"}"#).unwrap();
        assert_eq!(resp, CoordinatorResponse::capture_failed("denied"));
    }

    #[test]
    fn ready_response_wraps_state() {
        let resp = CoordinatorResponse::Ready {
            sidebar_state: GlobalSidebarState::default(),
        };
        assert_eq!(
            serde_json::to_value(resp).unwrap(),
            json!({"sidebarState": {"isOpen": false, "width": 400}})
        );
    }

    #[test]
    fn overlay_set_image_round_trips_through_wire_names() {
        let raw = r#"{"action":"setImage","imageData":"data:image/png;base64,AA=="}"#;
        let msg: OverlayMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            msg,
            OverlayMessage::SetImage {
                image_data: "data:image/png;base64,AA==".to_string()
            }
        );
    }
}
