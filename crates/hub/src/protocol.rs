use serde::{Deserialize, Serialize};

use crate::state::SystemStatus;

// ---------------------------------------------------------------------------
// Viewer message types
// ---------------------------------------------------------------------------

/// Inbound commands from a viewer, e.g. `{"type":"start_watering"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    StartWatering,
    StopWatering,
    GetStatus,
}

/// Outbound events, encoded as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    SystemStatus(SystemStatus),
    WateringProgress(WateringProgress),
    Notification(Notification),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WateringProgress {
    pub is_active: bool,
    pub progress: f64,
    pub time_elapsed: i64,
    pub current_moisture: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Notification {
    pub fn error(title: &str, message: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// Parse a text frame into a command.
pub fn parse_command(text: &str) -> Result<Command, String> {
    serde_json::from_str(text).map_err(|e| format!("unrecognised command: {e}"))
}

pub fn encode_event(event: &Event) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

// ===========================================================================
// Tests
// ===========================================================================
