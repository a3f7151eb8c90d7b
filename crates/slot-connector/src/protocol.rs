//! Wire protocol for the game server link
//!
//! Every message is one JSON frame `{ "type", "id", "data", "timestamp" }`.
//! Over TCP frames are newline-delimited; over WebSocket each text message
//! carries one frame.
//!
//! | type             | direction | data                        |
//! |------------------|-----------|-----------------------------|
//! | `auth`           | out       | `{ "token" }`               |
//! | `spin`           | out       | `SpinRequest`               |
//! | `stop_auto_spin` | out       | `{ "machineId" }`           |
//! | `heartbeat`      | both      | `null`                      |
//! | `spin_result`    | in        | `SpinOutcome`, echoes `id`  |
//! | `error`          | in        | `{ "message" }`, echoes `id`|

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use slot_core::{MachineId, SpinOutcome, SpinRequest};
use slot_session::ProviderError;

/// Connection protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// WebSocket connection
    WebSocket {
        /// WebSocket URL (ws:// or wss://)
        url: String,
    },
    /// Newline-delimited JSON over TCP
    Tcp { host: String, port: u16 },
}

impl Protocol {
    /// Parse `ws://`, `wss://` or `tcp://host:port`
    pub fn from_url(address: &str) -> Result<Self, String> {
        let parsed = url::Url::parse(address).map_err(|e| format!("Invalid URL: {}", e))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(Self::WebSocket {
                url: address.to_string(),
            }),
            "tcp" => {
                let host = parsed
                    .host_str()
                    .ok_or_else(|| "TCP address needs a host".to_string())?;
                let port = parsed
                    .port()
                    .ok_or_else(|| "TCP address needs a port".to_string())?;
                Ok(Self::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            other => Err(format!("Unsupported scheme: {}", other)),
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub protocol: Protocol,

    /// Authentication token (if required)
    pub auth_token: Option<String>,

    /// Connection timeout in milliseconds
    pub timeout_ms: u32,

    /// Heartbeat period in milliseconds (0 disables)
    #[serde(default)]
    pub heartbeat_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::WebSocket {
                url: "ws://localhost:8080".to_string(),
            },
            auth_token: None,
            timeout_ms: 5000,
            heartbeat_ms: 0,
        }
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// Link dropped with an error
    Error,
}

/// Wire format for protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolFrame {
    #[serde(rename = "type")]
    pub frame_type: String,

    /// Request/response correlation ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub data: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

pub const FRAME_SPIN: &str = "spin";
pub const FRAME_SPIN_RESULT: &str = "spin_result";
pub const FRAME_ERROR: &str = "error";
pub const FRAME_STOP_AUTO_SPIN: &str = "stop_auto_spin";
pub const FRAME_AUTH: &str = "auth";
pub const FRAME_HEARTBEAT: &str = "heartbeat";

impl ProtocolFrame {
    fn new(frame_type: &str, id: Option<&str>, data: Value) -> Self {
        Self {
            frame_type: frame_type.to_string(),
            id: id.map(str::to_string),
            data,
            timestamp: Some(current_time_ms()),
        }
    }

    /// Spin request frame
    pub fn spin(id: &str, request: &SpinRequest) -> Result<Self, serde_json::Error> {
        Ok(Self::new(FRAME_SPIN, Some(id), serde_json::to_value(request)?))
    }

    /// Best-effort notice that the player stopped auto-spin
    pub fn stop_auto_spin(machine_id: &MachineId) -> Self {
        Self::new(
            FRAME_STOP_AUTO_SPIN,
            None,
            json!({ "machineId": machine_id.as_str() }),
        )
    }

    pub fn auth(token: &str) -> Self {
        Self::new(FRAME_AUTH, None, json!({ "token": token }))
    }

    pub fn heartbeat() -> Self {
        Self::new(FRAME_HEARTBEAT, None, Value::Null)
    }

    /// Successful spin response
    pub fn spin_result(id: &str, outcome: &SpinOutcome) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            FRAME_SPIN_RESULT,
            Some(id),
            serde_json::to_value(outcome)?,
        ))
    }

    /// Error response
    pub fn error(id: Option<&str>, message: &str) -> Self {
        Self::new(FRAME_ERROR, id, json!({ "message": message }))
    }

    /// Interpret a response frame as a spin result.
    ///
    /// `None` for frames that do not answer a spin.
    pub fn into_spin_result(self) -> Option<Result<SpinOutcome, ProviderError>> {
        match self.frame_type.as_str() {
            FRAME_SPIN_RESULT => Some(
                serde_json::from_value::<SpinOutcome>(self.data)
                    .map_err(|e| ProviderError::MalformedOutcome(e.to_string())),
            ),
            FRAME_ERROR => {
                let message = self
                    .data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified server error")
                    .to_string();
                Some(Err(ProviderError::Rejected(message)))
            }
            _ => None,
        }
    }
}

fn current_time_ms() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64
}
