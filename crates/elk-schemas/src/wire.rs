//! Wire protocol for lock traffic.
//!
//! Every frame is an [`Envelope`]: `{"event": "<name>", "payload": <json>}`.
//! The event name carries both the message kind and the record type
//! (`start_edit_estimate`, `locked_invoices`, ...). Envelopes are decoded into
//! the closed unions [`ClientMessage`] / [`ServerMessage`] at the transport
//! boundary; nothing past that boundary sees untyped JSON except the
//! free-form payload of `expired_<type>s_closed`, which belongs to the
//! external record-expiry job.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{LockSnapshot, RecordId, RecordType, User};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Raw frame as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn decode(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(|e| WireError::Malformed(e.to_string()))
    }

    pub fn encode(&self) -> String {
        // Value trees with string keys always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// WireError
// ---------------------------------------------------------------------------

/// Reasons a frame is rejected at the boundary. Rejected frames are dropped;
/// they never reach the lease manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireError {
    /// Frame is not a JSON envelope at all.
    Malformed(String),
    /// Event name is not one of the known kinds for a known record type.
    UnknownEvent(String),
    /// Event requires a payload but none was sent.
    MissingPayload { event: String },
    /// Payload does not match the shape required by the event.
    InvalidPayload { event: String, reason: String },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Malformed(reason) => write!(f, "malformed frame: {reason}"),
            WireError::UnknownEvent(event) => write!(f, "unknown event: {event}"),
            WireError::MissingPayload { event } => write!(f, "missing payload for {event}"),
            WireError::InvalidPayload { event, reason } => {
                write!(f, "invalid payload for {event}: {reason}")
            }
        }
    }
}

impl std::error::Error for WireError {}

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct EditPayload {
    record_id: RecordId,
    user: User,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct HeartbeatPayload {
    record_id: RecordId,
}

fn payload<T: DeserializeOwned>(event: &str, v: Value) -> Result<T, WireError> {
    if v.is_null() {
        return Err(WireError::MissingPayload {
            event: event.to_string(),
        });
    }
    serde_json::from_value(v).map_err(|e| WireError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

fn to_value<T: Serialize>(v: &T) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// ClientMessage
// ---------------------------------------------------------------------------

/// Messages a client session sends to the coordinator.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    /// `start_edit_<type>`: acquire the edit lease for a record.
    StartEdit {
        record_type: RecordType,
        record_id: RecordId,
        user: User,
    },
    /// `heartbeat_edit_<type>`: renew the lease this connection holds.
    Heartbeat {
        record_type: RecordType,
        record_id: RecordId,
    },
    /// `stop_edit_<type>`: release the lease.
    StopEdit {
        record_type: RecordType,
        record_id: RecordId,
        user: User,
    },
    /// `start_listening_<type>s`: subscribe to lock snapshots for a topic.
    StartListening { record_type: RecordType },
}

impl ClientMessage {
    pub fn record_type(&self) -> RecordType {
        match self {
            ClientMessage::StartEdit { record_type, .. }
            | ClientMessage::Heartbeat { record_type, .. }
            | ClientMessage::StopEdit { record_type, .. }
            | ClientMessage::StartListening { record_type } => *record_type,
        }
    }

    pub fn event_name(&self) -> String {
        match self {
            ClientMessage::StartEdit { record_type, .. } => {
                format!("start_edit_{}", record_type.as_str())
            }
            ClientMessage::Heartbeat { record_type, .. } => {
                format!("heartbeat_edit_{}", record_type.as_str())
            }
            ClientMessage::StopEdit { record_type, .. } => {
                format!("stop_edit_{}", record_type.as_str())
            }
            ClientMessage::StartListening { record_type } => {
                format!("start_listening_{}", record_type.topic())
            }
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let payload = match self {
            ClientMessage::StartEdit {
                record_id, user, ..
            }
            | ClientMessage::StopEdit {
                record_id, user, ..
            } => to_value(&EditPayload {
                record_id: *record_id,
                user: user.clone(),
            }),
            ClientMessage::Heartbeat { record_id, .. } => to_value(&HeartbeatPayload {
                record_id: *record_id,
            }),
            ClientMessage::StartListening { .. } => Value::Null,
        };
        Envelope {
            event: self.event_name(),
            payload,
        }
    }

    pub fn from_envelope(env: Envelope) -> Result<Self, WireError> {
        let Envelope { event, payload: body } = env;
        let unknown = || WireError::UnknownEvent(event.clone());

        if let Some(name) = event.strip_prefix("start_edit_") {
            let record_type = RecordType::from_name(name).ok_or_else(unknown)?;
            let p: EditPayload = payload(&event, body)?;
            return Ok(ClientMessage::StartEdit {
                record_type,
                record_id: p.record_id,
                user: p.user,
            });
        }
        if let Some(name) = event.strip_prefix("heartbeat_edit_") {
            let record_type = RecordType::from_name(name).ok_or_else(unknown)?;
            let p: HeartbeatPayload = payload(&event, body)?;
            return Ok(ClientMessage::Heartbeat {
                record_type,
                record_id: p.record_id,
            });
        }
        if let Some(name) = event.strip_prefix("stop_edit_") {
            let record_type = RecordType::from_name(name).ok_or_else(unknown)?;
            let p: EditPayload = payload(&event, body)?;
            return Ok(ClientMessage::StopEdit {
                record_type,
                record_id: p.record_id,
                user: p.user,
            });
        }
        if let Some(topic) = event.strip_prefix("start_listening_") {
            let record_type = RecordType::from_topic(topic).ok_or_else(unknown)?;
            return Ok(ClientMessage::StartListening { record_type });
        }
        Err(unknown())
    }

    pub fn decode(text: &str) -> Result<Self, WireError> {
        Self::from_envelope(Envelope::decode(text)?)
    }

    pub fn encode(&self) -> String {
        self.to_envelope().encode()
    }
}

// ---------------------------------------------------------------------------
// ServerMessage
// ---------------------------------------------------------------------------

/// Messages the coordinator pushes to subscribers of a topic.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    /// `locked_<type>s`: full lock snapshot for the topic.
    Locked {
        record_type: RecordType,
        holders: LockSnapshot,
    },
    /// `expired_<type>s_closed`: emitted by the external record-expiry job;
    /// consumers re-fetch their list. Payload shape is owned by that job.
    ExpiredClosed {
        record_type: RecordType,
        payload: Value,
    },
}

impl ServerMessage {
    pub fn record_type(&self) -> RecordType {
        match self {
            ServerMessage::Locked { record_type, .. }
            | ServerMessage::ExpiredClosed { record_type, .. } => *record_type,
        }
    }

    pub fn event_name(&self) -> String {
        match self {
            ServerMessage::Locked { record_type, .. } => format!("locked_{}", record_type.topic()),
            ServerMessage::ExpiredClosed { record_type, .. } => {
                format!("expired_{}_closed", record_type.topic())
            }
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let payload = match self {
            ServerMessage::Locked { holders, .. } => to_value(holders),
            ServerMessage::ExpiredClosed { payload, .. } => payload.clone(),
        };
        Envelope {
            event: self.event_name(),
            payload,
        }
    }

    pub fn from_envelope(env: Envelope) -> Result<Self, WireError> {
        let Envelope { event, payload: body } = env;

        if let Some(topic) = event.strip_prefix("locked_") {
            let record_type = RecordType::from_topic(topic)
                .ok_or_else(|| WireError::UnknownEvent(event.clone()))?;
            // An empty topic is sent as `{}`; tolerate `null` from older peers.
            let holders = if body.is_null() {
                LockSnapshot::new()
            } else {
                payload(&event, body)?
            };
            return Ok(ServerMessage::Locked {
                record_type,
                holders,
            });
        }
        if let Some(topic) = event
            .strip_prefix("expired_")
            .and_then(|rest| rest.strip_suffix("_closed"))
        {
            let record_type = RecordType::from_topic(topic)
                .ok_or_else(|| WireError::UnknownEvent(event.clone()))?;
            return Ok(ServerMessage::ExpiredClosed {
                record_type,
                payload: body,
            });
        }
        Err(WireError::UnknownEvent(event))
    }

    pub fn decode(text: &str) -> Result<Self, WireError> {
        Self::from_envelope(Envelope::decode(text)?)
    }

    pub fn encode(&self) -> String {
        self.to_envelope().encode()
    }
}
