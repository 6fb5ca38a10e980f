//! WebSocket protocol surface.
//!
//! Both endpoints speak text JSON with a common envelope
//! `{type, payload, timestamp}`; the server stamps `timestamp` on every
//! outbound message. Binary frames are unused.

mod connection;
mod speaker;
mod viewer;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use connection::{Connection, ConnectionReader};
pub use speaker::speaker_ws;
pub use viewer::viewer_ws;

use crate::subtitle::Subtitle;

/// Read side gives up when the client stays silent this long.
pub const READ_DEADLINE: Duration = Duration::from_secs(60);
/// Protocol pings on the idle write side.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);
/// A single write may not take longer than this.
pub const WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// Outbound message queue per connection.
pub const SEND_QUEUE_CAPACITY: usize = 256;

pub const ERR_AUTH_FAILED: &str = "AUTH_FAILED";
pub const ERR_SESSION_FAILED: &str = "SESSION_FAILED";
pub const ERR_ADD_VIEWER_FAILED: &str = "ADD_VIEWER_FAILED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Auth,
    Ping,
    Pong,
    State,
    Error,
    Audio,
    Control,
    Subtitle,
    History,
}

/// The JSON envelope every application message travels in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    /// Set by the server on outbound messages; clients may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Speaker -> server: one base64 chunk of 16-bit LE PCM at 16 kHz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioPayload {
    pub chunk: String,
    #[serde(default)]
    pub sequence: i64,
}

/// Speaker -> server: START, STOP or PAUSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPayload {
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePayload {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// The subtitle frame a speaker receives: original plus metadata, no
/// translations map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerSubtitlePayload {
    pub id: String,
    pub original: String,
    pub source_lang: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f32,
}

impl From<&Subtitle> for SpeakerSubtitlePayload {
    fn from(subtitle: &Subtitle) -> Self {
        Self {
            id: subtitle.id.clone(),
            original: subtitle.original.clone(),
            source_lang: subtitle.source_lang.clone(),
            timestamp: subtitle.timestamp,
            confidence: subtitle.confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPayload {
    pub subtitles: Vec<crate::subtitle::SubtitleForViewer>,
}

/// Query parameters both endpoints require on upgrade. Defaults keep the
/// upgrade itself succeeding so the missing-parameter error can travel as
/// an ERROR frame instead of a bare HTTP 400.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "activityId", default)]
    pub activity_id: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub language: String,
}

impl SessionQuery {
    pub fn is_complete(&self) -> bool {
        !self.activity_id.is_empty() && !self.token.is_empty() && !self.language.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_types_use_wire_names() {
        let json = serde_json::to_string(&MessageType::Subtitle).unwrap();
        assert_eq!(json, "\"SUBTITLE\"");
        let parsed: MessageType = serde_json::from_str("\"AUDIO\"").unwrap();
        assert_eq!(parsed, MessageType::Audio);
    }

    #[test]
    fn envelope_without_timestamp_parses() {
        let msg: WsMessage =
            serde_json::from_str(r#"{"type":"PONG"}"#).unwrap();
        assert_eq!(msg.message_type, MessageType::Pong);
        assert!(msg.timestamp.is_none());
        assert!(msg.payload.is_null());
    }

    #[test]
    fn audio_payload_roundtrip() {
        let msg: WsMessage = serde_json::from_str(
            r#"{"type":"AUDIO","payload":{"chunk":"AAEC","sequence":7}}"#,
        )
        .unwrap();
        let audio: AudioPayload = serde_json::from_value(msg.payload).unwrap();
        assert_eq!(audio.chunk, "AAEC");
        assert_eq!(audio.sequence, 7);
    }
}
