//! Access control: speaker tokens, viewer invite codes, viewer entry.
//!
//! Session establishment for both socket kinds goes through this module:
//! the speaker presents a long opaque token, viewers present a short
//! invite code distributed through the activity's share URL / QR payload.
//! Token expiry is lazy: any read that observes an active token past its
//! deadline promotes it to expired on the spot, so no background sweeper
//! is needed.

mod service;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use service::AccessService;
pub use store::{AccessStore, MemoryAccessStore};

/// Token kinds. Speaker tokens are long random strings compared exactly;
/// viewer codes are short, human-enterable, compared case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Speaker,
    Viewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Revoked,
    Expired,
}

/// A credential bound to one activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityToken {
    pub id: String,
    pub activity_id: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_audience: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub status: TokenStatus,
}

impl ActivityToken {
    /// Whether the wall clock has passed the token's deadline. Status is
    /// updated separately via lazy promotion.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Parameters for viewer invite-code generation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateViewerTokenRequest {
    /// Cap on concurrent viewers; recorded when positive.
    #[serde(default)]
    pub max_audience: Option<u32>,
    /// Overrides the default code lifetime when positive.
    #[serde(default)]
    pub ttl_minutes: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerEntryStatus {
    Inactive,
    Active,
    Revoked,
}

/// The shareable handle viewers join through: a URL plus its QR payload.
/// At most one entry exists per activity; its status gates admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerEntry {
    pub activity_id: String,
    pub share_url: String,
    pub qr_type: String,
    pub qr_content: String,
    pub status: ViewerEntryStatus,
    pub updated_at: DateTime<Utc>,
}
