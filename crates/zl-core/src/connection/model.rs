use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{InstanceId, InstanceName};

/// Lifecycle status of a channel connection record.
///
/// ```text
/// disconnected ──► connecting ──► qr_pending ──► connected
///                                     │              │
///                                     ▼              ▼
///                                  expired ────► disconnected
///                                     │   (cancel)
///                                     └──► qr_pending (regenerate)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No provider session; record may still exist
    Disconnected,

    /// Provider create/fetch-pairing calls in flight
    Connecting,

    /// A non-expired pairing code is on screen, status polling active
    QrPending,

    /// Channel paired; profile is populated
    Connected,

    /// The pairing code lapsed before a successful status match
    Expired,
}

impl ConnectionStatus {
    /// States with live timer/poller resources attached
    pub fn is_pairing(self) -> bool {
        matches!(self, Self::Connecting | Self::QrPending)
    }

    /// States from which a fresh `start_pairing` is allowed
    pub fn can_start(self) -> bool {
        matches!(self, Self::Disconnected)
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Account profile reported by the provider once a channel is paired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelProfile {
    pub profile_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

impl ChannelProfile {
    pub fn is_empty(&self) -> bool {
        self.profile_name.is_none() && self.phone.is_none() && self.avatar_url.is_none()
    }
}

/// Time-boxed pairing code. `expires_at` is fixed at issuance; the
/// provider does not control the lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingCode {
    /// Renderable `data:image/...` URL
    pub image: String,

    /// Human-typable alternative code, when the provider offers one
    pub pairing_text: Option<String>,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PairingCode {
    pub fn issue(
        image: String,
        pairing_text: Option<String>,
        issued_at: DateTime<Utc>,
        lifetime: std::time::Duration,
    ) -> Self {
        let lifetime = Duration::from_std(lifetime).unwrap_or_else(|_| Duration::seconds(60));
        Self {
            image,
            pairing_text,
            issued_at,
            expires_at: issued_at + lifetime,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Canonical view of one provider status-check response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPayload {
    pub connected: bool,

    /// Raw status string when the provider sent one, for logging
    pub state: Option<String>,

    pub profile: Option<ChannelProfile>,
}

/// One persisted connection record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInstance {
    pub id: InstanceId,
    pub name: InstanceName,
    pub status: ConnectionStatus,
    pub profile: Option<ChannelProfile>,

    /// Provider-assigned identifier; may differ from `name`
    pub external_instance_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a provisional record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnection {
    pub name: InstanceName,
    pub status: ConnectionStatus,
}
