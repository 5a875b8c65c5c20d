use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use zl_core::connection::model::{ChannelProfile, PairingCode};
use zl_core::ids::InstanceId;

/// Lifecycle progress events, broadcast to every subscriber. UI event
/// handlers render these as QR dialogs, toasts and list refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkDomainEvent {
    QrIssued {
        id: InstanceId,
        code: PairingCode,
    },
    Connected {
        id: InstanceId,
        profile: ChannelProfile,
    },
    QrExpired {
        id: InstanceId,
    },
    /// The poller gave up after consecutive failed status checks; the
    /// QR itself is still valid until its own expiry.
    PollExhausted {
        id: InstanceId,
    },
    Disconnected {
        id: InstanceId,
    },
    Deleted {
        id: InstanceId,
    },
    PairingFailed {
        id: InstanceId,
        reason: String,
    },
}

#[async_trait]
pub trait LinkEventPort: Send + Sync {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<LinkDomainEvent>>;
}
