use async_trait::async_trait;

use super::errors::ProviderError;
use crate::connection::model::{ChannelProfile, PairingCode, StatusPayload};
use crate::ids::InstanceName;

/// Result of creating a provider-side instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceCreated {
    /// Provider-assigned identifier, when the payload carried one
    pub external_instance_id: Option<String>,
}

/// Outcome of a fetch-pairing call. Already-paired devices connect
/// without ever issuing a QR; that is a success path, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    Code(PairingCode),
    AlreadyConnected(ChannelProfile),
}

/// Thin client over the provider's five external operations. Each call
/// carries a bounded request timeout enforced locally; `check_status`
/// must be safe to abort mid-flight.
#[async_trait]
pub trait PairingProviderPort: Send + Sync {
    async fn create_instance(&self, name: &InstanceName)
        -> Result<InstanceCreated, ProviderError>;

    async fn fetch_pairing(&self, name: &InstanceName) -> Result<PairingOutcome, ProviderError>;

    async fn check_status(&self, name: &InstanceName) -> Result<StatusPayload, ProviderError>;

    async fn disconnect(&self, name: &InstanceName) -> Result<(), ProviderError>;

    async fn delete_instance(&self, name: &InstanceName) -> Result<(), ProviderError>;
}
