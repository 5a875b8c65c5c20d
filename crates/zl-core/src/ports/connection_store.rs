use async_trait::async_trait;

use super::errors::ConnectionStoreError;
use crate::connection::model::{
    ChannelProfile, ConnectionInstance, ConnectionStatus, NewConnection,
};
use crate::ids::{InstanceId, InstanceName};

/// Persisted connection record CRUD. The record for a given id is only
/// ever mutated through its owning orchestrator session.
#[async_trait]
pub trait ConnectionStorePort: Send + Sync {
    /// Creates a record; fails with `DuplicateName` when the name is taken.
    async fn create(&self, record: NewConnection)
        -> Result<ConnectionInstance, ConnectionStoreError>;

    async fn get(&self, id: &InstanceId)
        -> Result<Option<ConnectionInstance>, ConnectionStoreError>;

    async fn get_by_name(
        &self,
        name: &InstanceName,
    ) -> Result<Option<ConnectionInstance>, ConnectionStoreError>;

    async fn list_all(&self) -> Result<Vec<ConnectionInstance>, ConnectionStoreError>;

    /// Sets the status; clears the profile unless the status is `Connected`.
    async fn set_status(
        &self,
        id: &InstanceId,
        status: ConnectionStatus,
    ) -> Result<(), ConnectionStoreError>;

    /// Atomically persists `Connected` together with its profile.
    async fn mark_connected(
        &self,
        id: &InstanceId,
        profile: ChannelProfile,
    ) -> Result<(), ConnectionStoreError>;

    async fn set_external_instance_id(
        &self,
        id: &InstanceId,
        external_instance_id: String,
    ) -> Result<(), ConnectionStoreError>;

    async fn delete(&self, id: &InstanceId) -> Result<(), ConnectionStoreError>;
}
