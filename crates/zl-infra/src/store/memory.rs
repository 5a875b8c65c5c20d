//! In-memory connection store
//!
//! Backs the store port for tests and single-process deployments.
//! Records live in a map keyed by id; name uniqueness is enforced at
//! create time.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use zl_core::connection::model::{
    ChannelProfile, ConnectionInstance, ConnectionStatus, NewConnection,
};
use zl_core::ids::{InstanceId, InstanceName};
use zl_core::ports::connection_store::ConnectionStorePort;
use zl_core::ports::errors::ConnectionStoreError;

#[derive(Default)]
pub struct MemoryConnectionStore {
    records: RwLock<HashMap<InstanceId, ConnectionInstance>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStorePort for MemoryConnectionStore {
    async fn create(
        &self,
        record: NewConnection,
    ) -> Result<ConnectionInstance, ConnectionStoreError> {
        let mut records = self.records.write().await;
        if records.values().any(|r| r.name == record.name) {
            return Err(ConnectionStoreError::DuplicateName(
                record.name.as_str().to_owned(),
            ));
        }

        let now = Utc::now();
        let instance = ConnectionInstance {
            id: InstanceId::new(Uuid::new_v4().to_string()),
            name: record.name,
            status: record.status,
            profile: None,
            external_instance_id: None,
            created_at: now,
            updated_at: now,
        };
        records.insert(instance.id.clone(), instance.clone());
        Ok(instance)
    }

    async fn get(
        &self,
        id: &InstanceId,
    ) -> Result<Option<ConnectionInstance>, ConnectionStoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn get_by_name(
        &self,
        name: &InstanceName,
    ) -> Result<Option<ConnectionInstance>, ConnectionStoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| &r.name == name)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<ConnectionInstance>, ConnectionStoreError> {
        let mut all: Vec<ConnectionInstance> =
            self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.as_str().cmp(b.name.as_str()))
        });
        Ok(all)
    }

    async fn set_status(
        &self,
        id: &InstanceId,
        status: ConnectionStatus,
    ) -> Result<(), ConnectionStoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or(ConnectionStoreError::NotFound)?;
        record.status = status;
        if status != ConnectionStatus::Connected {
            record.profile = None;
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_connected(
        &self,
        id: &InstanceId,
        profile: ChannelProfile,
    ) -> Result<(), ConnectionStoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or(ConnectionStoreError::NotFound)?;
        record.status = ConnectionStatus::Connected;
        record.profile = Some(profile);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn set_external_instance_id(
        &self,
        id: &InstanceId,
        external_instance_id: String,
    ) -> Result<(), ConnectionStoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or(ConnectionStoreError::NotFound)?;
        record.external_instance_id = Some(external_instance_id);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: &InstanceId) -> Result<(), ConnectionStoreError> {
        self.records
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or(ConnectionStoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_connection(name: &str) -> NewConnection {
        NewConnection {
            name: InstanceName::parse(name).unwrap(),
            status: ConnectionStatus::Connecting,
        }
    }

    fn profile() -> ChannelProfile {
        ChannelProfile {
            profile_name: Some("Sales Desk".to_string()),
            phone: Some("5511999990000".to_string()),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_an_id_and_round_trips() {
        let store = MemoryConnectionStore::new();
        let created = store.create(new_connection("sales-01")).await.unwrap();

        assert!(!created.id.as_str().is_empty());
        assert_eq!(created.status, ConnectionStatus::Connecting);
        assert!(created.profile.is_none());

        let fetched = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);

        let by_name = store
            .get_by_name(&created.name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_name.id, created.id);
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let store = MemoryConnectionStore::new();
        store.create(new_connection("sales-01")).await.unwrap();

        let err = store.create(new_connection("sales-01")).await.unwrap_err();
        assert_eq!(
            err,
            ConnectionStoreError::DuplicateName("sales-01".to_string())
        );
    }

    #[tokio::test]
    async fn set_status_clears_the_profile_unless_connected() {
        let store = MemoryConnectionStore::new();
        let created = store.create(new_connection("sales-01")).await.unwrap();
        store.mark_connected(&created.id, profile()).await.unwrap();

        let record = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(record.status, ConnectionStatus::Connected);
        assert!(record.profile.is_some());

        store
            .set_status(&created.id, ConnectionStatus::Disconnected)
            .await
            .unwrap();
        let record = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(record.status, ConnectionStatus::Disconnected);
        assert!(record.profile.is_none());
    }

    #[tokio::test]
    async fn external_id_is_persisted() {
        let store = MemoryConnectionStore::new();
        let created = store.create(new_connection("sales-01")).await.unwrap();
        store
            .set_external_instance_id(&created.id, "ext-42".to_string())
            .await
            .unwrap();

        let record = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(record.external_instance_id.as_deref(), Some("ext-42"));
    }

    #[tokio::test]
    async fn list_all_is_ordered_by_creation() {
        let store = MemoryConnectionStore::new();
        store.create(new_connection("sales-01")).await.unwrap();
        store.create(new_connection("support-01")).await.unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name.as_str(), "sales-01");
        assert_eq!(all[1].name.as_str(), "support-01");
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let store = MemoryConnectionStore::new();
        let created = store.create(new_connection("sales-01")).await.unwrap();

        store.delete(&created.id).await.unwrap();
        assert!(store.get(&created.id).await.unwrap().is_none());
        assert_eq!(
            store.delete(&created.id).await.unwrap_err(),
            ConnectionStoreError::NotFound
        );
    }

    #[tokio::test]
    async fn mutations_on_missing_records_fail() {
        let store = MemoryConnectionStore::new();
        let missing = InstanceId::from("nope");

        assert_eq!(
            store
                .set_status(&missing, ConnectionStatus::Expired)
                .await
                .unwrap_err(),
            ConnectionStoreError::NotFound
        );
        assert_eq!(
            store.mark_connected(&missing, profile()).await.unwrap_err(),
            ConnectionStoreError::NotFound
        );
    }
}
