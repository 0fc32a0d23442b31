//! In-memory doubles for [`crate::net::NetworkEffects`] and
//! [`crate::data_store::DataStoreEffects`] (C11), enabled by the
//! `test-support` feature so integration tests and downstream crates can
//! drive a [`crate::engine::SyncEngine`] without a real NDN face or
//! object store.

use crate::action::ActionEntry;
use crate::data_store::{DataStatus, DataStoreEffects};
use crate::errors::Result;
use crate::identifiers::Name;
use crate::net::NetworkEffects;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// One Interest expressed, or one Data published, recorded by
/// [`RecordingNetwork`] for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Interest { name: Name, lifetime: Duration },
    Data { name: Name, content: Vec<u8>, freshness: Duration },
}

/// A `NetworkEffects` double that records every Interest/Data instead of
/// placing it on a wire. Tests drive the protocol by reading the recorded
/// events and feeding the corresponding `on_*` calls to the peer engine(s)
/// under test.
#[derive(Debug, Default)]
pub struct RecordingNetwork {
    events: Mutex<Vec<NetworkEvent>>,
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain every event recorded since the last drain.
    pub fn drain(&self) -> Vec<NetworkEvent> {
        std::mem::take(&mut self.events.lock().expect("recording network lock poisoned"))
    }

    pub fn events(&self) -> Vec<NetworkEvent> {
        self.events.lock().expect("recording network lock poisoned").clone()
    }
}

#[async_trait]
impl NetworkEffects for RecordingNetwork {
    async fn express_interest(&self, name: Name, lifetime: Duration) -> Result<()> {
        self.events
            .lock()
            .expect("recording network lock poisoned")
            .push(NetworkEvent::Interest { name, lifetime });
        Ok(())
    }

    async fn publish_data(&self, name: Name, content: Vec<u8>, freshness: Duration) -> Result<()> {
        self.events
            .lock()
            .expect("recording network lock poisoned")
            .push(NetworkEvent::Data { name, content, freshness });
        Ok(())
    }
}

/// A `DataStoreEffects` double backed by an in-memory status map. An
/// insertion records `Inserted`; a deletion records `Deleted`; `contains`
/// and `len` treat only `Existed`/`Inserted` as "present", matching a real
/// store's notion of current membership.
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    statuses: Mutex<HashMap<Name, DataStatus>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of data objects currently present (`Existed` or `Inserted`).
    pub fn len(&self) -> usize {
        self.statuses
            .lock()
            .expect("in-memory data store lock poisoned")
            .values()
            .filter(|s| matches!(s, DataStatus::Existed | DataStatus::Inserted))
            .count()
    }

    /// Seed a data object as present without going through an applied
    /// action, e.g. to exercise the `Existed` branch of snapshot
    /// comparison in tests.
    pub fn seed_existing(&self, data_name: &Name) {
        self.statuses
            .lock()
            .expect("in-memory data store lock poisoned")
            .insert(data_name.clone(), DataStatus::Existed);
    }
}

#[async_trait]
impl DataStoreEffects for InMemoryDataStore {
    async fn apply(&self, action: &ActionEntry) -> Result<()> {
        let mut statuses = self.statuses.lock().expect("in-memory data store lock poisoned");
        match action.action {
            crate::action::ActionKind::Insertion => {
                statuses.insert(action.data_name.clone(), DataStatus::Inserted);
            }
            crate::action::ActionKind::Deletion => {
                statuses.insert(action.data_name.clone(), DataStatus::Deleted);
            }
            crate::action::ActionKind::Others => {}
        }
        Ok(())
    }

    async fn contains(&self, action: &ActionEntry) -> Result<bool> {
        Ok(matches!(
            self.statuses
                .lock()
                .expect("in-memory data store lock poisoned")
                .get(&action.data_name),
            Some(DataStatus::Existed) | Some(DataStatus::Inserted)
        ))
    }

    async fn status(&self, data_name: &Name) -> Result<DataStatus> {
        Ok(self
            .statuses
            .lock()
            .expect("in-memory data store lock poisoned")
            .get(data_name)
            .copied()
            .unwrap_or(DataStatus::None))
    }

    async fn adopt(&self, data_name: &Name) -> Result<()> {
        self.statuses
            .lock()
            .expect("in-memory data store lock poisoned")
            .insert(data_name.clone(), DataStatus::Existed);
        Ok(())
    }

    async fn discard(&self, data_name: &Name) -> Result<()> {
        self.statuses
            .lock()
            .expect("in-memory data store lock poisoned")
            .insert(data_name.clone(), DataStatus::Deleted);
        Ok(())
    }

    async fn enumerate(&self) -> Result<Vec<(Name, DataStatus)>> {
        Ok(self
            .statuses
            .lock()
            .expect("in-memory data store lock poisoned")
            .iter()
            .map(|(name, status)| (name.clone(), *status))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;

    #[tokio::test]
    async fn recording_network_captures_interests_and_data() {
        let net = RecordingNetwork::new();
        net.express_interest(Name::parse("/repo/sync/abcd"), Duration::from_secs(4))
            .await
            .unwrap();
        net.publish_data(Name::parse("/repo/sync/abcd"), vec![1, 2, 3], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(net.events().len(), 2);
        assert_eq!(net.drain().len(), 2);
        assert!(net.events().is_empty());
    }

    #[tokio::test]
    async fn in_memory_data_store_tracks_insert_and_delete() {
        let store = InMemoryDataStore::new();
        let action = ActionEntry::new(
            Name::parse("/repo/0"),
            1,
            ActionKind::Insertion,
            Name::parse("/example/data/x"),
            1,
        );
        store.apply(&action).await.unwrap();
        assert!(store.contains(&action).await.unwrap());

        let delete = ActionEntry::new(
            Name::parse("/repo/0"),
            2,
            ActionKind::Deletion,
            Name::parse("/example/data/x"),
            1,
        );
        store.apply(&delete).await.unwrap();
        assert!(!store.contains(&action).await.unwrap());
    }

    #[tokio::test]
    async fn status_enumerate_adopt_and_discard_round_trip() {
        let store = InMemoryDataStore::new();
        let name = Name::parse("/example/data/x");
        assert_eq!(store.status(&name).await.unwrap(), DataStatus::None);

        store.adopt(&name).await.unwrap();
        assert_eq!(store.status(&name).await.unwrap(), DataStatus::Existed);
        assert_eq!(store.enumerate().await.unwrap(), vec![(name.clone(), DataStatus::Existed)]);
        assert_eq!(store.len(), 1);

        store.discard(&name).await.unwrap();
        assert_eq!(store.status(&name).await.unwrap(), DataStatus::Deleted);
        assert_eq!(store.len(), 0);
    }
}
