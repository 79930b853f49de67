//! Sync gateway: the only path from a session to the document store.
//!
//! `save` enforces name uniqueness with a query followed by an insert. The two
//! calls are not transactional, so two writers racing on the same name can both
//! pass the check and insert duplicates. Closing that window needs a unique
//! constraint in the store itself.

use crate::models::{NewPrediction, PredictionRecord};
use crate::store::{StoreConnection, StoreError};
use thiserror::Error;
use tracing::{info, warn};

pub const HISTORY_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cloud sync is offline: no document store is connected")]
    NotConnected,
    #[error("the name '{0}' is already taken; choose a different name")]
    DuplicateName(String),
    #[error("document store failure: {0}")]
    Transport(#[from] StoreError),
}

#[derive(Clone)]
pub struct SyncGateway {
    connection: StoreConnection,
}

impl SyncGateway {
    pub fn new(connection: StoreConnection) -> Self {
        Self { connection }
    }

    pub fn disconnected() -> Self {
        Self::new(StoreConnection::Disconnected)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn backend(&self) -> &'static str {
        match &self.connection {
            StoreConnection::Disconnected => "none",
            StoreConnection::Connected(store) => store.backend(),
        }
    }

    pub async fn save(&self, entry: NewPrediction) -> Result<PredictionRecord, SyncError> {
        let StoreConnection::Connected(store) = &self.connection else {
            return Err(SyncError::NotConnected);
        };

        if store.name_taken(entry.name.as_str()).await? {
            warn!(user = %entry.name, "sync rejected: duplicate name");
            return Err(SyncError::DuplicateName(entry.name.to_string()));
        }

        let record = store.insert(&entry).await?;
        info!(user = %record.name, score = record.score, "prediction synced");
        Ok(record)
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<PredictionRecord>, SyncError> {
        let StoreConnection::Connected(store) = &self.connection else {
            return Err(SyncError::NotConnected);
        };
        Ok(store.recent(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metrics, PersonName};
    use crate::store::{DocumentStore, MemoryStore};
    use async_trait::async_trait;

    fn entry(name: &str, score: f64, metrics: Metrics) -> NewPrediction {
        NewPrediction {
            name: PersonName::parse(name).unwrap(),
            score,
            metrics,
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl DocumentStore for BrokenStore {
        fn backend(&self) -> &'static str {
            "broken"
        }

        async fn name_taken(&self, _name: &str) -> Result<bool, StoreError> {
            Err(StoreError::Status {
                status: 403,
                body: "permission denied".into(),
            })
        }

        async fn insert(&self, _entry: &NewPrediction) -> Result<PredictionRecord, StoreError> {
            panic!("insert must not be reached after a failed lookup");
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<PredictionRecord>, StoreError> {
            Err(StoreError::Protocol("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn disconnected_gateway_fails_fast() {
        let gateway = SyncGateway::disconnected();
        let err = gateway
            .save(entry("Bob", 72.3, Metrics::default()))
            .await
            .expect_err("offline");
        assert!(matches!(err, SyncError::NotConnected));
        assert!(matches!(
            gateway.recent(HISTORY_LIMIT).await,
            Err(SyncError::NotConnected)
        ));
        assert_eq!(gateway.backend(), "none");
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected_without_insert() {
        let store = MemoryStore::new();
        let gateway = SyncGateway::new(StoreConnection::connected(store.clone()));
        gateway
            .save(entry("Alice", 64.0, Metrics::default()))
            .await
            .unwrap();

        let err = gateway
            .save(entry("Alice", 90.0, Metrics::default()))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, SyncError::DuplicateName(ref name) if name == "Alice"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn name_match_is_case_sensitive() {
        let store = MemoryStore::new();
        let gateway = SyncGateway::new(StoreConnection::connected(store.clone()));
        gateway
            .save(entry("Alice", 64.0, Metrics::default()))
            .await
            .unwrap();
        gateway
            .save(entry("alice", 64.0, Metrics::default()))
            .await
            .expect("different case is a different name");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn saved_record_shows_up_in_history() {
        let gateway = SyncGateway::new(StoreConnection::connected(MemoryStore::new()));
        let metrics = Metrics {
            sleep: 7.5,
            work: 8.0,
            exercise: 30,
            caffeine: 2,
            screen: 3.0,
        };
        let stored = gateway.save(entry("Bob", 72.3, metrics)).await.unwrap();

        let history = gateway.recent(HISTORY_LIMIT).await.unwrap();
        assert_eq!(history.len(), 1);
        let record = &history[0];
        assert_eq!(record.name, "Bob");
        assert_eq!(record.score, 72.3);
        assert_eq!(record.metrics, metrics);
        assert_eq!(record.created_at, stored.created_at);
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_transport_error() {
        let gateway = SyncGateway::new(StoreConnection::connected(BrokenStore));
        let err = gateway
            .save(entry("Carol", 50.0, Metrics::default()))
            .await
            .expect_err("broken store");
        assert!(matches!(
            err,
            SyncError::Transport(StoreError::Status { status: 403, .. })
        ));
        assert!(matches!(
            gateway.recent(HISTORY_LIMIT).await,
            Err(SyncError::Transport(_))
        ));
    }
}
