use crate::models::{NewPrediction, PredictionRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

pub const COLLECTION: &str = "user_logs";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("credentials rejected: {0}")]
    Credentials(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A collection of `user_logs` documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Whether any document carries exactly this `name`.
    async fn name_taken(&self, name: &str) -> Result<bool, StoreError>;

    /// Inserts a new document; the store assigns the timestamp.
    async fn insert(&self, entry: &NewPrediction) -> Result<PredictionRecord, StoreError>;

    /// Newest first, at most `limit` records.
    async fn recent(&self, limit: usize) -> Result<Vec<PredictionRecord>, StoreError>;
}

/// Either no store was reached at startup, or a live handle.
#[derive(Clone)]
pub enum StoreConnection {
    Disconnected,
    Connected(Arc<dyn DocumentStore>),
}

impl StoreConnection {
    pub fn connected(store: impl DocumentStore + 'static) -> Self {
        Self::Connected(Arc::new(store))
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

pub(crate) fn newest_first(records: &[PredictionRecord], limit: usize) -> Vec<PredictionRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted.truncate(limit);
    sorted
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<PredictionRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn name_taken(&self, name: &str) -> Result<bool, StoreError> {
        let records = self.records.lock().await;
        Ok(records.iter().any(|record| record.name == name))
    }

    async fn insert(&self, entry: &NewPrediction) -> Result<PredictionRecord, StoreError> {
        let record = PredictionRecord::from_new(entry, Utc::now());
        self.records.lock().await.push(record.clone());
        Ok(record)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PredictionRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(newest_first(&records, limit))
    }
}
