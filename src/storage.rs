use crate::models::{NewPrediction, PredictionRecord};
use crate::store::{newest_first, DocumentStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, sync::Mutex};
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogFile {
    pub user_logs: Vec<PredictionRecord>,
}

pub async fn load_logs(path: &Path) -> LogFile {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse log file {}: {err}", path.display());
                LogFile::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => LogFile::default(),
        Err(err) => {
            error!("failed to read log file {}: {err}", path.display());
            LogFile::default()
        }
    }
}

pub async fn persist_logs(path: &Path, data: &LogFile) -> Result<(), StoreError> {
    let payload = serde_json::to_vec_pretty(data)?;
    fs::write(path, payload).await?;
    Ok(())
}

/// `user_logs` kept in a local JSON file, rewritten after every insert.
#[derive(Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    data: Arc<Mutex<LogFile>>,
}

impl JsonFileStore {
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let data = load_logs(&path).await;
        Ok(Self {
            path,
            data: Arc::new(Mutex::new(data)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn name_taken(&self, name: &str) -> Result<bool, StoreError> {
        let data = self.data.lock().await;
        Ok(data.user_logs.iter().any(|record| record.name == name))
    }

    async fn insert(&self, entry: &NewPrediction) -> Result<PredictionRecord, StoreError> {
        let record = PredictionRecord::from_new(entry, Utc::now());
        let mut data = self.data.lock().await;
        data.user_logs.push(record.clone());
        if let Err(err) = persist_logs(&self.path, &data).await {
            data.user_logs.pop();
            return Err(err);
        }
        Ok(record)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PredictionRecord>, StoreError> {
        let data = self.data.lock().await;
        Ok(newest_first(&data.user_logs, limit))
    }
}
