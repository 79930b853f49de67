use crate::firestore::{FirestoreCredentials, FirestoreStore};
use crate::storage::JsonFileStore;
use crate::store::{MemoryStore, StoreConnection};
use std::{env, fs, path::PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MODEL_PATH: &str = "models/alignment_model.json";
const DEFAULT_DATA_PATH: &str = "data/user_logs.json";
const DEFAULT_CREDENTIALS_PATH: &str = "firebase_key.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown APP_STORE '{0}': expected memory, file, firestore or none")]
    UnknownStore(String),
    #[error("no Firestore credentials: set FIREBASE_CREDENTIALS or provide {0}")]
    MissingCredentials(String),
    #[error("invalid Firestore credentials: {0}")]
    InvalidCredentials(#[from] serde_json::Error),
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    None,
    Memory,
    File(PathBuf),
    Firestore,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub model_path: PathBuf,
    pub store: StoreBackend,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = lookup("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let model_path = lookup("APP_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));

        let store = match lookup("APP_STORE").as_deref().map(str::trim) {
            None | Some("") => {
                if credentials_available(&lookup) {
                    StoreBackend::Firestore
                } else {
                    StoreBackend::None
                }
            }
            Some("none") => StoreBackend::None,
            Some("memory") => StoreBackend::Memory,
            Some("file") => StoreBackend::File(
                lookup("APP_DATA_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH)),
            ),
            Some("firestore") => StoreBackend::Firestore,
            Some(other) => return Err(ConfigError::UnknownStore(other.to_string())),
        };

        Ok(Self {
            port,
            model_path,
            store,
        })
    }
}

fn credentials_path(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup("FIREBASE_CREDENTIALS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_PATH))
}

fn credentials_available(lookup: &impl Fn(&str) -> Option<String>) -> bool {
    lookup("FIREBASE_CREDENTIALS").is_some() || credentials_path(lookup).is_file()
}

/// Secret bundle from the environment first, then the local credential file.
pub fn load_credentials(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<FirestoreCredentials, ConfigError> {
    if let Some(bundle) = lookup("FIREBASE_CREDENTIALS") {
        return Ok(serde_json::from_str(&bundle)?);
    }
    let path = credentials_path(&lookup);
    if !path.is_file() {
        return Err(ConfigError::MissingCredentials(path.display().to_string()));
    }
    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Opens the configured store. Any failure leaves the app offline rather than
/// stopping it.
pub async fn connect_store(backend: &StoreBackend) -> StoreConnection {
    match backend {
        StoreBackend::None => {
            info!("no document store configured; cloud sync is offline");
            StoreConnection::Disconnected
        }
        StoreBackend::Memory => {
            info!("using in-memory document store");
            StoreConnection::connected(MemoryStore::new())
        }
        StoreBackend::File(path) => match JsonFileStore::open(path.clone()).await {
            Ok(store) => {
                info!(path = %store.path().display(), "using file document store");
                StoreConnection::connected(store)
            }
            Err(err) => {
                warn!("file store unavailable, running offline: {err}");
                StoreConnection::Disconnected
            }
        },
        StoreBackend::Firestore => match open_firestore(|key| env::var(key).ok()) {
            Ok(store) => {
                info!(
                    project = store.project_id(),
                    auth = store.auth_method(),
                    "using Firestore document store"
                );
                StoreConnection::connected(store)
            }
            Err(err) => {
                warn!("Firestore unavailable, running offline: {err}");
                StoreConnection::Disconnected
            }
        },
    }
}

/// Credentials that cannot authenticate are refused here, so the app starts
/// offline instead of failing every request.
pub fn open_firestore(lookup: impl Fn(&str) -> Option<String>) -> Result<FirestoreStore, String> {
    let credentials = load_credentials(lookup).map_err(|err| err.to_string())?;
    FirestoreStore::new(credentials).map_err(|err| err.to_string())
}
