pub mod app;
pub mod charts;
pub mod config;
pub mod errors;
pub mod firestore;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod oauth;
pub mod predictor;
pub mod session;
pub mod state;
pub mod storage;
pub mod store;
pub mod ui;

pub use app::router;
pub use config::{connect_store, Settings};
pub use gateway::SyncGateway;
pub use predictor::ModelStatus;
pub use state::AppState;
