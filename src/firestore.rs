//! Cloud Firestore backend over the v1 REST API.

use crate::models::{Metrics, NewPrediction, PredictionRecord};
use crate::oauth::ServiceAccount;
use crate::store::{DocumentStore, StoreError, COLLECTION};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com";
const DEFAULT_DATABASE: &str = "(default)";

/// Either a plain token bundle or a downloaded service-account key; unknown
/// keys in the file are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct FirestoreCredentials {
    pub project_id: String,
    pub database: Option<String>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub endpoint: Option<String>,
    pub client_email: Option<String>,
    pub private_key: Option<String>,
    pub private_key_id: Option<String>,
    pub token_uri: Option<String>,
}

enum Bearer {
    Static(String),
    ServiceAccount(ServiceAccount),
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: Option<String>,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    write_results: Vec<WriteResult>,
    commit_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteResult {
    #[serde(default)]
    transform_results: Vec<Value>,
}

pub struct FirestoreStore {
    client: reqwest::Client,
    credentials: FirestoreCredentials,
    bearer: Option<Bearer>,
}

impl FirestoreStore {
    /// Fails when the credentials carry no way to authenticate.
    pub fn new(credentials: FirestoreCredentials) -> Result<Self, StoreError> {
        let bearer = match (
            &credentials.access_token,
            &credentials.client_email,
            &credentials.private_key,
        ) {
            (Some(token), _, _) => Some(Bearer::Static(token.clone())),
            (None, Some(email), Some(key)) => Some(Bearer::ServiceAccount(ServiceAccount::new(
                email.clone(),
                key,
                credentials.private_key_id.clone(),
                credentials.token_uri.clone(),
            )?)),
            (None, _, _) => None,
        };
        if bearer.is_none() && credentials.api_key.is_none() {
            return Err(StoreError::Credentials(format!(
                "no access_token, api_key or service-account key for project {}",
                credentials.project_id
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            credentials,
            bearer,
        })
    }

    pub fn auth_method(&self) -> &'static str {
        match &self.bearer {
            Some(Bearer::Static(_)) => "access_token",
            Some(Bearer::ServiceAccount(_)) => "service_account",
            None => "api_key",
        }
    }

    pub fn project_id(&self) -> &str {
        &self.credentials.project_id
    }

    fn database_path(&self) -> String {
        format!(
            "projects/{}/databases/{}",
            self.credentials.project_id,
            self.credentials.database.as_deref().unwrap_or(DEFAULT_DATABASE)
        )
    }

    fn documents_url(&self) -> String {
        let endpoint = self
            .credentials
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/');
        format!("{endpoint}/v1/{}/documents", self.database_path())
    }

    async fn post(&self, url: String, body: &Value) -> Result<reqwest::Response, StoreError> {
        let mut request = self.client.post(url).json(body);
        match &self.bearer {
            Some(Bearer::Static(token)) => request = request.bearer_auth(token),
            Some(Bearer::ServiceAccount(account)) => {
                request = request.bearer_auth(account.access_token(&self.client).await?)
            }
            None => {}
        }
        if let Some(key) = &self.credentials.api_key {
            request = request.query(&[("key", key)]);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn run_query(&self, query: Value) -> Result<Vec<Document>, StoreError> {
        let response = self
            .post(format!("{}:runQuery", self.documents_url()), &query)
            .await?;
        let items: Vec<RunQueryItem> = response.json().await?;
        Ok(items.into_iter().filter_map(|item| item.document).collect())
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    fn backend(&self) -> &'static str {
        "firestore"
    }

    async fn name_taken(&self, name: &str) -> Result<bool, StoreError> {
        let found = self.run_query(name_query(name)).await?;
        Ok(!found.is_empty())
    }

    async fn insert(&self, entry: &NewPrediction) -> Result<PredictionRecord, StoreError> {
        let document = format!(
            "{}/documents/{COLLECTION}/{}",
            self.database_path(),
            Uuid::new_v4().simple()
        );
        let response = self
            .post(
                format!("{}:commit", self.documents_url()),
                &commit_body(&document, entry),
            )
            .await?;
        let commit: CommitResponse = response.json().await?;
        Ok(PredictionRecord::from_new(entry, commit_timestamp(&commit)?))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PredictionRecord>, StoreError> {
        let documents = self.run_query(recent_query(limit)).await?;
        Ok(decode_history(documents))
    }
}

fn name_query(name: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": COLLECTION }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": "name" },
                    "op": "EQUAL",
                    "value": { "stringValue": name }
                }
            },
            "select": { "fields": [{ "fieldPath": "name" }] },
            "limit": 1
        }
    })
}

fn recent_query(limit: usize) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": COLLECTION }],
            "orderBy": [{
                "field": { "fieldPath": "timestamp" },
                "direction": "DESCENDING"
            }],
            "limit": limit
        }
    })
}

fn encode_fields(entry: &NewPrediction) -> Value {
    let metrics = entry.metrics;
    json!({
        "name": { "stringValue": entry.name.as_str() },
        "efficiency_score": { "doubleValue": entry.score },
        "sleep": { "doubleValue": metrics.sleep },
        "work": { "doubleValue": metrics.work },
        "exercise": { "integerValue": metrics.exercise.to_string() },
        "caffeine": { "integerValue": metrics.caffeine.to_string() },
        "screen": { "doubleValue": metrics.screen }
    })
}

fn commit_body(document: &str, entry: &NewPrediction) -> Value {
    json!({
        "writes": [{
            "update": {
                "name": document,
                "fields": encode_fields(entry)
            },
            "updateTransforms": [{
                "fieldPath": "timestamp",
                "setToServerValue": "REQUEST_TIME"
            }],
            "currentDocument": { "exists": false }
        }]
    })
}

fn commit_timestamp(commit: &CommitResponse) -> Result<DateTime<Utc>, StoreError> {
    let from_transform = commit
        .write_results
        .first()
        .and_then(|result| result.transform_results.first())
        .and_then(|value| value.get("timestampValue"))
        .and_then(Value::as_str);
    let raw = from_transform
        .or(commit.commit_time.as_deref())
        .ok_or_else(|| StoreError::Protocol("commit response carries no timestamp".into()))?;
    parse_timestamp(raw)
}

/// Documents written by other clients may lack fields; those are left out of
/// the history instead of failing it.
fn decode_history(documents: Vec<Document>) -> Vec<PredictionRecord> {
    documents
        .into_iter()
        .filter_map(|document| match decode_document(&document.fields) {
            Ok(record) => Some(record),
            Err(err) => {
                let id = document.name.as_deref().unwrap_or("?");
                warn!(document = id, "skipping history entry: {err}");
                None
            }
        })
        .collect()
}

fn decode_document(fields: &Map<String, Value>) -> Result<PredictionRecord, StoreError> {
    Ok(PredictionRecord {
        name: string_field(fields, "name")?,
        score: number_field(fields, "efficiency_score")?,
        metrics: Metrics {
            sleep: number_field(fields, "sleep")?,
            work: number_field(fields, "work")?,
            exercise: whole_field(fields, "exercise")?,
            caffeine: whole_field(fields, "caffeine")?,
            screen: number_field(fields, "screen")?,
        },
        created_at: parse_timestamp(
            field(fields, "timestamp")?
                .get("timestampValue")
                .and_then(Value::as_str)
                .ok_or_else(|| wrong_type("timestamp"))?,
        )?,
    })
}

fn field<'a>(fields: &'a Map<String, Value>, key: &str) -> Result<&'a Value, StoreError> {
    fields
        .get(key)
        .ok_or_else(|| StoreError::Protocol(format!("document is missing `{key}`")))
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Protocol(format!("field `{key}` has an unexpected type"))
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Result<String, StoreError> {
    field(fields, key)?
        .get("stringValue")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| wrong_type(key))
}

fn number_field(fields: &Map<String, Value>, key: &str) -> Result<f64, StoreError> {
    let value = field(fields, key)?;
    if let Some(double) = value.get("doubleValue").and_then(Value::as_f64) {
        return Ok(double);
    }
    // integerValue is encoded as a decimal string
    value
        .get("integerValue")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<i64>().ok())
        .map(|int| int as f64)
        .ok_or_else(|| wrong_type(key))
}

fn whole_field(fields: &Map<String, Value>, key: &str) -> Result<u32, StoreError> {
    let number = number_field(fields, key)?;
    if number.fract() != 0.0 || number < 0.0 || number > f64::from(u32::MAX) {
        return Err(wrong_type(key));
    }
    Ok(number as u32)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| StoreError::Protocol(format!("bad timestamp {raw:?}: {err}")))
}
