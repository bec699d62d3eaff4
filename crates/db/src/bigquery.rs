//! Warehouse sink that streams finished quotations into a BigQuery table
//! through the `tabledata.insertAll` REST endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use moldquote_core::config::{SinkConfig, TokenSource};
use moldquote_core::domain::quotation::QuotationRecord;
use moldquote_core::sink::{QuotationSink, SinkError};

pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum BigQueryConfigError {
    #[error("missing bigquery setting `{0}`")]
    Missing(&'static str),
    #[error("could not build http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BigQueryTable {
    pub project_id: String,
    pub dataset: String,
    pub table: String,
}

impl BigQueryTable {
    pub fn new(
        project_id: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self { project_id: project_id.into(), dataset: dataset.into(), table: table.into() }
    }

    /// `project.dataset.table`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset, self.table)
    }

    fn insert_all_url(&self, api_base_url: &str) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
            api_base_url.trim_end_matches('/'),
            self.project_id,
            self.dataset,
            self.table
        )
    }
}

/// Where bearer tokens for the insert call come from.
#[derive(Clone, Debug)]
pub enum AccessTokenSource {
    Static(SecretString),
    /// Instance metadata server of the hosting platform.
    Metadata { endpoint: String },
}

struct CachedToken {
    value: SecretString,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertError>,
}

#[derive(Deserialize)]
struct InsertError {
    #[serde(default)]
    index: u64,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

pub struct BigQuerySink {
    client: Client,
    api_base_url: String,
    table: BigQueryTable,
    tokens: AccessTokenSource,
    cached: Mutex<Option<CachedToken>>,
}

impl BigQuerySink {
    pub fn new(
        client: Client,
        api_base_url: impl Into<String>,
        table: BigQueryTable,
        tokens: AccessTokenSource,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into(),
            table,
            tokens,
            cached: Mutex::new(None),
        }
    }

    pub fn from_config(config: &SinkConfig) -> Result<Self, BigQueryConfigError> {
        let project_id = config.project_id.clone().ok_or(BigQueryConfigError::Missing("project_id"))?;
        let dataset = config.dataset.clone().ok_or(BigQueryConfigError::Missing("dataset"))?;
        let table = config.table.clone().ok_or(BigQueryConfigError::Missing("table"))?;

        let tokens = match config.token_source {
            TokenSource::Static => AccessTokenSource::Static(
                config.access_token.clone().ok_or(BigQueryConfigError::Missing("access_token"))?,
            ),
            TokenSource::Metadata => {
                AccessTokenSource::Metadata { endpoint: METADATA_TOKEN_URL.to_string() }
            }
        };

        let client =
            Client::builder().timeout(Duration::from_secs(config.request_timeout_secs)).build()?;

        Ok(Self::new(
            client,
            config.api_base_url.clone(),
            BigQueryTable::new(project_id, dataset, table),
            tokens,
        ))
    }

    pub fn table(&self) -> &BigQueryTable {
        &self.table
    }

    async fn access_token(&self) -> Result<SecretString, SinkError> {
        let endpoint = match &self.tokens {
            AccessTokenSource::Static(token) => return Ok(token.clone()),
            AccessTokenSource::Metadata { endpoint } => endpoint,
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .get(endpoint)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|error| SinkError::Transport(format!("metadata token request: {error}")))?;

        if !response.status().is_success() {
            return Err(SinkError::Transport(format!(
                "metadata token request returned {}",
                response.status()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|error| SinkError::Transport(format!("metadata token decode: {error}")))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        let value = SecretString::from(token.access_token);
        *cached = Some(CachedToken { value: value.clone(), expires_at: Instant::now() + lifetime });
        debug!(event_name = "sink.bigquery.token_refreshed", "access token refreshed");

        Ok(value)
    }
}

#[async_trait]
impl QuotationSink for BigQuerySink {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    async fn append(&self, record: &QuotationRecord) -> Result<(), SinkError> {
        let token = self.access_token().await?;
        let body = json!({
            "kind": "bigquery#tableDataInsertAllRequest",
            "rows": [row_payload(record)],
        });

        let response = self
            .client
            .post(self.table.insert_all_url(&self.api_base_url))
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| SinkError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                event_name = "sink.bigquery.http_error",
                table = %self.table.qualified_name(),
                status = status.as_u16(),
                "insertAll returned an error status"
            );
            let message = format!("insertAll returned {status}: {detail}");
            return Err(if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                SinkError::Transport(message)
            } else {
                SinkError::Rejected(message)
            });
        }

        let parsed: InsertAllResponse = response
            .json()
            .await
            .map_err(|error| SinkError::Transport(format!("insertAll decode: {error}")))?;
        if !parsed.insert_errors.is_empty() {
            return Err(SinkError::Rejected(describe_insert_errors(&parsed.insert_errors)));
        }

        info!(
            event_name = "sink.bigquery.appended",
            table = %self.table.qualified_name(),
            quotation_id = %record.id.0,
            "row streamed"
        );
        Ok(())
    }
}

/// One `insertAll` row. `insertId` lets the warehouse drop retried duplicates.
fn row_payload(record: &QuotationRecord) -> Value {
    let contact = record.contact.as_ref();
    json!({
        "insertId": record.id.0,
        "json": {
            "user_id": record.sender_id,
            "material": record.material,
            "size": record.size,
            "volume": record.volume_cm3,
            "weight_kg": record.weight_kg,
            "quantity": record.quantity,
            "total_cost": record.total_cost,
            "contact_name": contact.map(|c| c.name.as_str()),
            "contact_phone": contact.map(|c| c.phone.as_str()),
            "contact_email": contact.map(|c| c.email.as_str()),
            "timestamp": record.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    })
}

fn describe_insert_errors(errors: &[InsertError]) -> String {
    errors
        .iter()
        .map(|row| {
            let reasons = row
                .errors
                .iter()
                .map(|error| format!("{}: {}", error.reason, error.message))
                .collect::<Vec<_>>()
                .join("; ");
            format!("row {}: {}", row.index, reasons)
        })
        .collect::<Vec<_>>()
        .join(" | ")
}
