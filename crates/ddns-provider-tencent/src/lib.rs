// # Tencent Cloud DNSPod Provider
//
// DnsProvider implementation for the DNSPod API 3.0
// (`dnspod.tencentcloudapi.com`, version 2021-03-23).
//
// ## Calls
//
// | Operation            | Action               |
// |----------------------|----------------------|
// | `find_record`        | `DescribeRecordList` |
// | `create_record`      | `CreateRecord`       |
// | `update_record`      | `ModifyRecord`       |
// | `delete_all_records` | `DescribeRecordList` + `DeleteRecord` per match |
//
// Every call is a signed JSON POST (TC3-HMAC-SHA256). API errors come back
// with HTTP 200 and a `Response.Error {Code, Message}` object; the message
// is surfaced verbatim. `ResourceNotFound.NoDataOfRecord` is the API's way
// of saying "no such record" and is turned into an absent result here.
//
// ## Security
//
// The secret key is only used to derive signatures. It never appears in
// logs, errors or `Debug` output.

mod sign;

use async_trait::async_trait;
use chrono::Utc;
use ddns_core::task::{Credentials, ProviderKind, RecordType};
use ddns_core::traits::{DnsProvider, DnsProviderFactory, RecordHandle};
use ddns_core::{Error, ProviderRegistry, Result};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use sign::Tc3Request;

/// Public DNSPod API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://dnspod.tencentcloudapi.com";

const API_VERSION: &str = "2021-03-23";
const SERVICE: &str = "dnspod";
const PROVIDER_NAME: &str = "tencent";

/// Record line every record is written on
const DEFAULT_RECORD_LINE: &str = "默认";

/// Error code returned by `DescribeRecordList` when nothing matches
const NO_DATA_OF_RECORD: &str = "ResourceNotFound.NoDataOfRecord";

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TencentProvider {
    secret_id: String,
    /// ⚠️ NEVER log this value
    secret_key: String,
    endpoint: Url,
    client: reqwest::Client,
}

impl std::fmt::Debug for TencentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TencentProvider")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<REDACTED>")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiError {
    code: String,
    message: String,
}

impl ApiError {
    fn into_error(self) -> Error {
        Error::provider_api(PROVIDER_NAME, format!("{} ({})", self.message, self.code))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecordList {
    #[serde(default)]
    record_list: Vec<RecordItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecordItem {
    record_id: u64,
    name: String,
    #[serde(rename = "Type")]
    record_type: String,
    value: String,
}

impl TencentProvider {
    /// Create a provider talking to the public endpoint
    pub fn new(credentials: &Credentials) -> Result<Self> {
        if credentials.secret_id.is_empty() || credentials.secret_key.is_empty() {
            return Err(Error::config("Tencent Cloud SecretId and SecretKey are required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            secret_id: credentials.secret_id.clone(),
            secret_key: credentials.secret_key.clone(),
            endpoint: parse_endpoint(DEFAULT_ENDPOINT)?,
            client,
        })
    }

    /// Point the provider at another endpoint (tests, private deployments)
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
        self.endpoint = parse_endpoint(endpoint)?;
        Ok(self)
    }

    /// Signed call; API-level errors are returned separately from transport errors
    async fn invoke(&self, action: &str, params: &Value) -> Result<std::result::Result<Value, ApiError>> {
        let payload = serde_json::to_string(params)?;
        let host = host_header(&self.endpoint);
        let timestamp = Utc::now();

        let authorization = sign::authorization(
            &self.secret_id,
            &self.secret_key,
            &Tc3Request {
                service: SERVICE,
                host: &host,
                action,
                payload: &payload,
                timestamp,
            },
        );

        tracing::debug!(action, "Calling DNSPod API");

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Authorization", authorization)
            .header("Content-Type", sign::CONTENT_TYPE)
            .header("X-TC-Action", action)
            .header("X-TC-Version", API_VERSION)
            .header("X-TC-Timestamp", timestamp.timestamp().to_string())
            .body(payload)
            .send()
            .await
            .map_err(|e| Error::http(format!("DNSPod {} request failed: {}", action, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("DNSPod {} response unreadable: {}", action, e)))?;

        if !status.is_success() {
            return Err(Error::http(format!(
                "DNSPod {} returned HTTP {}: {}",
                action, status, body
            )));
        }

        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| {
            Error::provider_api(PROVIDER_NAME, format!("Malformed {} response: {}", action, e))
        })?;

        match envelope.response.get("Error") {
            Some(err) => {
                let err: ApiError = serde_json::from_value(err.clone())?;
                tracing::debug!(action, code = %err.code, "DNSPod API error");
                Ok(Err(err))
            }
            None => Ok(Ok(envelope.response)),
        }
    }

    async fn call(&self, action: &str, params: Value) -> Result<Value> {
        self.invoke(action, &params).await?.map_err(ApiError::into_error)
    }

    async fn list_records(
        &self,
        domain: &str,
        host: &str,
        record_type: RecordType,
    ) -> Result<Vec<RecordItem>> {
        let params = json!({
            "Domain": domain,
            "Subdomain": host,
            "RecordType": record_type.as_str(),
        });

        let response = match self.invoke("DescribeRecordList", &params).await? {
            Ok(response) => response,
            Err(err) if err.code == NO_DATA_OF_RECORD => return Ok(Vec::new()),
            Err(err) => return Err(err.into_error()),
        };

        let list: RecordList = serde_json::from_value(response)?;
        Ok(list
            .record_list
            .into_iter()
            .filter(|r| r.name == host && r.record_type == record_type.as_str())
            .collect())
    }
}

#[async_trait]
impl DnsProvider for TencentProvider {
    async fn find_record(
        &self,
        domain: &str,
        host: &str,
        record_type: RecordType,
    ) -> Result<Option<RecordHandle>> {
        let record = self
            .list_records(domain, host, record_type)
            .await?
            .into_iter()
            .next();

        Ok(record.map(|r| RecordHandle {
            id: r.record_id.to_string(),
            domain: domain.to_string(),
            host: r.name,
            record_type,
            value: Some(r.value),
        }))
    }

    async fn create_record(
        &self,
        domain: &str,
        host: &str,
        record_type: RecordType,
        value: &str,
        ttl: u32,
    ) -> Result<()> {
        let response = self
            .call(
                "CreateRecord",
                json!({
                    "Domain": domain,
                    "SubDomain": host,
                    "RecordType": record_type.as_str(),
                    "RecordLine": DEFAULT_RECORD_LINE,
                    "Value": value,
                    "TTL": ttl,
                }),
            )
            .await?;

        tracing::info!(
            domain,
            host,
            record_id = ?response.get("RecordId"),
            "DNSPod record created"
        );
        Ok(())
    }

    async fn update_record(
        &self,
        record: &RecordHandle,
        host: &str,
        record_type: RecordType,
        value: &str,
        ttl: u32,
    ) -> Result<()> {
        let record_id: u64 = record.id.parse().map_err(|_| {
            Error::provider_api(PROVIDER_NAME, format!("Invalid record id: {}", record.id))
        })?;

        self.call(
            "ModifyRecord",
            json!({
                "Domain": record.domain,
                "SubDomain": host,
                "RecordType": record_type.as_str(),
                "RecordLine": DEFAULT_RECORD_LINE,
                "Value": value,
                "TTL": ttl,
                "RecordId": record_id,
            }),
        )
        .await?;

        tracing::info!(domain = %record.domain, host, record_id, "DNSPod record modified");
        Ok(())
    }

    async fn delete_all_records(
        &self,
        domain: &str,
        host: &str,
        record_type: RecordType,
    ) -> Result<usize> {
        let records = self.list_records(domain, host, record_type).await?;
        for record in &records {
            self.call(
                "DeleteRecord",
                json!({ "Domain": domain, "RecordId": record.record_id }),
            )
            .await?;
            tracing::info!(domain, host, record_id = record.record_id, "DNSPod record deleted");
        }
        Ok(records.len())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| Error::config(format!("Invalid DNSPod endpoint {}: {}", endpoint, e)))?;
    if url.host_str().is_none() {
        return Err(Error::config(format!("DNSPod endpoint {} has no host", endpoint)));
    }
    Ok(url)
}

/// Host header as sent by the HTTP client, port included when explicit
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Factory for creating DNSPod providers
#[derive(Debug, Default)]
pub struct TencentFactory {
    endpoint: Option<String>,
}

impl TencentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every provider against `endpoint` instead of the public one
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
        }
    }
}

impl DnsProviderFactory for TencentFactory {
    fn create(&self, credentials: &Credentials) -> Result<Box<dyn DnsProvider>> {
        let provider = TencentProvider::new(credentials)?;
        let provider = match &self.endpoint {
            Some(endpoint) => provider.with_endpoint(endpoint)?,
            None => provider,
        };
        Ok(Box::new(provider))
    }
}

/// Register the DNSPod provider with a registry
///
/// # Example
///
/// ```rust
/// use ddns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// ddns_provider_tencent::register(&registry);
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(ProviderKind::Tencent, Box::new(TencentFactory::new()));
}
