// # Alibaba Cloud DNS Provider
//
// DnsProvider implementation for Alibaba Cloud DNS
// (`alidns.cn-hangzhou.aliyuncs.com`, version 2015-01-09).
//
// ## Calls
//
// | Operation            | Action                  |
// |----------------------|-------------------------|
// | `find_record`        | `DescribeDomainRecords` |
// | `create_record`      | `AddDomainRecord`       |
// | `update_record`      | `UpdateDomainRecord`    |
// | `delete_all_records` | `DescribeDomainRecords` + `DeleteDomainRecord` per match |
//
// RPC style: parameters go in the query string, the body is empty, and the
// request is signed with ACS3-HMAC-SHA256. `RRKeyWord` is a fuzzy match, so
// listed records are filtered to the exact host.
//
// API errors come back as non-2xx responses with a `{Code, Message}` body.
// `DomainRecordDuplicate` on update means the record already holds the
// value and is treated as success.

mod sign;

use async_trait::async_trait;
use chrono::Utc;
use ddns_core::task::{Credentials, ProviderKind, RecordType};
use ddns_core::traits::{DnsProvider, DnsProviderFactory, RecordHandle};
use ddns_core::{Error, ProviderRegistry, Result};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use sign::AcsHeaders;

/// Public Alibaba Cloud DNS endpoint
pub const DEFAULT_ENDPOINT: &str = "https://alidns.cn-hangzhou.aliyuncs.com";

const API_VERSION: &str = "2015-01-09";
const PROVIDER_NAME: &str = "aliyun";

/// Error code of an update that would not change anything
const DOMAIN_RECORD_DUPLICATE: &str = "DomainRecordDuplicate";

/// Largest page `DescribeDomainRecords` accepts
const PAGE_SIZE: &str = "500";

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AliyunProvider {
    access_key_id: String,
    /// ⚠️ NEVER log this value
    access_key_secret: String,
    endpoint: Url,
    client: reqwest::Client,
}

impl std::fmt::Debug for AliyunProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliyunProvider")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<REDACTED>")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
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

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeDomainRecords {
    #[serde(default)]
    domain_records: DomainRecords,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DomainRecords {
    #[serde(default)]
    record: Vec<DomainRecord>,
}

#[derive(Debug, Deserialize)]
struct DomainRecord {
    #[serde(rename = "RecordId")]
    record_id: String,
    #[serde(rename = "RR")]
    rr: String,
    #[serde(rename = "Type")]
    record_type: String,
    #[serde(rename = "Value")]
    value: String,
}

impl AliyunProvider {
    /// Create a provider talking to the public endpoint
    pub fn new(credentials: &Credentials) -> Result<Self> {
        if credentials.secret_id.is_empty() || credentials.secret_key.is_empty() {
            return Err(Error::config(
                "Alibaba Cloud AccessKey ID and AccessKey Secret are required",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            access_key_id: credentials.secret_id.clone(),
            access_key_secret: credentials.secret_key.clone(),
            endpoint: parse_endpoint(DEFAULT_ENDPOINT)?,
            client,
        })
    }

    /// Point the provider at another endpoint (tests, other regions)
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
        self.endpoint = parse_endpoint(endpoint)?;
        Ok(self)
    }

    /// Signed call; API-level errors are returned separately from transport errors
    async fn invoke(
        &self,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<std::result::Result<Value, ApiError>> {
        let query = sign::canonical_query(params);
        let host = host_header(&self.endpoint);
        let date = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let content_sha256 = sign::sha256_hex(b"");

        let authorization = sign::authorization(
            &self.access_key_id,
            &self.access_key_secret,
            &query,
            &AcsHeaders {
                host: &host,
                action,
                version: API_VERSION,
                date: &date,
                nonce: &nonce,
                content_sha256: &content_sha256,
            },
        );

        let mut url = self.endpoint.clone();
        url.set_path("/");
        url.set_query(Some(&query));

        tracing::debug!(action, "Calling Alibaba Cloud DNS API");

        let response = self
            .client
            .post(url)
            .header("Authorization", authorization)
            .header("x-acs-action", action)
            .header("x-acs-version", API_VERSION)
            .header("x-acs-date", &date)
            .header("x-acs-signature-nonce", &nonce)
            .header("x-acs-content-sha256", &content_sha256)
            .send()
            .await
            .map_err(|e| Error::http(format!("Alidns {} request failed: {}", action, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Alidns {} response unreadable: {}", action, e)))?;

        if status.is_success() {
            let value: Value = serde_json::from_str(&body).map_err(|e| {
                Error::provider_api(PROVIDER_NAME, format!("Malformed {} response: {}", action, e))
            })?;
            return Ok(Ok(value));
        }

        match serde_json::from_str::<ApiError>(&body) {
            Ok(err) => {
                tracing::debug!(action, code = %err.code, %status, "Alidns API error");
                Ok(Err(err))
            }
            Err(_) => Err(Error::http(format!(
                "Alidns {} returned HTTP {}: {}",
                action, status, body
            ))),
        }
    }

    async fn call(&self, action: &str, params: &[(&str, String)]) -> Result<Value> {
        self.invoke(action, params).await?.map_err(ApiError::into_error)
    }

    async fn list_records(
        &self,
        domain: &str,
        host: &str,
        record_type: RecordType,
    ) -> Result<Vec<DomainRecord>> {
        let response = self
            .call(
                "DescribeDomainRecords",
                &[
                    ("DomainName", domain.to_string()),
                    ("RRKeyWord", host.to_string()),
                    ("Type", record_type.as_str().to_string()),
                    ("PageSize", PAGE_SIZE.to_string()),
                ],
            )
            .await?;

        let described: DescribeDomainRecords = serde_json::from_value(response)?;
        Ok(described
            .domain_records
            .record
            .into_iter()
            .filter(|r| r.rr == host && r.record_type == record_type.as_str())
            .collect())
    }
}

#[async_trait]
impl DnsProvider for AliyunProvider {
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
            id: r.record_id,
            domain: domain.to_string(),
            host: r.rr,
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
                "AddDomainRecord",
                &[
                    ("DomainName", domain.to_string()),
                    ("RR", host.to_string()),
                    ("Type", record_type.as_str().to_string()),
                    ("Value", value.to_string()),
                    ("TTL", ttl.to_string()),
                ],
            )
            .await?;

        tracing::info!(
            domain,
            host,
            record_id = ?response.get("RecordId"),
            "Alidns record added"
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
        let outcome = self
            .invoke(
                "UpdateDomainRecord",
                &[
                    ("RecordId", record.id.clone()),
                    ("RR", host.to_string()),
                    ("Type", record_type.as_str().to_string()),
                    ("Value", value.to_string()),
                    ("TTL", ttl.to_string()),
                ],
            )
            .await?;

        match outcome {
            Ok(_) => {
                tracing::info!(domain = %record.domain, host, record_id = %record.id, "Alidns record updated");
                Ok(())
            }
            Err(err) if err.code == DOMAIN_RECORD_DUPLICATE => {
                tracing::debug!(record_id = %record.id, "Alidns record already holds {}", value);
                Ok(())
            }
            Err(err) => Err(err.into_error()),
        }
    }

    async fn delete_all_records(
        &self,
        domain: &str,
        host: &str,
        record_type: RecordType,
    ) -> Result<usize> {
        let records = self.list_records(domain, host, record_type).await?;
        for record in &records {
            self.call("DeleteDomainRecord", &[("RecordId", record.record_id.clone())])
                .await?;
            tracing::info!(domain, host, record_id = %record.record_id, "Alidns record deleted");
        }
        Ok(records.len())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| Error::config(format!("Invalid Alidns endpoint {}: {}", endpoint, e)))?;
    if url.host_str().is_none() {
        return Err(Error::config(format!("Alidns endpoint {} has no host", endpoint)));
    }
    Ok(url)
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Factory for creating Alibaba Cloud DNS providers
#[derive(Debug, Default)]
pub struct AliyunFactory {
    endpoint: Option<String>,
}

impl AliyunFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
        }
    }
}

impl DnsProviderFactory for AliyunFactory {
    fn create(&self, credentials: &Credentials) -> Result<Box<dyn DnsProvider>> {
        let provider = AliyunProvider::new(credentials)?;
        let provider = match &self.endpoint {
            Some(endpoint) => provider.with_endpoint(endpoint)?,
            None => provider,
        };
        Ok(Box::new(provider))
    }
}

/// Register the Alibaba Cloud DNS provider with a registry
///
/// # Example
///
/// ```rust
/// use ddns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// ddns_provider_aliyun::register(&registry);
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(ProviderKind::Aliyun, Box::new(AliyunFactory::new()));
}
