// # DNS Provider Trait
//
// Defines the capability every cloud DNS vendor adapter implements.
//
// ## Implementations
//
// - Tencent Cloud DNSPod: `ddns-provider-tencent` crate
// - Alibaba Cloud DNS: `ddns-provider-aliyun` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::{DnsProvider, RecordType};
//
// async fn point(provider: &dyn DnsProvider) -> ddns_core::Result<()> {
//     match provider.find_record("example.com", "www", RecordType::A).await? {
//         Some(record) => provider.update_record(&record, "www", RecordType::A, "5.6.7.8", 600).await,
//         None => provider.create_record("example.com", "www", RecordType::A, "5.6.7.8", 600).await,
//     }
// }
// ```

use async_trait::async_trait;

use crate::task::{Credentials, RecordType};

/// An existing record as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHandle {
    /// The record ID (provider-specific)
    pub id: String,
    /// Root domain the record lives under
    pub domain: String,
    /// Host label of the record
    pub host: String,
    pub record_type: RecordType,
    /// Current record value, when the provider returned one
    pub value: Option<String>,
}

/// Trait for DNS provider implementations
///
/// One instance is built per task from that task's credentials and used for
/// every reconciliation of the task.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Retry or back off (the next scheduler tick is the retry)
/// - ❌ Decide whether a write is needed (owned by the reconciler)
/// - ❌ Touch task state or the task store
///
/// "Record absent" is a normal answer: `find_record` returns `Ok(None)` and
/// never an error whose text the caller would have to inspect.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Look up the record of `record_type` for `host` under `domain`
    async fn find_record(
        &self,
        domain: &str,
        host: &str,
        record_type: RecordType,
    ) -> Result<Option<RecordHandle>, crate::Error>;

    /// Create a new record
    async fn create_record(
        &self,
        domain: &str,
        host: &str,
        record_type: RecordType,
        value: &str,
        ttl: u32,
    ) -> Result<(), crate::Error>;

    /// Point an existing record at `value`
    async fn update_record(
        &self,
        record: &RecordHandle,
        host: &str,
        record_type: RecordType,
        value: &str,
        ttl: u32,
    ) -> Result<(), crate::Error>;

    /// Delete every record of `record_type` for `host` under `domain`
    ///
    /// Absent records are not an error. Returns the number of records removed.
    async fn delete_all_records(
        &self,
        domain: &str,
        host: &str,
        record_type: RecordType,
    ) -> Result<usize, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from task credentials
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance bound to `credentials`
    fn create(&self, credentials: &Credentials) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
