// # Cloudflare Provider Client
//
// This crate provides a Cloudflare adapter implementing the `ProviderClient` contract.
//
// ## Implementation Status
//
// - ✅ Full CRUD across all eight record types (A/AAAA/CNAME/MX/TXT/SRV/CAA/NS)
// - ✅ Per-provider `RecordCache` with explicit refresh and apex/trailing-dot normalization
// - ✅ Specific error handling for HTTP status codes (401/403, 404, 409, 429, 5xx)
// - ✅ Dry-run mode for safe testing
// - ✅ Zone auto-discovery and explicit zone ID
// - ✅ Ownership marker via Cloudflare's record `comment` field
// - ❌ NO retry logic (intentionally omitted - owned by the `Reconciler`, see §5)
// - ❌ NO backoff logic (intentionally omitted - owned by the `Reconciler`)
// - ❌ NO scheduling decisions (intentionally omitted - owned by the `Scheduler`)
//
// ## Trust Level: Untrusted (DNS Provider)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS API calls to the Cloudflare endpoint only
// - ✅ Maintain its own `RecordCache`
//
// **Forbidden Capabilities**:
// - ❌ Implement retry logic (owned by the `Reconciler`)
// - ❌ Access other providers' caches
// - ❌ Make scheduling decisions (owned by the `Scheduler`)
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - API token MUST be provided by the caller (env parsing lives in the daemon binary)
// - Provider MUST fail fast if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List zones: GET `/zones?name=...`
// - List/Create DNS records: GET/POST `/zones/:zone_id/dns_records`
// - Update/Delete DNS record: PUT/DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use dnscompanion_core::{
    DesiredRecord, DnsRecord, Error, ProviderClient, RecordCache, RecordExtras, RecordType, Result,
};
use serde_json::Value;
use std::time::Duration;

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Comment prefix used to mark records this system created, so the `OrphanReaper` can
/// tell them apart from records a human manages by hand (§4.1 `SupportsOwnershipMarker`).
const OWNERSHIP_MARKER: &str = "managed-by:dnscompanion";

/// Cloudflare `ProviderClient` adapter.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, list/find operations still hit the real API, but
/// create/update/delete log the intended payload and return as-if-applied without
/// actually mutating the zone.
pub struct CloudflareProvider {
    provider_id: String,
    zone: String,
    api_token: String,
    zone_id: std::sync::RwLock<Option<String>>,
    account_id: Option<String>,
    client: reqwest::Client,
    dry_run: bool,
    cache: RecordCache,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("provider_id", &self.provider_id)
            .field("zone", &self.zone)
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id.read().ok().map(|g| g.clone()))
            .field("account_id", &self.account_id)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// # Security
    ///
    /// The API token will never be logged or displayed in error messages.
    pub fn new(
        provider_id: impl Into<String>,
        zone: impl Into<String>,
        api_token: impl Into<String>,
        zone_id: Option<String>,
        account_id: Option<String>,
        dry_run: bool,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        let api_token = api_token.into();
        if api_token.is_empty() {
            panic!("Cloudflare API token cannot be empty");
        }

        Self {
            provider_id: provider_id.into(),
            zone: zone.into(),
            api_token,
            zone_id: std::sync::RwLock::new(zone_id),
            account_id,
            client,
            dry_run,
            cache: RecordCache::new(),
        }
    }

    pub fn new_live(
        provider_id: impl Into<String>,
        zone: impl Into<String>,
        api_token: impl Into<String>,
        zone_id: Option<String>,
        account_id: Option<String>,
    ) -> Self {
        Self::new(provider_id, zone, api_token, zone_id, account_id, false)
    }

    pub fn new_dry_run(
        provider_id: impl Into<String>,
        zone: impl Into<String>,
        api_token: impl Into<String>,
        zone_id: Option<String>,
        account_id: Option<String>,
    ) -> Self {
        Self::new(provider_id, zone, api_token, zone_id, account_id, true)
    }

    fn resolved_zone_id(&self) -> Option<String> {
        self.zone_id.read().expect("zone id lock poisoned").clone()
    }

    /// Resolves the zone id, either pre-configured or via `GET /zones?name=`.
    async fn get_zone_id(&self) -> Result<String> {
        if let Some(zone_id) = self.resolved_zone_id() {
            return Ok(zone_id);
        }

        tracing::debug!(zone = %self.zone, "looking up Cloudflare zone id");

        let url = format!("{CLOUDFLARE_API_BASE}/zones?name={}", self.zone);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::transport(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(self.map_error(response, "zone lookup").await);
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("failed to parse response: {e}")))?;

        let zones = json["result"]
            .as_array()
            .ok_or_else(|| Error::Http("invalid response format: result is not an array".to_string()))?;

        let zone = zones
            .first()
            .ok_or_else(|| Error::zone_not_found("cloudflare", self.zone.clone()))?;

        let zone_id = zone["id"]
            .as_str()
            .ok_or_else(|| Error::Http("invalid response format: zone.id is not a string".to_string()))?
            .to_string();

        *self.zone_id.write().expect("zone id lock poisoned") = Some(zone_id.clone());
        Ok(zone_id)
    }

    /// Maps a non-success response to the error taxonomy via per-status-code handling.
    async fn map_error(&self, response: reqwest::Response, context: &str) -> Error {
        let status = response.status();
        let retry_after = Self::parse_retry_after(&response);
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error response".to_string());

        match status.as_u16() {
            401 | 403 => Error::auth("cloudflare", format!("{context}: invalid token or insufficient permissions ({status})")),
            404 => Error::not_found(format!("{context}: not found ({status})")),
            409 => Error::conflict(format!("{context}: conflict ({status}) - {body}")),
            429 => Error::rate_limited(format!("{context}: rate limited ({status})"), retry_after),
            500..=599 => Error::transport(format!("{context}: transient Cloudflare server error ({status}) - {body}")),
            _ => Error::Http(format!("{context}: {status} - {body}")),
        }
    }

    /// Reads the `Retry-After` header as a whole number of seconds (the only form Cloudflare
    /// sends); HTTP-date values are not parsed.
    fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    fn cloudflare_type(record_type: RecordType) -> &'static str {
        match record_type {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Txt => "TXT",
            RecordType::Srv => "SRV",
            RecordType::Caa => "CAA",
            RecordType::Ns => "NS",
        }
    }

    fn parse_record_type(s: &str) -> Option<RecordType> {
        match s {
            "A" => Some(RecordType::A),
            "AAAA" => Some(RecordType::Aaaa),
            "CNAME" => Some(RecordType::Cname),
            "MX" => Some(RecordType::Mx),
            "TXT" => Some(RecordType::Txt),
            "SRV" => Some(RecordType::Srv),
            "CAA" => Some(RecordType::Caa),
            "NS" => Some(RecordType::Ns),
            _ => None,
        }
    }

    fn to_wire_payload(&self, desired: &DesiredRecord) -> Value {
        let name = if dnscompanion_core::model::is_apex(&desired.name, &self.zone) {
            self.zone.clone()
        } else {
            desired.name.clone()
        };

        let mut payload = serde_json::json!({
            "type": Self::cloudflare_type(desired.record_type),
            "name": name,
            "content": desired.content,
            "ttl": if desired.ttl == 0 { 1 } else { desired.ttl },
            "comment": OWNERSHIP_MARKER,
        });

        if let Some(proxied) = desired.proxied {
            payload["proxied"] = Value::Bool(proxied);
        }
        if let Some(priority) = desired.extras.priority {
            payload["priority"] = Value::from(priority);
        }
        if desired.record_type == RecordType::Srv {
            if let (Some(priority), Some(weight), Some(port)) =
                (desired.extras.priority, desired.extras.weight, desired.extras.port)
            {
                payload["data"] = serde_json::json!({
                    "priority": priority,
                    "weight": weight,
                    "port": port,
                    "target": desired.content,
                });
            }
        }
        if desired.record_type == RecordType::Caa {
            if let (Some(flags), Some(tag)) = (desired.extras.flags, &desired.extras.tag) {
                payload["data"] = serde_json::json!({
                    "flags": flags,
                    "tag": tag,
                    "value": desired.content,
                });
            }
        }

        payload
    }

    fn from_wire_record(&self, json: &Value) -> Option<DnsRecord> {
        let record_type = Self::parse_record_type(json["type"].as_str()?)?;
        let name = json["name"].as_str()?.to_string();
        let content = json["content"].as_str().unwrap_or_default().to_string();
        let ttl = json["ttl"].as_u64().unwrap_or(1) as u32;
        let external_id = json["id"].as_str().map(str::to_string);
        let proxied = json["proxied"].as_bool();
        let owned = json["comment"].as_str() == Some(OWNERSHIP_MARKER);

        let mut extras = RecordExtras::default();
        if record_type == RecordType::Mx {
            extras.priority = json["priority"].as_u64().map(|v| v as u16);
        }
        if record_type == RecordType::Srv {
            extras.priority = json["data"]["priority"].as_u64().map(|v| v as u16);
            extras.weight = json["data"]["weight"].as_u64().map(|v| v as u16);
            extras.port = json["data"]["port"].as_u64().map(|v| v as u16);
        }
        if record_type == RecordType::Caa {
            extras.flags = json["data"]["flags"].as_u64().map(|v| v as u8);
            extras.tag = json["data"]["tag"].as_str().map(str::to_string);
        }

        Some(DnsRecord {
            external_id,
            provider_id: self.provider_id.clone(),
            record_type,
            name,
            content,
            ttl,
            extras,
            proxied,
            owned,
        })
    }
}

#[async_trait]
impl ProviderClient for CloudflareProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn zone(&self) -> &str {
        &self.zone
    }

    fn cache(&self) -> &RecordCache {
        &self.cache
    }

    async fn init(&self) -> Result<()> {
        self.get_zone_id().await?;
        self.refresh_cache().await?;
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        self.get_zone_id().await.is_ok()
    }

    async fn refresh_cache(&self) -> Result<Vec<DnsRecord>> {
        let zone_id = self.get_zone_id().await?;
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!(
                "{CLOUDFLARE_API_BASE}/zones/{zone_id}/dns_records?page={page}&per_page=100"
            );
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|e| Error::transport(format!("HTTP request failed: {e}")))?;

            if !response.status().is_success() {
                return Err(self.map_error(response, "refresh cache").await);
            }

            let json: Value = response
                .json()
                .await
                .map_err(|e| Error::Http(format!("failed to parse response: {e}")))?;

            let results = json["result"].as_array().cloned().unwrap_or_default();
            let page_count = results.len();
            for raw in &results {
                if let Some(record) = self.from_wire_record(raw) {
                    all.push(record);
                }
            }

            let total_pages = json["result_info"]["total_pages"].as_u64().unwrap_or(1) as u32;
            if page_count == 0 || page >= total_pages {
                break;
            }
            page += 1;
        }

        self.cache.replace_all(all.clone());
        Ok(all)
    }

    async fn create(&self, desired: &DesiredRecord) -> Result<DnsRecord> {
        let zone_id = self.get_zone_id().await?;

        if self.dry_run {
            tracing::info!(name = %desired.name, "[dry-run] would create record: {}", self.to_wire_payload(desired));
            return Ok(DnsRecord {
                external_id: Some("dry-run".to_string()),
                provider_id: self.provider_id.clone(),
                record_type: desired.record_type,
                name: desired.name.clone(),
                content: desired.content.clone(),
                ttl: desired.ttl,
                extras: desired.extras.clone(),
                proxied: desired.proxied,
                owned: true,
            });
        }

        let url = format!("{CLOUDFLARE_API_BASE}/zones/{zone_id}/dns_records");
        let payload = self.to_wire_payload(desired);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::transport(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            if status.as_u16() == 400 || status.as_u16() == 409 {
                // Cloudflare reports CNAME collisions and duplicate-record errors via 400;
                // surface as a conflict so the caller can re-read and reconcile (S7).
                let body = response.text().await.unwrap_or_default();
                return Err(Error::conflict(format!(
                    "create record: record already exists ({status}) - {body}"
                )));
            }
            return Err(self.map_error(response, "create record").await);
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("failed to parse response: {e}")))?;

        let record = self
            .from_wire_record(&json["result"])
            .ok_or_else(|| Error::Http("invalid response format for created record".to_string()))?;
        self.cache.upsert(record.clone());
        Ok(record)
    }

    async fn update(&self, external_id: &str, desired: &DesiredRecord) -> Result<DnsRecord> {
        let zone_id = self.get_zone_id().await?;

        if self.dry_run {
            tracing::info!(%external_id, "[dry-run] would update record: {}", self.to_wire_payload(desired));
            return Ok(DnsRecord {
                external_id: Some(external_id.to_string()),
                provider_id: self.provider_id.clone(),
                record_type: desired.record_type,
                name: desired.name.clone(),
                content: desired.content.clone(),
                ttl: desired.ttl,
                extras: desired.extras.clone(),
                proxied: desired.proxied,
                owned: true,
            });
        }

        let url = format!("{CLOUDFLARE_API_BASE}/zones/{zone_id}/dns_records/{external_id}");
        let mut payload = self.to_wire_payload(desired);

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::transport(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            if status.as_u16() == 400 && desired.record_type.content_is_hostname() {
                // Some upstreams reject an unterminated FQDN for hostname-valued content;
                // retry once with a trailing dot appended (§4.1).
                if let Some(content) = payload.get("content").and_then(Value::as_str) {
                    if !content.ends_with('.') {
                        payload["content"] = Value::String(format!("{content}."));
                        let retry = self
                            .client
                            .put(&url)
                            .bearer_auth(&self.api_token)
                            .json(&payload)
                            .send()
                            .await
                            .map_err(|e| Error::transport(format!("HTTP request failed: {e}")))?;
                        if retry.status().is_success() {
                            let json: Value = retry
                                .json()
                                .await
                                .map_err(|e| Error::Http(format!("failed to parse response: {e}")))?;
                            let record = self
                                .from_wire_record(&json["result"])
                                .ok_or_else(|| Error::Http("invalid response format for updated record".to_string()))?;
                            self.cache.upsert(record.clone());
                            return Ok(record);
                        }
                        return Err(self.map_error(retry, "update record").await);
                    }
                }
            }
            return Err(self.map_error(response, "update record").await);
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("failed to parse response: {e}")))?;

        let record = self
            .from_wire_record(&json["result"])
            .ok_or_else(|| Error::Http("invalid response format for updated record".to_string()))?;
        self.cache.upsert(record.clone());
        Ok(record)
    }

    async fn delete(&self, external_id: &str) -> Result<()> {
        let zone_id = self.get_zone_id().await?;

        if self.dry_run {
            tracing::info!(%external_id, "[dry-run] would delete record");
            self.cache.remove(external_id);
            return Ok(());
        }

        let url = format!("{CLOUDFLARE_API_BASE}/zones/{zone_id}/dns_records/{external_id}");
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::transport(format!("HTTP request failed: {e}")))?;

        // Deleting an unknown id is idempotent: treat 404 as success.
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(self.map_error(response, "delete record").await);
        }

        self.cache.remove(external_id);
        Ok(())
    }

    fn validate(&self, desired: &DesiredRecord) -> Result<()> {
        match desired.record_type {
            RecordType::A => {
                if desired.content.parse::<std::net::Ipv4Addr>().is_err() {
                    return Err(Error::validation(format!("{} is not a valid IPv4 address", desired.content)));
                }
            }
            RecordType::Aaaa => {
                if desired.content.parse::<std::net::Ipv6Addr>().is_err() {
                    return Err(Error::validation(format!("{} is not a valid IPv6 address", desired.content)));
                }
            }
            RecordType::Mx => {
                if desired.extras.priority.is_none() {
                    return Err(Error::validation("MX records require a priority"));
                }
            }
            RecordType::Srv => {
                if desired.extras.priority.is_none()
                    || desired.extras.weight.is_none()
                    || desired.extras.port.is_none()
                {
                    return Err(Error::validation("SRV records require priority, weight, and port"));
                }
            }
            RecordType::Caa => {
                if desired.extras.flags.is_none() || desired.extras.tag.is_none() {
                    return Err(Error::validation("CAA records require flags and tag"));
                }
            }
            RecordType::Cname | RecordType::Txt | RecordType::Ns => {}
        }

        if desired.ttl != 0 && desired.ttl != 1 && !(60..=86400).contains(&desired.ttl) {
            return Err(Error::validation(format!(
                "TTL {} outside Cloudflare's supported range (60-86400, or 1 for automatic)",
                desired.ttl
            )));
        }

        Ok(())
    }

    fn supports_ownership_marker(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnscompanion_core::{DesiredSource};

    fn provider() -> CloudflareProvider {
        CloudflareProvider::new(
            "cf1",
            "example.com",
            "test_token",
            Some("test_zone_id".to_string()),
            None,
            false,
        )
    }

    #[test]
    #[should_panic(expected = "API token cannot be empty")]
    fn empty_token_panics() {
        CloudflareProvider::new("cf1", "example.com", "", None, None, false);
    }

    #[test]
    fn dry_run_vs_live_constructors() {
        let dry = CloudflareProvider::new_dry_run("cf1", "example.com", "token", None, None);
        let live = CloudflareProvider::new_live("cf1", "example.com", "token", None, None);
        assert!(dry.dry_run);
        assert!(!live.dry_run);
    }

    #[test]
    fn zone_id_preconfigured_is_stored() {
        let p = provider();
        assert_eq!(p.resolved_zone_id(), Some("test_zone_id".to_string()));
    }

    #[test]
    fn api_token_not_exposed_in_debug() {
        let p = provider();
        let debug_str = format!("{p:?}");
        assert!(!debug_str.contains("test_token"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[test]
    fn validate_rejects_bad_ipv4() {
        let p = provider();
        let desired = DesiredRecord {
            provider_id: "cf1".to_string(),
            record_type: RecordType::A,
            name: "a.example.com".to_string(),
            content: "not-an-ip".to_string(),
            ttl: 300,
            extras: RecordExtras::default(),
            proxied: None,
            source: DesiredSource::Direct,
            needs_public_ipv4: false,
            needs_public_ipv6: false,
        };
        assert!(p.validate(&desired).is_err());
    }

    #[test]
    fn validate_requires_mx_priority() {
        let p = provider();
        let desired = DesiredRecord {
            provider_id: "cf1".to_string(),
            record_type: RecordType::Mx,
            name: "example.com".to_string(),
            content: "mail.example.com".to_string(),
            ttl: 300,
            extras: RecordExtras::default(),
            proxied: None,
            source: DesiredSource::Direct,
            needs_public_ipv4: false,
            needs_public_ipv6: false,
        };
        assert!(p.validate(&desired).is_err());
    }

    #[test]
    fn supports_ownership_marker_is_true() {
        assert!(provider().supports_ownership_marker());
    }

    #[test]
    fn from_wire_record_detects_ownership_marker() {
        let p = provider();
        let marked = serde_json::json!({
            "id": "1", "type": "A", "name": "a.example.com", "content": "1.2.3.4",
            "ttl": 300, "comment": OWNERSHIP_MARKER,
        });
        let unmarked = serde_json::json!({
            "id": "2", "type": "A", "name": "b.example.com", "content": "1.2.3.4",
            "ttl": 300, "comment": "hand-managed by someone else",
        });
        let uncommented = serde_json::json!({
            "id": "3", "type": "A", "name": "c.example.com", "content": "1.2.3.4", "ttl": 300,
        });
        assert!(p.from_wire_record(&marked).unwrap().owned);
        assert!(!p.from_wire_record(&unmarked).unwrap().owned);
        assert!(!p.from_wire_record(&uncommented).unwrap().owned);
    }

    #[test]
    fn apex_name_substitutes_bare_zone_in_wire_payload() {
        let p = provider();
        let desired = DesiredRecord {
            provider_id: "cf1".to_string(),
            record_type: RecordType::A,
            name: "@".to_string(),
            content: "1.2.3.4".to_string(),
            ttl: 300,
            extras: RecordExtras::default(),
            proxied: None,
            source: DesiredSource::Direct,
            needs_public_ipv4: false,
            needs_public_ipv6: false,
        };
        let payload = p.to_wire_payload(&desired);
        assert_eq!(payload["name"], "example.com");
    }
}
