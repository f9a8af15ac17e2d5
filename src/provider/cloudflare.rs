use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::CloudflareConfig;
use crate::credentials::Credentials;

/// Cloudflare caps the zones listing at 50 per page.
const ZONES_PER_PAGE: u32 = 50;
const RECORDS_PER_PAGE: u32 = 100;
const RECORD_TYPE: &str = "A";

/// Thin client over the Cloudflare v4 API.
///
/// Every public operation issues exactly one request. Failures of any kind
/// (transport, HTTP status, `success: false`, undecodable body) are logged and
/// reported as `None` / `false`, never as an error.
pub struct CloudflareClient {
    client: Client,
    api_base: String,
}

impl CloudflareClient {
    pub fn new(config: &CloudflareConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for Cloudflare")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Names of all zones visible to `creds`, in the order Cloudflare lists them.
    pub async fn list_domains(&self, creds: &Credentials) -> Option<Vec<String>> {
        let zones = absent_on_error("get domains", self.list_zones(creds).await)?;
        Some(zones.into_iter().map(|zone| zone.name).collect())
    }

    /// Zone id of `domain`. The first zone whose name matches exactly wins.
    pub async fn resolve_zone(&self, creds: &Credentials, domain: &str) -> Option<String> {
        let zones = absent_on_error("get zone ID", self.list_zones(creds).await)?;
        let zone_id = zones
            .into_iter()
            .find(|zone| zone.name == domain)
            .map(|zone| zone.id);
        if zone_id.is_none() {
            debug!("No zone named {} on this account", domain);
        }
        zone_id
    }

    /// A records of a zone as record name -> record id.
    pub async fn list_records(
        &self,
        creds: &Credentials,
        zone_id: &str,
    ) -> Option<BTreeMap<String, String>> {
        let path = format!(
            "/zones/{}/dns_records?type={}&per_page={}",
            zone_id, RECORD_TYPE, RECORDS_PER_PAGE
        );
        let records: Vec<DnsRecord> =
            absent_on_error("get DNS records", self.get(creds, &path).await)?;
        Some(
            records
                .into_iter()
                .map(|record| (record.name, record.id))
                .collect(),
        )
    }

    /// Current content of a record, as stored by Cloudflare.
    pub async fn read_record_value(
        &self,
        creds: &Credentials,
        zone_id: &str,
        record_id: &str,
    ) -> Option<String> {
        let path = format!("/zones/{}/dns_records/{}", zone_id, record_id);
        let record: DnsRecord = absent_on_error("get DNS record", self.get(creds, &path).await)?;
        record.content
    }

    /// Overwrites a record with an A record pointing at `new_value`.
    pub async fn write_record(
        &self,
        creds: &Credentials,
        zone_id: &str,
        record_name: &str,
        record_id: &str,
        new_value: &str,
    ) -> bool {
        let path = format!("/zones/{}/dns_records/{}", zone_id, record_id);
        let body = UpdateRecordRequest {
            record_type: RECORD_TYPE,
            name: record_name,
            content: new_value,
        };

        let request = self.request(reqwest::Method::PUT, creds, &path).json(&body);
        match send::<DnsRecord>(request).await {
            Ok(_) => {
                info!("Updated DNS record {} to {}", record_name, new_value);
                true
            }
            Err(e) => {
                error!("Failed to update DNS record {}: {:#}", record_name, e);
                false
            }
        }
    }

    async fn list_zones(&self, creds: &Credentials) -> Result<Vec<Zone>> {
        let path = format!("/zones?per_page={}", ZONES_PER_PAGE);
        self.get(creds, &path).await
    }

    async fn get<T: DeserializeOwned>(&self, creds: &Credentials, path: &str) -> Result<T> {
        send(self.request(reqwest::Method::GET, creds, path)).await
    }

    fn request(&self, method: reqwest::Method, creds: &Credentials, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.api_base, path);
        debug!("{} {}", method, url);

        self.client
            .request(method, &url)
            .header("X-Auth-Email", &creds.email)
            .header("Authorization", creds.authorization())
            .header("Content-Type", "application/json")
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request
        .send()
        .await
        .context("Failed to send request to Cloudflare")?;

    let status = response.status();
    let body: CloudflareResponse<T> = response
        .json()
        .await
        .with_context(|| format!("Failed to parse Cloudflare response (HTTP {})", status))?;

    if !status.is_success() || !body.success {
        let errors: Vec<String> = body
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect();
        anyhow::bail!("Cloudflare API error (HTTP {}): {}", status, errors.join(", "));
    }

    body.result
        .ok_or_else(|| anyhow::anyhow!("No result in Cloudflare response"))
}

fn absent_on_error<T>(action: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Failed to {}: {:#}", action, e);
            None
        }
    }
}

// Cloudflare API types

#[derive(Debug, Serialize)]
struct UpdateRecordRequest<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CloudflareResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<CloudflareError>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CloudflareError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    name: String,
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AuthKind;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn client_for(server: &MockServer) -> CloudflareClient {
        CloudflareClient::new(&CloudflareConfig {
            api_base: server.base_url(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn global_key() -> Credentials {
        Credentials::new("ops@example.com", "global-key", AuthKind::GlobalKey)
    }

    fn zones_body() -> serde_json::Value {
        json!({
            "success": true,
            "errors": [],
            "result": [
                { "id": "Z2", "name": "b.com" },
                { "id": "Z1", "name": "a.com" },
                { "id": "Z3", "name": "c.org" }
            ]
        })
    }

    #[tokio::test]
    async fn list_domains_keeps_provider_order() {
        let server = MockServer::start_async().await;
        let zones = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/zones")
                    .header("X-Auth-Email", "ops@example.com")
                    .header("Authorization", "global-key");
                then.status(200).json_body(zones_body());
            })
            .await;

        let domains = client_for(&server).list_domains(&global_key()).await;

        assert_eq!(
            domains,
            Some(vec!["b.com".to_string(), "a.com".to_string(), "c.org".to_string()])
        );
        zones.assert_async().await;
    }

    #[tokio::test]
    async fn api_token_is_sent_as_bearer() {
        let server = MockServer::start_async().await;
        let zones = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/zones")
                    .header("Authorization", "Bearer scoped-token");
                then.status(200).json_body(zones_body());
            })
            .await;

        let creds = Credentials::new("ops@example.com", "scoped-token", AuthKind::ApiToken);
        assert!(client_for(&server).list_domains(&creds).await.is_some());
        zones.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_credentials_are_absent() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/zones");
                then.status(403).json_body(json!({
                    "success": false,
                    "errors": [{ "code": 9103, "message": "Unknown X-Auth-Key or X-Auth-Email" }],
                    "result": null
                }));
            })
            .await;

        assert_eq!(client_for(&server).list_domains(&global_key()).await, None);
    }

    #[tokio::test]
    async fn unreachable_api_is_absent() {
        let client = CloudflareClient::new(&CloudflareConfig {
            api_base: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
        })
        .unwrap();

        assert_eq!(client.list_domains(&global_key()).await, None);
        assert_eq!(client.resolve_zone(&global_key(), "a.com").await, None);
        assert!(!client.write_record(&global_key(), "Z1", "a.com", "R1", "1.1.1.1").await);
    }

    #[tokio::test]
    async fn slow_api_times_out_as_absent() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/zones");
                then.status(200)
                    .json_body(zones_body())
                    .delay(Duration::from_secs(3));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/zones/Z1/dns_records/R1");
                then.status(200)
                    .json_body(json!({
                        "success": true,
                        "result": { "id": "R1", "name": "a.com", "type": "A", "content": "2.2.2.2" }
                    }))
                    .delay(Duration::from_secs(3));
            })
            .await;
        let client = CloudflareClient::new(&CloudflareConfig {
            api_base: server.base_url(),
            timeout_secs: 1,
        })
        .unwrap();

        assert_eq!(client.list_domains(&global_key()).await, None);
        assert!(!client.write_record(&global_key(), "Z1", "a.com", "R1", "2.2.2.2").await);
    }

    #[tokio::test]
    async fn non_json_error_page_is_absent() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/zones");
                then.status(502).body("<html>Bad gateway</html>");
            })
            .await;

        assert_eq!(client_for(&server).list_domains(&global_key()).await, None);
    }

    #[tokio::test]
    async fn resolve_zone_matches_exact_name() {
        let server = MockServer::start_async().await;
        let zones = server
            .mock_async(|when, then| {
                when.method(GET).path("/zones");
                then.status(200).json_body(zones_body());
            })
            .await;
        let client = client_for(&server);

        assert_eq!(client.resolve_zone(&global_key(), "a.com").await.as_deref(), Some("Z1"));
        assert_eq!(client.resolve_zone(&global_key(), "a.com").await.as_deref(), Some("Z1"));
        assert_eq!(client.resolve_zone(&global_key(), "www.a.com").await, None);
        assert_eq!(client.resolve_zone(&global_key(), "A.COM").await, None);
        zones.assert_hits_async(4).await;
    }

    #[tokio::test]
    async fn resolve_zone_first_listed_wins() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/zones");
                then.status(200).json_body(json!({
                    "success": true,
                    "result": [
                        { "id": "first", "name": "dup.com" },
                        { "id": "second", "name": "dup.com" }
                    ]
                }));
            })
            .await;

        let zone = client_for(&server).resolve_zone(&global_key(), "dup.com").await;
        assert_eq!(zone.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn list_records_maps_names_to_ids() {
        let server = MockServer::start_async().await;
        let records = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/zones/Z1/dns_records")
                    .query_param("type", "A");
                then.status(200).json_body(json!({
                    "success": true,
                    "result": [
                        { "id": "R1", "name": "a.com", "type": "A", "content": "1.1.1.1" },
                        { "id": "R2", "name": "www.a.com", "type": "A", "content": "1.1.1.1" }
                    ]
                }));
            })
            .await;

        let listed = client_for(&server)
            .list_records(&global_key(), "Z1")
            .await
            .unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed["a.com"], "R1");
        assert_eq!(listed["www.a.com"], "R2");
        records.assert_async().await;
    }

    #[tokio::test]
    async fn read_record_value_returns_content() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/zones/Z1/dns_records/R1");
                then.status(200).json_body(json!({
                    "success": true,
                    "result": { "id": "R1", "name": "a.com", "type": "A", "content": "1.1.1.1" }
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/zones/Z1/dns_records/gone");
                then.status(404).json_body(json!({
                    "success": false,
                    "errors": [{ "code": 81044, "message": "Record does not exist." }]
                }));
            })
            .await;
        let client = client_for(&server);

        assert_eq!(
            client.read_record_value(&global_key(), "Z1", "R1").await.as_deref(),
            Some("1.1.1.1")
        );
        assert_eq!(client.read_record_value(&global_key(), "Z1", "gone").await, None);
    }

    #[tokio::test]
    async fn write_record_puts_a_record() {
        let server = MockServer::start_async().await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/zones/Z1/dns_records/R1")
                    .header("X-Auth-Email", "ops@example.com")
                    .json_body(json!({ "type": "A", "name": "a.com", "content": "2.2.2.2" }));
                then.status(200).json_body(json!({
                    "success": true,
                    "result": { "id": "R1", "name": "a.com", "type": "A", "content": "2.2.2.2" }
                }));
            })
            .await;

        let written = client_for(&server)
            .write_record(&global_key(), "Z1", "a.com", "R1", "2.2.2.2")
            .await;

        assert!(written);
        put.assert_async().await;
    }

    #[tokio::test]
    async fn write_record_reports_api_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/zones/Z1/dns_records/R1");
                then.status(400).json_body(json!({
                    "success": false,
                    "errors": [{ "code": 9005, "message": "Content for A record is invalid." }]
                }));
            })
            .await;

        let written = client_for(&server)
            .write_record(&global_key(), "Z1", "a.com", "R1", "not-an-ip")
            .await;

        assert!(!written);
    }
}
