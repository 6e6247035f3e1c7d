use crate::{inventory, CloudProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;

const SERVICE: &str = "lighthouse";
const API_VERSION: &str = "2020-03-24";
const DEFAULT_HOST: &str = "lighthouse.tencentcloudapi.com";
const DEFAULT_ENDPOINT: &str = "https://lighthouse.tencentcloudapi.com";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";
const ALGORITHM: &str = "TC3-HMAC-SHA256";

/// Page size for Describe* calls and batch size for Start/Stop (API maximum).
pub const PAGE_LIMIT: usize = 100;

type HmacSha256 = Hmac<Sha256>;

/// Tencent Cloud Lighthouse client for one SecretId/SecretKey pair.
pub struct LighthouseProvider {
    client: Client,
    secret_id: String,
    secret_key: String,
    /// Signed `Host` header value; stays the public API host even when `endpoint` is overridden.
    host: String,
    endpoint: String,
}

impl LighthouseProvider {
    pub fn new(secret_id: String, secret_key: String) -> Result<Self> {
        // reqwest has no overall timeout by default; a stalled API call would hang the cycle.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .context("failed to build Lighthouse HTTP client")?;
        Ok(Self {
            client,
            secret_id: secret_id.trim().to_string(),
            secret_key: secret_key.trim().to_string(),
            host: DEFAULT_HOST.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// Sends requests to another base URL (regional endpoint, proxy, local test server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, action: &str, region: &str, payload: &Value) -> Result<Value> {
        let body = serde_json::to_string(payload)?;
        let now = Utc::now();
        let authorization = sign_request(
            &self.secret_id,
            &self.secret_key,
            &self.host,
            SERVICE,
            &body,
            now,
        )?;
        let url = format!("{}/", self.endpoint);

        tracing::debug!(
            "[Lighthouse API] POST {} action={} region={} payload={}",
            url,
            action,
            region,
            body
        );

        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header(reqwest::header::HOST, &self.host)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header("X-TC-Action", action)
            .header("X-TC-Timestamp", now.timestamp().to_string())
            .header("X-TC-Version", API_VERSION)
            .header("X-TC-Region", region)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Lighthouse {} request failed", action))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "Lighthouse {} failed: status={} body={}",
                action,
                status.as_u16(),
                text
            ));
        }

        let json_resp: Value = serde_json::from_str(&text)
            .with_context(|| format!("Lighthouse {} returned invalid JSON", action))?;
        tracing::debug!("[Lighthouse API] {} response: {}", action, json_resp);
        unwrap_response(action, json_resp)
    }

    async fn lifecycle(&self, action: &str, region: &str, instance_ids: &[String]) -> Result<()> {
        for batch in instance_ids.chunks(PAGE_LIMIT) {
            let payload = json!({ "InstanceIds": batch });
            let resp = self.call(action, region, &payload).await?;
            tracing::info!(
                "✅ [Lighthouse API] {} accepted {} instance(s) in {} (request_id={})",
                action,
                batch.len(),
                region,
                resp["RequestId"].as_str().unwrap_or("-")
            );
        }
        Ok(())
    }
}

#[async_trait]
impl CloudProvider for LighthouseProvider {
    fn code(&self) -> &'static str {
        "lighthouse"
    }

    async fn list_instances(&self, region: &str) -> Result<Vec<inventory::DiscoveredInstance>> {
        let mut instances = Vec::new();
        let mut offset = 0usize;
        loop {
            let payload = json!({ "Offset": offset, "Limit": PAGE_LIMIT });
            let resp = self.call("DescribeInstances", region, &payload).await?;
            let page: DescribeInstancesResponse = serde_json::from_value(resp)
                .context("unexpected DescribeInstances response shape")?;

            let fetched = page.instance_set.len();
            instances.extend(page.instance_set.into_iter().map(RawInstance::into_discovered));
            offset += fetched;

            if fetched == 0 || offset as u64 >= page.total_count {
                break;
            }
        }
        tracing::info!("got {} Lighthouse instance(s) in {}", instances.len(), region);
        Ok(instances)
    }

    async fn list_traffic_packages(
        &self,
        region: &str,
        instance_ids: &[String],
    ) -> Result<Vec<inventory::InstanceTraffic>> {
        let mut traffic = Vec::new();
        for batch in instance_ids.chunks(PAGE_LIMIT) {
            let mut offset = 0usize;
            loop {
                let payload = json!({
                    "InstanceIds": batch,
                    "Offset": offset,
                    "Limit": PAGE_LIMIT
                });
                let resp = self
                    .call("DescribeInstancesTrafficPackages", region, &payload)
                    .await?;
                let page: DescribeTrafficResponse = serde_json::from_value(resp)
                    .context("unexpected DescribeInstancesTrafficPackages response shape")?;

                let fetched = page.instance_traffic_package_set.len();
                traffic.extend(
                    page.instance_traffic_package_set
                        .into_iter()
                        .map(RawInstanceTraffic::into_inventory),
                );
                offset += fetched;

                if fetched == 0 || offset as u64 >= page.total_count {
                    break;
                }
            }
        }
        tracing::info!("got {} traffic package record(s) in {}", traffic.len(), region);
        Ok(traffic)
    }

    async fn stop_instances(&self, region: &str, instance_ids: &[String]) -> Result<()> {
        self.lifecycle("StopInstances", region, instance_ids).await
    }

    async fn start_instances(&self, region: &str, instance_ids: &[String]) -> Result<()> {
        self.lifecycle("StartInstances", region, instance_ids).await
    }
}

// --- Wire shapes ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesResponse {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    instance_set: Vec<RawInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawInstance {
    instance_id: String,
    #[serde(default)]
    instance_name: String,
    instance_state: String,
    #[serde(default)]
    expired_time: Option<String>,
    #[serde(default)]
    public_addresses: Option<Vec<String>>,
}

impl RawInstance {
    fn into_discovered(self) -> inventory::DiscoveredInstance {
        inventory::DiscoveredInstance {
            provider_id: self.instance_id,
            name: self.instance_name,
            status: self.instance_state,
            expired_at: self.expired_time,
            public_addresses: self.public_addresses.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeTrafficResponse {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    instance_traffic_package_set: Vec<RawInstanceTraffic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawInstanceTraffic {
    instance_id: String,
    #[serde(default)]
    traffic_package_set: Vec<RawTrafficPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTrafficPackage {
    #[serde(default)]
    traffic_package_id: Option<String>,
    traffic_used: Option<u64>,
    traffic_package_total: Option<u64>,
}

impl RawInstanceTraffic {
    fn into_inventory(self) -> inventory::InstanceTraffic {
        inventory::InstanceTraffic {
            provider_id: self.instance_id,
            packages: self
                .traffic_package_set
                .into_iter()
                .map(|p| inventory::TrafficPackageUsage {
                    package_id: p.traffic_package_id,
                    used_bytes: p.traffic_used,
                    total_bytes: p.traffic_package_total,
                })
                .collect(),
        }
    }
}

/// Extracts `Response` and turns an API-level `Response.Error` into an error.
fn unwrap_response(action: &str, body: Value) -> Result<Value> {
    let Some(response) = body.get("Response") else {
        return Err(anyhow::anyhow!("Lighthouse {} response has no Response object", action));
    };
    if let Some(err) = response.get("Error") {
        return Err(anyhow::anyhow!(
            "Lighthouse {} failed: code={} message={} request_id={}",
            action,
            err["Code"].as_str().unwrap_or("unknown"),
            err["Message"].as_str().unwrap_or(""),
            response["RequestId"].as_str().unwrap_or("-")
        ));
    }
    Ok(response.clone())
}

// --- TC3-HMAC-SHA256 ---

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("invalid HMAC key: {}", e))?;
    mac.update(msg);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Builds the `Authorization` header value for a JSON POST to `/`.
pub fn sign_request(
    secret_id: &str,
    secret_key: &str,
    host: &str,
    service: &str,
    body: &str,
    at: DateTime<Utc>,
) -> Result<String> {
    let timestamp = at.timestamp();
    let date = at.format("%Y-%m-%d").to_string();
    let signed_headers = "content-type;host";

    let canonical_request = format!(
        "POST\n/\n\ncontent-type:{}\nhost:{}\n\n{}\n{}",
        CONTENT_TYPE,
        host,
        signed_headers,
        sha256_hex(body.as_bytes())
    );
    let credential_scope = format!("{}/{}/tc3_request", date, service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        timestamp,
        credential_scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let secret_date = hmac_sha256(format!("TC3{}", secret_key).as_bytes(), date.as_bytes())?;
    let secret_service = hmac_sha256(&secret_date, service.as_bytes())?;
    let secret_signing = hmac_sha256(&secret_service, b"tc3_request")?;
    let signature = hex::encode(hmac_sha256(&secret_signing, string_to_sign.as_bytes())?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, secret_id, credential_scope, signed_headers, signature
    ))
}
