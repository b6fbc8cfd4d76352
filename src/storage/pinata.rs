/// Pinata pinning API client
///
/// Writes snapshots with `pinJSONToIPFS`, lists them with `pinList`, and
/// reads them back through the configured IPFS gateway.
///
/// API Documentation: https://docs.pinata.cloud/api-reference

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::flush::Uploader;
use crate::model::{format_timestamp, Snapshot, SnapshotMetadata, StoreError, UploadError};
use crate::storage::SnapshotStore;

/// Page size for `pinList`. Pinata caps it at 1000.
const PAGE_LIMIT: usize = 1000;

/// Name prefix given to every snapshot pin.
pub const SNAPSHOT_NAME_PREFIX: &str = "ripple-snapshot";

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PinResponse {
    #[serde(rename = "IpfsHash")]
    pub ipfs_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct PinListResponse {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub rows: Vec<PinRow>,
}

#[derive(Debug, Deserialize)]
pub struct PinRow {
    pub ipfs_pin_hash: String,
    #[serde(default)]
    pub date_pinned: Option<String>,
    #[serde(default)]
    pub metadata: Option<PinRowMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct PinRowMetadata {
    #[serde(default)]
    pub name: Option<String>,
}

impl PinRow {
    /// True for pins written by this service's uploader.
    pub fn is_snapshot(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.name.as_deref())
            .is_some_and(|name| name.starts_with(SNAPSHOT_NAME_PREFIX))
    }
}

#[derive(Debug, Serialize)]
struct PinRequest<'a> {
    #[serde(rename = "pinataContent")]
    content: &'a Snapshot,
    #[serde(rename = "pinataMetadata")]
    metadata: serde_json::Value,
}

// ============================================================================
// URL and body construction
// ============================================================================

pub fn build_pin_url(api_url: &str) -> String {
    format!("{}/pinning/pinJSONToIPFS", api_url.trim_end_matches('/'))
}

/// Lists pinned snapshots only. Pinata matches `metadata[name]` as a
/// substring, so rows are still checked with [`PinRow::is_snapshot`].
pub fn build_pin_list_url(api_url: &str, offset: usize) -> String {
    format!(
        "{}/data/pinList?status=pinned&metadata[name]={}&pageLimit={}&pageOffset={}",
        api_url.trim_end_matches('/'),
        SNAPSHOT_NAME_PREFIX,
        PAGE_LIMIT,
        offset
    )
}

/// Accepts `example.mypinata.cloud` or `https://example.mypinata.cloud/`.
pub fn build_gateway_url(gateway: &str, cid: &str) -> String {
    let gateway = gateway.trim_end_matches('/');
    if gateway.starts_with("http://") || gateway.starts_with("https://") {
        format!("{}/ipfs/{}", gateway, cid)
    } else {
        format!("https://{}/ipfs/{}", gateway, cid)
    }
}

/// Pin metadata. Pinata keyvalues must be scalars, so topics are joined.
fn pin_metadata(metadata: &SnapshotMetadata) -> serde_json::Value {
    let timestamp = format_timestamp(&metadata.timestamp);
    json!({
        "name": format!("{}-{}", SNAPSHOT_NAME_PREFIX, timestamp),
        "keyvalues": {
            "timestamp": timestamp,
            "totalRecords": metadata.total_records,
            "topics": metadata.topics.join(","),
        }
    })
}

// ============================================================================
// Client
// ============================================================================

pub struct PinataClient {
    client: reqwest::blocking::Client,
    api_url: String,
    jwt: String,
    gateway: Option<String>,
}

impl PinataClient {
    pub fn new(
        api_url: &str,
        jwt: &str,
        gateway: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            jwt: jwt.to_string(),
            gateway: gateway.map(String::from),
        })
    }

    fn list_page(&self, offset: usize) -> Result<PinListResponse, StoreError> {
        let response = self
            .client
            .get(build_pin_list_url(&self.api_url, offset))
            .bearer_auth(&self.jwt)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Http(response.status().as_u16()));
        }
        response
            .json::<PinListResponse>()
            .map_err(|e| StoreError::Parse(e.to_string()))
    }
}

impl Uploader for PinataClient {
    fn upload(&self, snapshot: &Snapshot, metadata: &SnapshotMetadata) -> Result<String, UploadError> {
        let body = PinRequest {
            content: snapshot,
            metadata: pin_metadata(metadata),
        };

        let response = self
            .client
            .post(build_pin_url(&self.api_url))
            .bearer_auth(&self.jwt)
            .json(&body)
            .send()
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Http(response.status().as_u16()));
        }

        let pinned: PinResponse = response
            .json()
            .map_err(|e| UploadError::Parse(e.to_string()))?;
        Ok(pinned.ipfs_hash)
    }
}

impl SnapshotStore for PinataClient {
    fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut cids = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.list_page(offset)?;
            let fetched = page.rows.len();
            cids.extend(
                page.rows
                    .into_iter()
                    .filter(PinRow::is_snapshot)
                    .map(|row| row.ipfs_pin_hash),
            );
            if fetched < PAGE_LIMIT {
                break;
            }
            offset += fetched;
        }
        Ok(cids)
    }

    fn fetch(&self, cid: &str) -> Result<Snapshot, StoreError> {
        let gateway = self
            .gateway
            .as_deref()
            .unwrap_or("gateway.pinata.cloud");

        let response = self
            .client
            .get(build_gateway_url(gateway, cid))
            .send()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Http(response.status().as_u16()));
        }
        let text = response.text().map_err(|e| StoreError::Transport(e.to_string()))?;
        parse_snapshot(&text)
    }
}

/// Parses a stored snapshot payload.
pub fn parse_snapshot(body: &str) -> Result<Snapshot, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Parse(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
