//! Blobber HTTP surface
//!
//! Routes, auth headers, and the request/response bodies exchanged with
//! storage peers. Bodies are JSON (or multipart fields carrying JSON);
//! field names here are the wire names.

use serde::{Deserialize, Serialize};
use shardbox_core::hash::hash_str;

/// Request routes, each suffixed with the allocation id
pub mod routes {
    pub const UPLOAD: &str = "/v1/file/upload/";
    pub const DOWNLOAD: &str = "/v1/file/download/";
    pub const META: &str = "/v1/file/meta/";
    pub const STATS: &str = "/v1/file/stats/";
    pub const LIST: &str = "/v1/dir/list/";
    pub const RENAME: &str = "/v1/file/rename/";
    pub const COPY: &str = "/v1/file/copy/";
    pub const DELETE: &str = "/v1/file/delete/";
    pub const COMMIT: &str = "/v1/connection/commit/";
    pub const LATEST_READ_MARKER: &str = "/v1/readmarker/latest/";

    /// Full URL for a route against one blobber
    pub fn url(base_url: &str, route: &str, allocation_id: &str) -> String {
        format!("{}{}{}", base_url.trim_end_matches('/'), route, allocation_id)
    }
}

/// Auth headers carried on every request
pub mod headers {
    pub const CLIENT_ID: &str = "X-App-Client-ID";
    pub const CLIENT_KEY: &str = "X-App-Client-Key";
    pub const CLIENT_SIGNATURE: &str = "X-App-Client-Signature";
}

/// The hash a client signs to authenticate requests for an allocation
pub fn allocation_auth_hash(allocation_id: &str) -> String {
    hash_str(allocation_id)
}

/// `uploadMeta` multipart field accompanying a shard upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFormData {
    pub connection_id: String,
    pub filename: String,
    pub filepath: String,
    /// SHA-1 of this blobber's shard bytes
    pub content_hash: String,
    /// Root of the fixed Merkle tree over chunk-shard pieces
    pub merkle_root: String,
    /// SHA-1 of the whole original file (empty during repair re-upload)
    #[serde(default)]
    pub actual_hash: String,
    pub actual_size: u64,
}

/// Blobber reply to a shard upload; must equal the locally computed values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResult {
    pub filename: String,
    pub size: u64,
    pub content_hash: String,
    pub merkle_root: String,
}

/// `uploadMeta` multipart field accompanying a delete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFormData {
    pub connection_id: String,
    pub filename: String,
    pub filepath: String,
}

/// One block fetch; the read marker travels as JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadBlockRequest {
    pub path_hash: String,
    /// 1-based block number within the shard
    pub block_num: u64,
    pub read_marker: String,
}

/// One entry of a directory listing
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub path_hash: String,
    #[serde(default)]
    pub lookup_hash: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub actual_file_hash: String,
    #[serde(default)]
    pub actual_file_size: u64,
    #[serde(default)]
    pub num_of_blocks: u64,
}

/// Directory listing reply
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListResponse {
    #[serde(default)]
    pub allocation_root: String,
    #[serde(default)]
    pub meta: Option<ListEntry>,
    #[serde(default)]
    pub list: Vec<ListEntry>,
}

/// File metadata reply (`/v1/file/meta`)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileMetaResponse {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub path_hash: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub actual_file_hash: String,
    #[serde(default)]
    pub actual_file_size: u64,
}

impl FileMetaResponse {
    /// Summary hash used for majority voting across peers
    pub fn info_hash(&self) -> String {
        hash_str(&format!(
            "{}:{}:{}:{}",
            self.entry_type, self.name, self.actual_file_size, self.actual_file_hash
        ))
    }
}

/// Per-blobber file statistics (`/v1/file/stats`), kept open-ended
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileStatsResponse {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub actual_file_hash: String,
    #[serde(default)]
    pub num_of_block_downloads: u64,
    #[serde(default)]
    pub num_of_updates: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `/v1/readmarker/latest` reply
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LatestReadMarkerResponse {
    #[serde(default)]
    pub counter: u64,
}
