//! Blobber transport
//!
//! The pipelines talk to storage peers through the [`BlobberApi`] trait;
//! [`HttpTransport`] is the production implementation over reqwest, and
//! tests substitute an in-memory peer set. Retry and timeout policy live
//! in the executor, not here.

use crate::blobber::BlobberInfo;
use async_trait::async_trait;
use bytes::Bytes;
use shardbox_core::error::{Result, ShardboxError};
use shardbox_core::wallet::Wallet;
use shardbox_protocol::markers::{DeleteToken, WriteMarker};
use shardbox_protocol::wire::{
    self, headers, routes, DeleteFormData, DownloadBlockRequest, FileMetaResponse,
    FileStatsResponse, LatestReadMarkerResponse, ListResponse, UploadFormData, UploadResult,
};

/// One allocation's view of the blobber HTTP surface
#[async_trait]
pub trait BlobberApi: Send + Sync {
    /// Stream one shard; PUT for a fresh upload, POST for an update
    async fn upload_shard(
        &self,
        blobber: &BlobberInfo,
        update: bool,
        form: &UploadFormData,
        shard: Bytes,
    ) -> Result<UploadResult>;

    /// Fetch one shard block; the request carries a signed read marker
    async fn download_block(
        &self,
        blobber: &BlobberInfo,
        request: &DownloadBlockRequest,
    ) -> Result<Bytes>;

    /// Commit pending changes under a signed write marker
    async fn commit(
        &self,
        blobber: &BlobberInfo,
        connection_id: &str,
        write_marker: &WriteMarker,
    ) -> Result<()>;

    /// Last read-marker counter the blobber accepted; 0 if none
    async fn latest_read_marker(&self, blobber: &BlobberInfo) -> Result<u64>;

    /// File metadata looked up by path hash
    async fn file_meta(&self, blobber: &BlobberInfo, path_hash: &str) -> Result<FileMetaResponse>;

    /// File statistics looked up by path
    async fn file_stats(&self, blobber: &BlobberInfo, path: &str) -> Result<FileStatsResponse>;

    /// Directory listing
    async fn list_dir(&self, blobber: &BlobberInfo, path: &str) -> Result<ListResponse>;

    /// Delete a file under a signed delete token
    async fn delete_file(
        &self,
        blobber: &BlobberInfo,
        form: &DeleteFormData,
        token: &DeleteToken,
    ) -> Result<()>;
}

/// HTTP transport signing every request with the client identity
pub struct HttpTransport {
    client: reqwest::Client,
    allocation_id: String,
    client_id: String,
    client_key: String,
    auth_signature: String,
}

impl HttpTransport {
    pub fn new(allocation_id: &str, wallet: &Wallet) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ShardboxError::Network(e.to_string()))?;
        let auth_signature = wallet.sign(&wire::allocation_auth_hash(allocation_id))?;
        Ok(Self {
            client,
            allocation_id: allocation_id.to_string(),
            client_id: wallet.client_id.clone(),
            client_key: wallet.client_key.clone(),
            auth_signature,
        })
    }

    fn url(&self, blobber: &BlobberInfo, route: &str) -> String {
        routes::url(&blobber.url, route, &self.allocation_id)
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header(headers::CLIENT_ID, &self.client_id)
            .header(headers::CLIENT_KEY, &self.client_key)
            .header(headers::CLIENT_SIGNATURE, &self.auth_signature)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(ShardboxError::ServerRejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn net_err(e: reqwest::Error) -> ShardboxError {
    ShardboxError::Network(e.to_string())
}

#[async_trait]
impl BlobberApi for HttpTransport {
    async fn upload_shard(
        &self,
        blobber: &BlobberInfo,
        update: bool,
        form: &UploadFormData,
        shard: Bytes,
    ) -> Result<UploadResult> {
        let meta = serde_json::to_string(form)?;
        let body = reqwest::multipart::Form::new()
            .text("uploadMeta", meta)
            .part(
                "uploadFile",
                reqwest::multipart::Part::bytes(shard.to_vec()).file_name(form.filename.clone()),
            );
        let url = self.url(blobber, routes::UPLOAD);
        let req = if update {
            self.client.post(&url)
        } else {
            self.client.put(&url)
        };
        let resp = self
            .with_auth(req)
            .multipart(body)
            .send()
            .await
            .map_err(net_err)?;
        let resp = Self::check(resp).await?;
        resp.json().await.map_err(net_err)
    }

    async fn download_block(
        &self,
        blobber: &BlobberInfo,
        request: &DownloadBlockRequest,
    ) -> Result<Bytes> {
        let url = self.url(blobber, routes::DOWNLOAD);
        let resp = self
            .with_auth(self.client.post(&url))
            .form(&[
                ("path_hash", request.path_hash.as_str()),
                ("block_num", &request.block_num.to_string()),
                ("read_marker", request.read_marker.as_str()),
            ])
            .send()
            .await
            .map_err(net_err)?;
        let resp = Self::check(resp).await?;
        resp.bytes().await.map_err(net_err)
    }

    async fn commit(
        &self,
        blobber: &BlobberInfo,
        connection_id: &str,
        write_marker: &WriteMarker,
    ) -> Result<()> {
        let marker = serde_json::to_string(write_marker)?;
        let body = reqwest::multipart::Form::new()
            .text("connection_id", connection_id.to_string())
            .text("write_marker", marker);
        let url = self.url(blobber, routes::COMMIT);
        let resp = self
            .with_auth(self.client.post(&url))
            .multipart(body)
            .send()
            .await
            .map_err(net_err)?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn latest_read_marker(&self, blobber: &BlobberInfo) -> Result<u64> {
        let url = self.url(blobber, routes::LATEST_READ_MARKER);
        let resp = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(net_err)?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        // A client that never read from this peer is not an error
        if status.as_u16() == 404 || body.contains("entity_not_found") {
            return Ok(0);
        }
        if !status.is_success() {
            return Err(ShardboxError::ServerRejected {
                status: status.as_u16(),
                message: body,
            });
        }
        let parsed: LatestReadMarkerResponse = serde_json::from_str(&body)?;
        Ok(parsed.counter)
    }

    async fn file_meta(&self, blobber: &BlobberInfo, path_hash: &str) -> Result<FileMetaResponse> {
        let url = self.url(blobber, routes::META);
        let resp = self
            .with_auth(self.client.post(&url))
            .form(&[("path_hash", path_hash)])
            .send()
            .await
            .map_err(net_err)?;
        let resp = Self::check(resp).await?;
        resp.json().await.map_err(net_err)
    }

    async fn file_stats(&self, blobber: &BlobberInfo, path: &str) -> Result<FileStatsResponse> {
        let url = self.url(blobber, routes::STATS);
        let resp = self
            .with_auth(self.client.get(&url))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(net_err)?;
        let resp = Self::check(resp).await?;
        resp.json().await.map_err(net_err)
    }

    async fn list_dir(&self, blobber: &BlobberInfo, path: &str) -> Result<ListResponse> {
        let url = self.url(blobber, routes::LIST);
        let resp = self
            .with_auth(self.client.get(&url))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(net_err)?;
        let resp = Self::check(resp).await?;
        resp.json().await.map_err(net_err)
    }

    async fn delete_file(
        &self,
        blobber: &BlobberInfo,
        form: &DeleteFormData,
        token: &DeleteToken,
    ) -> Result<()> {
        let meta = serde_json::to_string(form)?;
        let token_json = serde_json::to_string(token)?;
        let body = reqwest::multipart::Form::new()
            .text("uploadMeta", meta)
            .text("delete_token", token_json);
        let url = self.url(blobber, routes::DELETE);
        let resp = self
            .with_auth(self.client.delete(&url))
            .multipart(body)
            .send()
            .await
            .map_err(net_err)?;
        Self::check(resp).await?;
        Ok(())
    }
}
