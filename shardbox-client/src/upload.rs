//! Upload/update pipeline
//!
//! One splitter task reads the local file chunk by chunk, encodes each
//! chunk into shards, and feeds shard `i` into a bounded channel consumed
//! by blobber `i`'s uploader. Uploaders hash their shard as it arrives
//! (SHA-1 content hash plus a Merkle tree over chunk pieces), then send
//! one multipart request and check the peer echoed the same hashes back.
//!
//! The splitter closes the channels after the terminal chunk so uploaders
//! exit cleanly; repair runs reuse the file's known whole-file hash
//! instead of re-hashing.

use crate::blobber::Blobber;
use crate::executor::{Dispatcher, PeerResult};
use crate::status::{Operation, StatusCallback};
use crate::transport::BlobberApi;
use bytes::{Bytes, BytesMut};
use shardbox_core::erasure::ShardCodec;
use shardbox_core::error::{Result, ShardboxError};
use shardbox_core::hash::{hash_str, StreamingSha1};
use shardbox_core::merkle::MerkleTree;
use shardbox_protocol::wire::UploadFormData;
use std::path::Path;
use std::sync::OnceLock;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Clone, Copy)]
pub(crate) struct UploadParams<'a> {
    pub allocation_id: &'a str,
    pub remote_path: &'a str,
    pub update: bool,
    pub repair: bool,
    /// Whole-file hash reused during repair instead of re-hashing
    pub known_actual_hash: Option<&'a str>,
    /// Bit per blobber that receives a shard
    pub upload_mask: u64,
    pub op: Operation,
}

/// One blobber's accepted shard
pub(crate) struct ShardUploadResult {
    pub file_hash: String,
}

pub(crate) struct UploadOutcome {
    pub file_size: u64,
    pub actual_hash: String,
    pub shard_size: u64,
    pub results: Vec<PeerResult<ShardUploadResult>>,
}

/// Hash identifying one file version as stored on one blobber
pub(crate) fn file_ref_hash(
    allocation_id: &str,
    name: &str,
    remote_path: &str,
    shard_size: u64,
    content_hash: &str,
    merkle_root: &str,
    actual_size: u64,
    actual_hash: &str,
) -> String {
    hash_str(&format!(
        "{}:f:{}:{}:{}:{}:{}:{}:{}",
        allocation_id, name, remote_path, shard_size, content_hash, merkle_root, actual_size,
        actual_hash
    ))
}

/// Bytes per shard and chunks per shard for a file of `size` bytes
pub(crate) fn chunk_plan(size: u64, data_shards: u64, chunk_size: u64) -> (u64, u64) {
    let per_shard = size.div_ceil(data_shards);
    let chunks = per_shard.div_ceil(chunk_size);
    (per_shard, chunks)
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_upload(
    codec: &ShardCodec,
    dispatcher: &Dispatcher,
    transport: &dyn BlobberApi,
    blobbers: &[Blobber],
    chunk_size: u64,
    local_path: &Path,
    params: UploadParams<'_>,
    status: &dyn StatusCallback,
) -> Result<UploadOutcome> {
    let data_shards = codec.config().data_shards as u64;
    let meta = tokio::fs::metadata(local_path).await?;
    let size = meta.len();
    if size == 0 {
        return Err(ShardboxError::Configuration(
            "cannot upload an empty file".to_string(),
        ));
    }
    let (per_shard, chunks) = chunk_plan(size, data_shards, chunk_size);
    let (_, file_name) = crate::path::split(params.remote_path);
    if file_name.is_empty() {
        return Err(ShardboxError::Configuration(format!(
            "remote path names no file: {}",
            params.remote_path
        )));
    }

    let participants: Vec<usize> = (0..blobbers.len())
        .filter(|i| params.upload_mask & (1 << i) != 0)
        .collect();
    if participants.is_empty() {
        return Err(ShardboxError::Internal("empty upload mask".to_string()));
    }
    debug!(
        path = params.remote_path,
        size,
        per_shard,
        chunks,
        peers = participants.len(),
        "starting upload pipeline"
    );
    status.started(params.allocation_id, params.remote_path, params.op, size);

    // Set by the splitter before it closes the shard channels
    let actual_hash_cell: OnceLock<String> = OnceLock::new();

    let mut senders = Vec::with_capacity(participants.len());
    let mut receivers = Vec::with_capacity(participants.len());
    for _ in &participants {
        let (tx, rx) = mpsc::channel::<Bytes>(1);
        senders.push(tx);
        receivers.push(rx);
    }

    let splitter = {
        let participants = &participants;
        let actual_hash_cell = &actual_hash_cell;
        let status = &status;
        async move {
            let mut file = tokio::fs::File::open(local_path).await?;
            let mut hasher = if params.repair {
                None
            } else {
                Some(StreamingSha1::new())
            };
            let mut read_total: u64 = 0;
            for chunk_idx in 0..chunks {
                let shard_piece = (per_shard - chunk_idx * chunk_size).min(chunk_size);
                let chunk_len = (shard_piece * data_shards) as usize;
                let mut buf = vec![0u8; chunk_len];
                let real = ((size - read_total) as usize).min(chunk_len);
                file.read_exact(&mut buf[..real]).await?;
                read_total += real as u64;
                if let Some(h) = hasher.as_mut() {
                    h.update(&buf[..real]);
                }
                let shards = codec.encode(&buf)?;
                for (slot, &idx) in participants.iter().enumerate() {
                    // A dead uploader already recorded its own failure
                    let _ = senders[slot].send(shards[idx].clone()).await;
                }
                status.in_progress(params.allocation_id, params.remote_path, params.op, read_total);
            }
            let actual = if params.repair {
                params.known_actual_hash.unwrap_or_default().to_string()
            } else {
                hasher.map(StreamingSha1::finish).unwrap_or_default()
            };
            let _ = actual_hash_cell.set(actual);
            drop(senders);
            Ok::<(), ShardboxError>(())
        }
    };

    let uploads = futures::future::join_all(receivers.into_iter().zip(participants.iter()).map(
        |(mut rx, &idx)| {
            let blobber = &blobbers[idx];
            let file_name = file_name.clone();
            let actual_hash_cell = &actual_hash_cell;
            async move {
                let mut sha = StreamingSha1::new();
                let mut merkle = MerkleTree::new();
                let mut payload = BytesMut::new();
                while let Some(piece) = rx.recv().await {
                    sha.update(&piece);
                    merkle.push_leaf(&piece);
                    payload.extend_from_slice(&piece);
                }
                let content_hash = sha.finish();
                let merkle_root = merkle.root();
                let actual_hash = actual_hash_cell.get().cloned().unwrap_or_default();
                let shard_size = payload.len() as u64;
                let form = UploadFormData {
                    connection_id: blobber.conn.connection_id.clone(),
                    filename: file_name.clone(),
                    filepath: params.remote_path.to_string(),
                    content_hash: content_hash.clone(),
                    merkle_root: merkle_root.clone(),
                    actual_hash: actual_hash.clone(),
                    actual_size: size,
                };
                let payload = payload.freeze();
                let peer = dispatcher
                    .single(idx, || {
                        transport.upload_shard(&blobber.info, params.update, &form, payload.clone())
                    })
                    .await;
                let result = peer.result.and_then(|resp| {
                    if resp.content_hash != content_hash
                        || resp.merkle_root != merkle_root
                        || resp.filename != file_name
                        || resp.size != shard_size
                    {
                        warn!(peer = idx, "peer echoed mismatching shard manifest");
                        return Err(ShardboxError::Integrity(format!(
                            "blobber {} stored a different shard than sent",
                            blobber.info.id
                        )));
                    }
                    Ok(ShardUploadResult {
                        file_hash: file_ref_hash(
                            params.allocation_id,
                            &file_name,
                            params.remote_path,
                            shard_size,
                            &content_hash,
                            &merkle_root,
                            size,
                            &actual_hash,
                        ),
                    })
                });
                PeerResult {
                    index: idx,
                    result,
                    latency_ms: peer.latency_ms,
                }
            }
        },
    ));

    let (split_result, results) = tokio::join!(splitter, uploads);
    split_result?;

    let actual_hash = actual_hash_cell.get().cloned().unwrap_or_default();
    Ok(UploadOutcome {
        file_size: size,
        actual_hash,
        shard_size: per_shard,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_plan() {
        // 100 bytes over k=2 with 64 KiB chunks: one 50-byte shard block
        assert_eq!(chunk_plan(100, 2, 64 * 1024), (50, 1));
        // Larger than one chunk per shard
        assert_eq!(chunk_plan(300 * 1024, 2, 64 * 1024), (150 * 1024, 3));
        // Uneven sizes round the shard up
        assert_eq!(chunk_plan(101, 2, 64 * 1024), (51, 1));
    }

    #[test]
    fn test_file_ref_hash_is_field_sensitive() {
        let a = file_ref_hash("alloc", "f", "/f", 50, "ch", "mr", 100, "ah");
        let b = file_ref_hash("alloc", "f", "/f", 50, "ch2", "mr", 100, "ah");
        assert_ne!(a, b);
        assert_eq!(
            a,
            hash_str("alloc:f:f:/f:50:ch:mr:100:ah")
        );
    }
}
