//! Download pipeline
//!
//! Blocks are fetched shard-wise from the peers that agreed on the file's
//! hash. Every block request carries a fresh signed read marker with a
//! strictly increasing counter; the fan-out stops as soon as K shards
//! arrive, the chunk is decoded, trimmed to the remaining file size, and
//! appended to the sink while a running SHA-1 accumulates for the final
//! integrity check.

use crate::blobber::Blobber;
use crate::consensus::Consensus;
use crate::executor::Dispatcher;
use crate::status::{Operation, StatusCallback};
use crate::transport::BlobberApi;
use crate::upload::chunk_plan;
use shardbox_core::erasure::ShardCodec;
use shardbox_core::error::{Result, ShardboxError};
use shardbox_core::hash::StreamingSha1;
use shardbox_core::wallet::Wallet;
use shardbox_protocol::markers::{now, ReadMarker};
use shardbox_protocol::wire::DownloadBlockRequest;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub(crate) struct DownloadParams<'a> {
    pub allocation_id: &'a str,
    pub owner_id: &'a str,
    pub remote_path: &'a str,
    pub path_hash: &'a str,
    /// Whole-file SHA-1 the sink must match
    pub actual_hash: &'a str,
    pub file_size: u64,
    /// Bit per blobber that agreed on the file hash
    pub download_mask: u64,
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_download(
    codec: &ShardCodec,
    dispatcher: &Dispatcher,
    transport: &dyn BlobberApi,
    blobbers: &[Blobber],
    wallet: &Wallet,
    consensus: &Consensus,
    chunk_size: u64,
    local_path: &Path,
    params: DownloadParams<'_>,
    cancel: &AtomicBool,
    status: &dyn StatusCallback,
) -> Result<()> {
    let result = fetch_to_sink(
        codec, dispatcher, transport, blobbers, wallet, consensus, chunk_size, local_path,
        &params, cancel, status,
    )
    .await;
    if result.is_err() {
        // Never leave a partial or corrupt sink behind
        let _ = tokio::fs::remove_file(local_path).await;
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn fetch_to_sink(
    codec: &ShardCodec,
    dispatcher: &Dispatcher,
    transport: &dyn BlobberApi,
    blobbers: &[Blobber],
    wallet: &Wallet,
    consensus: &Consensus,
    chunk_size: u64,
    local_path: &Path,
    params: &DownloadParams<'_>,
    cancel: &AtomicBool,
    status: &dyn StatusCallback,
) -> Result<()> {
    let data_shards = codec.config().data_shards as u64;
    let total_shards = codec.config().total_shards();
    let peers: Vec<usize> = (0..blobbers.len())
        .filter(|i| params.download_mask & (1 << i) != 0)
        .collect();
    if peers.len() < data_shards as usize {
        return Err(ShardboxError::NoConsensus {
            rate: consensus.rate(peers.len(), blobbers.len()),
            required: consensus.threshold(),
        });
    }

    // Seed read counters from each peer's last accepted marker
    let seeds = dispatcher
        .wait(peers.iter().copied(), |i| {
            transport.latest_read_marker(&blobbers[i].info)
        })
        .await;
    for seed in seeds {
        match seed.result {
            Ok(counter) => blobbers[seed.index].seed_read_counter(counter),
            Err(e) => warn!(peer = seed.index, error = %e, "read marker seed failed"),
        }
    }

    let (per_shard, blocks) = chunk_plan(params.file_size, data_shards, chunk_size);
    debug!(
        path = params.remote_path,
        size = params.file_size,
        blocks,
        peers = peers.len(),
        "starting download pipeline"
    );
    status.started(
        params.allocation_id,
        params.remote_path,
        Operation::Download,
        params.file_size,
    );

    let mut sink = tokio::fs::File::create(local_path).await?;
    let mut file_hash = StreamingSha1::new();
    let mut written: u64 = 0;

    for block in 1..=blocks {
        if cancel.load(Ordering::SeqCst) {
            return Err(ShardboxError::Cancelled);
        }
        let piece_len = ((per_shard - (block - 1) * chunk_size).min(chunk_size)) as usize;

        let results = dispatcher
            .first_k(peers.iter().copied(), data_shards as usize, |i| async move {
                let blobber = &blobbers[i];
                let mut marker = ReadMarker {
                    client_id: wallet.client_id.clone(),
                    client_public_key: wallet.client_key.clone(),
                    blobber_id: blobber.info.id.clone(),
                    allocation_id: params.allocation_id.to_string(),
                    owner_id: params.owner_id.to_string(),
                    timestamp: now(),
                    counter: blobber.next_read_counter(),
                    signature: String::new(),
                };
                marker.sign(wallet)?;
                let request = DownloadBlockRequest {
                    path_hash: params.path_hash.to_string(),
                    block_num: block,
                    read_marker: serde_json::to_string(&marker)?,
                };
                transport.download_block(&blobber.info, &request).await
            })
            .await;

        let mut shards: Vec<Option<Vec<u8>>> = vec![None; total_shards];
        let mut got = 0;
        for peer in results {
            match peer.result {
                Ok(bytes) if bytes.len() == piece_len => {
                    shards[peer.index] = Some(bytes.to_vec());
                    got += 1;
                }
                Ok(bytes) => warn!(
                    peer = peer.index,
                    expected = piece_len,
                    got = bytes.len(),
                    "shard piece has wrong length, discarding"
                ),
                Err(e) => debug!(peer = peer.index, error = %e, "block fetch failed"),
            }
        }
        if got < data_shards as usize {
            return Err(ShardboxError::NoConsensus {
                rate: consensus.rate(got, blobbers.len()),
                required: consensus.threshold(),
            });
        }

        let chunk = codec.decode(&shards, piece_len)?;
        let take = ((params.file_size - written) as usize).min(chunk.len());
        sink.write_all(&chunk[..take]).await?;
        file_hash.update(&chunk[..take]);
        written += take as u64;
        status.in_progress(
            params.allocation_id,
            params.remote_path,
            Operation::Download,
            written,
        );
    }

    sink.flush().await?;
    let computed = file_hash.finish();
    if computed != params.actual_hash {
        return Err(ShardboxError::Integrity(format!(
            "downloaded content hash {} does not match recorded {}",
            computed, params.actual_hash
        )));
    }
    Ok(())
}
