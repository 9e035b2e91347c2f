//! Allocation session
//!
//! The entry point for one allocation: it owns the wallet, the codec,
//! the per-blobber state, and the background reconciler, and exposes the
//! user-facing operations. Mutations (upload, update, repair, delete,
//! mkdir) are staged against per-blobber connections and take effect on
//! the peers only at [`AllocationSession::commit`].
//!
//! Every operation pauses the reconciler for its duration, and every
//! operation with a status callback makes exactly one terminal call,
//! `completed` or `error`.

use crate::blobber::{Blobber, BlobberInfo};
use crate::consensus::{find_majority, full_mask, Consensus, Majority};
use crate::dir_tree::{self, Ref};
use crate::download::{run_download, DownloadParams};
use crate::executor::{Dispatcher, RequestConfig};
use crate::path;
use crate::reconciler::{resync, Pending, Reconciler, ReconcilerHandle, SyncState};
use crate::status::{Operation, StatusCallback};
use crate::transport::BlobberApi;
use crate::upload::{run_upload, UploadParams};
use shardbox_core::erasure::{ErasureConfig, ShardCodec};
use shardbox_core::error::{Result, ShardboxError};
use shardbox_core::wallet::Wallet;
use shardbox_protocol::markers::{now, AuthTicket, DeleteToken, WriteMarker};
use shardbox_protocol::wire::{DeleteFormData, FileMetaResponse, FileStatsResponse, ListEntry};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Share tickets expire after 90 days
const SHARE_TICKET_LIFETIME_SECS: i64 = 90 * 24 * 3600;

/// Static description of one allocation
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub allocation_id: String,
    pub data_shards: usize,
    pub parity_shards: usize,
    pub chunk_size: u64,
}

impl SessionConfig {
    pub fn new(allocation_id: impl Into<String>, data_shards: usize, parity_shards: usize) -> Self {
        Self {
            allocation_id: allocation_id.into(),
            data_shards,
            parity_shards,
            chunk_size: shardbox_core::CHUNK_SIZE,
        }
    }
}

/// One open allocation
pub struct AllocationSession {
    allocation_id: String,
    wallet: Wallet,
    codec: ShardCodec,
    consensus: Consensus,
    chunk_size: u64,
    transport: Arc<dyn BlobberApi>,
    state: Arc<Mutex<SyncState>>,
    dispatcher: Dispatcher,
    bulk: Dispatcher,
    reconciler: ReconcilerHandle,
    cancel: AtomicBool,
}

impl AllocationSession {
    /// Open a session over an allocation's blobber set.
    ///
    /// `dir_tree_json` restores a previously serialized master tree;
    /// without it the session starts from an empty root and relies on
    /// [`AllocationSession::sync`] to pick up remote state. Must be
    /// called inside a tokio runtime: the reconciler task starts here.
    pub fn open(
        config: SessionConfig,
        wallet: Wallet,
        blobbers: Vec<BlobberInfo>,
        dir_tree_json: Option<&str>,
        transport: Arc<dyn BlobberApi>,
    ) -> Result<Self> {
        let total = config.data_shards + config.parity_shards;
        if blobbers.len() != total {
            return Err(ShardboxError::Configuration(format!(
                "allocation needs {} blobbers, got {}",
                total,
                blobbers.len()
            )));
        }
        if total > 64 {
            return Err(ShardboxError::Configuration(
                "at most 64 blobbers per allocation".to_string(),
            ));
        }
        let codec = ShardCodec::new(ErasureConfig::new(
            config.data_shards,
            config.parity_shards,
        )?)?;
        let consensus = Consensus::new(config.data_shards, total);
        let tree = match dir_tree_json {
            Some(json) => Ref::from_json(json)?,
            None => Ref::new_root(&config.allocation_id),
        };
        let blobbers: Vec<Blobber> = blobbers
            .into_iter()
            .map(|info| Blobber::new(info, &tree))
            .collect();
        let state = Arc::new(Mutex::new(SyncState {
            tree,
            blobbers,
            poll_idx: 0,
            pending: Pending::Idle,
        }));
        let dispatcher = Dispatcher::default();
        let reconciler = Reconciler {
            allocation_id: config.allocation_id.clone(),
            state: Arc::clone(&state),
            transport: Arc::clone(&transport),
            dispatcher: dispatcher.clone(),
            consensus,
        }
        .spawn();
        info!(
            allocation = %config.allocation_id,
            data = config.data_shards,
            parity = config.parity_shards,
            "session opened"
        );
        Ok(Self {
            allocation_id: config.allocation_id,
            wallet,
            codec,
            consensus,
            chunk_size: config.chunk_size,
            transport,
            state,
            dispatcher,
            bulk: Dispatcher::new(RequestConfig::bulk()),
            reconciler,
            cancel: AtomicBool::new(false),
        })
    }

    pub fn allocation_id(&self) -> &str {
        &self.allocation_id
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Stage a new file; fails with `FileExists` if the path is taken
    pub async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        status: &dyn StatusCallback,
    ) -> Result<()> {
        self.put(local_path, remote_path, false, status).await
    }

    /// Stage a new version of an existing file
    pub async fn update(
        &self,
        local_path: &Path,
        remote_path: &str,
        status: &dyn StatusCallback,
    ) -> Result<()> {
        self.put(local_path, remote_path, true, status).await
    }

    async fn put(
        &self,
        local_path: &Path,
        remote_path: &str,
        update: bool,
        status: &dyn StatusCallback,
    ) -> Result<()> {
        let op = if update {
            Operation::Update
        } else {
            Operation::Upload
        };
        self.reconciler.pause().await;
        let result = self.put_inner(local_path, remote_path, update, op, status).await;
        self.reconciler.resume().await;
        self.finish(remote_path, op, status, result)
    }

    async fn put_inner(
        &self,
        local_path: &Path,
        remote_path: &str,
        update: bool,
        op: Operation,
        status: &dyn StatusCallback,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        if state.pending == Pending::Repair {
            return Err(ShardboxError::PendingCommitConflict(
                "a repair awaits commit".to_string(),
            ));
        }
        let exists = dir_tree::get(&state.tree, remote_path).is_some();
        if update && !exists {
            return Err(ShardboxError::NotFound(remote_path.to_string()));
        }
        if !update && exists {
            return Err(ShardboxError::FileExists(remote_path.to_string()));
        }
        let n = state.blobbers.len();
        let params = UploadParams {
            allocation_id: &self.allocation_id,
            remote_path,
            update,
            repair: false,
            known_actual_hash: None,
            upload_mask: full_mask(n),
            op,
        };
        let outcome = run_upload(
            &self.codec,
            &self.bulk,
            self.transport.as_ref(),
            &state.blobbers,
            self.chunk_size,
            local_path,
            params,
            status,
        )
        .await?;

        let ok_count = outcome.results.iter().filter(|r| r.result.is_ok()).count();
        let rate = self.consensus.rate(ok_count, n);
        if !self.consensus.is_min(rate) {
            return Err(ShardboxError::NoConsensus {
                rate,
                required: self.consensus.threshold(),
            });
        }

        for peer in &outcome.results {
            let Ok(shard) = &peer.result else { continue };
            let file = Ref::new_file(
                &self.allocation_id,
                remote_path,
                shard.file_hash.clone(),
                outcome.actual_hash.clone(),
                outcome.file_size,
                self.chunk_size,
            );
            let conn = &mut state.blobbers[peer.index].conn;
            if dir_tree::get(&conn.tree, remote_path).is_some() {
                conn.update_file(&self.allocation_id, file)?;
            } else {
                conn.add_file(&self.allocation_id, file)?;
            }
        }

        let mut file = Ref::new_file(
            &self.allocation_id,
            remote_path,
            outcome.actual_hash.clone(),
            outcome.actual_hash.clone(),
            outcome.file_size,
            self.chunk_size,
        );
        file.blobber_count = ok_count as u32;
        if update {
            dir_tree::update_file(&mut state.tree, &self.allocation_id, file)?;
        } else {
            dir_tree::insert_file(&mut state.tree, &self.allocation_id, file)?;
        }
        state.pending = if update {
            Pending::Update
        } else {
            Pending::Upload
        };
        debug!(path = remote_path, peers = ok_count, "staged across blobbers");
        Ok(outcome.file_size)
    }

    /// Re-upload missing shards to the blobbers that lost them.
    ///
    /// `local_path` must hold the file's current content; its shards are
    /// re-encoded and sent only to peers outside the agreeing majority.
    pub async fn repair(
        &self,
        local_path: &Path,
        remote_path: &str,
        status: &dyn StatusCallback,
    ) -> Result<()> {
        self.reconciler.pause().await;
        let result = self.repair_inner(local_path, remote_path, status).await;
        self.reconciler.resume().await;
        self.finish(remote_path, Operation::Repair, status, result)
    }

    async fn repair_inner(
        &self,
        local_path: &Path,
        remote_path: &str,
        status: &dyn StatusCallback,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        if matches!(state.pending, Pending::Upload | Pending::Update) {
            return Err(ShardboxError::PendingCommitConflict(
                "an upload awaits commit".to_string(),
            ));
        }
        let file = dir_tree::get(&state.tree, remote_path)
            .ok_or_else(|| ShardboxError::NotFound(remote_path.to_string()))?
            .clone();
        let n = state.blobbers.len();
        let majority = self.stats_majority(&state, remote_path).await?;

        let full = full_mask(n);
        if majority.mask == full {
            info!(path = remote_path, "every blobber holds the file, nothing to repair");
            status.started(&self.allocation_id, remote_path, Operation::Repair, 0);
            return Ok(file.actual_size);
        }
        let upload_mask = !majority.mask & full;
        let active = upload_mask.count_ones() as usize;
        info!(
            path = remote_path,
            healthy = majority.count,
            missing = active,
            "repairing shards"
        );

        let params = UploadParams {
            allocation_id: &self.allocation_id,
            remote_path,
            update: false,
            repair: true,
            known_actual_hash: Some(&file.actual_hash),
            upload_mask,
            op: Operation::Repair,
        };
        let outcome = run_upload(
            &self.codec,
            &self.bulk,
            self.transport.as_ref(),
            &state.blobbers,
            self.chunk_size,
            local_path,
            params,
            status,
        )
        .await?;

        let ok_count = outcome.results.iter().filter(|r| r.result.is_ok()).count();
        let rate = self.consensus.rate(ok_count, active);
        if !self.consensus.is_min(rate) {
            return Err(ShardboxError::NoConsensus {
                rate,
                required: self.consensus.threshold(),
            });
        }

        for peer in &outcome.results {
            let Ok(shard) = &peer.result else { continue };
            let repaired = Ref::new_file(
                &self.allocation_id,
                remote_path,
                shard.file_hash.clone(),
                file.actual_hash.clone(),
                file.actual_size,
                self.chunk_size,
            );
            let conn = &mut state.blobbers[peer.index].conn;
            if dir_tree::get(&conn.tree, remote_path).is_some() {
                conn.update_file(&self.allocation_id, repaired)?;
            } else {
                conn.add_file(&self.allocation_id, repaired)?;
            }
        }
        if let Some(node) = dir_tree::get_mut(&mut state.tree, remote_path) {
            node.blobber_count = (majority.count + ok_count) as u32;
        }
        state.pending = Pending::Repair;
        Ok(file.actual_size)
    }

    /// Commit all staged changes by advancing each dirty blobber's
    /// allocation root with a signed write marker.
    ///
    /// Every attempted connection is discarded afterwards, success or
    /// failure; a failed commit leaves the peers on their previous roots.
    pub async fn commit(&self) -> Result<()> {
        self.reconciler.pause().await;
        let result = self.commit_inner().await;
        self.reconciler.resume().await;
        result
    }

    async fn commit_inner(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let dirty: Vec<usize> = state
            .blobbers
            .iter()
            .enumerate()
            .filter(|(_, b)| b.conn.is_dirty())
            .map(|(i, _)| i)
            .collect();
        if dirty.is_empty() {
            debug!("no staged changes to commit");
            state.pending = Pending::Idle;
            return Ok(());
        }
        let ts = now();
        let mut prepared: HashMap<usize, (String, WriteMarker)> = HashMap::new();
        for &idx in &dirty {
            let blobber = &mut state.blobbers[idx];
            let new_root = blobber.conn.allocation_root(ts);
            let mut marker = WriteMarker {
                prev_allocation_root: blobber.allocation_root.clone(),
                allocation_root: new_root,
                allocation_id: self.allocation_id.clone(),
                blobber_id: blobber.info.id.clone(),
                client_id: self.wallet.client_id.clone(),
                size: blobber.conn.size_delta(),
                timestamp: ts,
                signature: String::new(),
            };
            marker.sign(&self.wallet)?;
            prepared.insert(idx, (blobber.conn.connection_id.clone(), marker));
        }

        let results = {
            let blobbers = &state.blobbers;
            let prepared = &prepared;
            self.dispatcher
                .wait(dirty.iter().copied(), |i| {
                    let (conn_id, marker) = &prepared[&i];
                    self.transport.commit(&blobbers[i].info, conn_id, marker)
                })
                .await
        };

        let mut ok_count = 0;
        for peer in &results {
            match &peer.result {
                Ok(()) => {
                    ok_count += 1;
                    if let Some((_, marker)) = prepared.get(&peer.index) {
                        state.blobbers[peer.index].allocation_root =
                            marker.allocation_root.clone();
                    }
                }
                Err(e) => warn!(peer = peer.index, error = %e, "commit rejected"),
            }
        }

        // The staged batch is discarded with the connections, so nothing
        // stays pending after this attempt
        let base = state.tree.clone();
        for &idx in &dirty {
            state.blobbers[idx].conn.reset(&base);
        }
        state.pending = Pending::Idle;

        let rate = self.consensus.rate(ok_count, dirty.len());
        if !self.consensus.is_ok(rate) {
            return Err(ShardboxError::NoConsensus {
                rate,
                required: self.consensus.required_for_ok(),
            });
        }
        info!(peers = ok_count, timestamp = ts, "commit confirmed");
        Ok(())
    }

    /// Reassemble a file into `local_path`.
    ///
    /// Peers vote on the file's identity first; blocks are then fetched
    /// only from the agreeing set, each under a fresh signed read marker.
    pub async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        status: &dyn StatusCallback,
    ) -> Result<()> {
        self.reconciler.pause().await;
        let result = self.download_inner(remote_path, local_path, status).await;
        self.reconciler.resume().await;
        self.finish(remote_path, Operation::Download, status, result)
    }

    async fn download_inner(
        &self,
        remote_path: &str,
        local_path: &Path,
        status: &dyn StatusCallback,
    ) -> Result<u64> {
        self.cancel.store(false, Ordering::SeqCst);
        let state = self.state.lock().await;
        let file = dir_tree::get(&state.tree, remote_path)
            .ok_or_else(|| ShardboxError::NotFound(remote_path.to_string()))?
            .clone();
        if file.is_dir() {
            return Err(ShardboxError::Configuration(format!(
                "{} is a directory",
                remote_path
            )));
        }
        // Only peers agreeing on the file's hash serve shards
        let majority = self.stats_majority(&state, remote_path).await?;
        let params = DownloadParams {
            allocation_id: &self.allocation_id,
            owner_id: &self.wallet.client_id,
            remote_path,
            path_hash: &file.lookup_hash,
            actual_hash: &file.actual_hash,
            file_size: file.actual_size,
            download_mask: majority.mask,
        };
        run_download(
            &self.codec,
            &self.bulk,
            self.transport.as_ref(),
            &state.blobbers,
            &self.wallet,
            &self.consensus,
            self.chunk_size,
            local_path,
            params,
            &self.cancel,
            status,
        )
        .await?;
        Ok(file.actual_size)
    }

    /// Download a file shared with this client via an auth ticket
    pub async fn download_shared(
        &self,
        ticket_b64: &str,
        local_path: &Path,
        status: &dyn StatusCallback,
    ) -> Result<()> {
        self.reconciler.pause().await;
        let result = self
            .download_shared_inner(ticket_b64, local_path, status)
            .await;
        self.reconciler.resume().await;
        match result {
            Ok((name, size)) => {
                status.completed(
                    &self.allocation_id,
                    &name,
                    &name,
                    &mime_of(&name),
                    size,
                    Operation::Download,
                );
                Ok(())
            }
            Err(e) => {
                status.error(&self.allocation_id, "", Operation::Download, &e);
                Err(e)
            }
        }
    }

    async fn download_shared_inner(
        &self,
        ticket_b64: &str,
        local_path: &Path,
        status: &dyn StatusCallback,
    ) -> Result<(String, u64)> {
        let ticket = AuthTicket::from_base64(ticket_b64)?;
        if ticket.client_id != self.wallet.client_id {
            return Err(ShardboxError::Unauthorized(
                "ticket issued to a different client".to_string(),
            ));
        }
        if !ticket.is_active_at(now()) {
            return Err(ShardboxError::Unauthorized(
                "ticket expired or not yet active".to_string(),
            ));
        }
        self.cancel.store(false, Ordering::SeqCst);
        let state = self.state.lock().await;
        let (mask, meta) = self.meta_majority(&state, &ticket.file_path_hash).await?;
        let params = DownloadParams {
            allocation_id: &ticket.allocation_id,
            owner_id: &ticket.owner_id,
            remote_path: &ticket.file_name,
            path_hash: &ticket.file_path_hash,
            actual_hash: &meta.actual_file_hash,
            file_size: meta.actual_file_size,
            download_mask: mask,
        };
        run_download(
            &self.codec,
            &self.bulk,
            self.transport.as_ref(),
            &state.blobbers,
            &self.wallet,
            &self.consensus,
            self.chunk_size,
            local_path,
            params,
            &self.cancel,
            status,
        )
        .await?;
        Ok((ticket.file_name.clone(), meta.actual_file_size))
    }

    /// Poll file stats from every peer and vote on the whole-file hash
    async fn stats_majority(&self, state: &SyncState, remote_path: &str) -> Result<Majority> {
        let n = state.blobbers.len();
        let votes = self
            .dispatcher
            .wait(0..n, |i| {
                self.transport
                    .file_stats(&state.blobbers[i].info, remote_path)
            })
            .await;
        let mut per_peer: Vec<Option<FileStatsResponse>> = vec![None; n];
        for peer in votes {
            match peer.result {
                Ok(stats) => per_peer[peer.index] = Some(stats),
                Err(e) => debug!(peer = peer.index, error = %e, "stats poll failed"),
            }
        }
        let present = per_peer.iter().flatten().count();
        find_majority(&per_peer, |s| s.actual_file_hash.clone(), &self.consensus).ok_or(
            ShardboxError::NoConsensus {
                rate: self.consensus.rate(present, n),
                required: self.consensus.threshold(),
            },
        )
    }

    /// Poll metadata from every peer and return the agreeing mask plus
    /// the winning record
    async fn meta_majority(
        &self,
        state: &SyncState,
        path_hash: &str,
    ) -> Result<(u64, FileMetaResponse)> {
        let n = state.blobbers.len();
        let votes = self
            .dispatcher
            .wait(0..n, |i| {
                self.transport.file_meta(&state.blobbers[i].info, path_hash)
            })
            .await;
        let mut per_peer: Vec<Option<FileMetaResponse>> = vec![None; n];
        for peer in votes {
            match peer.result {
                Ok(meta) => per_peer[peer.index] = Some(meta),
                Err(e) => debug!(peer = peer.index, error = %e, "meta poll failed"),
            }
        }
        let present = per_peer.iter().flatten().count();
        let majority = find_majority(&per_peer, FileMetaResponse::info_hash, &self.consensus)
            .ok_or(ShardboxError::NoConsensus {
                rate: self.consensus.rate(present, n),
                required: self.consensus.threshold(),
            })?;
        let winner = per_peer
            .into_iter()
            .nth(majority.winner)
            .flatten()
            .ok_or_else(|| ShardboxError::Internal("majority winner vanished".to_string()))?;
        Ok((majority.mask, winner))
    }

    /// Delete a file from every peer that holds it.
    ///
    /// Each peer gets its own signed delete token built from that peer's
    /// listing of the parent directory.
    pub async fn delete(&self, remote_path: &str, status: &dyn StatusCallback) -> Result<()> {
        self.reconciler.pause().await;
        let result = self.delete_inner(remote_path).await;
        self.reconciler.resume().await;
        self.finish(remote_path, Operation::Delete, status, result)
    }

    async fn delete_inner(&self, remote_path: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        if state.pending == Pending::Repair {
            return Err(ShardboxError::PendingCommitConflict(
                "a repair awaits commit".to_string(),
            ));
        }
        let size = dir_tree::get(&state.tree, remote_path)
            .ok_or_else(|| ShardboxError::NotFound(remote_path.to_string()))?
            .actual_size;
        let n = state.blobbers.len();
        let (parent, name) = path::split(remote_path);
        if name.is_empty() {
            return Err(ShardboxError::Configuration(
                "cannot delete the root directory".to_string(),
            ));
        }
        let ts = now();

        let results = {
            let state = &*state;
            let parent = parent.as_str();
            let name = name.as_str();
            self.dispatcher
                .wait(0..n, |i| async move {
                    let blobber = &state.blobbers[i];
                    let listing = self.transport.list_dir(&blobber.info, parent).await?;
                    let entry = listing
                        .list
                        .into_iter()
                        .find(|e| e.path == remote_path)
                        .ok_or_else(|| ShardboxError::NotFound(remote_path.to_string()))?;
                    let path_hash = if entry.path_hash.is_empty() {
                        dir_tree::lookup_hash(&self.allocation_id, remote_path)
                    } else {
                        entry.path_hash.clone()
                    };
                    let mut token = DeleteToken {
                        file_ref_hash: entry.hash.clone(),
                        file_path_hash: path_hash,
                        allocation_id: self.allocation_id.clone(),
                        blobber_id: blobber.info.id.clone(),
                        client_id: self.wallet.client_id.clone(),
                        size: entry.size as i64,
                        timestamp: ts,
                        signature: String::new(),
                    };
                    token.sign(&self.wallet)?;
                    let form = DeleteFormData {
                        connection_id: blobber.conn.connection_id.clone(),
                        filename: name.to_string(),
                        filepath: remote_path.to_string(),
                    };
                    self.transport
                        .delete_file(&blobber.info, &form, &token)
                        .await
                })
                .await
        };

        let mut ok_count = 0;
        for peer in &results {
            match &peer.result {
                Ok(()) => {
                    ok_count += 1;
                    let conn = &mut state.blobbers[peer.index].conn;
                    if let Err(e) = conn.delete_file(remote_path) {
                        debug!(peer = peer.index, error = %e, "delete not staged locally");
                    }
                }
                Err(e) => warn!(peer = peer.index, error = %e, "delete rejected"),
            }
        }

        let rate = self.consensus.rate(ok_count, n);
        if !self.consensus.is_ok(rate) {
            return Err(ShardboxError::NoConsensus {
                rate,
                required: self.consensus.required_for_ok(),
            });
        }
        dir_tree::delete(&mut state.tree, remote_path)?;
        info!(path = remote_path, peers = ok_count, "deleted");
        Ok(size)
    }

    /// Issue a base64 auth ticket granting `referee_client_id` read
    /// access to a path
    pub async fn share(&self, remote_path: &str, referee_client_id: &str) -> Result<String> {
        let state = self.state.lock().await;
        let node = dir_tree::get(&state.tree, remote_path)
            .ok_or_else(|| ShardboxError::NotFound(remote_path.to_string()))?;
        let ts = now();
        let mut ticket = AuthTicket {
            allocation_id: self.allocation_id.clone(),
            client_id: referee_client_id.to_string(),
            owner_id: self.wallet.client_id.clone(),
            file_path_hash: node.lookup_hash.clone(),
            file_name: node.name.clone(),
            reference_type: if node.is_dir() { "d" } else { "f" }.to_string(),
            re_encryption_key: String::new(),
            expiration: ts + SHARE_TICKET_LIFETIME_SECS,
            available_after: 0,
            timestamp: ts,
            actual_file_hash: node.actual_hash.clone(),
            encrypted: false,
            signature: String::new(),
        };
        ticket.sign(&self.wallet)?;
        ticket.to_base64()
    }

    /// Majority-merged listing of one directory across all peers
    pub async fn list_dir(&self, dir_path: &str) -> Result<Vec<ListEntry>> {
        self.reconciler.pause().await;
        let result = self.list_dir_inner(dir_path).await;
        self.reconciler.resume().await;
        result
    }

    async fn list_dir_inner(&self, dir_path: &str) -> Result<Vec<ListEntry>> {
        let state = self.state.lock().await;
        let n = state.blobbers.len();
        let listings = self
            .dispatcher
            .wait(0..n, |i| {
                self.transport.list_dir(&state.blobbers[i].info, dir_path)
            })
            .await;
        let mut per_peer: Vec<Option<Vec<ListEntry>>> = vec![None; n];
        let mut reachable = 0;
        for peer in listings {
            if let Ok(listing) = peer.result {
                per_peer[peer.index] = Some(listing.list);
                reachable += 1;
            }
        }
        let rate = self.consensus.rate(reachable, n);
        if !self.consensus.is_min(rate) {
            return Err(ShardboxError::NoConsensus {
                rate,
                required: self.consensus.threshold(),
            });
        }

        let mut child_paths: Vec<String> = Vec::new();
        for listing in per_peer.iter().flatten() {
            for entry in listing {
                if !child_paths.contains(&entry.path) {
                    child_paths.push(entry.path.clone());
                }
            }
        }
        let mut merged = Vec::new();
        for child_path in child_paths {
            let votes: Vec<Option<&ListEntry>> = per_peer
                .iter()
                .map(|listing| {
                    listing
                        .as_ref()
                        .and_then(|l| l.iter().find(|e| e.path == child_path))
                })
                .collect();
            // Per-peer ref hashes cover different shards; the whole-file
            // hash is the field peers can agree on
            let Some(majority) = find_majority(
                &votes,
                |entry| {
                    (
                        entry.entry_type.clone(),
                        entry.actual_file_hash.clone(),
                        entry.actual_file_size,
                    )
                },
                &self.consensus,
            ) else {
                debug!(path = %child_path, "no quorum on entry, omitting");
                continue;
            };
            if let Some(winner) = votes[majority.winner] {
                merged.push(winner.clone());
            }
        }
        Ok(merged)
    }

    /// Per-blobber statistics for one file, keyed by blobber id
    pub async fn file_stats(&self, remote_path: &str) -> Result<Vec<(String, FileStatsResponse)>> {
        let state = self.state.lock().await;
        let n = state.blobbers.len();
        let results = self
            .dispatcher
            .wait(0..n, |i| {
                self.transport
                    .file_stats(&state.blobbers[i].info, remote_path)
            })
            .await;
        let mut stats = Vec::new();
        for peer in results {
            if let Ok(s) = peer.result {
                stats.push((state.blobbers[peer.index].info.id.clone(), s));
            }
        }
        if stats.is_empty() {
            return Err(ShardboxError::NotFound(remote_path.to_string()));
        }
        Ok(stats)
    }

    /// Stage a directory on every connection and in the master tree
    pub async fn add_dir(&self, dir_path: &str) -> Result<()> {
        self.reconciler.pause().await;
        let result = self.add_dir_inner(dir_path).await;
        self.reconciler.resume().await;
        result
    }

    async fn add_dir_inner(&self, dir_path: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.pending == Pending::Repair {
            return Err(ShardboxError::PendingCommitConflict(
                "a repair awaits commit".to_string(),
            ));
        }
        for blobber in state.blobbers.iter_mut() {
            blobber.conn.add_dir(&self.allocation_id, dir_path)?;
        }
        dir_tree::add_dir(&mut state.tree, &self.allocation_id, dir_path)?;
        state.pending = Pending::Upload;
        Ok(())
    }

    /// Force an immediate tree resync from the peers
    pub async fn sync(&self) -> Result<()> {
        self.reconciler.pause().await;
        let result = {
            let mut state = self.state.lock().await;
            resync(
                &self.allocation_id,
                &mut state,
                self.transport.as_ref(),
                &self.dispatcher,
                &self.consensus,
            )
            .await
        };
        self.reconciler.resume().await;
        result
    }

    /// Serialized master tree with fresh hashes, for persisting
    pub async fn dir_tree_json(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        dir_tree::calculate_hashes(&mut state.tree);
        state.tree.to_json()
    }

    pub async fn blobbers(&self) -> Vec<BlobberInfo> {
        let state = self.state.lock().await;
        state.blobbers.iter().map(|b| b.info.clone()).collect()
    }

    /// Abort the in-flight download at the next block boundary
    pub fn cancel_download(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Stop the reconciler; the session must not be used afterwards
    pub async fn close(&self) {
        self.reconciler.stop().await;
    }

    /// Emit the single terminal status call for an operation
    fn finish(
        &self,
        remote_path: &str,
        op: Operation,
        status: &dyn StatusCallback,
        result: Result<u64>,
    ) -> Result<()> {
        match result {
            Ok(size) => {
                let name = path::base(remote_path);
                status.completed(
                    &self.allocation_id,
                    remote_path,
                    &name,
                    &mime_of(&name),
                    size,
                    op,
                );
                Ok(())
            }
            Err(e) => {
                status.error(&self.allocation_id, remote_path, op, &e);
                Err(e)
            }
        }
    }
}

fn mime_of(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults_chunk_size() {
        let config = SessionConfig::new("alloc", 2, 1);
        assert_eq!(config.chunk_size, shardbox_core::CHUNK_SIZE);
    }

    #[test]
    fn test_mime_of() {
        assert_eq!(mime_of("photo.png"), "image/png");
        assert_eq!(mime_of("blob"), "application/octet-stream");
    }
}
