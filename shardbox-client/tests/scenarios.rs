//! End-to-end scenarios against an in-memory blobber network.
//!
//! `SimNet` behaves like a set of storage peers: shards are staged per
//! connection and only become readable after a verified commit, read
//! markers are signature-checked and must carry increasing counters, and
//! individual peers can be told to fail uploads or downloads.

use async_trait::async_trait;
use bytes::Bytes;
use shardbox_client::dir_tree::lookup_hash;
use shardbox_client::{path, AllocationSession, BlobberApi, BlobberInfo, NoopStatus, Ref, SessionConfig};
use shardbox_core::error::{Result, ShardboxError};
use shardbox_core::hash::sha1_hex;
use shardbox_core::signature::SignatureScheme;
use shardbox_core::wallet::Wallet;
use shardbox_core::CHUNK_SIZE;
use shardbox_protocol::markers::{DeleteToken, ReadMarker, WriteMarker};
use shardbox_protocol::wire::{
    DeleteFormData, DownloadBlockRequest, FileMetaResponse, FileStatsResponse, ListEntry,
    ListResponse, UploadFormData, UploadResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

const ALLOC: &str = "alloc-sim";

#[derive(Clone)]
struct StoredFile {
    name: String,
    path: String,
    path_hash: String,
    content_hash: String,
    merkle_root: String,
    actual_hash: String,
    actual_size: u64,
    data: Bytes,
}

#[derive(Default)]
struct PeerState {
    staged: HashMap<String, HashMap<String, StoredFile>>,
    committed: HashMap<String, StoredFile>,
    allocation_root: String,
    last_read_counter: u64,
}

struct SimNet {
    allocation_id: String,
    owner_key: String,
    peers: Mutex<Vec<PeerState>>,
    fail_upload: Mutex<HashSet<usize>>,
    fail_download: Mutex<HashSet<usize>>,
    fail_commit: Mutex<HashSet<usize>>,
    /// Read-marker counters in arrival order, per peer
    counters_seen: Mutex<Vec<Vec<u64>>>,
}

impl SimNet {
    fn new(n: usize, owner_key: &str) -> Self {
        Self {
            allocation_id: ALLOC.to_string(),
            owner_key: owner_key.to_string(),
            peers: Mutex::new((0..n).map(|_| PeerState::default()).collect()),
            fail_upload: Mutex::new(HashSet::new()),
            fail_download: Mutex::new(HashSet::new()),
            fail_commit: Mutex::new(HashSet::new()),
            counters_seen: Mutex::new(vec![Vec::new(); n]),
        }
    }

    fn infos(n: usize) -> Vec<BlobberInfo> {
        (0..n)
            .map(|i| BlobberInfo {
                id: format!("b{}", i),
                url: format!("http://sim/{}", i),
            })
            .collect()
    }

    fn idx(blobber: &BlobberInfo) -> usize {
        blobber.id[1..].parse().unwrap()
    }

    fn fail_uploads(&self, peers: &[usize]) {
        *self.fail_upload.lock().unwrap() = peers.iter().copied().collect();
    }

    fn fail_downloads(&self, peers: &[usize]) {
        *self.fail_download.lock().unwrap() = peers.iter().copied().collect();
    }

    fn fail_commits(&self, peers: &[usize]) {
        *self.fail_commit.lock().unwrap() = peers.iter().copied().collect();
    }

    fn committed_paths(&self, peer: usize) -> Vec<String> {
        let peers = self.peers.lock().unwrap();
        let mut paths: Vec<String> = peers[peer].committed.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn verify_owner_sig(&self, signature: &str, hash: &str) -> Result<()> {
        let ok = SignatureScheme::Ed25519.verify(&self.owner_key, signature, hash)?;
        if !ok {
            return Err(ShardboxError::Unauthorized("bad signature".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobberApi for SimNet {
    async fn upload_shard(
        &self,
        blobber: &BlobberInfo,
        _update: bool,
        form: &UploadFormData,
        shard: Bytes,
    ) -> Result<UploadResult> {
        let idx = Self::idx(blobber);
        if self.fail_upload.lock().unwrap().contains(&idx) {
            return Err(ShardboxError::ServerRejected {
                status: 503,
                message: "peer offline".to_string(),
            });
        }
        if sha1_hex(&shard) != form.content_hash {
            return Err(ShardboxError::ServerRejected {
                status: 400,
                message: "shard hash mismatch".to_string(),
            });
        }
        let mut peers = self.peers.lock().unwrap();
        let stored = StoredFile {
            name: form.filename.clone(),
            path: form.filepath.clone(),
            path_hash: lookup_hash(&self.allocation_id, &form.filepath),
            content_hash: form.content_hash.clone(),
            merkle_root: form.merkle_root.clone(),
            actual_hash: form.actual_hash.clone(),
            actual_size: form.actual_size,
            data: shard.clone(),
        };
        peers[idx]
            .staged
            .entry(form.connection_id.clone())
            .or_default()
            .insert(form.filepath.clone(), stored);
        Ok(UploadResult {
            filename: form.filename.clone(),
            size: shard.len() as u64,
            content_hash: form.content_hash.clone(),
            merkle_root: form.merkle_root.clone(),
        })
    }

    async fn download_block(
        &self,
        blobber: &BlobberInfo,
        request: &DownloadBlockRequest,
    ) -> Result<Bytes> {
        let idx = Self::idx(blobber);
        if self.fail_download.lock().unwrap().contains(&idx) {
            return Err(ShardboxError::ServerRejected {
                status: 500,
                message: "peer offline".to_string(),
            });
        }
        let marker: ReadMarker = serde_json::from_str(&request.read_marker)?;
        let ok =
            SignatureScheme::Ed25519.verify(&marker.client_public_key, &marker.signature, &marker.hash())?;
        if !ok {
            return Err(ShardboxError::Unauthorized(
                "read marker signature invalid".to_string(),
            ));
        }
        {
            let mut peers = self.peers.lock().unwrap();
            if marker.counter <= peers[idx].last_read_counter {
                return Err(ShardboxError::Unauthorized(format!(
                    "stale read marker counter {}",
                    marker.counter
                )));
            }
            peers[idx].last_read_counter = marker.counter;
        }
        self.counters_seen.lock().unwrap()[idx].push(marker.counter);

        let peers = self.peers.lock().unwrap();
        let file = peers[idx]
            .committed
            .values()
            .find(|f| f.path_hash == request.path_hash)
            .ok_or_else(|| ShardboxError::NotFound(request.path_hash.clone()))?;
        let start = ((request.block_num - 1) * CHUNK_SIZE) as usize;
        let end = (request.block_num * CHUNK_SIZE).min(file.data.len() as u64) as usize;
        if start >= file.data.len() {
            return Err(ShardboxError::NotFound("block out of range".to_string()));
        }
        Ok(file.data.slice(start..end))
    }

    async fn commit(
        &self,
        blobber: &BlobberInfo,
        connection_id: &str,
        write_marker: &WriteMarker,
    ) -> Result<()> {
        let idx = Self::idx(blobber);
        if self.fail_commit.lock().unwrap().contains(&idx) {
            return Err(ShardboxError::ServerRejected {
                status: 400,
                message: "commit rejected".to_string(),
            });
        }
        self.verify_owner_sig(&write_marker.signature, &write_marker.hash())?;
        let mut peers = self.peers.lock().unwrap();
        let peer = &mut peers[idx];
        if write_marker.prev_allocation_root != peer.allocation_root {
            return Err(ShardboxError::ServerRejected {
                status: 400,
                message: "stale previous allocation root".to_string(),
            });
        }
        if let Some(staged) = peer.staged.remove(connection_id) {
            for (path, file) in staged {
                peer.committed.insert(path, file);
            }
        }
        peer.allocation_root = write_marker.allocation_root.clone();
        Ok(())
    }

    async fn latest_read_marker(&self, blobber: &BlobberInfo) -> Result<u64> {
        let peers = self.peers.lock().unwrap();
        Ok(peers[Self::idx(blobber)].last_read_counter)
    }

    async fn file_meta(&self, blobber: &BlobberInfo, path_hash: &str) -> Result<FileMetaResponse> {
        let peers = self.peers.lock().unwrap();
        let file = peers[Self::idx(blobber)]
            .committed
            .values()
            .find(|f| f.path_hash == path_hash)
            .ok_or_else(|| ShardboxError::NotFound(path_hash.to_string()))?;
        Ok(FileMetaResponse {
            entry_type: "f".to_string(),
            name: file.name.clone(),
            path: file.path.clone(),
            path_hash: file.path_hash.clone(),
            hash: file.content_hash.clone(),
            size: file.data.len() as u64,
            actual_file_hash: file.actual_hash.clone(),
            actual_file_size: file.actual_size,
        })
    }

    async fn file_stats(&self, blobber: &BlobberInfo, path: &str) -> Result<FileStatsResponse> {
        let peers = self.peers.lock().unwrap();
        let file = peers[Self::idx(blobber)]
            .committed
            .get(path)
            .ok_or_else(|| ShardboxError::NotFound(path.to_string()))?;
        Ok(FileStatsResponse {
            name: file.name.clone(),
            path: file.path.clone(),
            size: file.data.len() as u64,
            actual_file_hash: file.actual_hash.clone(),
            ..Default::default()
        })
    }

    async fn list_dir(&self, blobber: &BlobberInfo, dir_path: &str) -> Result<ListResponse> {
        let peers = self.peers.lock().unwrap();
        let peer = &peers[Self::idx(blobber)];
        let list = peer
            .committed
            .values()
            .filter(|f| path::dir(&f.path) == dir_path)
            .map(|f| ListEntry {
                entry_type: "f".to_string(),
                name: f.name.clone(),
                path: f.path.clone(),
                hash: f.content_hash.clone(),
                path_hash: f.path_hash.clone(),
                lookup_hash: f.path_hash.clone(),
                size: f.data.len() as u64,
                actual_file_hash: f.actual_hash.clone(),
                actual_file_size: f.actual_size,
                num_of_blocks: (f.data.len() as u64).div_ceil(CHUNK_SIZE),
            })
            .collect();
        Ok(ListResponse {
            allocation_root: peer.allocation_root.clone(),
            meta: None,
            list,
        })
    }

    async fn delete_file(
        &self,
        blobber: &BlobberInfo,
        form: &DeleteFormData,
        token: &DeleteToken,
    ) -> Result<()> {
        self.verify_owner_sig(&token.signature, &token.hash())?;
        let mut peers = self.peers.lock().unwrap();
        let peer = &mut peers[Self::idx(blobber)];
        peer.committed
            .remove(&form.filepath)
            .ok_or_else(|| ShardboxError::NotFound(form.filepath.clone()))?;
        Ok(())
    }
}

fn owner_wallet() -> Wallet {
    Wallet::recover(SignatureScheme::Ed25519, "scenario owner wallet").unwrap()
}

fn open_session(net: Arc<SimNet>, wallet: Wallet) -> AllocationSession {
    AllocationSession::open(
        SessionConfig::new(ALLOC, 2, 1),
        wallet,
        SimNet::infos(3),
        None,
        net,
    )
    .unwrap()
}

fn write_temp(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
    let p = dir.path().join(name);
    std::fs::write(&p, data).unwrap();
    p
}

fn sample_bytes(n: usize) -> Vec<u8> {
    (0..n).map(|i| i as u8).collect()
}

#[tokio::test]
async fn test_upload_commit_download_roundtrip() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let data = sample_bytes(100);
    let local = write_temp(&tmp, "hello.bin", &data);

    session
        .upload(&local, "/hello.bin", &NoopStatus)
        .await
        .unwrap();
    session.commit().await.unwrap();

    // Every peer holds a committed 50-byte shard
    for peer in 0..3 {
        assert_eq!(net.committed_paths(peer), vec!["/hello.bin".to_string()]);
        let peers = net.peers.lock().unwrap();
        assert_eq!(peers[peer].committed["/hello.bin"].data.len(), 50);
        assert!(!peers[peer].allocation_root.is_empty());
    }

    // The master tree records the file with the whole-file hash
    let tree = Ref::from_json(&session.dir_tree_json().await.unwrap()).unwrap();
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].name, "hello.bin");
    assert_eq!(tree.children[0].actual_size, 100);
    assert_eq!(tree.children[0].actual_hash, sha1_hex(&data));

    let out = tmp.path().join("hello.out");
    session
        .download("/hello.bin", &out, &NoopStatus)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), data);
    session.close().await;
}

#[tokio::test]
async fn test_degraded_upload_then_repair() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let data = sample_bytes(100);
    let local = write_temp(&tmp, "f.bin", &data);

    // One peer down: 2 of 3 reaches the bare quorum
    net.fail_uploads(&[2]);
    session.upload(&local, "/f.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();
    assert!(net.committed_paths(2).is_empty());

    // Peer recovers; repair re-encodes and fills only the hole
    net.fail_uploads(&[]);
    session.repair(&local, "/f.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();
    assert_eq!(net.committed_paths(2), vec!["/f.bin".to_string()]);
    {
        let peers = net.peers.lock().unwrap();
        // Repaired shard matches what the healthy peer of the same index
        // group would hold and carries the known whole-file hash
        assert_eq!(peers[2].committed["/f.bin"].data.len(), 50);
        assert_eq!(peers[2].committed["/f.bin"].actual_hash, sha1_hex(&data));
    }

    let out = tmp.path().join("f.out");
    session.download("/f.bin", &out, &NoopStatus).await.unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), data);
    session.close().await;
}

#[tokio::test]
async fn test_repair_is_noop_when_all_peers_hold_the_file() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let local = write_temp(&tmp, "f.bin", &sample_bytes(64));

    session.upload(&local, "/f.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();
    session.repair(&local, "/f.bin", &NoopStatus).await.unwrap();
    // Nothing staged, so the follow-up commit has nothing to send
    session.commit().await.unwrap();
    session.close().await;
}

#[tokio::test]
async fn test_download_fails_beyond_parity_budget() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let local = write_temp(&tmp, "f.bin", &sample_bytes(100));

    session.upload(&local, "/f.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();

    // Two of three peers down: fewer than K shards are reachable
    net.fail_downloads(&[0, 2]);
    let out = tmp.path().join("f.out");
    let err = session
        .download("/f.bin", &out, &NoopStatus)
        .await
        .unwrap_err();
    assert!(matches!(err, ShardboxError::NoConsensus { .. }));
    // No partial file is left behind
    assert!(!out.exists());
    session.close().await;
}

#[tokio::test]
async fn test_upload_fails_beyond_parity_budget() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let local = write_temp(&tmp, "f.bin", &sample_bytes(100));

    net.fail_uploads(&[1, 2]);
    let err = session
        .upload(&local, "/f.bin", &NoopStatus)
        .await
        .unwrap_err();
    assert!(matches!(err, ShardboxError::NoConsensus { .. }));

    // The failed upload left no trace in the master tree
    let tree = Ref::from_json(&session.dir_tree_json().await.unwrap()).unwrap();
    assert!(tree.children.is_empty());
    session.close().await;
}

#[tokio::test]
async fn test_read_marker_counters_strictly_increase() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let data = sample_bytes(100);
    let local = write_temp(&tmp, "f.bin", &data);

    session.upload(&local, "/f.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();
    for run in 0..3 {
        let out = tmp.path().join(format!("f.out{}", run));
        session.download("/f.bin", &out, &NoopStatus).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), data);
    }

    let seen = net.counters_seen.lock().unwrap();
    let total: usize = seen.iter().map(Vec::len).sum();
    assert!(total >= 6, "expected at least K counters per download");
    for peer_counters in seen.iter() {
        for pair in peer_counters.windows(2) {
            assert!(pair[1] > pair[0], "counter rewound: {:?}", peer_counters);
        }
    }
    session.close().await;
}

#[tokio::test]
async fn test_delete_removes_from_peers_and_tree() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let local = write_temp(&tmp, "f.bin", &sample_bytes(100));

    session.upload(&local, "/f.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();
    session.delete("/f.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();

    for peer in 0..3 {
        assert!(net.committed_paths(peer).is_empty());
    }
    let tree = Ref::from_json(&session.dir_tree_json().await.unwrap()).unwrap();
    assert!(tree.children.is_empty());

    let out = tmp.path().join("f.out");
    let err = session
        .download("/f.bin", &out, &NoopStatus)
        .await
        .unwrap_err();
    assert!(matches!(err, ShardboxError::NotFound(_)));
    session.close().await;
}

#[tokio::test]
async fn test_share_ticket_grants_download_to_referee_only() {
    let owner = owner_wallet();
    let referee = Wallet::recover(SignatureScheme::Ed25519, "scenario referee wallet").unwrap();
    let net = Arc::new(SimNet::new(3, &owner.client_key));
    let owner_session = open_session(Arc::clone(&net), owner);
    let tmp = tempfile::tempdir().unwrap();
    let data = sample_bytes(100);
    let local = write_temp(&tmp, "pic.png", &data);

    owner_session
        .upload(&local, "/pic.png", &NoopStatus)
        .await
        .unwrap();
    owner_session.commit().await.unwrap();
    let ticket = owner_session
        .share("/pic.png", &referee.client_id)
        .await
        .unwrap();

    let referee_session = open_session(Arc::clone(&net), referee);
    let out = tmp.path().join("pic.out");
    referee_session
        .download_shared(&ticket, &out, &NoopStatus)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), data);

    // The owner's own client id does not match the ticket's grantee
    let err = owner_session
        .download_shared(&ticket, &tmp.path().join("nope.out"), &NoopStatus)
        .await
        .unwrap_err();
    assert!(matches!(err, ShardboxError::Unauthorized(_)));
    owner_session.close().await;
    referee_session.close().await;
}

#[tokio::test]
async fn test_repair_rejected_while_upload_awaits_commit() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let local = write_temp(&tmp, "f.bin", &sample_bytes(100));

    session.upload(&local, "/f.bin", &NoopStatus).await.unwrap();
    let err = session
        .repair(&local, "/f.bin", &NoopStatus)
        .await
        .unwrap_err();
    assert!(matches!(err, ShardboxError::PendingCommitConflict(_)));

    session.commit().await.unwrap();
    session.close().await;
}

#[tokio::test]
async fn test_failed_commit_releases_pending_gate() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let v1 = sample_bytes(100);
    let local_v1 = write_temp(&tmp, "v1.bin", &v1);
    let local_v2 = write_temp(&tmp, "v2.bin", &sample_bytes(60));

    session.upload(&local_v1, "/f.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();

    // Stage a new version while every peer rejects its commit
    session.update(&local_v2, "/f.bin", &NoopStatus).await.unwrap();
    net.fail_commits(&[0, 1, 2]);
    let err = session.commit().await.unwrap_err();
    assert!(matches!(err, ShardboxError::NoConsensus { .. }));

    // The rejected batch was discarded with its connections: a retried
    // commit has nothing to send, and the session is no longer gated on it
    net.fail_commits(&[]);
    session.commit().await.unwrap();
    session.repair(&local_v1, "/f.bin", &NoopStatus).await.unwrap();
    session.close().await;
}

#[tokio::test]
async fn test_sync_adopts_remote_state_for_a_fresh_session() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let first = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let a = sample_bytes(100);
    let local_a = write_temp(&tmp, "a.bin", &a);
    let local_b = write_temp(&tmp, "b.bin", &sample_bytes(40));

    first.upload(&local_a, "/a.bin", &NoopStatus).await.unwrap();
    first.upload(&local_b, "/b.bin", &NoopStatus).await.unwrap();
    first.commit().await.unwrap();
    first.close().await;

    // A second session with no cached tree starts empty
    let session = open_session(Arc::clone(&net), owner_wallet());
    let tree = Ref::from_json(&session.dir_tree_json().await.unwrap()).unwrap();
    assert!(tree.children.is_empty());

    // Sync rebuilds the tree from the per-directory majority
    session.sync().await.unwrap();
    let tree = Ref::from_json(&session.dir_tree_json().await.unwrap()).unwrap();
    let mut names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["a.bin", "b.bin"]);
    let adopted = tree.children.iter().find(|c| c.name == "a.bin").unwrap();
    assert_eq!(adopted.actual_hash, sha1_hex(&a));
    assert_eq!(adopted.actual_size, 100);

    // Adopted peer roots chain the next write marker correctly
    let local_c = write_temp(&tmp, "c.bin", &sample_bytes(20));
    session.upload(&local_c, "/c.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();
    assert_eq!(
        net.committed_paths(0),
        vec![
            "/a.bin".to_string(),
            "/b.bin".to_string(),
            "/c.bin".to_string()
        ]
    );

    // The synced tree serves downloads
    let out = tmp.path().join("a.out");
    session.download("/a.bin", &out, &NoopStatus).await.unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), a);
    session.close().await;
}

#[tokio::test]
async fn test_duplicate_upload_and_update_of_missing_file() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let local = write_temp(&tmp, "f.bin", &sample_bytes(10));

    session.upload(&local, "/f.bin", &NoopStatus).await.unwrap();
    let err = session
        .upload(&local, "/f.bin", &NoopStatus)
        .await
        .unwrap_err();
    assert!(matches!(err, ShardboxError::FileExists(_)));

    let err = session
        .update(&local, "/missing.bin", &NoopStatus)
        .await
        .unwrap_err();
    assert!(matches!(err, ShardboxError::NotFound(_)));
    session.close().await;
}

#[tokio::test]
async fn test_update_replaces_content() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let v1 = sample_bytes(100);
    let v2: Vec<u8> = (0..120).map(|i| (i * 3) as u8).collect();
    let local_v1 = write_temp(&tmp, "v1.bin", &v1);
    let local_v2 = write_temp(&tmp, "v2.bin", &v2);

    session.upload(&local_v1, "/f.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();
    session.update(&local_v2, "/f.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();

    let out = tmp.path().join("f.out");
    session.download("/f.bin", &out, &NoopStatus).await.unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), v2);

    let tree = Ref::from_json(&session.dir_tree_json().await.unwrap()).unwrap();
    assert_eq!(tree.children[0].actual_size, 120);
    session.close().await;
}

#[tokio::test]
async fn test_list_dir_merges_peer_majorities() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let a = write_temp(&tmp, "a.bin", &sample_bytes(10));
    let b = write_temp(&tmp, "b.bin", &sample_bytes(20));

    session.upload(&a, "/a.bin", &NoopStatus).await.unwrap();
    session.upload(&b, "/b.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();

    let mut names: Vec<String> = session
        .list_dir("/")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.bin".to_string(), "b.bin".to_string()]);
    session.close().await;
}

#[tokio::test]
async fn test_file_stats_reports_each_peer() {
    let wallet = owner_wallet();
    let net = Arc::new(SimNet::new(3, &wallet.client_key));
    let session = open_session(Arc::clone(&net), wallet);
    let tmp = tempfile::tempdir().unwrap();
    let local = write_temp(&tmp, "f.bin", &sample_bytes(100));

    session.upload(&local, "/f.bin", &NoopStatus).await.unwrap();
    session.commit().await.unwrap();

    let stats = session.file_stats("/f.bin").await.unwrap();
    assert_eq!(stats.len(), 3);
    for (_, s) in &stats {
        assert_eq!(s.size, 50);
    }
    session.close().await;
}
