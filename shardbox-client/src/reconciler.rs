//! Background reconciler
//!
//! A 30-second ticker polls one blobber round-robin for its "/" listing.
//! If the reported allocation root differs from the one the session has
//! cached for that peer, every peer is re-listed and the master tree is
//! rebuilt from the per-directory majority. User operations pause the
//! loop through an acknowledged channel protocol so no tick can preempt
//! an in-flight pipeline.

use crate::blobber::Blobber;
use crate::consensus::{find_majority, Consensus};
use crate::dir_tree::{self, Ref};
use crate::executor::Dispatcher;
use crate::transport::BlobberApi;
use shardbox_core::error::Result;
use shardbox_protocol::wire::ListEntry;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

pub(crate) const TICK_INTERVAL: Duration = Duration::from_secs(30);

pub(crate) enum Signal {
    Pause,
    Resume,
    Stop,
}

/// Control handle held by the session
pub(crate) struct ReconcilerHandle {
    control: mpsc::Sender<(Signal, oneshot::Sender<()>)>,
}

impl ReconcilerHandle {
    async fn signal(&self, signal: Signal) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.control.send((signal, ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub async fn pause(&self) {
        self.signal(Signal::Pause).await;
    }

    pub async fn resume(&self) {
        self.signal(Signal::Resume).await;
    }

    pub async fn stop(&self) {
        self.signal(Signal::Stop).await;
    }
}

/// Which mutation batch is awaiting its commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    Idle,
    Upload,
    Update,
    Repair,
}

/// Shared session state the reconciler reads and repairs
pub(crate) struct SyncState {
    pub tree: Ref,
    pub blobbers: Vec<Blobber>,
    pub poll_idx: usize,
    pub pending: Pending,
}

pub(crate) struct Reconciler {
    pub allocation_id: String,
    pub state: Arc<Mutex<SyncState>>,
    pub transport: Arc<dyn BlobberApi>,
    pub dispatcher: Dispatcher,
    pub consensus: Consensus,
}

impl Reconciler {
    /// Spawn the loop; the handle controls it for the session's lifetime
    pub fn spawn(self) -> ReconcilerHandle {
        let (control, mut control_rx) = mpsc::channel::<(Signal, oneshot::Sender<()>)>(1);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The interval fires immediately once; swallow that tick
            ticker.tick().await;
            let mut paused = false;
            loop {
                tokio::select! {
                    msg = control_rx.recv() => match msg {
                        Some((Signal::Pause, ack)) => { paused = true; let _ = ack.send(()); }
                        Some((Signal::Resume, ack)) => { paused = false; let _ = ack.send(()); }
                        Some((Signal::Stop, ack)) => { let _ = ack.send(()); break; }
                        None => break,
                    },
                    _ = ticker.tick() => {
                        if paused {
                            continue;
                        }
                        if let Err(e) = self.tick().await {
                            warn!(error = %e, "reconciler tick failed");
                        }
                    }
                }
            }
            debug!("reconciler stopped");
        });
        ReconcilerHandle { control }
    }

    /// Poll one peer round-robin; trigger a resync on root divergence
    async fn tick(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let n = state.blobbers.len();
        for _ in 0..n {
            let idx = state.poll_idx % n;
            state.poll_idx = (state.poll_idx + 1) % n;
            let info = state.blobbers[idx].info.clone();
            match self.transport.list_dir(&info, "/").await {
                Ok(listing) => {
                    let diverged = listing.allocation_root != state.blobbers[idx].allocation_root;
                    if diverged {
                        info!(
                            peer = %info.id,
                            "allocation root diverged, resyncing tree"
                        );
                        resync(
                            &self.allocation_id,
                            &mut state,
                            self.transport.as_ref(),
                            &self.dispatcher,
                            &self.consensus,
                        )
                        .await?;
                    }
                    return Ok(());
                }
                Err(e) => {
                    // Fall through to the next peer
                    debug!(peer = %info.id, error = %e, "root poll failed");
                }
            }
        }
        Ok(())
    }
}

/// Rebuild the master tree from per-directory majorities across all peers
pub(crate) async fn resync(
    allocation_id: &str,
    state: &mut SyncState,
    transport: &dyn BlobberApi,
    dispatcher: &Dispatcher,
    consensus: &Consensus,
) -> Result<()> {
    let mut tree = Ref::new_root(allocation_id);
    let mut roots: Vec<Option<String>> = vec![None; state.blobbers.len()];
    sync_dir(
        allocation_id,
        "/",
        state,
        transport,
        dispatcher,
        consensus,
        &mut tree,
        &mut roots,
    )
    .await?;
    dir_tree::calculate_hashes(&mut tree);
    state.tree = tree;
    for (blobber, root) in state.blobbers.iter_mut().zip(roots) {
        if let Some(root) = root {
            blobber.allocation_root = root;
        }
    }
    // Pending diffs predate the adopted tree
    let base = state.tree.clone();
    for blobber in state.blobbers.iter_mut() {
        blobber.conn.reset(&base);
    }
    Ok(())
}

/// Merge one directory level by majority and recurse into agreed subdirs
#[allow(clippy::too_many_arguments)]
fn sync_dir<'a>(
    allocation_id: &'a str,
    dir_path: &'a str,
    state: &'a SyncState,
    transport: &'a dyn BlobberApi,
    dispatcher: &'a Dispatcher,
    consensus: &'a Consensus,
    tree: &'a mut Ref,
    roots: &'a mut Vec<Option<String>>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let listings = dispatcher
            .wait(0..state.blobbers.len(), |i| {
                transport.list_dir(&state.blobbers[i].info, dir_path)
            })
            .await;

        let mut per_peer: Vec<Option<Vec<ListEntry>>> = vec![None; state.blobbers.len()];
        for peer in listings {
            if let Ok(listing) = peer.result {
                if dir_path == "/" {
                    roots[peer.index] = Some(listing.allocation_root.clone());
                }
                per_peer[peer.index] = Some(listing.list);
            }
        }

        // Paths any peer reported, in first-seen order
        let mut child_paths: Vec<String> = Vec::new();
        for listing in per_peer.iter().flatten() {
            for entry in listing {
                if !child_paths.contains(&entry.path) {
                    child_paths.push(entry.path.clone());
                }
            }
        }

        let mut subdirs = Vec::new();
        for child_path in child_paths {
            let votes: Vec<Option<&ListEntry>> = per_peer
                .iter()
                .map(|listing| {
                    listing
                        .as_ref()
                        .and_then(|l| l.iter().find(|e| e.path == child_path))
                })
                .collect();
            // Vote on the whole-file hash: per-peer ref hashes cover
            // different shards and never agree across peers
            let Some(majority) = find_majority(
                &votes,
                |entry| {
                    (
                        entry.entry_type.clone(),
                        entry.actual_file_hash.clone(),
                        entry.actual_file_size,
                    )
                },
                consensus,
            ) else {
                debug!(path = %child_path, "no quorum on entry, dropping from tree");
                continue;
            };
            let Some(winner) = votes[majority.winner] else {
                continue;
            };
            let winner = winner.clone();
            if winner.entry_type == "d" {
                dir_tree::add_dir(tree, allocation_id, &child_path)?;
                subdirs.push(child_path);
            } else {
                let mut file = Ref::new_file(
                    allocation_id,
                    &child_path,
                    winner.actual_file_hash.clone(),
                    winner.actual_file_hash.clone(),
                    winner.actual_file_size,
                    shardbox_core::CHUNK_SIZE,
                );
                file.blobber_count = majority.count as u32;
                dir_tree::insert_file(tree, allocation_id, file)?;
            }
        }

        for subdir in subdirs {
            sync_dir(
                allocation_id,
                &subdir,
                state,
                transport,
                dispatcher,
                consensus,
                tree,
                roots,
            )
            .await?;
        }
        Ok(())
    })
}
