//! Per-blobber client-side state
//!
//! Each peer carries the last allocation root it acknowledged, a monotone
//! read counter, and a pending [`Connection`]: a working copy of the
//! directory tree plus the net size of staged changes. The connection is
//! reset after every commit attempt, success or failure.

use crate::dir_tree::{self, Ref};
use serde::{Deserialize, Serialize};
use shardbox_core::error::Result;
use shardbox_core::hash::hash_str;
use std::sync::atomic::{AtomicU64, Ordering};

/// Static peer coordinates from the allocation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobberInfo {
    pub id: String,
    pub url: String,
}

/// Parse the blobber set from its JSON wire form
pub fn blobbers_from_json(data: &str) -> Result<Vec<BlobberInfo>> {
    Ok(serde_json::from_str(data)?)
}

/// Pending, uncommitted changes against one blobber
#[derive(Debug)]
pub struct Connection {
    pub connection_id: String,
    /// Working copy of the directory tree with staged changes applied
    pub tree: Ref,
    upload_size: i64,
    delete_size: i64,
    dirty: bool,
}

impl Connection {
    pub fn new(base_tree: &Ref) -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().simple().to_string(),
            tree: base_tree.clone(),
            upload_size: 0,
            delete_size: 0,
            dirty: false,
        }
    }

    /// Stage a freshly uploaded file
    pub fn add_file(&mut self, allocation_id: &str, file: Ref) -> Result<()> {
        let size = file.actual_size as i64;
        dir_tree::insert_file(&mut self.tree, allocation_id, file)?;
        self.upload_size += size;
        self.dirty = true;
        Ok(())
    }

    /// Stage an updated file
    pub fn update_file(&mut self, allocation_id: &str, file: Ref) -> Result<()> {
        let new_size = file.actual_size as i64;
        let old_size = dir_tree::get(&self.tree, &file.path)
            .map(|r| r.actual_size as i64)
            .unwrap_or(0);
        dir_tree::update_file(&mut self.tree, allocation_id, file)?;
        self.upload_size += new_size - old_size;
        self.dirty = true;
        Ok(())
    }

    /// Stage a deletion
    pub fn delete_file(&mut self, remote_path: &str) -> Result<()> {
        let removed = dir_tree::delete(&mut self.tree, remote_path)?;
        self.delete_size += removed.actual_size as i64;
        self.dirty = true;
        Ok(())
    }

    /// Stage a new directory
    pub fn add_dir(&mut self, allocation_id: &str, dir_path: &str) -> Result<()> {
        dir_tree::add_dir(&mut self.tree, allocation_id, dir_path)?;
        self.dirty = true;
        Ok(())
    }

    /// Net size change of the staged batch
    pub fn size_delta(&self) -> i64 {
        self.upload_size - self.delete_size
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Allocation root the staged tree would commit to at time `ts`
    pub fn allocation_root(&mut self, ts: i64) -> String {
        let dir_hash = dir_tree::calculate_hashes(&mut self.tree);
        hash_str(&format!("{}:{}", dir_hash, ts))
    }

    /// Discard staged state, starting a fresh connection over `base_tree`
    pub fn reset(&mut self, base_tree: &Ref) {
        self.connection_id = uuid::Uuid::new_v4().simple().to_string();
        self.tree = base_tree.clone();
        self.upload_size = 0;
        self.delete_size = 0;
        self.dirty = false;
    }
}

/// One peer's full client-side record
#[derive(Debug)]
pub struct Blobber {
    pub info: BlobberInfo,
    /// Last allocation root this peer acknowledged via commit
    pub allocation_root: String,
    read_counter: AtomicU64,
    pub conn: Connection,
}

impl Blobber {
    pub fn new(info: BlobberInfo, base_tree: &Ref) -> Self {
        Self {
            info,
            allocation_root: String::new(),
            read_counter: AtomicU64::new(0),
            conn: Connection::new(base_tree),
        }
    }

    /// Seed the counter from the peer's reported last value, never
    /// moving backwards
    pub fn seed_read_counter(&self, reported: u64) {
        self.read_counter.fetch_max(reported, Ordering::SeqCst);
    }

    /// Claim the next counter value; strictly increasing per peer
    pub fn next_read_counter(&self) -> u64 {
        self.read_counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}
