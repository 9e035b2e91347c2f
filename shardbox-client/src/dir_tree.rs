//! Replicated directory tree
//!
//! The client keeps one master tree plus a working copy per blobber
//! connection. Nodes ("refs") carry two recursive hashes: `content_hash`
//! folds child content hashes, `path_hash` folds child path hashes, both
//! as `":"`-joins in child insertion order. The root's content hash is the
//! allocation's directory root.

use crate::path;
use serde::{Deserialize, Serialize};
use shardbox_core::error::{Result, ShardboxError};
use shardbox_core::hash::hash_str;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefType {
    #[serde(rename = "f")]
    File,
    #[serde(rename = "d")]
    Directory,
}

/// One file or directory node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ref {
    #[serde(rename = "type")]
    pub ref_type: RefType,
    pub name: String,
    pub path: String,
    pub parent_path: String,
    pub level: u32,
    #[serde(default)]
    pub actual_size: u64,
    #[serde(default)]
    pub actual_hash: String,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub path_hash: String,
    #[serde(default)]
    pub lookup_hash: String,
    #[serde(default)]
    pub chunk_size: u64,
    #[serde(default)]
    pub num_blocks: u64,
    /// How many blobbers confirmed this file at upload time
    #[serde(default)]
    pub blobber_count: u32,
    #[serde(default)]
    pub children: Vec<Ref>,
}

/// Lookup hash of a path within an allocation
pub fn lookup_hash(allocation_id: &str, remote_path: &str) -> String {
    hash_str(&format!("{}:{}", allocation_id, remote_path))
}

impl Ref {
    /// Fresh tree containing only the "/" directory
    pub fn new_root(allocation_id: &str) -> Self {
        Ref {
            ref_type: RefType::Directory,
            name: "/".to_string(),
            path: "/".to_string(),
            parent_path: String::new(),
            level: 0,
            actual_size: 0,
            actual_hash: String::new(),
            content_hash: String::new(),
            path_hash: String::new(),
            lookup_hash: lookup_hash(allocation_id, "/"),
            chunk_size: 0,
            num_blocks: 0,
            blobber_count: 0,
            children: Vec::new(),
        }
    }

    /// Build a FILE ref ready for insertion
    #[allow(clippy::too_many_arguments)]
    pub fn new_file(
        allocation_id: &str,
        remote_path: &str,
        content_hash: String,
        actual_hash: String,
        actual_size: u64,
        chunk_size: u64,
    ) -> Self {
        let (parent, name) = path::split(remote_path);
        let lookup = lookup_hash(allocation_id, remote_path);
        let num_blocks = if chunk_size > 0 {
            actual_size.div_ceil(chunk_size)
        } else {
            0
        };
        Ref {
            ref_type: RefType::File,
            name,
            path: remote_path.to_string(),
            parent_path: parent,
            level: path::segments(remote_path).len() as u32,
            actual_size,
            actual_hash,
            content_hash,
            path_hash: lookup.clone(),
            lookup_hash: lookup,
            chunk_size,
            num_blocks,
            blobber_count: 0,
            children: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.ref_type == RefType::Directory
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn new_dir_node(allocation_id: &str, dir_path: &str) -> Ref {
    let (parent, name) = path::split(dir_path);
    Ref {
        ref_type: RefType::Directory,
        name,
        path: dir_path.to_string(),
        parent_path: parent,
        level: path::segments(dir_path).len() as u32,
        actual_size: 0,
        actual_hash: String::new(),
        content_hash: String::new(),
        path_hash: String::new(),
        lookup_hash: lookup_hash(allocation_id, dir_path),
        chunk_size: 0,
        num_blocks: 0,
        blobber_count: 0,
        children: Vec::new(),
    }
}

/// Descend to the directory that would hold `remote_path`, creating
/// intermediate directories on the way. Fails when a FILE ref sits on an
/// intermediate segment.
fn ensure_parent<'a>(
    root: &'a mut Ref,
    allocation_id: &str,
    remote_path: &str,
) -> Result<&'a mut Ref> {
    let segs = path::segments(remote_path);
    let mut cur = root;
    let mut cur_path = String::new();
    for seg in segs.iter().take(segs.len().saturating_sub(1)) {
        cur_path.push('/');
        cur_path.push_str(seg);
        let idx = match cur.children.iter().position(|c| c.name == *seg) {
            Some(i) => {
                if !cur.children[i].is_dir() {
                    return Err(ShardboxError::FileExists(cur_path));
                }
                i
            }
            None => {
                cur.children.push(new_dir_node(allocation_id, &cur_path));
                cur.children.len() - 1
            }
        };
        cur = &mut cur.children[idx];
    }
    Ok(cur)
}

/// Insert a FILE ref, creating intermediate directories
pub fn insert_file(root: &mut Ref, allocation_id: &str, file: Ref) -> Result<()> {
    let parent = ensure_parent(root, allocation_id, &file.path)?;
    if parent.children.iter().any(|c| c.name == file.name) {
        return Err(ShardboxError::FileExists(file.path));
    }
    parent.children.push(file);
    Ok(())
}

/// Replace an existing FILE ref in place, keeping its child position
pub fn update_file(root: &mut Ref, allocation_id: &str, file: Ref) -> Result<()> {
    let parent = ensure_parent(root, allocation_id, &file.path)?;
    match parent.children.iter_mut().find(|c| c.name == file.name) {
        Some(existing) => {
            *existing = file;
            Ok(())
        }
        None => Err(ShardboxError::NotFound(file.path)),
    }
}

/// Create a directory, including intermediate levels. Idempotent.
pub fn add_dir(root: &mut Ref, allocation_id: &str, dir_path: &str) -> Result<()> {
    if dir_path == "/" {
        return Ok(());
    }
    let segs = path::segments(dir_path);
    if segs.is_empty() {
        return Err(ShardboxError::NotFound(dir_path.to_string()));
    }
    let parent = ensure_parent(root, allocation_id, dir_path)?;
    let name = segs[segs.len() - 1];
    if let Some(existing) = parent.children.iter().find(|c| c.name == name) {
        if !existing.is_dir() {
            return Err(ShardboxError::FileExists(dir_path.to_string()));
        }
        return Ok(());
    }
    parent.children.push(new_dir_node(allocation_id, dir_path));
    Ok(())
}

/// Find a node by absolute path
pub fn get<'a>(root: &'a Ref, remote_path: &str) -> Option<&'a Ref> {
    if remote_path == "/" {
        return Some(root);
    }
    let mut cur = root;
    for seg in path::segments(remote_path) {
        cur = cur.children.iter().find(|c| c.name == seg)?;
    }
    Some(cur)
}

pub fn get_mut<'a>(root: &'a mut Ref, remote_path: &str) -> Option<&'a mut Ref> {
    if remote_path == "/" {
        return Some(root);
    }
    let mut cur = root;
    for seg in path::segments(remote_path) {
        let idx = cur.children.iter().position(|c| c.name == seg)?;
        cur = &mut cur.children[idx];
    }
    Some(cur)
}

/// Remove a node; returns the removed ref
pub fn delete(root: &mut Ref, remote_path: &str) -> Result<Ref> {
    let (parent_path, name) = path::split(remote_path);
    if name.is_empty() {
        return Err(ShardboxError::NotFound(remote_path.to_string()));
    }
    let parent = get_mut(root, &parent_path)
        .ok_or_else(|| ShardboxError::NotFound(remote_path.to_string()))?;
    let idx = parent
        .children
        .iter()
        .position(|c| c.name == name)
        .ok_or_else(|| ShardboxError::NotFound(remote_path.to_string()))?;
    // Parent hashes are stale until the next calculate_hashes pass
    parent.content_hash.clear();
    parent.path_hash.clear();
    Ok(parent.children.remove(idx))
}

/// Children of a directory node
pub fn list<'a>(root: &'a Ref, dir_path: &str) -> Option<&'a [Ref]> {
    let node = get(root, dir_path)?;
    if node.is_dir() {
        Some(&node.children)
    } else {
        None
    }
}

/// Recompute directory hashes bottom-up and return the root content hash.
///
/// File hashes are taken as stored; a directory's hashes fold its
/// children in insertion order. Empty directories keep whatever hash
/// they already carry.
pub fn calculate_hashes(node: &mut Ref) -> String {
    if node.is_dir() && !node.children.is_empty() {
        let mut content_parts = Vec::with_capacity(node.children.len());
        let mut path_parts = Vec::with_capacity(node.children.len());
        for child in node.children.iter_mut() {
            calculate_hashes(child);
            content_parts.push(child.content_hash.clone());
            path_parts.push(child.path_hash.clone());
        }
        node.content_hash = hash_str(&content_parts.join(":"));
        node.path_hash = hash_str(&path_parts.join(":"));
    }
    node.content_hash.clone()
}

/// Summary hash of one node's identity, used for majority voting
pub fn info_hash(node: &Ref) -> String {
    let type_tag = match node.ref_type {
        RefType::File => "f",
        RefType::Directory => "d",
    };
    hash_str(&format!(
        "{}:{}:{}:{}",
        type_tag, node.name, node.actual_size, node.content_hash
    ))
}
