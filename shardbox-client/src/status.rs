//! Operation status callbacks
//!
//! Pipelines report progress through this trait. Exactly one terminal
//! call, `completed` or `error`, is made per operation.

use shardbox_core::error::ShardboxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Update,
    Download,
    Repair,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Upload => "upload",
            Operation::Update => "update",
            Operation::Download => "download",
            Operation::Repair => "repair",
            Operation::Delete => "delete",
        }
    }
}

/// Progress observer; all methods default to no-ops
#[allow(unused_variables)]
pub trait StatusCallback: Send + Sync {
    fn started(&self, allocation_id: &str, path: &str, op: Operation, total_bytes: u64) {}

    fn in_progress(&self, allocation_id: &str, path: &str, op: Operation, completed_bytes: u64) {}

    fn completed(
        &self,
        allocation_id: &str,
        path: &str,
        name: &str,
        mime_type: &str,
        size: u64,
        op: Operation,
    ) {
    }

    fn error(&self, allocation_id: &str, path: &str, op: Operation, err: &ShardboxError) {}
}

/// Callback that ignores everything
pub struct NoopStatus;

impl StatusCallback for NoopStatus {}
