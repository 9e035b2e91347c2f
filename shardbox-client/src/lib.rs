//! Sharded allocation client engine
//!
//! Stores, retrieves, repairs, and deletes files across an allocation's
//! blobber set:
//!
//! - **Erasure-coded pipelines**: files are split into K data + M parity
//!   shards per chunk; any K shards reconstruct the content
//! - **Quorum consensus**: reads succeed at the bare `K/N` quorum,
//!   mutations demand an extra safety margin
//! - **Signed markers**: every read and every commit carries a wallet
//!   signature the peers verify
//! - **Replicated directory tree**: one master tree plus a staged
//!   working copy per blobber connection
//! - **Background reconciler**: detects allocation-root divergence and
//!   rebuilds the tree from per-directory majorities
//!
//! [`session::AllocationSession`] is the entry point.

pub mod blobber;
pub mod consensus;
pub mod dir_tree;
mod download;
pub mod executor;
pub mod path;
mod reconciler;
pub mod session;
pub mod status;
pub mod transport;
mod upload;

pub use blobber::{blobbers_from_json, Blobber, BlobberInfo, Connection};
pub use consensus::{find_majority, full_mask, Consensus, Majority, ADDITIONAL_SUCCESS_RATE};
pub use dir_tree::{Ref, RefType};
pub use executor::{Dispatcher, PeerResult, RequestConfig};
pub use session::{AllocationSession, SessionConfig};
pub use status::{NoopStatus, Operation, StatusCallback};
pub use transport::{BlobberApi, HttpTransport};
