//! Shardbox Protocol Library
//!
//! Wire-level types shared by the client and its tooling:
//! - Signed markers (read, write, delete, version) and auth tickets
//! - Blobber HTTP routes, auth headers, and request/response bodies

pub mod markers;
pub mod wire;

pub use markers::{now, AuthTicket, DeleteToken, ReadMarker, VersionMarker, WriteMarker};
pub use wire::{
    allocation_auth_hash, DeleteFormData, DownloadBlockRequest, FileMetaResponse,
    FileStatsResponse, LatestReadMarkerResponse, ListEntry, ListResponse, UploadFormData,
    UploadResult,
};
