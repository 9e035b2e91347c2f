//! CLI commands

pub mod delete;
pub mod download;
pub mod list;
pub mod share;
pub mod upload;
pub mod wallet;
