//! Download commands

use crate::progress::ProgressStatus;
use anyhow::Result;
use shardbox_client::{path, AllocationSession};
use std::path::PathBuf;

pub async fn run(
    session: &AllocationSession,
    remote_path: &str,
    output: Option<String>,
) -> Result<()> {
    let out = match output {
        Some(o) => PathBuf::from(o),
        None => PathBuf::from(path::base(remote_path)),
    };
    let status = ProgressStatus::new();
    session.download(remote_path, &out, &status).await?;
    Ok(())
}

pub async fn shared(session: &AllocationSession, ticket: &str, output: &str) -> Result<()> {
    let status = ProgressStatus::new();
    session
        .download_shared(ticket, &PathBuf::from(output), &status)
        .await?;
    Ok(())
}
