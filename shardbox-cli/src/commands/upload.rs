//! Upload, update, and repair commands

use crate::progress::ProgressStatus;
use anyhow::{Context, Result};
use shardbox_client::AllocationSession;
use std::path::Path;

pub async fn run(
    session: &AllocationSession,
    local_path: &str,
    remote_path: &str,
    update: bool,
) -> Result<()> {
    let local = Path::new(local_path);
    if !local.is_file() {
        anyhow::bail!("not a file: {}", local_path);
    }
    let status = ProgressStatus::new();
    if update {
        session.update(local, remote_path, &status).await?;
    } else {
        session.upload(local, remote_path, &status).await?;
    }
    session.commit().await.context("commit failed")?;
    Ok(())
}

pub async fn repair(
    session: &AllocationSession,
    local_path: &str,
    remote_path: &str,
) -> Result<()> {
    let local = Path::new(local_path);
    if !local.is_file() {
        anyhow::bail!("not a file: {}", local_path);
    }
    let status = ProgressStatus::new();
    session.repair(local, remote_path, &status).await?;
    session.commit().await.context("commit failed")?;
    Ok(())
}
