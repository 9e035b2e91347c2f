//! Delete command

use crate::progress::ProgressStatus;
use anyhow::{Context, Result};
use shardbox_client::AllocationSession;
use std::io::Write;

pub async fn run(session: &AllocationSession, remote_path: &str, force: bool) -> Result<()> {
    if !force {
        print!("delete {}? [y/N] ", remote_path);
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("aborted");
            return Ok(());
        }
    }
    let status = ProgressStatus::new();
    session.delete(remote_path, &status).await?;
    session.commit().await.context("commit failed")?;
    Ok(())
}
