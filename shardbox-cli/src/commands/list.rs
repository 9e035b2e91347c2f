//! Listing and statistics commands

use anyhow::Result;
use console::style;
use shardbox_client::AllocationSession;

pub async fn run(session: &AllocationSession, dir_path: &str, long: bool) -> Result<()> {
    let entries = session.list_dir(dir_path).await?;
    if entries.is_empty() {
        println!("{}", style("(empty)").dim());
        return Ok(());
    }
    for entry in entries {
        if long {
            println!(
                "{} {:>12} {}  {}",
                entry.entry_type,
                entry.actual_file_size,
                entry.path,
                style(&entry.actual_file_hash).dim()
            );
        } else {
            println!("{}", entry.path);
        }
    }
    Ok(())
}

pub async fn stats(session: &AllocationSession, remote_path: &str) -> Result<()> {
    let stats = session.file_stats(remote_path).await?;
    println!("{}", remote_path);
    for (blobber_id, s) in stats {
        println!(
            "  {:<24} shard {:>10} bytes, {} reads, {} updates",
            blobber_id, s.size, s.num_of_block_downloads, s.num_of_updates
        );
    }
    Ok(())
}
