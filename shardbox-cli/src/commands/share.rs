//! Share command

use anyhow::Result;
use console::style;
use shardbox_client::AllocationSession;

pub async fn run(
    session: &AllocationSession,
    remote_path: &str,
    referee_client_id: &str,
) -> Result<()> {
    let ticket = session.share(remote_path, referee_client_id).await?;
    println!(
        "{} share ticket for {} (valid 90 days):",
        style("\u{2713}").green(),
        remote_path
    );
    println!("{}", ticket);
    Ok(())
}
