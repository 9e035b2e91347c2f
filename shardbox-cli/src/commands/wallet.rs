//! Wallet commands
//!
//! Creates, recovers, and inspects the client wallet stored at
//! ~/.shardbox/wallet.json.

use crate::config;
use anyhow::Result;
use console::style;
use shardbox_core::signature::SignatureScheme;
use shardbox_core::wallet::Wallet;

pub fn create(mnemonic: Option<String>, force: bool) -> Result<()> {
    if config::wallet_exists() && !force {
        anyhow::bail!("a wallet already exists; pass --force to overwrite it");
    }
    let wallet = match mnemonic.as_deref() {
        Some(m) => Wallet::recover(SignatureScheme::Ed25519, m)?,
        None => Wallet::create(SignatureScheme::Ed25519)?,
    };
    let path = config::save_wallet(&wallet)?;
    println!(
        "{} wallet written to {}",
        style("\u{2713}").green(),
        path.display()
    );
    println!("client id:  {}", wallet.client_id);
    println!("public key: {}", wallet.client_key);
    Ok(())
}

pub fn show() -> Result<()> {
    let wallet = config::load_wallet()?;
    println!("client id:  {}", wallet.client_id);
    println!("public key: {}", wallet.client_key);
    println!("scheme:     {:?}", wallet.scheme);
    println!("created:    {}", wallet.date_created);
    Ok(())
}
