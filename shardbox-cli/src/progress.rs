//! Terminal progress reporting
//!
//! Bridges the client's status callbacks onto an indicatif progress bar.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use shardbox_client::{Operation, StatusCallback};
use shardbox_core::error::ShardboxError;
use std::sync::Mutex;

pub struct ProgressStatus {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressStatus {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }
}

impl StatusCallback for ProgressStatus {
    fn started(&self, _allocation_id: &str, path: &str, op: Operation, total_bytes: u64) {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .unwrap()
                .progress_chars("#>-"),
        );
        bar.set_message(format!("{} {}", op.as_str(), path));
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn in_progress(&self, _allocation_id: &str, _path: &str, _op: Operation, completed_bytes: u64) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_position(completed_bytes);
            }
        }
    }

    fn completed(
        &self,
        _allocation_id: &str,
        _path: &str,
        name: &str,
        _mime_type: &str,
        size: u64,
        op: Operation,
    ) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
        println!(
            "{} {} {} ({} bytes)",
            style("\u{2713}").green(),
            op.as_str(),
            name,
            size
        );
    }

    fn error(&self, _allocation_id: &str, path: &str, op: Operation, err: &ShardboxError) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
        eprintln!(
            "{} {} {} failed: {}",
            style("\u{2717}").red(),
            op.as_str(),
            path,
            err
        );
    }
}
