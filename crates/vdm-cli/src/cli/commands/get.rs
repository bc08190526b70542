//! `vdm get` – resolve a reference, run the download job, render progress.
//!
//! This is the polling client the engine's snapshot surface is built for:
//! it creates one job, polls on an interval, and renders
//! completed/total, speed, ETA, and the active-item lines.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use vdm_core::config::VdmConfig;
use vdm_core::downloader::{Quality, YtDlpDownloader, YtDlpOptions};
use vdm_core::item::ItemState;
use vdm_core::job::JobStatus;
use vdm_core::naming::sanitize_component;
use vdm_core::progress::{format_eta, format_speed};
use vdm_core::registry::Registry;
use vdm_core::resolver::{Reference, YtDlpResolver};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run_get(
    cfg: &VdmConfig,
    reference: &str,
    concurrency: Option<usize>,
    fail_fast: bool,
    max_items: Option<usize>,
    audio_only: bool,
    output_dir: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let reference = Reference::parse(reference)?;

    let mut options = cfg.job_options();
    if let Some(n) = concurrency {
        options.concurrency_limit = n;
    }
    options.fail_fast = options.fail_fast || fail_fast;
    let max_items = max_items.or(cfg.max_items);
    let quality = if audio_only {
        Quality::Audio
    } else {
        cfg.quality
    };

    // One directory per channel/playlist, like the original layout.
    let mut target_dir = output_dir.unwrap_or_else(|| cfg.download_root());
    if let Some(hint) = reference.dir_hint() {
        target_dir = target_dir.join(sanitize_component(&hint));
    }

    let downloader = YtDlpDownloader::new(YtDlpOptions {
        binary: "yt-dlp".to_string(),
        output_dir: target_dir.clone(),
        quality,
    });
    let registry = Registry::new(Arc::new(downloader));
    let resolver = YtDlpResolver::new("yt-dlp", max_items);

    println!("Resolving {} ...", reference.url());
    let id = registry.create_from(&resolver, &reference, options).await?;
    let first = registry.get(id)?;
    println!(
        "job {}: {} item(s) -> {}",
        id,
        first.total,
        target_dir.display()
    );

    let mut cancel_requested = false;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                println!("\ninterrupted: cancelling job {id} (in-flight items may finish)");
                registry.cancel(id)?;
                cancel_requested = true;
            }
        }

        let snap = registry.get(id)?;
        println!(
            "  {} / {} items ({}%)  {}  ETA {}",
            snap.completed,
            snap.total,
            snap.progress_percent,
            format_speed(snap.speed_bps),
            format_eta(snap.eta_secs)
        );
        for line in &snap.active_descriptions {
            println!("      {}", line);
        }
        if snap.status.is_terminal() && snap.active == 0 {
            break;
        }
    }

    let snap = registry.get(id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snap)?);
    }
    match snap.status {
        JobStatus::Completed => {
            println!(
                "done: {} item(s) downloaded to {}",
                snap.completed,
                target_dir.display()
            );
            Ok(())
        }
        JobStatus::Cancelled => {
            bail!(
                "cancelled: {} of {} item(s) downloaded",
                snap.completed,
                snap.total
            )
        }
        _ => {
            // A failed job still reports which items succeeded and which did not.
            for item in registry.items_report(id)? {
                if item.state == ItemState::Failed {
                    println!(
                        "failed: {} ({})",
                        item.title.as_deref().unwrap_or(&item.id),
                        item.last_error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            bail!(
                "job failed: {} of {} item(s) downloaded",
                snap.completed,
                snap.total
            )
        }
    }
}
