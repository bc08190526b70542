//! CLI for the VDM download manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vdm_core::config;

use commands::{run_get, run_resolve};

/// Top-level CLI for the VDM download manager.
#[derive(Debug, Parser)]
#[command(name = "vdm")]
#[command(about = "VDM: concurrent bulk video download manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download every video behind a channel, playlist, or video reference.
    Get {
        /// Channel/playlist/video URL, or a bare video id.
        reference: String,

        /// Simultaneous downloads for this job (default from config).
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,

        /// Stop claiming new items once one item exhausts its retries.
        #[arg(long)]
        fail_fast: bool,

        /// Only resolve and download the first N items.
        #[arg(long, value_name = "N")]
        max_items: Option<usize>,

        /// Download audio only.
        #[arg(long)]
        audio_only: bool,

        /// Directory downloads land in (default from config).
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Print the final job snapshot as JSON instead of a summary line.
        #[arg(long)]
        json: bool,
    },

    /// List the items a reference resolves to, without downloading.
    Resolve {
        /// Channel/playlist/video URL, or a bare video id.
        reference: String,

        /// Only list the first N items.
        #[arg(long, value_name = "N")]
        max_items: Option<usize>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                reference,
                concurrency,
                fail_fast,
                max_items,
                audio_only,
                output_dir,
                json,
            } => {
                run_get(
                    &cfg,
                    &reference,
                    concurrency,
                    fail_fast,
                    max_items,
                    audio_only,
                    output_dir,
                    json,
                )
                .await?;
            }
            CliCommand::Resolve {
                reference,
                max_items,
            } => run_resolve(&reference, max_items).await?,
        }

        Ok(())
    }
}
