//! Command-line interface for likevault.
//!
//! Provides commands for refreshing the corpus from the feed, rebuilding the
//! media cache and gallery, cleaning the media store, and showing config.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{FeedSource, HttpFeed};
use crate::config::{self, ResolvedConfig};
use crate::core::{CorpusFile, RefreshOutcome, Syncer};
use crate::media::{GcReport, MediaProcessor, MediaReport};

/// likevault - incremental archive of a likes feed
#[derive(Parser, Debug)]
#[command(name = "likevault")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull new likes, then update media and the gallery if anything changed
    Refresh {
        /// Rebuild media and gallery even when the corpus is unchanged
        #[arg(long)]
        force_media: bool,

        /// Skip the media stage
        #[arg(long, conflicts_with = "force_media")]
        no_media: bool,

        /// Print the refresh outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pull new likes into the corpus only
    Sync {
        /// Print the refresh outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download media for the current corpus and rewrite the gallery
    Media,

    /// Remove unreferenced and duplicate media files
    Gc,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Refresh {
                force_media,
                no_media,
                json,
            } => refresh(force_media, no_media, json).await,
            Commands::Sync { json } => {
                let cfg = config::config()?;
                let outcome = sync_corpus(cfg).await?;
                print_outcome(&outcome, json)
            }
            Commands::Media => {
                let cfg = config::config()?;
                let report = run_media(cfg).await?;
                print_media_report(&report);
                Ok(())
            }
            Commands::Gc => collect_garbage().await,
            Commands::Config => show_config(),
        }
    }
}

/// Run one harvest + reconcile cycle against the configured feed
async fn sync_corpus(cfg: &ResolvedConfig) -> Result<RefreshOutcome> {
    if cfg.feed.user_id.is_empty() {
        anyhow::bail!(
            "No feed user configured. Set feed.user_id in .likevault/config.yaml"
        );
    }

    let feed = HttpFeed::new(cfg.feed.clone()).context("Failed to build feed client")?;
    eprintln!("🔄 Refreshing from {}", feed.name());

    let corpus = CorpusFile::new(cfg.layout().corpus());
    let syncer = Syncer::new(&feed, corpus, cfg.sync.clone());

    syncer.refresh().await.context("Failed to refresh corpus")
}

/// Run the media stage over the persisted corpus
async fn run_media(cfg: &ResolvedConfig) -> Result<MediaReport> {
    let layout = cfg.layout();
    let records = CorpusFile::new(layout.corpus())
        .load()
        .await
        .context("Failed to load corpus")?;

    eprintln!("🖼  Processing media for {} records", records.len());

    MediaProcessor::new(layout, cfg.media.clone())
        .process(&records)
        .await
        .context("Media processing failed")
}

async fn refresh(force_media: bool, no_media: bool, json: bool) -> Result<()> {
    let cfg = config::config()?;
    let outcome = sync_corpus(cfg).await?;
    print_outcome(&outcome, json)?;

    if no_media {
        return Ok(());
    }

    if outcome.changed || force_media || !cfg.layout().gallery().exists() {
        let report = run_media(cfg).await?;
        print_media_report(&report);
    } else {
        eprintln!("Corpus unchanged, skipping media");
    }

    Ok(())
}

async fn collect_garbage() -> Result<()> {
    let cfg = config::config()?;
    let layout = cfg.layout();
    let records = CorpusFile::new(layout.corpus())
        .load()
        .await
        .context("Failed to load corpus")?;

    let report = MediaProcessor::new(layout, cfg.media.clone())
        .collect_garbage(&records)
        .await
        .context("Media cleanup failed")?;

    match report {
        Some(report) => print_gc_report(&report),
        None => eprintln!("Media downloads disabled (media.download = false), skipping cleanup"),
    }
    Ok(())
}

fn print_outcome(outcome: &RefreshOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    let marker = if outcome.changed { "✅" } else { "✓" };
    println!("{} {}", marker, outcome.summary());
    println!("   Pages:   {}", outcome.pages);
    println!("   Stopped: {}", outcome.stop_reason);

    for record in outcome.added.iter().take(10) {
        let preview: String = record.content.chars().take(60).collect();
        println!("   + {:<20} @{:<16} {}", record.id, record.author_handle, preview);
    }
    if outcome.added.len() > 10 {
        println!("   ... and {} more", outcome.added.len() - 10);
    }

    Ok(())
}

fn print_gc_report(report: &GcReport) {
    println!("Media cleanup:");
    println!("  Orphans removed:    {}", report.orphans_removed);
    println!("  Duplicates removed: {}", report.duplicates_removed);
    println!("  Pointers repaired:  {}", report.pointers_repaired);
    println!("  Pointers dropped:   {}", report.pointers_dropped);
    if !report.failures.is_empty() {
        println!("  Skipped files:      {}", report.failures.len());
        for failure in &report.failures {
            println!("    {} ({})", failure.path.display(), failure.error);
        }
    }
}

fn print_media_report(report: &MediaReport) {
    if let Some(gc) = &report.gc {
        print_gc_report(gc);
    }

    if let Some(fetch) = &report.fetch {
        println!("Media fetch:");
        println!("  Already stored: {}", fetch.cached);
        println!("  Downloaded:     {}", fetch.downloaded);
        println!("  Failed:         {}", fetch.failures.len());
        for failure in fetch.failures.iter().take(10) {
            println!("    ❌ {} ({})", failure.url, failure.error);
        }
    }

    println!("Gallery: {} records", report.gallery_records);
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;
    let layout = cfg.layout();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("  likevault Configuration");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Output:           {}", layout.root().display());
    println!("  Corpus:           {}", layout.corpus().display());
    println!("  Gallery:          {}", layout.gallery().display());
    println!("  Media:            {}", layout.media_dir().display());
    println!("  Avatars:          {}", layout.avatar_dir().display());
    println!();
    println!("Feed:");
    println!("  Endpoint:         {}", cfg.feed.endpoint);
    println!(
        "  User:             {}",
        if cfg.feed.user_id.is_empty() {
            "(not set)"
        } else {
            cfg.feed.user_id.as_str()
        }
    );
    println!("  Headers:          {}", cfg.feed.headers.len());
    println!("  Timeout:          {}s", cfg.feed.request_timeout_seconds);
    println!();
    println!("Sync:");
    println!("  Page size:        {}", cfg.sync.page_size);
    println!("  Seen-streak stop: {}", cfg.sync.consecutive_seen_limit);
    println!();
    println!("Media:");
    println!("  Download:         {}", cfg.media.download);
    println!("  Workers:          {}", cfg.media.workers());
    println!("  Timeout:          {}s", cfg.media.request_timeout_seconds);
    println!("  Convert to WebP:  {}", cfg.media.convert_extensions.join(", "));
    println!("  WebP quality:     {}", cfg.media.webp_quality);

    Ok(())
}
