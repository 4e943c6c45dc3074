//! iSamples Harvester Library
//!
//! Harvests physical-sample metadata from upstream providers into a local
//! record store, and exports the store to a search index.
//!
//! # Overview
//!
//! - **Cursors** ([`cursor`]): page through provider identifier listings
//! - **Sitemaps** ([`sitemap`]): walk and publish sitemap indexes with a
//!   last-modified watermark
//! - **Fetching** ([`fetch`]): bounded-concurrency retrieval with retries
//! - **Providers** ([`providers`]): SESAR, GEOME, Open Context and peer
//!   `/thing` record fetchers
//! - **Store** ([`store`]): SQLite records with aliases and key-ordered scans
//! - **Export** ([`export`]): transform records and push them to Solr
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod commands;
pub mod config;
pub mod cursor;
pub mod decompression;
pub mod export;
pub mod fetch;
pub mod http;
pub mod providers;
pub mod sitemap;
pub mod store;

pub use config::{ConfigError, HarvestConfig};
pub use store::{Record, RecordStore};

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// isb - iSamples metadata harvester
#[derive(Parser, Debug)]
#[command(name = "isb")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Database URL, overrides ISB_DATABASE_URL
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Concurrent fetches, overrides ISB_POOL_SIZE
    #[arg(long, global = true)]
    pub pool_size: Option<usize>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Harvest records from a provider's identifier listing
    Harvest(HarvestArgs),

    /// Harvest records listed by a sitemap index
    Sitemap(SitemapArgs),

    /// Push stored records to the search index
    Export(ExportArgs),

    /// Write the store as a sitemap index and urlset files
    PublishSitemap(PublishArgs),

    /// Show record counts by status and authority
    Stats,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Sesar,
    Geome,
    Opencontext,
}

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// Provider to harvest
    #[arg(value_enum)]
    pub provider: Provider,

    /// Stop after this many identifiers; negative for no limit
    #[arg(short, long, default_value_t = -1, allow_hyphen_values = true)]
    pub max_records: i64,

    /// Identifiers to skip before harvesting
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Identifiers requested per listing page
    #[arg(long, default_value_t = cursor::DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Only identifiers modified at or after this time (defaults to the newest stored record)
    #[arg(long)]
    pub since: Option<String>,

    /// Only identifiers modified at or before this time
    #[arg(long)]
    pub until: Option<String>,

    /// Ignore the stored watermark and list everything
    #[arg(long)]
    pub full: bool,

    /// Skip identifiers already stored successfully
    #[arg(long)]
    pub skip_existing: bool,
}

#[derive(Args, Debug)]
pub struct SitemapArgs {
    /// Sitemap index URL
    pub index_url: String,

    /// Authority for records whose payload names none
    #[arg(short, long)]
    pub authority: String,

    /// Ignore the stored watermark and crawl every file
    #[arg(long)]
    pub ignore_last_modified: bool,

    /// Only the child sitemap whose URL ends with this name
    #[arg(long)]
    pub file: Option<String>,

    /// Skip this many child sitemaps
    #[arg(long, default_value_t = 0)]
    pub start_index: usize,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Only records of this authority
    #[arg(short, long)]
    pub authority: Option<String>,

    /// Only records created at or after this time
    #[arg(long)]
    pub since: Option<String>,

    /// Solr collection URL, overrides ISB_SOLR_URL
    #[arg(long)]
    pub solr_url: Option<String>,

    /// Documents per batch, overrides ISB_EXPORT_BATCH_SIZE
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Output directory
    pub dest: PathBuf,

    /// Public URL the output directory is served from
    #[arg(long)]
    pub sitemap_base_url: String,

    /// Only records of this authority
    #[arg(short, long)]
    pub authority: Option<String>,

    /// Thing link prefix, overrides ISB_THING_BASE_URL
    #[arg(long)]
    pub thing_base_url: Option<String>,

    /// URLs per urlset file
    #[arg(long, default_value_t = sitemap::publisher::DEFAULT_URLS_PER_FILE)]
    pub urls_per_file: usize,
}
