//! Command implementations for the `isb` binary

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use isb_common::time::parse_timestamp;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::config::HarvestConfig;
use crate::cursor::{
    CursorOptions, GeomeProjectLoader, IdentifierCursor, OaiPmhLoader, OpenContextLoader,
};
use crate::export::{EnvelopeTransform, ExportOptions, ExportPipeline, SolrIndex};
use crate::fetch::{
    FetchOrchestrator, HarvestReport, OrchestratorOptions, SitemapHarvestOptions,
    SitemapHarvester,
};
use crate::http::build_client;
use crate::providers::geome::GEOME_AUTHORITY;
use crate::providers::opencontext::OPENCONTEXT_AUTHORITY;
use crate::providers::sesar::SESAR_AUTHORITY;
use crate::providers::{GeomeFetcher, OpenContextFetcher, SesarFetcher, ThingFetcher};
use crate::sitemap::{SitemapPublisher, SitemapWalker};
use crate::store::RecordStore;
use crate::{ExportArgs, HarvestArgs, Provider, PublishArgs, SitemapArgs};

impl Provider {
    pub fn authority(self) -> &'static str {
        match self {
            Provider::Sesar => SESAR_AUTHORITY,
            Provider::Geome => GEOME_AUTHORITY,
            Provider::Opencontext => OPENCONTEXT_AUTHORITY,
        }
    }
}

fn parse_optional(value: Option<&str>, flag: &str) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|v| parse_timestamp(v).with_context(|| format!("Invalid --{} value '{}'", flag, v)))
        .transpose()
}

async fn open_store(config: &HarvestConfig) -> Result<RecordStore> {
    RecordStore::connect(&config.store)
        .await
        .with_context(|| format!("Failed to open record store at {}", config.store.url))
}

fn orchestrator_options(config: &HarvestConfig, skip_existing: bool) -> OrchestratorOptions {
    OrchestratorOptions {
        pool_size: config.harvest.pool_size,
        max_attempts: config.harvest.max_attempts,
        max_records: None,
        skip_existing,
    }
}

fn print_report(report: &HarvestReport) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(report).context("Failed to serialize report")?
    );
    Ok(())
}

/// `isb harvest <provider>`
pub async fn harvest(config: &HarvestConfig, args: &HarvestArgs) -> Result<()> {
    let store = open_store(config).await?;
    let client = build_client(&config.http).context("Failed to build HTTP client")?;
    let authority = args.provider.authority();

    let since = match parse_optional(args.since.as_deref(), "since")? {
        Some(since) => Some(since),
        None if args.full => None,
        None => store
            .last_created_at(authority)
            .await
            .context("Failed to read harvest watermark")?,
    };
    let until = parse_optional(args.until.as_deref(), "until")?;
    info!(authority, since = ?since, until = ?until, "Harvest window");

    let cursor_options = CursorOptions::default()
        .max_entries(args.max_records)
        .offset(args.offset)
        .page_size(args.page_size)
        .window(since, until);
    let options = orchestrator_options(config, args.skip_existing);
    let providers = &config.providers;

    let report = match args.provider {
        Provider::Sesar => {
            let loader = OaiPmhLoader::new(client.clone(), providers.sesar_oai_url.as_str());
            let mut cursor = IdentifierCursor::new(loader, cursor_options);
            let fetcher = SesarFetcher::new(client, providers.sesar_api_url.as_str());
            FetchOrchestrator::new(fetcher, store, options)
                .run(&mut cursor)
                .await
        },
        Provider::Geome => {
            let loader = GeomeProjectLoader::new(client.clone(), providers.geome_api_url.as_str());
            let mut cursor = IdentifierCursor::new(loader, cursor_options);
            let fetcher = GeomeFetcher::new(client, providers.geome_api_url.as_str());
            FetchOrchestrator::new(fetcher, store, options)
                .run(&mut cursor)
                .await
        },
        Provider::Opencontext => {
            let loader =
                OpenContextLoader::new(client.clone(), providers.opencontext_search_url.as_str());
            let mut cursor = IdentifierCursor::new(loader, cursor_options);
            FetchOrchestrator::new(OpenContextFetcher::new(client), store, options)
                .run(&mut cursor)
                .await
        },
    }
    .with_context(|| format!("{} harvest failed", authority))?;

    print_report(&report)
}

/// `isb sitemap <index-url>`
pub async fn sitemap(config: &HarvestConfig, args: &SitemapArgs) -> Result<()> {
    let store = open_store(config).await?;
    let client = build_client(&config.http).context("Failed to build HTTP client")?;

    let watermark = if args.ignore_last_modified {
        None
    } else {
        store
            .last_created_at(&args.authority)
            .await
            .context("Failed to read harvest watermark")?
    };

    let fetcher = ThingFetcher::new(client.clone(), args.authority.as_str())
        .context("Failed to compile thing URL pattern")?;
    let harvester = SitemapHarvester::new(
        SitemapWalker::new(client),
        Arc::new(fetcher),
        store,
        orchestrator_options(config, false),
    );
    let options = SitemapHarvestOptions {
        watermark,
        file: args.file.clone(),
        start_index: args.start_index,
    };

    let report = harvester
        .run(&args.index_url, &options)
        .await
        .with_context(|| format!("Sitemap harvest of {} failed", args.index_url))?;
    print_report(&report)
}

/// `isb export`
pub async fn export(config: &HarvestConfig, args: &ExportArgs) -> Result<()> {
    let store = open_store(config).await?;
    let client = build_client(&config.http).context("Failed to build HTTP client")?;
    let solr_url = args
        .solr_url
        .clone()
        .unwrap_or_else(|| config.export.solr_url.clone());

    let options = ExportOptions {
        authority: args.authority.clone(),
        min_created: parse_optional(args.since.as_deref(), "since")?,
        batch_size: args.batch_size.unwrap_or(config.export.batch_size),
        page_size: config.export.page_size,
    };
    let pipeline = ExportPipeline::new(
        store,
        EnvelopeTransform::new(),
        SolrIndex::new(client, solr_url.as_str()),
        options,
    );

    let report = pipeline
        .run()
        .await
        .with_context(|| format!("Export to {} failed", solr_url))?;
    println!(
        "{}",
        json!({
            "records": report.records,
            "skipped": report.skipped,
            "documents": report.documents,
            "batches": report.batches,
        })
    );
    Ok(())
}

/// `isb publish-sitemap <dest>`
pub async fn publish_sitemap(config: &HarvestConfig, args: &PublishArgs) -> Result<()> {
    let store = open_store(config).await?;
    let thing_base_url = args
        .thing_base_url
        .clone()
        .unwrap_or_else(|| config.thing_base_url.clone());

    let report = SitemapPublisher::new(store, thing_base_url, args.sitemap_base_url.as_str())
        .with_urls_per_file(args.urls_per_file)
        .publish(args.authority.as_deref(), &args.dest)
        .await
        .with_context(|| format!("Failed to publish sitemap to {}", args.dest.display()))?;

    println!(
        "Wrote {} URLs in {} files to {}",
        report.urls,
        report.files.len(),
        args.dest.display()
    );
    Ok(())
}

/// `isb stats`
pub async fn stats(config: &HarvestConfig) -> Result<()> {
    let store = open_store(config).await?;
    let by_status = store
        .status_counts()
        .await
        .context("Failed to count records by status")?;
    let by_authority = store
        .authority_counts()
        .await
        .context("Failed to count records by authority")?;

    println!("Records by fetch status:");
    for (status, count) in &by_status {
        println!("  {:>5}  {}", status, count);
    }
    println!("Records by authority:");
    for (authority, count) in &by_authority {
        println!("  {:<12} {}", authority, count);
    }
    Ok(())
}
