use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

use umd_client::{
    DownloadOutcome, DownloadRequest, Registry, ReqwestFetcherFactory, download_all,
};
use umd_core::{EventEmitter, Media, Metadata, QueryOptions, TracingEventSink};

#[derive(Parser)]
#[command(name = "umd", version, about = "Universal media downloader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the media found at a URL as JSON
    Query {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Query a URL and download every media file found
    Download {
        #[command(flatten)]
        query: QueryArgs,

        /// Directory to save files into
        #[arg(short, long, env = "UMD_OUTPUT_DIR", default_value = ".")]
        output: PathBuf,

        /// Files downloaded at once
        #[arg(short, long, env = "UMD_PARALLEL", default_value_t = 5)]
        parallel: usize,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Page, post, user or subreddit URL
    #[arg(short, long)]
    url: String,

    /// Maximum number of media items
    #[arg(short, long, env = "UMD_LIMIT")]
    limit: Option<usize>,

    /// Only keep these extensions (e.g. "mp4,jpg")
    #[arg(short, long = "ext", env = "UMD_EXTENSIONS", value_delimiter = ',')]
    extensions: Vec<String>,

    /// Extra metadata echoed in the response (KEY=VALUE, repeatable)
    #[arg(long = "meta", value_parser = parse_key_value)]
    metadata: Vec<(String, String)>,

    /// Resolve links to other supported hosts into their media
    #[arg(long)]
    deep: bool,
}

impl QueryArgs {
    fn options(&self) -> QueryOptions {
        let options = QueryOptions::new()
            .with_extensions(&self.extensions)
            .with_deep(self.deep);
        match self.limit {
            Some(limit) => options.with_limit(limit),
            None => options,
        }
    }

    fn metadata(&self) -> Metadata {
        self.metadata.iter().cloned().collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("umd=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry =
        Registry::new(ReqwestFetcherFactory).with_events(EventEmitter::new(Arc::new(TracingEventSink)));

    match cli.command {
        Commands::Query { query } => cmd_query(&registry, &query).await?,
        Commands::Download {
            query,
            output,
            parallel,
        } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, stopping downloads");
                    on_signal.cancel();
                }
            });

            cmd_download(&registry, &query, &output, parallel, cancel).await?;
        }
    }

    Ok(())
}

async fn cmd_query(registry: &Registry<ReqwestFetcherFactory>, query: &QueryArgs) -> Result<()> {
    let response = registry
        .query_media(&query.url, &query.options(), query.metadata())
        .await
        .with_context(|| format!("Query failed for {}", query.url))?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn cmd_download(
    registry: &Registry<ReqwestFetcherFactory>,
    query: &QueryArgs,
    output: &Path,
    parallel: usize,
    cancel: CancellationToken,
) -> Result<()> {
    let extractor = registry.find_extractor(&query.url, query.metadata())?;
    let response = extractor
        .query_media(&query.url, &query.options())
        .await
        .with_context(|| format!("Query failed for {}", query.url))?;

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;

    let requests: Vec<DownloadRequest> = response
        .media
        .iter()
        .enumerate()
        .map(|(index, media)| DownloadRequest {
            url: media.url().to_string(),
            destination: output.join(file_name(media, index)),
        })
        .collect();

    let total = requests.len();
    let mut finished = 0;
    let mut downloaded = 0;
    let mut failed = 0;
    let mut cancelled = 0;

    let mut reports = std::pin::pin!(download_all(
        extractor.fetcher(),
        requests,
        parallel,
        &cancel
    ));
    while let Some(report) = reports.next().await {
        finished += 1;
        match report.outcome {
            DownloadOutcome::Completed { bytes } => {
                downloaded += 1;
                tracing::info!(
                    "[{}/{}] {} ({} bytes)",
                    finished,
                    total,
                    report.request.destination.display(),
                    bytes
                );
            }
            DownloadOutcome::Failed(_) => failed += 1,
            DownloadOutcome::Cancelled => cancelled += 1,
        }
    }

    if cancelled > 0 {
        tracing::warn!(cancelled, "Downloads cancelled; rerun to resume them");
    }
    println!(
        "Downloaded {downloaded} of {total} files to {} ({failed} failed, {cancelled} cancelled)",
        output.display()
    );
    Ok(())
}

/// Local file name for `media`: the URL's last path segment, or a
/// numbered fallback.
fn file_name(media: &Media, index: usize) -> String {
    let segment = Url::parse(media.url())
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty());

    match segment {
        Some(segment) => segment,
        None if media.extension().is_empty() => format!("media-{index}"),
        None => format!("media-{index}.{}", media.extension()),
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
