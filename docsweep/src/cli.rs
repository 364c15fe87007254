//! CLI surface for docsweep.
//!
//! One subcommand per automation script; all business logic lives in
//! `docsweep-core`. This module handles argument parsing, wiring real
//! clients into core entry points, and console reporting. The async
//! entrypoint [`run`] is callable from integration tests.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use docsweep_core::compress::{compress_pdf, human_size, DEFAULT_COMPRESSION_LEVEL};
use docsweep_core::contract::BucketStore;
use docsweep_core::dlp::HttpDlpClient;
use docsweep_core::event::{decode_event, process_event};
use docsweep_core::links::{extract_links, write_links_csv, DEFAULT_ORIGIN};
use docsweep_core::merge::{
    filter_http, merge_records, read_link_records, DEFAULT_OUTPUT_FILENAME,
    DEFAULT_TITLE_COLUMN, DEFAULT_URL_COLUMN,
};
use docsweep_core::render::{ChromiumRenderer, PrintOptions};
use docsweep_core::storage::{HttpStorageClient, PII_LABEL};

/// CLI for docsweep: documentation harvesting and bucket DLP automation.
#[derive(Parser)]
#[clap(
    name = "docsweep",
    version,
    about = "Extract doc-site links to CSV, merge pages into one PDF, compress PDFs, and gate DLP scan triggers on bucket labels"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract navigation links from a documentation page into a CSV
    ExtractLinks {
        /// URL of the documentation overview page
        url: String,
        /// Site origin used to resolve relative hrefs
        #[clap(long, default_value = DEFAULT_ORIGIN)]
        origin: String,
        /// Output CSV path
        #[clap(long, default_value = "Integration_links.csv")]
        output: PathBuf,
    },
    /// Recompress a PDF's content streams and deduplicate identical objects
    Compress {
        /// Path to the input PDF file
        input_file: PathBuf,
        /// Path for the output (compressed) PDF file
        output_file: PathBuf,
        /// Compression level (0-9); 0 stores content streams uncompressed
        #[clap(
            short = 'c',
            long = "compression",
            value_parser = clap::value_parser!(u32).range(0..=9),
            default_value_t = DEFAULT_COMPRESSION_LEVEL
        )]
        compression: u32,
    },
    /// Render each CSV row's URL to PDF and merge them in row order
    Merge {
        /// CSV of titles and URLs, as produced by extract-links
        csv_file: PathBuf,
        /// Output PDF path
        #[clap(long, default_value = DEFAULT_OUTPUT_FILENAME)]
        output: PathBuf,
        #[clap(long, default_value = DEFAULT_TITLE_COLUMN)]
        title_column: String,
        #[clap(long, default_value = DEFAULT_URL_COLUMN)]
        url_column: String,
    },
    /// Print whether a bucket carries the informational pii label
    CheckBucket {
        bucket_name: String,
    },
    /// Handle a base64-encoded storage-change event and gate DLP trigger creation
    HandleEvent {
        /// Base64 event payload; read from stdin when omitted
        #[clap(long)]
        data: Option<String>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::ExtractLinks {
            url,
            origin,
            output,
        } => {
            let records = extract_links(&url, &origin)
                .await
                .map_err(|e| anyhow!("link extraction failed: {e}"))?;
            write_links_csv(&output, &records)
                .map_err(|e| anyhow!("failed to write CSV: {e}"))?;
            println!(
                "Successfully saved {} links to {}",
                records.len(),
                output.display()
            );
            Ok(())
        }
        Commands::Compress {
            input_file,
            output_file,
            compression,
        } => {
            println!("Applying compression with level: {compression}...");
            let report = compress_pdf(&input_file, &output_file, compression)
                .map_err(|e| anyhow!("compression failed: {e}"))?;
            println!("Original file size: {}", human_size(report.input_bytes));
            println!("Compressed PDF saved to: {}", output_file.display());
            println!("Final file size: {}", human_size(report.output_bytes));
            println!("Size reduction: {:.2}%", report.reduction_percent());
            Ok(())
        }
        Commands::Merge {
            csv_file,
            output,
            title_column,
            url_column,
        } => {
            // Validate the CSV before paying for a browser launch.
            let records = filter_http(
                read_link_records(&csv_file, &title_column, &url_column)
                    .map_err(|e| anyhow!("failed to read CSV: {e}"))?,
            );
            if records.is_empty() {
                println!("No URLs to process. Exiting.");
                return Ok(());
            }
            tracing::info!(count = records.len(), "Setting up headless browser");
            let renderer = ChromiumRenderer::launch()
                .await
                .map_err(|e| anyhow!("failed to launch browser: {e}"))?;
            let result =
                merge_records(&records, &output, &PrintOptions::default(), &renderer).await;
            // The browser session must die on every exit path.
            renderer.close().await;
            let report = result.map_err(|e| anyhow!("merge failed: {e}"))?;
            println!(
                "Merged {} pages into {}",
                report.pages_rendered,
                report.output_path.display()
            );
            Ok(())
        }
        Commands::CheckBucket { bucket_name } => {
            let store = HttpStorageClient::new_from_env()
                .map_err(|e| anyhow!("failed to construct storage client: {e}"))?;
            let labels = store
                .bucket_labels(&bucket_name)
                .await
                .map_err(|e| anyhow!("failed to fetch bucket labels: {e}"))?;
            match labels.get(PII_LABEL) {
                Some(value) => println!("Bucket label pii: {value}"),
                None => println!("No pii label found."),
            }
            Ok(())
        }
        Commands::HandleEvent { data } => {
            let payload = match data {
                Some(data) => data,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let payload = payload.trim();
            // A malformed payload must not end the invocation abnormally;
            // the event runtime completes its lifecycle either way.
            let event = match decode_event(payload.as_bytes()) {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(error = %e, "Error parsing storage event");
                    println!("Error parsing event payload: {e}");
                    return Ok(());
                }
            };
            let store = HttpStorageClient::new_from_env()
                .map_err(|e| anyhow!("failed to construct storage client: {e}"))?;
            let dlp = HttpDlpClient::new_from_env()
                .map_err(|e| anyhow!("failed to construct DLP client: {e}"))?;
            match process_event(event, &store, &dlp).await {
                Ok(report) => {
                    match report.trigger_name {
                        Some(name) => println!("DLP job trigger created: {name}"),
                        None => println!(
                            "Bucket {} is exempted from DLP scanning.",
                            report.bucket_name
                        ),
                    }
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to handle storage event");
                    println!("Error handling event: {e}");
                    Ok(())
                }
            }
        }
    }
}
