//! Skybid CLI - Run API strategies over a sheet
//!
//! # Main Commands
//!
//! ```bash
//! skybid run bids.csv --config config.csv   # Process a sheet in place
//! skybid serve                              # Start HTTP server (port 3000)
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! skybid resolve hourly.temp.!MAX response.json   # Try a path on a JSON file
//! skybid api-headers bids.csv                     # List api:<path> columns
//! skybid cache clear                              # Empty the response cache
//! ```

use clap::{Parser, Subcommand};
use serde_json::Value;
use skybid::cache::DEFAULT_CACHE_FILE;
use skybid::{
    api_headers, default_processor, load_config, run_sheet, try_resolve, DiskCache,
    ReqwestFetcher, Sheet,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "skybid")]
#[command(about = "Fill sheet columns from data APIs and run bid strategies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a sheet: call the APIs and run the strategies
    Run {
        /// Input CSV sheet
        input: PathBuf,

        /// Config sheet (two columns: key,value)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip strategies that ran within this many hours
        #[arg(long)]
        hours: Option<f64>,

        /// Response cache file
        #[arg(long, default_value = DEFAULT_CACHE_FILE)]
        cache: PathBuf,

        /// Output file (default: overwrite the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the error log to this file
        #[arg(short, long)]
        errors: Option<PathBuf>,
    },

    /// Resolve a dot path against a JSON file
    Resolve {
        /// Path such as `main.temp` or `hourly.!MAX`
        path: String,

        /// JSON file
        input: PathBuf,
    },

    /// List the api:<path> columns of a sheet
    ApiHeaders {
        /// Input CSV sheet
        input: PathBuf,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached response
    Clear {
        /// Response cache file
        #[arg(long, default_value = DEFAULT_CACHE_FILE)]
        cache: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            config,
            hours,
            cache,
            output,
            errors,
        } => {
            // The fetcher blocks on HTTP, run the batch off the async workers.
            tokio::task::spawn_blocking(move || {
                cmd_run(
                    &input,
                    config.as_deref(),
                    hours,
                    &cache,
                    output.as_deref(),
                    errors.as_deref(),
                )
                .map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r)
            .map_err(|e| -> Box<dyn std::error::Error> { e.into() })
        }

        Commands::Resolve { path, input } => cmd_resolve(&path, &input),

        Commands::ApiHeaders { input } => cmd_api_headers(&input),

        Commands::Serve { port } => cmd_serve(port).await,

        Commands::Cache { action } => cmd_cache(action),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(
    input: &Path,
    config_path: Option<&Path>,
    hours: Option<f64>,
    cache_path: &Path,
    output: Option<&Path>,
    errors_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Processing: {}", input.display());

    let mut sheet = Sheet::from_path(input)?;
    eprintln!("   Encoding: {}", sheet.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(sheet.delimiter));
    eprintln!("   Rows: {}", sheet.rows.len());

    let config = load_config(config_path, hours)?;

    let cache = Arc::new(DiskCache::with_path(cache_path));
    let mut processor = default_processor(cache, Arc::new(ReqwestFetcher::new()));
    let report = run_sheet(&mut processor, &mut sheet, config);

    let target = output.unwrap_or(input);
    sheet.write_to(target)?;
    eprintln!("\n{}", report.summary());
    eprintln!("   Written to: {}", target.display());

    if !report.errors.is_empty() {
        match errors_path {
            Some(path) => {
                fs::write(path, &report.errors)?;
                eprintln!("   Error log: {}", path.display());
            }
            None => {
                eprintln!("\nErrors:");
                for line in report.errors.lines() {
                    eprintln!("   - {}", line);
                }
            }
        }
    }

    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn cmd_resolve(path: &str, input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let content = fs::read_to_string(input)?;
    let json: Value = serde_json::from_str(&content)?;

    let value = try_resolve(path, &json)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn cmd_api_headers(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let sheet = Sheet::from_path(input)?;
    let columns = api_headers(&sheet.headers);

    if columns.is_empty() {
        eprintln!("No api: columns in {}", input.display());
        return Ok(());
    }
    for (path, index) in columns {
        println!("{:>4}  {}", index, path);
    }
    Ok(())
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    skybid::server::start_server(port).await
}

fn cmd_cache(action: CacheAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        CacheAction::Clear { cache } => {
            let cache = DiskCache::with_path(&cache);
            let count = cache.len();
            cache.clear()?;
            eprintln!("Cleared {} cached responses from {}", count, cache.path().display());
        }
    }
    Ok(())
}
