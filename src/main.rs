use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use media_chooser_cache::catalog::{scan_catalog, CatalogItem, LocalFileFetcher};
use media_chooser_cache::{CacheConfig, CachedMedia, ChooserCallbacks, MediaChooser};

/// Browse a media directory the way the remote chooser does
#[derive(Debug, Parser)]
#[command(name = "media-chooser", version, about)]
struct Cli {
    /// Directory of pictures, videos and overlays to browse
    catalog: PathBuf,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the cache capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Evict by added date instead of last access
    #[arg(long)]
    purge_by_added_date: bool,

    /// Override the download directory
    #[arg(long)]
    temp_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let fetcher = LocalFileFetcher::new(&cli.catalog, &config.temp_dir);
    let callbacks = ChooserCallbacks {
        on_loading: Box::new(|item: &CatalogItem| println!("loading {} ...", item.key)),
        on_item_ready: Box::new(|item: &CatalogItem, media: &CachedMedia| {
            let size = media
                .preview()
                .map(|p| format!("{}x{}", p.width(), p.height()))
                .unwrap_or_else(|| "no preview".to_string());
            println!("showing {} [{:?}, {}]", item.key, item.kind, size);
        }),
        on_failed: Box::new(|item: &CatalogItem, error: &str| println!("failed {}: {}", item.key, error)),
    };

    let mut chooser = MediaChooser::new(fetcher, &config, callbacks).context("Invalid configuration")?;
    chooser.set_results(scan_catalog(&cli.catalog));

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        chooser.pump_timeout(Duration::from_millis(50));
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        match line?.trim() {
            "next" | "n" => {
                if !chooser.next() {
                    println!("end of results");
                }
            }
            "prev" | "p" => {
                if !chooser.previous() {
                    println!("start of results");
                }
            }
            "select" | "s" => match chooser.select() {
                Some(selected) => match selected.path {
                    Some(path) => println!("selected {} -> {}", selected.key, path.display()),
                    None => println!("selected {} (in memory)", selected.key),
                },
                None => println!("still loading"),
            },
            "rescan" => chooser.set_results(scan_catalog(&cli.catalog)),
            "status" => {
                let pre = chooser.predownloader();
                let (position, total) = chooser.position();
                println!(
                    "item {}/{}, cached {}/{}, downloading {}, direction {:?}",
                    position,
                    total,
                    pre.cache().len(),
                    pre.cache().capacity(),
                    pre.in_flight(),
                    pre.direction()
                );
            }
            "list" => println!("{}", serde_json::to_string_pretty(chooser.items())?),
            "quit" | "q" => break,
            "" => {}
            other => println!("unknown command: {} (next, prev, select, rescan, status, list, quit)", other),
        }
    }

    Ok(())
}

/// Config file (if any) with command line overrides applied
fn load_config(cli: &Cli) -> Result<CacheConfig> {
    let mut config = match &cli.config {
        Some(path) => CacheConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CacheConfig::default(),
    };

    if let Some(capacity) = cli.capacity {
        config = config.with_capacity(capacity);
    }
    if cli.purge_by_added_date {
        config = config.with_purge_by_added_date(true);
    }
    if let Some(dir) = &cli.temp_dir {
        config = config.with_temp_dir(dir);
    }

    config.validate()?;
    Ok(config)
}
