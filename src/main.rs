use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use price_crawler::settings::Settings;
use price_crawler::{crawl_async, logging, store};

/// Crawl marketplace product pages through a proxy pool and store the results.
#[derive(Parser, Debug)]
#[command(name = "price-crawler", version, about)]
struct Args {
    /// YAML file with the `urls` list
    #[arg(long, default_value = "url.yaml")]
    urls: PathBuf,

    /// YAML file with crawler settings
    #[arg(long, default_value = "settings.yaml")]
    settings: PathBuf,

    /// Print the status response JSON instead of a summary
    #[arg(long)]
    status_json: bool,

    /// Skip writing records
    #[arg(long)]
    no_store: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(&args.urls, &args.settings).with_context(|| {
        format!(
            "failed to load settings from {} and {}",
            args.urls.display(),
            args.settings.display()
        )
    })?;
    let log_guard = logging::init(&settings.log).context("failed to initialize logging")?;

    let report = crawl_async(settings.urls.clone(), &settings)
        .await
        .context("crawl failed")?;

    if !args.no_store && !report.records.is_empty() {
        store::store_records(&report.records, &settings)
            .await
            .context("failed to store records")?;
    }

    if args.status_json {
        println!("{}", serde_json::to_string_pretty(&report.status_response())?);
    } else {
        println!(
            "records: {}  failed: {}  unprocessed: {}  terminated early: {}  elapsed: {:.1}s",
            report.records.len(),
            report.failed.len(),
            report.unprocessed.len(),
            report.terminated_early,
            report.elapsed.as_secs_f64()
        );
        for failure in &report.failed {
            println!("  failed {}: {:?}", failure.url, failure.reason);
        }
    }

    if report.terminated_early {
        drop(log_guard);
        std::process::exit(2);
    }
    drop(log_guard);
    Ok(())
}
