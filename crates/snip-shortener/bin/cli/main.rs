mod cli;

use crate::cli::{Command, LogFormat, CLI};
use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use snip_generator::RandomGenerator;
use snip_shortener::{DeletionQueue, Shortened, ShortenerService};
use snip_storage::open_store;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    info!(
        storage_backend = %config.storage,
        base_url = %config.base_url,
        "starting snip"
    );

    let store = open_store(config.store_config()?)
        .await
        .context("failed to open storage backend")?;
    let queue = Arc::new(DeletionQueue::new(
        Arc::clone(&store),
        config.queue_settings(),
    ));

    let (stop, stopped) = oneshot::channel::<()>();
    let worker = queue.start(async move {
        tokio::select! {
            _ = stopped => {}
            _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        }
    })?;

    let service = ShortenerService::new(store, RandomGenerator::new(), queue);
    let outcome = run(&config, &service).await;

    let _ = stop.send(());
    let grace = config.shutdown_grace();
    if let Err(err) = worker.join(grace).await {
        error!(error = %err, "deletion queue did not shut down cleanly, forcing exit");
        std::process::exit(1);
    }

    outcome
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: &CLI, service: &ShortenerService<RandomGenerator>) -> anyhow::Result<()> {
    match &config.command {
        Command::Shorten { owner, url } => {
            let shortened = service.shorten(url, owner).await?;
            if let Shortened::Existing(record) = &shortened {
                info!(code = %record.short_code, "url was already shortened");
            }
            println!("{}", shortened.record().short_code.to_url(&config.base_url));
        }
        Command::Batch { owner, items } => {
            let results = service.shorten_batch(items.clone(), owner).await?;
            for result in results {
                println!(
                    "{}\t{}",
                    result.correlation_id,
                    result.record.short_code.to_url(&config.base_url)
                );
            }
        }
        Command::Resolve { code } => {
            let record = service.resolve(code).await?;
            println!("{}", record.original_url);
        }
        Command::List { owner } => {
            print_json(&service.user_urls(owner).await?)?;
        }
        Command::Delete { owner, codes } => {
            service.delete_urls(owner, codes.clone()).await?;
            info!(count = codes.len(), "deletion queued");
        }
        Command::Stats => {
            print_json(&service.internal_stats().await?)?;
        }
        Command::Ping => {
            service.ping().await?;
            println!("ok");
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
