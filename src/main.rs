use alertsweep::models::{AppError, Config, DedupeError, EligibilityFilter};
use alertsweep::services::{open_store, DedupeOptions, Deduplicator, Store, WebhookNotifier};
use log::*;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load_from_toml(&path),
        None => Config::load(),
    }
    .map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    let store = open_store(&config)?;
    let filter = config.eligibility_filter();

    let notifiers: Vec<WebhookNotifier> = config
        .webhooks()
        .iter()
        .map(|entry| WebhookNotifier::new(entry.url.clone(), entry.name.clone()))
        .collect();

    info!(
        "starting alert cleanup - store={}, statuses={:?}, key={:?}, dry_run={}, run_once={}, webhooks={}",
        config.storage_type(),
        filter.statuses(),
        config.schema.key_fields,
        config.dry_run(),
        config.run_once(),
        notifiers.len()
    );

    loop {
        let options = DedupeOptions::with_budget(config.dry_run(), config.deadline());

        match run_pass(&store, &filter, &options, &notifiers).await {
            Ok(()) => {
                if config.run_once() {
                    info!("RUN_ONCE mode: exiting after first pass");
                    break;
                }
            }
            Err(e) => {
                error!("cleanup pass failed: {}", e);
                if config.run_once() {
                    return Err(Box::<dyn std::error::Error>::from(AppError(e.to_string())));
                }
            }
        }

        let jitter_secs = u64::from(rand::random::<u8>() % 11); // 0..10
        info!(
            "next pass in {} minutes (+{jitter_secs}s)",
            config.interval_minutes()
        );
        sleep(config.interval().saturating_add(Duration::from_secs(jitter_secs))).await;
    }

    Ok(())
}

async fn run_pass(
    store: &Store,
    filter: &EligibilityFilter,
    options: &DedupeOptions,
    notifiers: &[WebhookNotifier],
) -> Result<(), DedupeError> {
    match Deduplicator::new(store, filter).run(options).await {
        Ok(report) => {
            println!("{}", report.render());
            for notifier in notifiers {
                if let Err(e) = notifier.notify_report(&report).await {
                    warn!("failed to send cleanup report: {e}");
                }
            }
            Ok(())
        }
        Err(e) => {
            let report = match &e {
                DedupeError::PartialDeleteFailure { report, .. } => Some(report.as_ref()),
                _ => None,
            };
            if let Some(report) = report {
                println!("{}", report.render());
            }
            for notifier in notifiers {
                if let Err(notify_err) = notifier.notify_failure(&e.to_string(), report).await {
                    warn!("failed to send failure notice: {notify_err}");
                }
            }
            Err(e)
        }
    }
}
