use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use revector_service::{DrainRequest, RevectorService, drain};
use revector_storage::db::Db;

#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

/// Long-running drain loop: one drain pass per poll interval. Any number of
/// worker processes may run against the same database.
pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = revector_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;
	db.ensure_schema().await?;

	let poll_interval = Duration::from_millis(config.queue.poll_interval_ms);
	let service = RevectorService::new(config, db);

	tracing::info!("Drain worker started.");

	loop {
		match drain::drain(&service, DrainRequest::default()).await {
			Ok(report) =>
				if report.processed_count + report.skipped_count + report.failed_count > 0 {
					tracing::info!(
						processed = report.processed_count,
						skipped = report.skipped_count,
						failed = report.failed_count,
						duration_ms = report.duration_ms,
						"Drain pass finished.",
					);
				},
			Err(err) => {
				tracing::error!(error = %err, "Drain pass failed.");
			},
		}

		tokio::time::sleep(poll_interval).await;
	}
}
