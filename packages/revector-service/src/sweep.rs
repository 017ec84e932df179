use serde::Serialize;
use time::{Duration, OffsetDateTime};

use revector_storage::jobs;

use crate::{Result, RevectorService};

#[derive(Debug, Serialize)]
pub struct SweepResponse {
	pub reclaimed_count: u64,
}

/// Standalone timeout reclaim: `processing` rows whose claim is older than the
/// job timeout go back to `pending`. The drain path runs the same reclaim
/// before claiming.
pub async fn sweep(service: &RevectorService) -> Result<SweepResponse> {
	let now = OffsetDateTime::now_utc();
	let cutoff = now - Duration::milliseconds(service.cfg.queue.job_timeout_ms as i64);
	let reclaimed_count = jobs::reclaim_abandoned(&service.db.pool, cutoff, now).await?;

	if reclaimed_count > 0 {
		tracing::info!(count = reclaimed_count, "Reclaimed abandoned jobs.");
	}

	Ok(SweepResponse { reclaimed_count })
}
