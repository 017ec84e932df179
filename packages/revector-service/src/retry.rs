use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use revector_storage::jobs;

use crate::{Error, Result, RevectorService};

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
	pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RetryResponse {
	pub job_id: Uuid,
}

/// Operator escape hatch: a terminally failed job back to `pending`, attempts
/// preserved.
pub async fn retry(service: &RevectorService, request: RetryRequest) -> Result<RetryResponse> {
	let now = OffsetDateTime::now_utc();

	if jobs::retry_failed(&service.db.pool, request.job_id, now).await? {
		tracing::info!(job_id = %request.job_id, "Retried failed job.");

		return Ok(RetryResponse { job_id: request.job_id });
	}

	match jobs::fetch_job(&service.db.pool, request.job_id).await? {
		None => Err(Error::NotFound { message: format!("Job {} does not exist.", request.job_id) }),
		Some(job) => Err(Error::Conflict {
			message: format!("Job {} is {} and cannot be retried.", request.job_id, job.status),
		}),
	}
}
