use sqlx::{PgPool, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{EmbeddingJob, JobStatus},
};

const JOB_COLUMNS: &str = "\
job_id, organization_id, source_table, source_field, source_id, status, priority, content_hash, \
attempts, last_error, available_at, claimed_at, created_at, updated_at";

/// Logical target of a job: one embeddable field of one record.
#[derive(Clone, Copy, Debug)]
pub struct JobTarget<'a> {
	pub organization_id: &'a str,
	pub source_table: &'a str,
	pub source_field: &'a str,
	pub source_id: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
	Created(Uuid),
	Updated(Uuid),
}
impl UpsertOutcome {
	pub fn job_id(&self) -> Uuid {
		match self {
			Self::Created(job_id) | Self::Updated(job_id) => *job_id,
		}
	}
}

#[derive(Clone, Debug, Default)]
pub struct ClaimFilter<'a> {
	pub organization_id: Option<&'a str>,
	pub priority_min: Option<i32>,
	pub priority_max: Option<i32>,
}

#[derive(Clone, Debug, Default)]
pub struct JobListFilter<'a> {
	pub organization_id: Option<&'a str>,
	pub source_table: Option<&'a str>,
	pub status: Option<JobStatus>,
	pub priority_min: Option<i32>,
	pub priority_max: Option<i32>,
	pub created_after: Option<OffsetDateTime>,
	pub created_before: Option<OffsetDateTime>,
	pub limit: i64,
	pub offset: i64,
}

/// Idempotent enqueue. A target that already has a non-terminal job gets that
/// row updated in place (hash refreshed, attempts reset) instead of a
/// duplicate; the partial unique index makes the whole thing one atomic
/// statement.
pub async fn upsert_job(
	pool: &PgPool,
	target: JobTarget<'_>,
	content_hash: &str,
	priority: i32,
	now: OffsetDateTime,
) -> Result<UpsertOutcome> {
	let (job_id, created): (Uuid, bool) = sqlx::query_as(
		"\
INSERT INTO embedding_jobs (
	job_id,
	organization_id,
	source_table,
	source_field,
	source_id,
	status,
	priority,
	content_hash,
	attempts,
	available_at,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, 0, $8, $8, $8)
ON CONFLICT (organization_id, source_table, source_field, source_id)
	WHERE status IN ('pending', 'processing')
DO UPDATE SET
	content_hash = EXCLUDED.content_hash,
	priority = EXCLUDED.priority,
	attempts = 0,
	last_error = NULL,
	available_at = EXCLUDED.available_at,
	updated_at = EXCLUDED.updated_at
RETURNING job_id, (xmax = 0) AS created",
	)
	.bind(Uuid::new_v4())
	.bind(target.organization_id)
	.bind(target.source_table)
	.bind(target.source_field)
	.bind(target.source_id)
	.bind(priority)
	.bind(content_hash)
	.bind(now)
	.fetch_one(pool)
	.await?;

	if created {
		Ok(UpsertOutcome::Created(job_id))
	} else {
		Ok(UpsertOutcome::Updated(job_id))
	}
}

pub async fn find_nonterminal(
	pool: &PgPool,
	target: JobTarget<'_>,
) -> Result<Option<EmbeddingJob>> {
	let job = sqlx::query_as(&format!(
		"\
SELECT {JOB_COLUMNS}
FROM embedding_jobs
WHERE organization_id = $1
	AND source_table = $2
	AND source_field = $3
	AND source_id = $4
	AND status IN ('pending', 'processing')",
	))
	.bind(target.organization_id)
	.bind(target.source_table)
	.bind(target.source_field)
	.bind(target.source_id)
	.fetch_optional(pool)
	.await?;

	Ok(job)
}

pub async fn fetch_job(pool: &PgPool, job_id: Uuid) -> Result<Option<EmbeddingJob>> {
	let job =
		sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM embedding_jobs WHERE job_id = $1"))
			.bind(job_id)
			.fetch_optional(pool)
			.await?;

	Ok(job)
}

/// Claim a drain batch: select eligible pending rows oldest-highest-priority
/// first and flip them to `processing` inside one transaction. SKIP LOCKED
/// keeps concurrent drains from ever claiming the same row.
pub async fn claim_batch(
	pool: &PgPool,
	filter: &ClaimFilter<'_>,
	batch_size: i64,
	now: OffsetDateTime,
) -> Result<Vec<EmbeddingJob>> {
	let mut tx = pool.begin().await?;
	let mut builder = QueryBuilder::new(format!(
		"SELECT {JOB_COLUMNS} FROM embedding_jobs WHERE status = 'pending' AND available_at <= ",
	));

	builder.push_bind(now);

	if let Some(organization_id) = filter.organization_id {
		builder.push(" AND organization_id = ");
		builder.push_bind(organization_id);
	}
	if let Some(priority_min) = filter.priority_min {
		builder.push(" AND priority >= ");
		builder.push_bind(priority_min);
	}
	if let Some(priority_max) = filter.priority_max {
		builder.push(" AND priority <= ");
		builder.push_bind(priority_max);
	}

	builder.push(" ORDER BY priority DESC, created_at ASC LIMIT ");
	builder.push_bind(batch_size);
	builder.push(" FOR UPDATE SKIP LOCKED");

	let mut jobs: Vec<EmbeddingJob> = builder.build_query_as().fetch_all(&mut *tx).await?;

	if !jobs.is_empty() {
		let ids: Vec<Uuid> = jobs.iter().map(|job| job.job_id).collect();

		sqlx::query(
			"\
UPDATE embedding_jobs
SET status = 'processing', claimed_at = $1, updated_at = $1
WHERE job_id = ANY($2)",
		)
		.bind(now)
		.bind(&ids)
		.execute(&mut *tx)
		.await?;
	}

	tx.commit().await?;

	for job in &mut jobs {
		job.status = JobStatus::Processing.as_str().to_string();
		job.claimed_at = Some(now);
		job.updated_at = now;
	}

	Ok(jobs)
}

/// Refresh the claim timestamp when a job's task actually starts running,
/// after any wait behind the concurrency limit. Returns false when the row is
/// no longer `processing`, meaning a sweep already took the claim back.
pub async fn touch_claim(pool: &PgPool, job_id: Uuid, now: OffsetDateTime) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE embedding_jobs
SET claimed_at = $1, updated_at = $1
WHERE job_id = $2 AND status = 'processing'",
	)
	.bind(now)
	.bind(job_id)
	.execute(pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Success path: supersede the active embedding and mark the job completed in
/// the same transaction.
#[allow(clippy::too_many_arguments)]
pub async fn complete_with_embedding(
	pool: &PgPool,
	job_id: Uuid,
	target: JobTarget<'_>,
	vector: &[f32],
	content_hash: &str,
	model: &str,
	now: OffsetDateTime,
) -> Result<()> {
	let mut tx = pool.begin().await?;

	sqlx::query(
		"\
UPDATE embeddings
SET is_active = FALSE, updated_at = $1
WHERE organization_id = $2
	AND source_table = $3
	AND source_field = $4
	AND source_id = $5
	AND is_active",
	)
	.bind(now)
	.bind(target.organization_id)
	.bind(target.source_table)
	.bind(target.source_field)
	.bind(target.source_id)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"\
INSERT INTO embeddings (
	embedding_id,
	organization_id,
	source_table,
	source_field,
	source_id,
	vector,
	content_hash,
	model,
	is_active,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9, $9)",
	)
	.bind(Uuid::new_v4())
	.bind(target.organization_id)
	.bind(target.source_table)
	.bind(target.source_field)
	.bind(target.source_id)
	.bind(vector)
	.bind(content_hash)
	.bind(model)
	.bind(now)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"\
UPDATE embedding_jobs
SET status = 'completed', last_error = NULL, updated_at = $1
WHERE job_id = $2",
	)
	.bind(now)
	.bind(job_id)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(())
}

/// Drain found the fresh content hash already embedded; close the job without
/// touching the embedding.
pub async fn complete_unchanged(pool: &PgPool, job_id: Uuid, now: OffsetDateTime) -> Result<()> {
	sqlx::query(
		"\
UPDATE embedding_jobs
SET status = 'completed', last_error = NULL, updated_at = $1
WHERE job_id = $2",
	)
	.bind(now)
	.bind(job_id)
	.execute(pool)
	.await?;

	Ok(())
}

/// Transient failure below the attempt cap: back to pending, eligible again
/// at `available_at`.
pub async fn mark_retry(
	pool: &PgPool,
	job_id: Uuid,
	attempts: i32,
	last_error: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE embedding_jobs
SET status = 'pending',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	claimed_at = NULL,
	updated_at = $4
WHERE job_id = $5",
	)
	.bind(attempts)
	.bind(last_error)
	.bind(available_at)
	.bind(now)
	.bind(job_id)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn mark_failed(
	pool: &PgPool,
	job_id: Uuid,
	attempts: i32,
	last_error: &str,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE embedding_jobs
SET status = 'failed',
	attempts = $1,
	last_error = $2,
	claimed_at = NULL,
	updated_at = $3
WHERE job_id = $4",
	)
	.bind(attempts)
	.bind(last_error)
	.bind(now)
	.bind(job_id)
	.execute(pool)
	.await?;

	Ok(())
}

/// Operator-triggered retry: failed back to pending, attempts preserved.
/// Returns false when the job is not in `failed`.
pub async fn retry_failed(pool: &PgPool, job_id: Uuid, now: OffsetDateTime) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE embedding_jobs
SET status = 'pending', available_at = $1, claimed_at = NULL, updated_at = $1
WHERE job_id = $2 AND status = 'failed'",
	)
	.bind(now)
	.bind(job_id)
	.execute(pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Sweep for dead workers: `processing` rows claimed before the cutoff go
/// back to pending so no job is lost permanently.
pub async fn reclaim_abandoned(
	pool: &PgPool,
	cutoff: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE embedding_jobs
SET status = 'pending', claimed_at = NULL, updated_at = $1
WHERE status = 'processing' AND claimed_at < $2",
	)
	.bind(now)
	.bind(cutoff)
	.execute(pool)
	.await?;

	Ok(result.rows_affected())
}

pub async fn list_jobs(pool: &PgPool, filter: &JobListFilter<'_>) -> Result<Vec<EmbeddingJob>> {
	let mut builder =
		QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM embedding_jobs WHERE TRUE"));

	if let Some(organization_id) = filter.organization_id {
		builder.push(" AND organization_id = ");
		builder.push_bind(organization_id);
	}
	if let Some(source_table) = filter.source_table {
		builder.push(" AND source_table = ");
		builder.push_bind(source_table);
	}
	if let Some(status) = filter.status {
		builder.push(" AND status = ");
		builder.push_bind(status.as_str());
	}
	if let Some(priority_min) = filter.priority_min {
		builder.push(" AND priority >= ");
		builder.push_bind(priority_min);
	}
	if let Some(priority_max) = filter.priority_max {
		builder.push(" AND priority <= ");
		builder.push_bind(priority_max);
	}
	if let Some(created_after) = filter.created_after {
		builder.push(" AND created_at >= ");
		builder.push_bind(created_after);
	}
	if let Some(created_before) = filter.created_before {
		builder.push(" AND created_at <= ");
		builder.push_bind(created_before);
	}

	builder.push(" ORDER BY created_at DESC LIMIT ");
	builder.push_bind(filter.limit);
	builder.push(" OFFSET ");
	builder.push_bind(filter.offset);

	let jobs = builder.build_query_as().fetch_all(pool).await?;

	Ok(jobs)
}
