use std::{sync::Arc, time::Instant};

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tokio::{
	sync::Semaphore,
	task::JoinSet,
	time::{self as tokio_time, Duration as StdDuration},
};

use revector_config::{ContentProviderConfig, EmbeddingProviderConfig, Queue};
use revector_domain::{SourceTable, content_hash};
use revector_storage::{
	audit, embeddings,
	jobs::{self, ClaimFilter, JobTarget},
	models::EmbeddingJob,
};

use crate::{Providers, Result, RevectorService};

const BASE_BACKOFF_MS: i64 = 500;
const MAX_BACKOFF_MS: i64 = 30_000;
const MAX_ERROR_CHARS: usize = 1_024;

pub const SOURCE_NOT_FOUND: &str = "source_not_found";
pub const EMPTY_CONTENT: &str = "empty_content";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStrategy {
	/// Skip the generator when the fresh content hash already matches the
	/// active embedding.
	#[default]
	Diff,
	Force,
}

#[derive(Debug, Default, Deserialize)]
pub struct DrainRequest {
	#[serde(default)]
	pub organization_id: Option<String>,
	/// Per-call override of the configured claim size.
	#[serde(default)]
	pub batch_size: Option<u32>,
	#[serde(default)]
	pub strategy: DiffStrategy,
	#[serde(default)]
	pub priority_min: Option<i32>,
	#[serde(default)]
	pub priority_max: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct DrainResponse {
	pub processed_count: i64,
	pub skipped_count: i64,
	pub failed_count: i64,
	pub duration_ms: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JobOutcome {
	Processed,
	Skipped,
	Failed,
	/// The claim expired while the task waited for a permit and a sweep
	/// handed the job to another worker. Counted nowhere; the new owner
	/// reports it.
	Lost,
}

#[derive(Debug)]
enum JobError {
	/// Never succeeds on retry. Terminal immediately with a distinguishing
	/// code in `last_error`; the retry budget is untouched.
	Permanent(&'static str),
	Transient(String),
}

/// Everything a spawned job task needs, detached from the service borrow.
struct JobContext {
	pool: PgPool,
	providers: Providers,
	embedding_cfg: EmbeddingProviderConfig,
	content_cfg: ContentProviderConfig,
	queue: Queue,
	strategy: DiffStrategy,
}

/// One drain invocation: reclaim abandoned jobs, claim a batch and process it
/// under bounded concurrency. Safe to run from any number of workers at once;
/// the claim transaction is the only synchronization point.
pub async fn drain(service: &RevectorService, request: DrainRequest) -> Result<DrainResponse> {
	let started = Instant::now();
	let queue = service.cfg.queue.clone();
	let now = OffsetDateTime::now_utc();
	let cutoff = now - Duration::milliseconds(queue.job_timeout_ms as i64);
	let reclaimed = jobs::reclaim_abandoned(&service.db.pool, cutoff, now).await?;

	if reclaimed > 0 {
		tracing::info!(count = reclaimed, "Reclaimed abandoned jobs before drain.");
	}

	let filter = ClaimFilter {
		organization_id: request.organization_id.as_deref(),
		priority_min: request.priority_min,
		priority_max: request.priority_max,
	};
	let batch_size = request.batch_size.unwrap_or(queue.batch_size).max(1) as i64;
	let claimed = jobs::claim_batch(&service.db.pool, &filter, batch_size, now).await?;
	let ctx = Arc::new(JobContext {
		pool: service.db.pool.clone(),
		providers: service.providers.clone(),
		embedding_cfg: service.cfg.providers.embedding.clone(),
		content_cfg: service.cfg.providers.content.clone(),
		queue,
		strategy: request.strategy,
	});
	let semaphore = Arc::new(Semaphore::new(ctx.queue.max_concurrent_jobs as usize));
	let mut join_set = JoinSet::new();

	for job in claimed {
		let ctx = ctx.clone();
		let semaphore = semaphore.clone();

		join_set.spawn(async move {
			let _permit = match semaphore.acquire_owned().await {
				Ok(permit) => permit,
				Err(_) => return JobOutcome::Failed,
			};

			// The claim timestamp is as old as the batch; refresh it so a
			// job that waited behind the permit is not swept mid-flight.
			match jobs::touch_claim(&ctx.pool, job.job_id, OffsetDateTime::now_utc()).await {
				Ok(true) => {},
				Ok(false) => {
					tracing::debug!(
						job_id = %job.job_id,
						"Claim was reclaimed while waiting for a permit; leaving the job to its new owner.",
					);

					return JobOutcome::Lost;
				},
				Err(err) => {
					tracing::warn!(error = %err, job_id = %job.job_id, "Claim refresh failed.");
				},
			}

			process_claimed_job(&ctx, &job).await
		});
	}

	let mut processed_count = 0_i64;
	let mut skipped_count = 0_i64;
	let mut failed_count = 0_i64;

	while let Some(joined) = join_set.join_next().await {
		match joined {
			Ok(JobOutcome::Processed) => processed_count += 1,
			Ok(JobOutcome::Skipped) => skipped_count += 1,
			Ok(JobOutcome::Failed) => failed_count += 1,
			Ok(JobOutcome::Lost) => {},
			Err(err) => {
				// The row stays in `processing`; the next sweep reclaims it.
				failed_count += 1;

				tracing::error!(error = %err, "Drain job task panicked.");
			},
		}
	}

	let duration_ms = started.elapsed().as_millis() as i64;
	let audit_pool = service.db.pool.clone();
	let audit_org = request.organization_id.clone();

	tokio::spawn(async move {
		if let Err(err) = audit::insert_drain_run(
			&audit_pool,
			audit_org.as_deref(),
			processed_count,
			skipped_count,
			failed_count,
			duration_ms,
		)
		.await
		{
			tracing::warn!(error = %err, "Drain audit write failed.");
		}
	});

	tracing::info!(
		processed = processed_count,
		skipped = skipped_count,
		failed = failed_count,
		duration_ms,
		"Drain finished.",
	);

	Ok(DrainResponse { processed_count, skipped_count, failed_count, duration_ms })
}

async fn process_claimed_job(ctx: &JobContext, job: &EmbeddingJob) -> JobOutcome {
	match run_job(ctx, job).await {
		Ok(outcome) => outcome,
		Err(err) => {
			settle_failure(ctx, job, err).await;

			JobOutcome::Failed
		},
	}
}

async fn run_job(ctx: &JobContext, job: &EmbeddingJob) -> Result<JobOutcome, JobError> {
	let source_table: SourceTable =
		job.source_table.parse().map_err(|_| JobError::Permanent(SOURCE_NOT_FOUND))?;
	let document = ctx
		.providers
		.content
		.fetch(&ctx.content_cfg, &job.organization_id, source_table, &job.source_id)
		.await
		.map_err(|err| JobError::Transient(err.to_string()))?;
	let Some(document) = document else {
		return Err(JobError::Permanent(SOURCE_NOT_FOUND));
	};
	let text = document.content.embeddable_text();

	if text.is_empty() {
		return Err(JobError::Permanent(EMPTY_CONTENT));
	}

	let hash = content_hash(&text);
	let target = JobTarget {
		organization_id: &job.organization_id,
		source_table: &job.source_table,
		source_field: &job.source_field,
		source_id: &job.source_id,
	};

	if ctx.strategy == DiffStrategy::Diff {
		let active = embeddings::active_hash(&ctx.pool, target)
			.await
			.map_err(|err| JobError::Transient(err.to_string()))?;

		if active.as_deref() == Some(hash.as_str()) {
			jobs::complete_unchanged(&ctx.pool, job.job_id, OffsetDateTime::now_utc())
				.await
				.map_err(|err| JobError::Transient(err.to_string()))?;

			return Ok(JobOutcome::Skipped);
		}
	}

	let texts = vec![text];
	let vectors = tokio_time::timeout(
		StdDuration::from_millis(ctx.queue.job_timeout_ms),
		ctx.providers.embedding.embed(&ctx.embedding_cfg, &texts),
	)
	.await
	.map_err(|_| JobError::Transient("Embedding call timed out.".to_string()))?
	.map_err(|err| JobError::Transient(err.to_string()))?;
	let Some(vector) = vectors.into_iter().next() else {
		return Err(JobError::Transient("Embedding provider returned no vectors.".to_string()));
	};

	if vector.len() != ctx.embedding_cfg.dimensions as usize {
		return Err(JobError::Transient(format!(
			"Embedding dimension {} does not match configured dimensions {}.",
			vector.len(),
			ctx.embedding_cfg.dimensions
		)));
	}

	jobs::complete_with_embedding(
		&ctx.pool,
		job.job_id,
		target,
		&vector,
		&hash,
		&ctx.embedding_cfg.model,
		OffsetDateTime::now_utc(),
	)
	.await
	.map_err(|err| JobError::Transient(err.to_string()))?;

	Ok(JobOutcome::Processed)
}

async fn settle_failure(ctx: &JobContext, job: &EmbeddingJob, err: JobError) {
	let now = OffsetDateTime::now_utc();
	let result = match err {
		JobError::Permanent(code) =>
			jobs::mark_failed(&ctx.pool, job.job_id, job.attempts, code, now).await,
		JobError::Transient(message) => {
			let attempts = job.attempts.saturating_add(1);
			let error_text = sanitize_error(&message);

			if attempts >= ctx.queue.max_attempts {
				jobs::mark_failed(&ctx.pool, job.job_id, attempts, &error_text, now).await
			} else {
				let available_at = now + backoff_for_attempt(attempts);

				jobs::mark_retry(&ctx.pool, job.job_id, attempts, &error_text, available_at, now)
					.await
			}
		},
	};

	if let Err(err) = result {
		tracing::error!(error = %err, job_id = %job.job_id, "Failed to record job failure.");
	}
}

fn backoff_for_attempt(attempt: i32) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(6);
	let base = BASE_BACKOFF_MS.saturating_mul(1 << exp);
	let capped = base.min(MAX_BACKOFF_MS);

	Duration::milliseconds(capped)
}

fn sanitize_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = match raw.split(sep).next() {
					Some(prefix) => prefix,
					None => raw,
				};

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_ERROR_CHARS {
		out = out.chars().take(MAX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}
