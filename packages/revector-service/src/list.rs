use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use revector_storage::{
	embeddings::{self, EmbeddingListFilter},
	jobs::{self, JobListFilter},
	models::{EmbeddingJob, EmbeddingRow, JobStatus},
};

use crate::{Result, RevectorService};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsRequest {
	#[serde(default)]
	pub organization_id: Option<String>,
	#[serde(default)]
	pub source_table: Option<String>,
	#[serde(default)]
	pub status: Option<JobStatus>,
	#[serde(default)]
	pub priority_min: Option<i32>,
	#[serde(default)]
	pub priority_max: Option<i32>,
	#[serde(default, with = "crate::time_serde::option")]
	pub created_after: Option<OffsetDateTime>,
	#[serde(default, with = "crate::time_serde::option")]
	pub created_before: Option<OffsetDateTime>,
	#[serde(default)]
	pub limit: Option<i64>,
	#[serde(default)]
	pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct JobView {
	pub job_id: Uuid,
	pub organization_id: String,
	pub source_table: String,
	pub source_field: String,
	pub source_id: String,
	pub status: String,
	pub priority: i32,
	pub content_hash: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	#[serde(with = "crate::time_serde")]
	pub available_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub claimed_at: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
	pub items: Vec<JobView>,
	pub limit: i64,
	pub offset: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListEmbeddingsRequest {
	#[serde(default)]
	pub organization_id: Option<String>,
	#[serde(default)]
	pub source_table: Option<String>,
	#[serde(default)]
	pub is_active: Option<bool>,
	#[serde(default, with = "crate::time_serde::option")]
	pub updated_after: Option<OffsetDateTime>,
	#[serde(default, with = "crate::time_serde::option")]
	pub updated_before: Option<OffsetDateTime>,
	#[serde(default)]
	pub limit: Option<i64>,
	#[serde(default)]
	pub offset: Option<i64>,
}

/// Read-side projection of an embedding row. The raw vector stays out of list
/// responses; only its dimension count is reported.
#[derive(Debug, Serialize)]
pub struct EmbeddingView {
	pub embedding_id: Uuid,
	pub organization_id: String,
	pub source_table: String,
	pub source_field: String,
	pub source_id: String,
	pub dimensions: usize,
	pub content_hash: String,
	pub model: String,
	pub is_active: bool,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct ListEmbeddingsResponse {
	pub items: Vec<EmbeddingView>,
	pub limit: i64,
	pub offset: i64,
}

pub async fn list_jobs(
	service: &RevectorService,
	request: ListJobsRequest,
) -> Result<ListJobsResponse> {
	let limit = clamp_limit(request.limit);
	let offset = request.offset.unwrap_or(0).max(0);
	let filter = JobListFilter {
		organization_id: request.organization_id.as_deref(),
		source_table: request.source_table.as_deref(),
		status: request.status,
		priority_min: request.priority_min,
		priority_max: request.priority_max,
		created_after: request.created_after,
		created_before: request.created_before,
		limit,
		offset,
	};
	let items =
		jobs::list_jobs(&service.db.pool, &filter).await?.into_iter().map(job_view).collect();

	Ok(ListJobsResponse { items, limit, offset })
}

pub async fn list_embeddings(
	service: &RevectorService,
	request: ListEmbeddingsRequest,
) -> Result<ListEmbeddingsResponse> {
	let limit = clamp_limit(request.limit);
	let offset = request.offset.unwrap_or(0).max(0);
	let filter = EmbeddingListFilter {
		organization_id: request.organization_id.as_deref(),
		source_table: request.source_table.as_deref(),
		is_active: request.is_active,
		updated_after: request.updated_after,
		updated_before: request.updated_before,
		limit,
		offset,
	};
	let items = embeddings::list_embeddings(&service.db.pool, &filter)
		.await?
		.into_iter()
		.map(embedding_view)
		.collect();

	Ok(ListEmbeddingsResponse { items, limit, offset })
}

fn clamp_limit(limit: Option<i64>) -> i64 {
	limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn job_view(job: EmbeddingJob) -> JobView {
	JobView {
		job_id: job.job_id,
		organization_id: job.organization_id,
		source_table: job.source_table,
		source_field: job.source_field,
		source_id: job.source_id,
		status: job.status,
		priority: job.priority,
		content_hash: job.content_hash,
		attempts: job.attempts,
		last_error: job.last_error,
		available_at: job.available_at,
		claimed_at: job.claimed_at,
		created_at: job.created_at,
		updated_at: job.updated_at,
	}
}

fn embedding_view(row: EmbeddingRow) -> EmbeddingView {
	EmbeddingView {
		embedding_id: row.embedding_id,
		organization_id: row.organization_id,
		source_table: row.source_table,
		source_field: row.source_field,
		source_id: row.source_id,
		dimensions: row.vector.len(),
		content_hash: row.content_hash,
		model: row.model,
		is_active: row.is_active,
		created_at: row.created_at,
		updated_at: row.updated_at,
	}
}
