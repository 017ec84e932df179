use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use revector_domain::{SourceContent, SourceTable, content_hash};
use revector_storage::{
	embeddings,
	jobs::{self, JobTarget, UpsertOutcome},
};

use crate::{DEFAULT_PRIORITY, DEFAULT_SOURCE_FIELD, Error, Result, RevectorService};

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
	pub organization_id: String,
	pub source_table: SourceTable,
	pub source_id: String,
	#[serde(default)]
	pub source_field: Option<String>,
	/// Embeddable fields of the record. Fetched from the content source when
	/// absent.
	#[serde(default)]
	pub content: Option<Map<String, Value>>,
	#[serde(default)]
	pub priority: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
	Created,
	Updated,
	Skipped,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
	pub outcome: EnqueueOutcome,
	pub job_id: Option<Uuid>,
	pub content_hash: String,
}

/// Idempotent save hook. Hashes the record's embeddable text and decides
/// whether a (re)embedding job is warranted; never touches the embedding
/// generator.
pub async fn enqueue(service: &RevectorService, request: EnqueueRequest) -> Result<EnqueueResponse> {
	crate::require_non_empty(&request.organization_id, "organization_id")?;
	crate::require_non_empty(&request.source_id, "source_id")?;

	if let Some(source_field) = request.source_field.as_deref() {
		crate::require_non_empty(source_field, "source_field")?;
	}

	let content = match request.content {
		Some(fields) => parse_content(request.source_table, fields)?,
		None => {
			let document = service
				.providers
				.content
				.fetch(
					&service.cfg.providers.content,
					&request.organization_id,
					request.source_table,
					&request.source_id,
				)
				.await?;
			let Some(document) = document else {
				return Err(Error::NotFound {
					message: format!(
						"Source record {}/{} does not exist.",
						request.source_table, request.source_id
					),
				});
			};

			document.content
		},
	};
	let hash = content_hash(&content.embeddable_text());
	let source_table = request.source_table.as_str();
	let source_field = request.source_field.as_deref().unwrap_or(DEFAULT_SOURCE_FIELD);
	let target = JobTarget {
		organization_id: &request.organization_id,
		source_table,
		source_field,
		source_id: &request.source_id,
	};
	let priority = request.priority.unwrap_or(DEFAULT_PRIORITY);
	let now = OffsetDateTime::now_utc();

	if let Some(job) = jobs::find_nonterminal(&service.db.pool, target).await? {
		if job.content_hash == hash {
			return Ok(EnqueueResponse {
				outcome: EnqueueOutcome::Skipped,
				job_id: Some(job.job_id),
				content_hash: hash,
			});
		}
	} else if embeddings::active_hash(&service.db.pool, target).await?.as_deref()
		== Some(hash.as_str())
	{
		return Ok(EnqueueResponse {
			outcome: EnqueueOutcome::Skipped,
			job_id: None,
			content_hash: hash,
		});
	}

	let outcome = jobs::upsert_job(&service.db.pool, target, &hash, priority, now).await?;
	let (outcome, job_id) = match outcome {
		UpsertOutcome::Created(job_id) => (EnqueueOutcome::Created, job_id),
		UpsertOutcome::Updated(job_id) => (EnqueueOutcome::Updated, job_id),
	};

	tracing::debug!(
		job_id = %job_id,
		organization_id = %request.organization_id,
		source_table,
		source_id = %request.source_id,
		?outcome,
		"Enqueued embedding job.",
	);

	Ok(EnqueueResponse { outcome, job_id: Some(job_id), content_hash: hash })
}

/// The wire shape carries `source_table` once at the top level; reattach it
/// as the tag before handing the fields to the tagged union.
fn parse_content(source_table: SourceTable, mut fields: Map<String, Value>) -> Result<SourceContent> {
	fields.insert("source_table".to_string(), Value::String(source_table.as_str().to_string()));

	serde_json::from_value(Value::Object(fields))
		.map_err(|err| Error::InvalidRequest { message: format!("Invalid content payload: {err}.") })
}
