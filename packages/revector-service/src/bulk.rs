use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use revector_domain::{SourceTable, content_hash};
use revector_storage::{
	embeddings,
	jobs::{self, JobTarget, UpsertOutcome},
};

use crate::{DEFAULT_PRIORITY, DEFAULT_SOURCE_FIELD, Error, Result, RevectorService};

#[derive(Debug, Deserialize)]
pub struct BulkEnqueueRequest {
	pub organization_id: String,
	pub content_types: Vec<SourceTable>,
	#[serde(default)]
	pub priority: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct BulkEnqueueResponse {
	pub created: u64,
	pub updated: u64,
	pub skipped: u64,
	pub total: u64,
	pub full_rebuild: bool,
}

struct BulkEntry {
	source_table: SourceTable,
	source_id: String,
	content_hash: String,
	changed: bool,
}

/// Re-sync an organization: list every record of the requested content types,
/// diff against the active embedding hashes and enqueue either the changed
/// subset or, past the rebuild threshold, the whole set.
pub async fn bulk_enqueue(
	service: &RevectorService,
	request: BulkEnqueueRequest,
) -> Result<BulkEnqueueResponse> {
	crate::require_non_empty(&request.organization_id, "organization_id")?;

	if request.content_types.is_empty() {
		return Err(Error::InvalidRequest {
			message: "content_types must name at least one content type.".to_string(),
		});
	}

	let mut content_types = request.content_types.clone();

	content_types.sort_by_key(SourceTable::as_str);
	content_types.dedup();

	let mut entries = Vec::new();

	for source_table in content_types {
		let documents = service
			.providers
			.content
			.list(&service.cfg.providers.content, &request.organization_id, source_table)
			.await?;
		let active = embeddings::active_hashes(
			&service.db.pool,
			&request.organization_id,
			source_table.as_str(),
			DEFAULT_SOURCE_FIELD,
		)
		.await?;

		for document in documents {
			let hash = content_hash(&document.content.embeddable_text());
			let changed = active.get(&document.source_id) != Some(&hash);

			entries.push(BulkEntry {
				source_table,
				source_id: document.source_id,
				content_hash: hash,
				changed,
			});
		}
	}

	let total = entries.len();
	let changed_count = entries.iter().filter(|entry| entry.changed).count();
	let full_rebuild = decide_full_rebuild(
		changed_count,
		total,
		service.cfg.queue.diff_rebuild_threshold_percent,
	);
	let priority = request.priority.unwrap_or(DEFAULT_PRIORITY);
	let now = OffsetDateTime::now_utc();
	let mut created = 0_u64;
	let mut updated = 0_u64;
	let mut skipped = 0_u64;

	for entry in &entries {
		if !full_rebuild && !entry.changed {
			skipped += 1;

			continue;
		}

		let target = JobTarget {
			organization_id: &request.organization_id,
			source_table: entry.source_table.as_str(),
			source_field: DEFAULT_SOURCE_FIELD,
			source_id: &entry.source_id,
		};

		match jobs::upsert_job(&service.db.pool, target, &entry.content_hash, priority, now).await? {
			UpsertOutcome::Created(_) => created += 1,
			UpsertOutcome::Updated(_) => updated += 1,
		}
	}

	tracing::info!(
		organization_id = %request.organization_id,
		total,
		changed = changed_count,
		full_rebuild,
		created,
		updated,
		skipped,
		"Bulk enqueue finished.",
	);

	Ok(BulkEnqueueResponse { created, updated, skipped, total: total as u64, full_rebuild })
}

/// Full rebuild when the changed fraction reaches the threshold. An empty set
/// never rebuilds.
fn decide_full_rebuild(changed: usize, total: usize, threshold_percent: u32) -> bool {
	total > 0 && changed as u64 * 100 >= threshold_percent as u64 * total as u64
}
