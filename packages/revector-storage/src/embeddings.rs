use std::collections::HashMap;

use sqlx::{PgPool, QueryBuilder};
use time::OffsetDateTime;

use crate::{Result, jobs::JobTarget, models::EmbeddingRow};

const EMBEDDING_COLUMNS: &str = "\
embedding_id, organization_id, source_table, source_field, source_id, vector, content_hash, \
model, is_active, created_at, updated_at";

#[derive(Clone, Debug, Default)]
pub struct EmbeddingListFilter<'a> {
	pub organization_id: Option<&'a str>,
	pub source_table: Option<&'a str>,
	pub is_active: Option<bool>,
	pub updated_after: Option<OffsetDateTime>,
	pub updated_before: Option<OffsetDateTime>,
	pub limit: i64,
	pub offset: i64,
}

/// Hash of the active embedding for one target, if any. The enqueue diff
/// check pivots on this.
pub async fn active_hash(pool: &PgPool, target: JobTarget<'_>) -> Result<Option<String>> {
	let hash: Option<(String,)> = sqlx::query_as(
		"\
SELECT content_hash
FROM embeddings
WHERE organization_id = $1
	AND source_table = $2
	AND source_field = $3
	AND source_id = $4
	AND is_active",
	)
	.bind(target.organization_id)
	.bind(target.source_table)
	.bind(target.source_field)
	.bind(target.source_id)
	.fetch_optional(pool)
	.await?;

	Ok(hash.map(|(hash,)| hash))
}

/// All active hashes for one organization and content type, keyed by
/// source id. One round trip for the bulk diff instead of one per record.
pub async fn active_hashes(
	pool: &PgPool,
	organization_id: &str,
	source_table: &str,
	source_field: &str,
) -> Result<HashMap<String, String>> {
	let rows: Vec<(String, String)> = sqlx::query_as(
		"\
SELECT source_id, content_hash
FROM embeddings
WHERE organization_id = $1 AND source_table = $2 AND source_field = $3 AND is_active",
	)
	.bind(organization_id)
	.bind(source_table)
	.bind(source_field)
	.fetch_all(pool)
	.await?;

	Ok(rows.into_iter().collect())
}

pub async fn fetch_active(pool: &PgPool, target: JobTarget<'_>) -> Result<Option<EmbeddingRow>> {
	let row = sqlx::query_as(&format!(
		"\
SELECT {EMBEDDING_COLUMNS}
FROM embeddings
WHERE organization_id = $1
	AND source_table = $2
	AND source_field = $3
	AND source_id = $4
	AND is_active",
	))
	.bind(target.organization_id)
	.bind(target.source_table)
	.bind(target.source_field)
	.bind(target.source_id)
	.fetch_optional(pool)
	.await?;

	Ok(row)
}

pub async fn list_embeddings(
	pool: &PgPool,
	filter: &EmbeddingListFilter<'_>,
) -> Result<Vec<EmbeddingRow>> {
	let mut builder =
		QueryBuilder::new(format!("SELECT {EMBEDDING_COLUMNS} FROM embeddings WHERE TRUE"));

	if let Some(organization_id) = filter.organization_id {
		builder.push(" AND organization_id = ");
		builder.push_bind(organization_id);
	}
	if let Some(source_table) = filter.source_table {
		builder.push(" AND source_table = ");
		builder.push_bind(source_table);
	}
	if let Some(is_active) = filter.is_active {
		builder.push(" AND is_active = ");
		builder.push_bind(is_active);
	}
	if let Some(updated_after) = filter.updated_after {
		builder.push(" AND updated_at >= ");
		builder.push_bind(updated_after);
	}
	if let Some(updated_before) = filter.updated_before {
		builder.push(" AND updated_at <= ");
		builder.push_bind(updated_before);
	}

	builder.push(" ORDER BY updated_at DESC LIMIT ");
	builder.push_bind(filter.limit);
	builder.push(" OFFSET ");
	builder.push_bind(filter.offset);

	let rows = builder.build_query_as().fetch_all(pool).await?;

	Ok(rows)
}
