use sqlx::PgPool;
use uuid::Uuid;

use crate::Result;

/// Insert one drain audit row. Callers spawn this fire-and-forget; a failed
/// write costs an audit row, never a drain.
pub async fn insert_drain_run(
	pool: &PgPool,
	organization_id: Option<&str>,
	processed_count: i64,
	skipped_count: i64,
	failed_count: i64,
	duration_ms: i64,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO drain_runs (
	run_id,
	organization_id,
	processed_count,
	skipped_count,
	failed_count,
	duration_ms
)
VALUES ($1, $2, $3, $4, $5, $6)",
	)
	.bind(Uuid::new_v4())
	.bind(organization_id)
	.bind(processed_count)
	.bind(skipped_count)
	.bind(failed_count)
	.bind(duration_ms)
	.execute(pool)
	.await?;

	Ok(())
}
