use uuid::Uuid;

use revector_config::Postgres;
use revector_storage::db::Db;
use revector_testkit::TestDatabase;

async fn bootstrap(base_dsn: &str) -> (TestDatabase, Db) {
	let test_db = TestDatabase::new(base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	(test_db, db)
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn queue_tables_exist_after_bootstrap() {
	let Some(base_dsn) = revector_testkit::env_dsn() else {
		eprintln!("Skipping queue_tables_exist_after_bootstrap; set REVECTOR_PG_DSN to run.");

		return;
	};
	let (test_db, db) = bootstrap(&base_dsn).await;

	for table in ["embedding_jobs", "embeddings", "drain_runs"] {
		let count: i64 = sqlx::query_scalar(
			"SELECT count(*) FROM information_schema.tables WHERE table_name = $1",
		)
		.bind(table)
		.fetch_one(&db.pool)
		.await
		.expect("Failed to query schema tables.");

		assert_eq!(count, 1, "Expected table {table} to exist.");
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn schema_bootstrap_is_rerunnable() {
	let Some(base_dsn) = revector_testkit::env_dsn() else {
		eprintln!("Skipping schema_bootstrap_is_rerunnable; set REVECTOR_PG_DSN to run.");

		return;
	};
	let (test_db, db) = bootstrap(&base_dsn).await;

	db.ensure_schema().await.expect("Second bootstrap must succeed.");
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn nonterminal_job_uniqueness_enforced() {
	let Some(base_dsn) = revector_testkit::env_dsn() else {
		eprintln!("Skipping nonterminal_job_uniqueness_enforced; set REVECTOR_PG_DSN to run.");

		return;
	};
	let (test_db, db) = bootstrap(&base_dsn).await;
	let insert = "\
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
VALUES ($1, 'org-1', 'posts', 'content', 'P1', $2, 5, 'abc', 0, now(), now(), now())";

	sqlx::query(insert)
		.bind(Uuid::new_v4())
		.bind("pending")
		.execute(&db.pool)
		.await
		.expect("First pending job must insert.");

	assert!(
		sqlx::query(insert).bind(Uuid::new_v4()).bind("pending").execute(&db.pool).await.is_err(),
		"Second non-terminal job for the same target must violate the partial unique index."
	);

	sqlx::query(insert)
		.bind(Uuid::new_v4())
		.bind("failed")
		.execute(&db.pool)
		.await
		.expect("Terminal rows are exempt from the uniqueness rule.");
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn active_embedding_uniqueness_enforced() {
	let Some(base_dsn) = revector_testkit::env_dsn() else {
		eprintln!("Skipping active_embedding_uniqueness_enforced; set REVECTOR_PG_DSN to run.");

		return;
	};
	let (test_db, db) = bootstrap(&base_dsn).await;
	let insert = "\
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
VALUES ($1, 'org-1', 'posts', 'content', 'P1', $2, 'abc', 'test-model', $3, now(), now())";
	let vector = vec![0.1_f32, 0.2_f32];

	sqlx::query(insert)
		.bind(Uuid::new_v4())
		.bind(&vector)
		.bind(true)
		.execute(&db.pool)
		.await
		.expect("First active embedding must insert.");

	assert!(
		sqlx::query(insert)
			.bind(Uuid::new_v4())
			.bind(&vector)
			.bind(true)
			.execute(&db.pool)
			.await
			.is_err(),
		"Second active embedding for the same key must violate the partial unique index."
	);

	sqlx::query(insert)
		.bind(Uuid::new_v4())
		.bind(&vector)
		.bind(false)
		.execute(&db.pool)
		.await
		.expect("Inactive rows are exempt from the uniqueness rule.");
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
