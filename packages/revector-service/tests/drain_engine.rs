use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};

use serde_json::{Map, Value};
use uuid::Uuid;

use revector_config::{
	Config, ContentProviderConfig, EmbeddingProviderConfig, Postgres, Queue, Service, Storage,
};
use revector_domain::{SourceContent, SourceDocument, SourceTable};
use revector_service::{
	BoxFuture, ContentSource, DiffStrategy, DrainRequest, EmbeddingGenerator, EnqueueOutcome,
	EnqueueRequest, Providers, RevectorService, bulk, drain, enqueue, retry, sweep,
};
use revector_storage::db::Db;
use revector_testkit::TestDatabase;

const TEST_DIMENSIONS: u32 = 2;

struct FakeEmbedder {
	calls: AtomicUsize,
	fail: AtomicBool,
}
impl FakeEmbedder {
	fn new() -> Arc<Self> {
		Arc::new(Self { calls: AtomicUsize::new(0), fail: AtomicBool::new(false) })
	}

	fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	fn set_failing(&self, failing: bool) {
		self.fail.store(failing, Ordering::SeqCst);
	}
}
impl EmbeddingGenerator for FakeEmbedder {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(texts.len(), Ordering::SeqCst);

		let failing = self.fail.load(Ordering::SeqCst);
		let vectors: Vec<Vec<f32>> =
			texts.iter().map(|text| vec![text.len() as f32, 1.0_f32]).collect();

		Box::pin(async move {
			if failing {
				return Err(color_eyre::eyre::eyre!("Simulated provider outage."));
			}

			Ok(vectors)
		})
	}
}

struct FakeContent {
	documents: Mutex<HashMap<(SourceTable, String), SourceDocument>>,
}
impl FakeContent {
	fn new() -> Arc<Self> {
		Arc::new(Self { documents: Mutex::new(HashMap::new()) })
	}

	fn put(&self, source_table: SourceTable, document: SourceDocument) {
		self.documents
			.lock()
			.expect("documents lock")
			.insert((source_table, document.source_id.clone()), document);
	}

	fn remove(&self, source_table: SourceTable, source_id: &str) {
		self.documents
			.lock()
			.expect("documents lock")
			.remove(&(source_table, source_id.to_string()));
	}
}
impl ContentSource for FakeContent {
	fn fetch<'a>(
		&'a self,
		_cfg: &'a ContentProviderConfig,
		_organization_id: &'a str,
		source_table: SourceTable,
		source_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Option<SourceDocument>>> {
		let document = self
			.documents
			.lock()
			.expect("documents lock")
			.get(&(source_table, source_id.to_string()))
			.cloned();

		Box::pin(async move { Ok(document) })
	}

	fn list<'a>(
		&'a self,
		_cfg: &'a ContentProviderConfig,
		_organization_id: &'a str,
		source_table: SourceTable,
	) -> BoxFuture<'a, color_eyre::Result<Vec<SourceDocument>>> {
		let documents: Vec<SourceDocument> = self
			.documents
			.lock()
			.expect("documents lock")
			.iter()
			.filter(|((table, _), _)| *table == source_table)
			.map(|(_, document)| document.clone())
			.collect();

		Box::pin(async move { Ok(documents) })
	}
}

fn test_config(dsn: &str, queue: Queue) -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			admin_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage { postgres: Postgres { dsn: dsn.to_string(), pool_max_conns: 8 } },
		providers: revector_config::Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "fake".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "fake-model".to_string(),
				dimensions: TEST_DIMENSIONS,
				timeout_ms: 5_000,
				default_headers: Map::new(),
			},
			content: ContentProviderConfig {
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: None,
				path: "/internal/content".to_string(),
				timeout_ms: 5_000,
				default_headers: Map::new(),
			},
		},
		queue,
	}
}

async fn setup(
	queue: Queue,
) -> (TestDatabase, Arc<RevectorService>, Arc<FakeEmbedder>, Arc<FakeContent>) {
	let base_dsn = revector_testkit::env_dsn().expect("REVECTOR_PG_DSN must be set.");
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = test_config(test_db.dsn(), queue);
	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let embedder = FakeEmbedder::new();
	let content = FakeContent::new();
	let providers = Providers::new(embedder.clone(), content.clone());
	let service = Arc::new(RevectorService::with_providers(cfg, db, providers));

	(test_db, service, embedder, content)
}

fn post(source_id: &str, body: &str) -> SourceDocument {
	SourceDocument {
		source_id: source_id.to_string(),
		content: SourceContent::Posts {
			title: "Title".to_string(),
			body: body.to_string(),
			excerpt: None,
		},
	}
}

fn content_fields(value: Value) -> Map<String, Value> {
	match value {
		Value::Object(map) => map,
		_ => unreachable!(),
	}
}

fn enqueue_request(source_id: &str, body: &str) -> EnqueueRequest {
	EnqueueRequest {
		organization_id: "org-1".to_string(),
		source_table: SourceTable::Posts,
		source_id: source_id.to_string(),
		source_field: None,
		content: Some(content_fields(serde_json::json!({ "title": "Title", "body": body }))),
		priority: None,
	}
}

async fn job_row(service: &RevectorService, job_id: Uuid) -> (String, i32, Option<String>) {
	sqlx::query_as("SELECT status, attempts, last_error FROM embedding_jobs WHERE job_id = $1")
		.bind(job_id)
		.fetch_one(&service.db.pool)
		.await
		.expect("Job row must exist.")
}

async fn release_backoff(service: &RevectorService) {
	sqlx::query("UPDATE embedding_jobs SET available_at = now() WHERE status = 'pending'")
		.execute(&service.db.pool)
		.await
		.expect("Failed to release backoff.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn enqueue_is_idempotent_for_unchanged_content() {
	if revector_testkit::env_dsn().is_none() {
		eprintln!("Skipping enqueue_is_idempotent_for_unchanged_content; set REVECTOR_PG_DSN.");

		return;
	}

	let (test_db, service, _embedder, _content) = setup(Queue::default()).await;
	let first = enqueue::enqueue(&service, enqueue_request("P1", "hello"))
		.await
		.expect("First enqueue must succeed.");

	assert_eq!(first.outcome, EnqueueOutcome::Created);

	let second = enqueue::enqueue(&service, enqueue_request("P1", "hello"))
		.await
		.expect("Second enqueue must succeed.");

	assert_eq!(second.outcome, EnqueueOutcome::Skipped);
	assert_eq!(second.job_id, first.job_id);
	assert_eq!(second.content_hash, first.content_hash);

	let third = enqueue::enqueue(&service, enqueue_request("P1", "changed"))
		.await
		.expect("Third enqueue must succeed.");

	assert_eq!(third.outcome, EnqueueOutcome::Updated);
	assert_eq!(third.job_id, first.job_id, "Changed hash updates the row in place.");

	let count: i64 = sqlx::query_scalar("SELECT count(*) FROM embedding_jobs")
		.fetch_one(&service.db.pool)
		.await
		.expect("Failed to count jobs.");

	assert_eq!(count, 1);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn hello_world_lifecycle_end_to_end() {
	if revector_testkit::env_dsn().is_none() {
		eprintln!("Skipping hello_world_lifecycle_end_to_end; set REVECTOR_PG_DSN.");

		return;
	}

	let (test_db, service, embedder, content) = setup(Queue::default()).await;

	content.put(SourceTable::Posts, post("P1", "hello"));

	let first = enqueue::enqueue(&service, enqueue_request("P1", "hello"))
		.await
		.expect("Enqueue must succeed.");

	assert_eq!(first.outcome, EnqueueOutcome::Created);

	let report = drain::drain(&service, DrainRequest::default())
		.await
		.expect("Drain must succeed.");

	assert_eq!(report.processed_count, 1);
	assert_eq!(report.skipped_count, 0);
	assert_eq!(report.failed_count, 0);
	assert_eq!(embedder.calls(), 1);

	// Saving the identical content again is a no-op end to end.
	let resave = enqueue::enqueue(&service, enqueue_request("P1", "hello"))
		.await
		.expect("Enqueue must succeed.");

	assert_eq!(resave.outcome, EnqueueOutcome::Skipped);
	assert_eq!(resave.job_id, None);

	content.put(SourceTable::Posts, post("P1", "hello world"));

	let changed = enqueue::enqueue(&service, enqueue_request("P1", "hello world"))
		.await
		.expect("Enqueue must succeed.");

	assert_eq!(changed.outcome, EnqueueOutcome::Created);

	let report = drain::drain(&service, DrainRequest::default())
		.await
		.expect("Drain must succeed.");

	assert_eq!(report.processed_count, 1);
	assert_eq!(embedder.calls(), 2);

	let (total, active): (i64, i64) = sqlx::query_as(
		"SELECT count(*), count(*) FILTER (WHERE is_active) FROM embeddings",
	)
	.fetch_one(&service.db.pool)
	.await
	.expect("Failed to count embeddings.");

	assert_eq!(total, 2, "The superseded embedding stays as an inactive row.");
	assert_eq!(active, 1);

	let active_hash: String = sqlx::query_scalar(
		"SELECT content_hash FROM embeddings WHERE is_active",
	)
	.fetch_one(&service.db.pool)
	.await
	.expect("Failed to fetch active hash.");

	assert_eq!(active_hash, changed.content_hash);

	// The audit row is written by a detached task.
	tokio::time::sleep(StdDuration::from_millis(200)).await;

	let runs: i64 = sqlx::query_scalar("SELECT count(*) FROM drain_runs")
		.fetch_one(&service.db.pool)
		.await
		.expect("Failed to count drain runs.");

	assert!(runs >= 2);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn drain_time_diff_skips_already_current_content() {
	if revector_testkit::env_dsn().is_none() {
		eprintln!("Skipping drain_time_diff_skips_already_current_content; set REVECTOR_PG_DSN.");

		return;
	}

	let (test_db, service, embedder, content) = setup(Queue::default()).await;

	content.put(SourceTable::Posts, post("P1", "hello"));
	enqueue::enqueue(&service, enqueue_request("P1", "hello")).await.expect("Enqueue must succeed.");
	drain::drain(&service, DrainRequest::default()).await.expect("Drain must succeed.");
	assert_eq!(embedder.calls(), 1);

	// The record was touched but its embeddable text is unchanged by drain
	// time; the job was enqueued against a stale snapshot.
	enqueue::enqueue(&service, enqueue_request("P1", "stale snapshot"))
		.await
		.expect("Enqueue must succeed.");

	let report = drain::drain(&service, DrainRequest::default())
		.await
		.expect("Drain must succeed.");

	assert_eq!(report.skipped_count, 1);
	assert_eq!(report.processed_count, 0);
	assert_eq!(embedder.calls(), 1, "Diff strategy must not call the generator.");

	// Force re-embeds even when nothing changed.
	enqueue::enqueue(&service, enqueue_request("P1", "stale snapshot"))
		.await
		.expect("Enqueue must succeed.");

	let report = drain::drain(
		&service,
		DrainRequest { strategy: DiffStrategy::Force, ..DrainRequest::default() },
	)
	.await
	.expect("Drain must succeed.");

	assert_eq!(report.processed_count, 1);
	assert_eq!(embedder.calls(), 2);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn transient_failures_retry_up_to_max_attempts() {
	if revector_testkit::env_dsn().is_none() {
		eprintln!("Skipping transient_failures_retry_up_to_max_attempts; set REVECTOR_PG_DSN.");

		return;
	}

	let (test_db, service, embedder, content) = setup(Queue::default()).await;

	content.put(SourceTable::Posts, post("P1", "hello"));
	embedder.set_failing(true);

	let enqueued = enqueue::enqueue(&service, enqueue_request("P1", "hello"))
		.await
		.expect("Enqueue must succeed.");
	let job_id = enqueued.job_id.expect("Job id must be present.");

	for attempt in 1..=3 {
		release_backoff(&service).await;

		let report = drain::drain(&service, DrainRequest::default())
			.await
			.expect("Drain must succeed.");

		assert_eq!(report.failed_count, 1, "Attempt {attempt} must fail.");
	}

	let (status, attempts, last_error) = job_row(&service, job_id).await;

	assert_eq!(status, "failed");
	assert_eq!(attempts, 3);
	assert!(last_error.expect("last_error must be set.").contains("Simulated provider outage"));
	assert_eq!(embedder.calls(), 3, "Exactly max_attempts generator calls.");

	release_backoff(&service).await;

	let report =
		drain::drain(&service, DrainRequest::default()).await.expect("Drain must succeed.");

	assert_eq!(report.failed_count, 0, "Terminal jobs are never reclaimed by drain.");
	assert_eq!(embedder.calls(), 3);

	// Operator retry puts it back in rotation; a healthy provider finishes it.
	embedder.set_failing(false);
	retry::retry(&service, revector_service::RetryRequest { job_id })
		.await
		.expect("Retry must succeed.");

	let report =
		drain::drain(&service, DrainRequest::default()).await.expect("Drain must succeed.");

	assert_eq!(report.processed_count, 1);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn permanent_failures_are_terminal_immediately() {
	if revector_testkit::env_dsn().is_none() {
		eprintln!("Skipping permanent_failures_are_terminal_immediately; set REVECTOR_PG_DSN.");

		return;
	}

	let (test_db, service, embedder, content) = setup(Queue::default()).await;

	// P1 was deleted after enqueue; P2 exists but has no embeddable text.
	let gone = enqueue::enqueue(&service, enqueue_request("P1", "hello"))
		.await
		.expect("Enqueue must succeed.");

	content.remove(SourceTable::Posts, "P1");
	content.put(
		SourceTable::Posts,
		SourceDocument {
			source_id: "P2".to_string(),
			content: SourceContent::Posts {
				title: "  ".to_string(),
				body: String::new(),
				excerpt: None,
			},
		},
	);

	let empty = enqueue::enqueue(&service, enqueue_request("P2", "hello"))
		.await
		.expect("Enqueue must succeed.");
	let report =
		drain::drain(&service, DrainRequest::default()).await.expect("Drain must succeed.");

	assert_eq!(report.failed_count, 2);
	assert_eq!(embedder.calls(), 0);

	let (status, attempts, last_error) =
		job_row(&service, gone.job_id.expect("Job id must be present.")).await;

	assert_eq!(status, "failed");
	assert_eq!(attempts, 0, "Permanent failures leave the retry budget untouched.");
	assert_eq!(last_error.as_deref(), Some("source_not_found"));

	let (status, _, last_error) =
		job_row(&service, empty.job_id.expect("Job id must be present.")).await;

	assert_eq!(status, "failed");
	assert_eq!(last_error.as_deref(), Some("empty_content"));
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn concurrent_drains_claim_disjoint_jobs() {
	if revector_testkit::env_dsn().is_none() {
		eprintln!("Skipping concurrent_drains_claim_disjoint_jobs; set REVECTOR_PG_DSN.");

		return;
	}

	let queue = Queue { batch_size: 5, ..Queue::default() };
	let (test_db, service, embedder, content) = setup(queue).await;

	for index in 0..20 {
		let source_id = format!("P{index}");

		content.put(SourceTable::Posts, post(&source_id, &format!("body {index}")));
		enqueue::enqueue(&service, enqueue_request(&source_id, &format!("body {index}")))
			.await
			.expect("Enqueue must succeed.");
	}

	let mut handles = Vec::new();

	for _ in 0..4 {
		let service = service.clone();

		handles.push(tokio::spawn(async move {
			drain::drain(&service, DrainRequest::default()).await
		}));
	}

	let mut total_processed = 0_i64;

	for handle in handles {
		let report = handle.await.expect("Drain task must not panic.").expect("Drain must succeed.");

		assert!(report.processed_count <= 5);
		assert_eq!(report.failed_count, 0);

		total_processed += report.processed_count;
	}

	assert_eq!(total_processed, 20, "Every job drained exactly once across workers.");
	assert_eq!(embedder.calls(), 20);

	let nonterminal: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM embedding_jobs WHERE status IN ('pending', 'processing')",
	)
	.fetch_one(&service.db.pool)
	.await
	.expect("Failed to count jobs.");

	assert_eq!(nonterminal, 0);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn drain_honors_caller_batch_size() {
	if revector_testkit::env_dsn().is_none() {
		eprintln!("Skipping drain_honors_caller_batch_size; set REVECTOR_PG_DSN.");

		return;
	}

	let (test_db, service, embedder, content) = setup(Queue::default()).await;

	for index in 0..5 {
		let source_id = format!("P{index}");

		content.put(SourceTable::Posts, post(&source_id, &format!("body {index}")));
		enqueue::enqueue(&service, enqueue_request(&source_id, &format!("body {index}")))
			.await
			.expect("Enqueue must succeed.");
	}

	let report = drain::drain(
		&service,
		DrainRequest { batch_size: Some(2), ..DrainRequest::default() },
	)
	.await
	.expect("Drain must succeed.");

	assert_eq!(report.processed_count, 2);
	assert_eq!(embedder.calls(), 2);

	let pending: i64 =
		sqlx::query_scalar("SELECT count(*) FROM embedding_jobs WHERE status = 'pending'")
			.fetch_one(&service.db.pool)
			.await
			.expect("Failed to count jobs.");

	assert_eq!(pending, 3, "The override claims exactly two jobs; the rest wait.");

	// A zero override is clamped, never a stalled no-op drain.
	let report = drain::drain(
		&service,
		DrainRequest { batch_size: Some(0), ..DrainRequest::default() },
	)
	.await
	.expect("Drain must succeed.");

	assert_eq!(report.processed_count, 1);

	// Without an override the configured batch size drains the remainder.
	let report =
		drain::drain(&service, DrainRequest::default()).await.expect("Drain must succeed.");

	assert_eq!(report.processed_count, 2);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn bulk_enqueue_respects_rebuild_threshold() {
	if revector_testkit::env_dsn().is_none() {
		eprintln!("Skipping bulk_enqueue_respects_rebuild_threshold; set REVECTOR_PG_DSN.");

		return;
	}

	let (test_db, service, _embedder, content) = setup(Queue::default()).await;

	for index in 0..10 {
		let source_id = format!("P{index}");

		content.put(SourceTable::Posts, post(&source_id, &format!("body {index}")));
	}

	// Nothing embedded yet, so everything counts as changed: full rebuild.
	let report = bulk::bulk_enqueue(
		&service,
		revector_service::BulkEnqueueRequest {
			organization_id: "org-1".to_string(),
			content_types: vec![SourceTable::Posts],
			priority: None,
		},
	)
	.await
	.expect("Bulk enqueue must succeed.");

	assert!(report.full_rebuild);
	assert_eq!(report.created, 10);
	assert_eq!(report.total, 10);
	drain::drain(&service, DrainRequest::default()).await.expect("Drain must succeed.");

	// Two records change; 20% is below the 60% threshold, so the diff stays
	// surgical.
	content.put(SourceTable::Posts, post("P0", "rewritten"));
	content.put(SourceTable::Posts, post("P1", "also rewritten"));

	let report = bulk::bulk_enqueue(
		&service,
		revector_service::BulkEnqueueRequest {
			organization_id: "org-1".to_string(),
			content_types: vec![SourceTable::Posts],
			priority: None,
		},
	)
	.await
	.expect("Bulk enqueue must succeed.");

	assert!(!report.full_rebuild);
	assert_eq!(report.created, 2);
	assert_eq!(report.skipped, 8);
	assert_eq!(report.total, 10);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set REVECTOR_PG_DSN to run."]
async fn sweep_reclaims_timed_out_claims() {
	if revector_testkit::env_dsn().is_none() {
		eprintln!("Skipping sweep_reclaims_timed_out_claims; set REVECTOR_PG_DSN.");

		return;
	}

	let queue = Queue { job_timeout_ms: 50, ..Queue::default() };
	let (test_db, service, _embedder, content) = setup(queue).await;

	content.put(SourceTable::Posts, post("P1", "hello"));

	let enqueued = enqueue::enqueue(&service, enqueue_request("P1", "hello"))
		.await
		.expect("Enqueue must succeed.");
	let job_id = enqueued.job_id.expect("Job id must be present.");

	// Simulate a worker that claimed the job and died.
	sqlx::query(
		"UPDATE embedding_jobs SET status = 'processing', claimed_at = now() WHERE job_id = $1",
	)
	.bind(job_id)
	.execute(&service.db.pool)
	.await
	.expect("Failed to fake a claim.");
	tokio::time::sleep(StdDuration::from_millis(100)).await;

	let report = sweep::sweep(&service).await.expect("Sweep must succeed.");

	assert_eq!(report.reclaimed_count, 1);

	let (status, _, _) = job_row(&service, job_id).await;

	assert_eq!(status, "pending");
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
