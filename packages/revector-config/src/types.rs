use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub queue: Queue,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub content: ContentProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ContentProviderConfig {
	pub api_base: String,
	pub api_key: Option<String>,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Drain tunables. Every field falls back to a hardcoded default so a missing
/// or partial `[queue]` section never blocks startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Queue {
	pub batch_size: u32,
	pub max_concurrent_jobs: u32,
	pub job_timeout_ms: u64,
	pub max_attempts: i32,
	pub diff_rebuild_threshold_percent: u32,
	pub poll_interval_ms: u64,
}
impl Default for Queue {
	fn default() -> Self {
		Self {
			batch_size: 25,
			max_concurrent_jobs: 4,
			job_timeout_ms: 30_000,
			max_attempts: 3,
			diff_rebuild_threshold_percent: 60,
			poll_interval_ms: 500,
		}
	}
}
