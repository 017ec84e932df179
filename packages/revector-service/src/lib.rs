pub mod bulk;
pub mod drain;
pub mod enqueue;
pub mod list;
pub mod retry;
pub mod sweep;
pub mod time_serde;

mod error;

pub use error::{Error, Result};

use std::{future::Future, pin::Pin, sync::Arc};

pub use bulk::{BulkEnqueueRequest, BulkEnqueueResponse};
pub use drain::{DiffStrategy, DrainRequest, DrainResponse};
pub use enqueue::{EnqueueOutcome, EnqueueRequest, EnqueueResponse};
pub use list::{
	EmbeddingView, JobView, ListEmbeddingsRequest, ListEmbeddingsResponse, ListJobsRequest,
	ListJobsResponse,
};
pub use retry::{RetryRequest, RetryResponse};
pub use sweep::SweepResponse;

use revector_config::{Config, ContentProviderConfig, EmbeddingProviderConfig};
use revector_domain::{SourceDocument, SourceTable};
use revector_providers::{content, embedding};
use revector_storage::db::Db;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Field of the source record whose text is embedded. Only one field per
/// record is indexed today.
pub const DEFAULT_SOURCE_FIELD: &str = "content";
pub const DEFAULT_PRIORITY: i32 = 5;

pub trait EmbeddingGenerator
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait ContentSource
where
	Self: Send + Sync,
{
	fn fetch<'a>(
		&'a self,
		cfg: &'a ContentProviderConfig,
		organization_id: &'a str,
		source_table: SourceTable,
		source_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Option<SourceDocument>>>;

	fn list<'a>(
		&'a self,
		cfg: &'a ContentProviderConfig,
		organization_id: &'a str,
		source_table: SourceTable,
	) -> BoxFuture<'a, color_eyre::Result<Vec<SourceDocument>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingGenerator>,
	pub content: Arc<dyn ContentSource>,
}

pub struct RevectorService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
}

struct DefaultProviders;

impl EmbeddingGenerator for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl ContentSource for DefaultProviders {
	fn fetch<'a>(
		&'a self,
		cfg: &'a ContentProviderConfig,
		organization_id: &'a str,
		source_table: SourceTable,
		source_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Option<SourceDocument>>> {
		Box::pin(content::fetch(cfg, organization_id, source_table, source_id))
	}

	fn list<'a>(
		&'a self,
		cfg: &'a ContentProviderConfig,
		organization_id: &'a str,
		source_table: SourceTable,
	) -> BoxFuture<'a, color_eyre::Result<Vec<SourceDocument>>> {
		Box::pin(content::list(cfg, organization_id, source_table))
	}
}

impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingGenerator>, content: Arc<dyn ContentSource>) -> Self {
		Self { embedding, content }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);
		Self { embedding: provider.clone(), content: provider }
	}
}

impl RevectorService {
	pub fn new(cfg: Config, db: Db) -> Self {
		Self { cfg, db, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, db: Db, providers: Providers) -> Self {
		Self { cfg, db, providers }
	}
}

pub(crate) fn require_non_empty(value: &str, field: &str) -> Result<()> {
	if value.trim().is_empty() {
		return Err(Error::InvalidRequest { message: format!("{field} must be non-empty.") });
	}

	Ok(())
}
