use std::sync::Arc;

use revector_service::RevectorService;
use revector_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<RevectorService>,
}
impl AppState {
	pub async fn new(config: revector_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let service = RevectorService::new(config, db);

		Ok(Self { service: Arc::new(service) })
	}
}
