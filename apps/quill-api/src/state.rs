use std::sync::Arc;

use quill_service::QuillService;
use quill_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<QuillService>,
}
impl AppState {
	pub async fn new(config: quill_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.providers.embedding.dimensions).await?;

		let service = QuillService::new(config, db);

		Ok(Self { service: Arc::new(service) })
	}
}
