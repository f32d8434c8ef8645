//! Shared stubs for unit tests that never reach storage or a live provider.

use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use serde_json::Map;
use sqlx::PgPool;

use crate::{BoxChatStream, BoxFuture, ChatProvider, EmbeddingProvider, Providers, QuillService};
use quill_config::{
	ChatProviderConfig, Config, EmbeddingProviderConfig, Postgres, Security, Service, Storage,
};
use quill_providers::chat::{ChatMessage, ToolDefinition};
use quill_storage::db::Db;

pub(crate) struct CountingEmbedding(pub AtomicUsize);
impl CountingEmbedding {
	pub fn calls(&self) -> usize {
		self.0.load(Ordering::SeqCst)
	}
}
impl EmbeddingProvider for CountingEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, quill_providers::Result<Vec<Vec<f32>>>> {
		self.0.fetch_add(1, Ordering::SeqCst);

		let vectors = texts.iter().map(|_| vec![0.; 4]).collect::<Vec<_>>();

		Box::pin(async move { Ok(vectors) })
	}
}

pub(crate) struct NoChat;
impl ChatProvider for NoChat {
	fn stream_chat(
		&self,
		_cfg: &ChatProviderConfig,
		_messages: Vec<ChatMessage>,
		_tools: Vec<ToolDefinition>,
	) -> BoxChatStream {
		Box::pin(futures::stream::empty())
	}
}

// The pool never connects; paths under test must return before storage.
pub(crate) fn offline_service(embedding: Arc<CountingEmbedding>) -> QuillService {
	let cfg = Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
			cors_origin: "*".to_string(),
		},
		storage: Storage {
			postgres: Postgres {
				dsn: "postgres://localhost/unused".to_string(),
				pool_max_conns: 1,
			},
		},
		providers: quill_config::Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://localhost".to_string(),
				api_key: String::new(),
				path: "/v1/embeddings".to_string(),
				model: "test-embedding".to_string(),
				dimensions: 4,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			chat: ChatProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://localhost".to_string(),
				api_key: String::new(),
				path: "/v1/chat/completions".to_string(),
				model: "test-chat".to_string(),
				temperature: 0.2,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		security: Security {
			bind_localhost_only: true,
			user_id_header: "x-user-id".to_string(),
			api_auth_token: None,
		},
	};
	let pool = PgPool::connect_lazy(&cfg.storage.postgres.dsn).expect("Failed to build pool.");

	QuillService::with_providers(cfg, Db { pool }, Providers::new(embedding, Arc::new(NoChat)))
}
