//! Note lifecycle, retrieval, and chat orchestration over the storage and
//! provider layers.
//!
//! Every operation is scoped to the calling user. Reads with no caller
//! degrade to empty results; writes without a caller are rejected.

pub mod chat;
pub mod create_note;
pub mod delete_note;
pub mod embed;
pub mod list_notes;
pub mod retrieve;
pub mod time_serde;
pub mod update_note;

mod error;
#[cfg(test)]
mod testutil;

pub use error::{Error, Result};

use std::{future::Future, pin::Pin, sync::Arc};

use futures::Stream;

pub use chat::{ChatEvent, ChatRequest, ChatTurn};
pub use create_note::{CreateNoteRequest, CreateNoteResponse};
pub use delete_note::{DeleteNoteRequest, DeleteNoteResponse};
pub use list_notes::{ListNotesResponse, NoteSummary};
pub use retrieve::{NoteSearcher, RelevantNote};
pub use update_note::{UpdateNoteRequest, UpdateNoteResponse};

use quill_chunking::{BlankLineSegmenter, Segmenter};
use quill_config::{ChatProviderConfig, Config, EmbeddingProviderConfig};
use quill_providers::chat::{ChatDelta, ChatMessage, ToolDefinition};
use quill_storage::db::Db;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type BoxChatStream =
	Pin<Box<dyn Stream<Item = quill_providers::Result<ChatDelta>> + Send + 'static>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, quill_providers::Result<Vec<Vec<f32>>>>;
}

pub trait ChatProvider
where
	Self: Send + Sync,
{
	fn stream_chat(
		&self,
		cfg: &ChatProviderConfig,
		messages: Vec<ChatMessage>,
		tools: Vec<ToolDefinition>,
	) -> BoxChatStream;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub chat: Arc<dyn ChatProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, chat: Arc<dyn ChatProvider>) -> Self {
		Self { embedding, chat }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), chat: provider }
	}
}

pub struct QuillService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
	pub segmenter: Arc<dyn Segmenter>,
}
impl QuillService {
	pub fn new(cfg: Config, db: Db) -> Self {
		Self { cfg, db, providers: Providers::default(), segmenter: Arc::new(BlankLineSegmenter) }
	}

	pub fn with_providers(cfg: Config, db: Db, providers: Providers) -> Self {
		Self { cfg, db, providers, segmenter: Arc::new(BlankLineSegmenter) }
	}
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, quill_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(quill_providers::embedding::embed(cfg, texts))
	}
}

impl ChatProvider for DefaultProviders {
	fn stream_chat(
		&self,
		cfg: &ChatProviderConfig,
		messages: Vec<ChatMessage>,
		tools: Vec<ToolDefinition>,
	) -> BoxChatStream {
		Box::pin(quill_providers::chat::stream_chat(cfg, messages, tools))
	}
}

/// Normalizes an optional caller identity for a write path.
pub(crate) fn require_user(user_id: Option<&str>) -> Result<&str> {
	match user_id.map(str::trim) {
		Some(user_id) if !user_id.is_empty() => Ok(user_id),
		_ => Err(Error::Unauthenticated { message: "A caller identity is required.".to_string() }),
	}
}

/// Normalizes an optional caller identity for a read path; absent callers see
/// nothing rather than an error.
pub(crate) fn normalize_user(user_id: Option<&str>) -> Option<&str> {
	user_id.map(str::trim).filter(|user_id| !user_id.is_empty())
}

pub(crate) fn authorize_owner(owner_id: &str, user_id: &str) -> Result<()> {
	if owner_id != user_id {
		return Err(Error::Forbidden {
			message: "The note belongs to a different user.".to_string(),
		});
	}

	Ok(())
}
