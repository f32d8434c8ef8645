use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BoxFuture, QuillService, Result, embed};
use quill_storage::embeddings;

/// How many chunks a similarity query considers before hits collapse to
/// their parent notes.
pub const TOP_K: u32 = 10;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelevantNote {
	pub note_id: Uuid,
	pub title: String,
	pub body: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: time::OffsetDateTime,
}

/// Retrieval seam for the chat orchestrator.
pub trait NoteSearcher
where
	Self: Send + Sync,
{
	fn find_relevant_notes<'a>(
		&'a self,
		user_id: &'a str,
		query: &'a str,
	) -> BoxFuture<'a, Result<Vec<RelevantNote>>>;
}

impl QuillService {
	/// Embeds `query` and returns the caller's closest notes, best first,
	/// deduplicated by note. An absent caller or a blank query yields an
	/// empty result without touching the provider.
	pub async fn retrieve(&self, user_id: Option<&str>, query: &str) -> Result<Vec<RelevantNote>> {
		let Some(user_id) = crate::normalize_user(user_id) else {
			return Ok(Vec::new());
		};
		let query = query.trim();

		if query.is_empty() {
			return Ok(Vec::new());
		}

		let query_vec =
			embed::embed_single(&self.cfg.providers.embedding, &*self.providers.embedding, query)
				.await?;
		let hits =
			embeddings::similarity_search(&self.db.pool, user_id, &query_vec, TOP_K).await?;
		let rows = embeddings::resolve_chunks_to_notes(&self.db.pool, &hits).await?;

		tracing::debug!(hits = hits.len(), notes = rows.len(), "Retrieved notes for a query.");

		Ok(rows
			.into_iter()
			.map(|row| RelevantNote {
				note_id: row.note_id,
				title: row.title,
				body: row.body,
				created_at: row.created_at,
			})
			.collect())
	}
}

impl NoteSearcher for QuillService {
	fn find_relevant_notes<'a>(
		&'a self,
		user_id: &'a str,
		query: &'a str,
	) -> BoxFuture<'a, Result<Vec<RelevantNote>>> {
		Box::pin(self.retrieve(Some(user_id), query))
	}
}
