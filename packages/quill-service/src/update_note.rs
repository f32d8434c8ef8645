use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, QuillService, Result, create_note::validate_note_text, embed};
use quill_storage::{embeddings, notes};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateNoteRequest {
	pub note_id: Uuid,
	pub title: String,
	pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateNoteResponse {
	pub note_id: Uuid,
}

impl QuillService {
	/// Replaces a note's text and its entire chunk set. Concurrent updates
	/// serialize on the row lock; the last committed write wins.
	pub async fn update_note(
		&self,
		user_id: Option<&str>,
		req: UpdateNoteRequest,
	) -> Result<UpdateNoteResponse> {
		let user_id = crate::require_user(user_id)?;

		validate_note_text(&req.title, &req.body)?;

		let chunks = embed::embed_chunks(
			&self.cfg.providers.embedding,
			&*self.providers.embedding,
			&*self.segmenter,
			&req.body,
		)
		.await?;
		let mut tx = self.db.pool.begin().await?;
		let Some(existing) = notes::fetch_note_for_update(&mut *tx, req.note_id).await? else {
			return Err(Error::NotFound { message: format!("Note {} does not exist.", req.note_id) });
		};

		crate::authorize_owner(&existing.user_id, user_id)?;

		// Old chunks go first so the note is never indexed under two bodies.
		embeddings::delete_chunks_for_note(&mut *tx, req.note_id).await?;
		notes::update_note_text(&mut *tx, req.note_id, &req.title, &req.body).await?;
		embeddings::insert_chunks(&mut tx, req.note_id, user_id, &chunks).await?;
		tx.commit().await?;

		tracing::info!(note_id = %req.note_id, chunks = chunks.len(), "Updated a note.");

		Ok(UpdateNoteResponse { note_id: req.note_id })
	}
}
