use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, QuillService, Result, embed};
use quill_storage::{embeddings, models::NoteRow, notes};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateNoteRequest {
	pub title: String,
	pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateNoteResponse {
	pub note_id: Uuid,
}

impl QuillService {
	pub async fn create_note(
		&self,
		user_id: Option<&str>,
		req: CreateNoteRequest,
	) -> Result<CreateNoteResponse> {
		let user_id = crate::require_user(user_id)?;

		validate_note_text(&req.title, &req.body)?;

		// Embedding happens before the transaction opens; provider latency
		// must never hold row locks.
		let chunks = embed::embed_chunks(
			&self.cfg.providers.embedding,
			&*self.providers.embedding,
			&*self.segmenter,
			&req.body,
		)
		.await?;
		let note = NoteRow {
			note_id: Uuid::new_v4(),
			user_id: user_id.to_string(),
			title: req.title,
			body: req.body,
			created_at: OffsetDateTime::now_utc(),
		};
		let mut tx = self.db.pool.begin().await?;

		notes::insert_note(&mut *tx, &note).await?;
		embeddings::insert_chunks(&mut tx, note.note_id, user_id, &chunks).await?;
		tx.commit().await?;

		tracing::info!(note_id = %note.note_id, chunks = chunks.len(), "Created a note.");

		Ok(CreateNoteResponse { note_id: note.note_id })
	}
}

pub(crate) fn validate_note_text(title: &str, body: &str) -> Result<()> {
	if title.trim().is_empty() {
		return Err(Error::InvalidRequest {
			message: "The note title must not be empty.".to_string(),
		});
	}
	if body.trim().is_empty() {
		return Err(Error::InvalidRequest {
			message: "The note body must not be empty.".to_string(),
		});
	}

	Ok(())
}
