use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, QuillService, Result};
use quill_storage::{embeddings, notes};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteNoteRequest {
	pub note_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteNoteResponse {
	pub note_id: Uuid,
}

impl QuillService {
	/// Removes a note and all of its chunks in one transaction; no orphaned
	/// chunk can survive a committed delete.
	pub async fn delete_note(
		&self,
		user_id: Option<&str>,
		req: DeleteNoteRequest,
	) -> Result<DeleteNoteResponse> {
		let user_id = crate::require_user(user_id)?;
		let mut tx = self.db.pool.begin().await?;
		let Some(existing) = notes::fetch_note_for_update(&mut *tx, req.note_id).await? else {
			return Err(Error::NotFound { message: format!("Note {} does not exist.", req.note_id) });
		};

		crate::authorize_owner(&existing.user_id, user_id)?;

		let chunks = embeddings::delete_chunks_for_note(&mut *tx, req.note_id).await?;

		notes::delete_note(&mut *tx, req.note_id).await?;
		tx.commit().await?;

		tracing::info!(note_id = %req.note_id, chunks, "Deleted a note.");

		Ok(DeleteNoteResponse { note_id: req.note_id })
	}
}
