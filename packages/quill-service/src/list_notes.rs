use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{QuillService, Result};
use quill_storage::notes;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoteSummary {
	pub note_id: Uuid,
	pub title: String,
	pub body: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: time::OffsetDateTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListNotesResponse {
	pub notes: Vec<NoteSummary>,
}

impl QuillService {
	/// All of the caller's notes, newest first. An absent caller sees an
	/// empty list rather than an error.
	pub async fn list_notes(&self, user_id: Option<&str>) -> Result<ListNotesResponse> {
		let Some(user_id) = crate::normalize_user(user_id) else {
			return Ok(ListNotesResponse { notes: Vec::new() });
		};
		let rows = notes::list_notes_for_user(&self.db.pool, user_id).await?;
		let notes = rows
			.into_iter()
			.map(|row| NoteSummary {
				note_id: row.note_id,
				title: row.title,
				body: row.body,
				created_at: row.created_at,
			})
			.collect();

		Ok(ListNotesResponse { notes })
	}
}
