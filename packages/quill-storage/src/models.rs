use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct NoteRow {
	pub note_id: Uuid,
	pub user_id: String,
	pub title: String,
	pub body: String,
	pub created_at: OffsetDateTime,
}

/// One segment of a note body together with its vector, ready for insertion.
#[derive(Clone, Debug)]
pub struct EmbeddedChunkRow {
	pub content: String,
	pub vec: Vec<f32>,
}

/// A similarity hit; `score` is cosine similarity in `[-1, 1]`.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ChunkHit {
	pub chunk_id: Uuid,
	pub note_id: Uuid,
	pub score: f32,
}
