//! Vector store adapter over the `note_embeddings` table.
//!
//! Pure persistence: vectors arrive precomputed and are stored via pgvector.
//! Every similarity query is scoped to one owner; cross-user rows are never
//! candidates.

use std::collections::{HashMap, HashSet};

use sqlx::{PgExecutor, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{ChunkHit, EmbeddedChunkRow, NoteRow},
};

pub async fn insert_chunks(
	tx: &mut Transaction<'_, Postgres>,
	note_id: Uuid,
	user_id: &str,
	chunks: &[EmbeddedChunkRow],
) -> Result<()> {
	let now = OffsetDateTime::now_utc();

	for chunk in chunks {
		sqlx::query(
			"\
INSERT INTO note_embeddings (chunk_id, note_id, user_id, content, vec, created_at)
VALUES ($1, $2, $3, $4, $5::text::vector, $6)",
		)
		.bind(Uuid::new_v4())
		.bind(note_id)
		.bind(user_id)
		.bind(chunk.content.as_str())
		.bind(vector_literal(&chunk.vec))
		.bind(now)
		.execute(&mut **tx)
		.await?;
	}

	Ok(())
}

pub async fn delete_chunks_for_note<'e, E>(executor: E, note_id: Uuid) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM note_embeddings WHERE note_id = $1")
		.bind(note_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected())
}

/// Top-`k` chunks for `user_id` by cosine similarity to `query_vec`, best
/// first.
pub async fn similarity_search<'e, E>(
	executor: E,
	user_id: &str,
	query_vec: &[f32],
	k: u32,
) -> Result<Vec<ChunkHit>>
where
	E: PgExecutor<'e>,
{
	let hits = sqlx::query_as(
		"\
SELECT
	chunk_id,
	note_id,
	(1 - (vec <=> $1::text::vector))::real AS score
FROM note_embeddings
WHERE user_id = $2
ORDER BY vec <=> $1::text::vector
LIMIT $3",
	)
	.bind(vector_literal(query_vec))
	.bind(user_id)
	.bind(i64::from(k))
	.fetch_all(executor)
	.await?;

	Ok(hits)
}

/// Resolves chunk hits to their parent notes, deduplicated, preserving the
/// rank order of each note's first hit. Hits whose note has vanished are
/// skipped.
pub async fn resolve_chunks_to_notes<'e, E>(executor: E, hits: &[ChunkHit]) -> Result<Vec<NoteRow>>
where
	E: PgExecutor<'e>,
{
	let ordered_ids = distinct_note_ids(hits);

	if ordered_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows: Vec<NoteRow> = sqlx::query_as("SELECT * FROM notes WHERE note_id = ANY($1)")
		.bind(ordered_ids.as_slice())
		.fetch_all(executor)
		.await?;
	let mut by_id: HashMap<Uuid, NoteRow> =
		rows.into_iter().map(|row| (row.note_id, row)).collect();

	Ok(ordered_ids.into_iter().filter_map(|note_id| by_id.remove(&note_id)).collect())
}

fn distinct_note_ids(hits: &[ChunkHit]) -> Vec<Uuid> {
	let mut seen = HashSet::with_capacity(hits.len());
	let mut ordered = Vec::new();

	for hit in hits {
		if seen.insert(hit.note_id) {
			ordered.push(hit.note_id);
		}
	}

	ordered
}

fn vector_literal(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}
