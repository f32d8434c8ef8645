use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{Result, models::NoteRow};

pub async fn insert_note<'e, E>(executor: E, note: &NoteRow) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO notes (note_id, user_id, title, body, created_at)
VALUES ($1, $2, $3, $4, $5)",
	)
	.bind(note.note_id)
	.bind(note.user_id.as_str())
	.bind(note.title.as_str())
	.bind(note.body.as_str())
	.bind(note.created_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn fetch_note<'e, E>(executor: E, note_id: Uuid) -> Result<Option<NoteRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as("SELECT * FROM notes WHERE note_id = $1")
		.bind(note_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

/// Like [`fetch_note`] but takes a row lock; call inside a transaction.
pub async fn fetch_note_for_update<'e, E>(executor: E, note_id: Uuid) -> Result<Option<NoteRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as("SELECT * FROM notes WHERE note_id = $1 FOR UPDATE")
		.bind(note_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

pub async fn update_note_text<'e, E>(
	executor: E,
	note_id: Uuid,
	title: &str,
	body: &str,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("UPDATE notes SET title = $1, body = $2 WHERE note_id = $3")
		.bind(title)
		.bind(body)
		.bind(note_id)
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn delete_note<'e, E>(executor: E, note_id: Uuid) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result =
		sqlx::query("DELETE FROM notes WHERE note_id = $1").bind(note_id).execute(executor).await?;

	Ok(result.rows_affected())
}

/// All notes owned by `user_id`, newest first.
pub async fn list_notes_for_user<'e, E>(executor: E, user_id: &str) -> Result<Vec<NoteRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as("SELECT * FROM notes WHERE user_id = $1 ORDER BY created_at DESC")
		.bind(user_id)
		.fetch_all(executor)
		.await?;

	Ok(rows)
}
