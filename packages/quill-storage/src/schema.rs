/// Renders the full schema with the configured embedding dimension baked into
/// the vector column type.
pub fn render_schema(vector_dim: u32) -> String {
	let mut out = String::new();

	out.push_str(include_str!("../sql/00_extensions.sql"));
	out.push_str(include_str!("../sql/01_notes.sql"));
	out.push_str(include_str!("../sql/02_note_embeddings.sql"));

	out.replace("<VECTOR_DIM>", &vector_dim.to_string())
}
