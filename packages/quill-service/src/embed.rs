//! Shared embedding pipeline: segment a note body, embed the segments, and
//! verify the provider kept its contract before anything touches storage.

use crate::{EmbeddingProvider, Error, Result};
use quill_chunking::Segmenter;
use quill_config::EmbeddingProviderConfig;
use quill_storage::models::EmbeddedChunkRow;

pub const MAX_CHUNKS_PER_BATCH: usize = 100;

pub(crate) async fn embed_chunks(
	cfg: &EmbeddingProviderConfig,
	provider: &dyn EmbeddingProvider,
	segmenter: &dyn Segmenter,
	text: &str,
) -> Result<Vec<EmbeddedChunkRow>> {
	let mut chunks = segmenter.segment(text);

	if chunks.is_empty() {
		return Ok(Vec::new());
	}
	if chunks.len() > MAX_CHUNKS_PER_BATCH {
		// Provider batch limit. Trailing segments are dropped, not an error.
		tracing::warn!(
			dropped = chunks.len() - MAX_CHUNKS_PER_BATCH,
			"The note exceeds the chunk cap; truncating."
		);
		chunks.truncate(MAX_CHUNKS_PER_BATCH);
	}

	let vectors = provider.embed(cfg, &chunks).await.map_err(Error::embedding)?;

	if vectors.len() != chunks.len() {
		return Err(Error::Embedding {
			message: format!(
				"The provider returned {} vectors for {} chunks.",
				vectors.len(),
				chunks.len()
			),
		});
	}

	for vector in &vectors {
		check_dimensions(cfg, vector)?;
	}

	Ok(chunks
		.into_iter()
		.zip(vectors)
		.map(|(content, vec)| EmbeddedChunkRow { content, vec })
		.collect())
}

pub(crate) async fn embed_single(
	cfg: &EmbeddingProviderConfig,
	provider: &dyn EmbeddingProvider,
	text: &str,
) -> Result<Vec<f32>> {
	let texts = vec![text.to_string()];
	let mut vectors = provider.embed(cfg, &texts).await.map_err(Error::embedding)?;

	if vectors.len() != 1 {
		return Err(Error::Embedding {
			message: format!("The provider returned {} vectors for one input.", vectors.len()),
		});
	}

	let vector = vectors.remove(0);

	check_dimensions(cfg, &vector)?;

	Ok(vector)
}

fn check_dimensions(cfg: &EmbeddingProviderConfig, vector: &[f32]) -> Result<()> {
	if vector.len() != cfg.dimensions as usize {
		return Err(Error::Embedding {
			message: format!(
				"The provider returned a {}-dimensional vector; {} was configured.",
				vector.len(),
				cfg.dimensions
			),
		});
	}

	Ok(())
}
