//! Note-body segmentation strategies.
//!
//! The embedding pipeline depends only on [`Segmenter`], so the paragraph
//! heuristic can be swapped for a token- or sentence-based splitter without
//! touching the pipeline.

pub trait Segmenter
where
	Self: Send + Sync,
{
	fn segment(&self, text: &str) -> Vec<String>;
}

/// Splits on blank-line boundaries. Lines containing only whitespace count as
/// blank, and whitespace-only segments are dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlankLineSegmenter;

impl Segmenter for BlankLineSegmenter {
	fn segment(&self, text: &str) -> Vec<String> {
		split_blank_lines(text)
	}
}

pub fn split_blank_lines(text: &str) -> Vec<String> {
	let mut segments = Vec::new();
	let mut current = String::new();

	for line in text.lines() {
		if line.trim().is_empty() {
			push_segment(&mut segments, &mut current);

			continue;
		}

		if !current.is_empty() {
			current.push('\n');
		}

		current.push_str(line);
	}

	push_segment(&mut segments, &mut current);

	segments
}

fn push_segment(segments: &mut Vec<String>, current: &mut String) {
	let trimmed = current.trim();

	if !trimmed.is_empty() {
		segments.push(trimmed.to_string());
	}

	current.clear();
}
