pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Unauthenticated: {message}")]
	Unauthenticated { message: String },
	#[error("Forbidden: {message}")]
	Forbidden { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Embedding provider error: {message}")]
	Embedding { message: String },
	#[error("Model provider error: {message}")]
	Model { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	// Never surfaces over HTTP; the subscriber that would have seen it is
	// already gone.
	#[error("Chat turn cancelled by the client.")]
	Cancelled,
}
impl Error {
	pub(crate) fn embedding(err: impl std::fmt::Display) -> Self {
		Self::Embedding { message: err.to_string() }
	}

	pub(crate) fn model(err: impl std::fmt::Display) -> Self {
		Self::Model { message: err.to_string() }
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<quill_storage::Error> for Error {
	fn from(err: quill_storage::Error) -> Self {
		match err {
			quill_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
		}
	}
}
