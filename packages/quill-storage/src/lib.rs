pub mod db;
pub mod embeddings;
pub mod models;
pub mod notes;
pub mod schema;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
