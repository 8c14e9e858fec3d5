pub mod models;
pub mod repository;
pub mod validation;

pub use models::*;
pub use repository::{InMemoryRepository, Repository};
