//! Domain layer - Core cache types and collaborator contracts

pub mod cache;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod semantic_cache;

pub use error::DomainError;
