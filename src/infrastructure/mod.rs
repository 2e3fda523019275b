//! Infrastructure layer - Concrete index, storage and engine implementations

pub mod embedding;
pub mod index;
pub mod logging;
pub mod semantic_cache;
pub mod services;
