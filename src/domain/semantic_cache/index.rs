//! Vector index contract

use std::fmt::Debug;

use crate::domain::DomainError;
use crate::domain::embedding::similarity_from_squared_l2;

/// One nearest-neighbour result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub slot: usize,
    /// Squared L2 distance between unit-normalised vectors
    pub distance: f32,
}

impl SearchHit {
    pub fn new(slot: usize, distance: f32) -> Self {
        Self { slot, distance }
    }

    pub fn similarity(&self) -> f32 {
        similarity_from_squared_l2(self.distance)
    }
}

/// Append-only nearest-neighbour structure
///
/// Slots are assigned in insertion order and never reused. The index has no
/// notion of liveness; callers map slots back to entries and decide.
pub trait VectorIndex: Send + Sync + Debug {
    /// Fixed on the first insertion
    fn dimension(&self) -> Option<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a vector, returning its slot
    fn insert(&mut self, vector: &[f32]) -> Result<usize, DomainError>;

    /// Up to `k` hits in ascending distance; empty when the index is empty
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, DomainError> {
        self.search_where(query, k, &|_| true)
    }

    /// Like `search`, over only the slots `accept` admits
    ///
    /// Rejected slots never occupy one of the `k` places.
    fn search_where(
        &self,
        query: &[f32],
        k: usize,
        accept: &dyn Fn(usize) -> bool,
    ) -> Result<Vec<SearchHit>, DomainError>;

    /// The stored (normalised) vector of a slot
    fn reconstruct(&self, slot: usize) -> Option<Vec<f32>>;

    fn check_dimension(&self, actual: usize) -> Result<(), DomainError> {
        match self.dimension() {
            Some(expected) if expected != actual => {
                Err(DomainError::dimension_mismatch(expected, actual))
            }
            _ => Ok(()),
        }
    }
}
