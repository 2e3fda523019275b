//! Exhaustive vector index

use crate::domain::embedding::{normalized, squared_l2};
use crate::domain::semantic_cache::{SearchHit, VectorIndex};
use crate::domain::DomainError;

/// Contiguous row-major vector storage answering queries by linear scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatIndex {
    dimension: Option<usize>,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from raw slot-ordered rows, normalising each one
    pub fn from_rows(dimension: Option<usize>, data: Vec<f32>) -> Result<Self, DomainError> {
        let mut index = Self::new();

        let Some(dimension) = dimension else {
            if !data.is_empty() {
                return Err(DomainError::persistence(
                    "index holds vectors but has no dimension",
                ));
            }
            return Ok(index);
        };

        if dimension == 0 || data.len() % dimension != 0 {
            return Err(DomainError::persistence(format!(
                "{} values do not form rows of dimension {}",
                data.len(),
                dimension
            )));
        }

        index.dimension = Some(dimension);
        index.data.reserve(data.len());

        for row in data.chunks_exact(dimension) {
            index.data.extend(normalized(row)?);
        }

        Ok(index)
    }

    /// Slot-ordered rows, `len() * dimension` values
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, slot: usize) -> Option<&[f32]> {
        let dimension = self.dimension?;
        let start = slot.checked_mul(dimension)?;
        self.data.get(start..start + dimension)
    }

    /// Distances from an already normalised query to the accepted slots
    pub(crate) fn scan<I>(
        &self,
        query: &[f32],
        slots: I,
        k: usize,
        accept: &dyn Fn(usize) -> bool,
    ) -> Vec<SearchHit>
    where
        I: IntoIterator<Item = usize>,
    {
        let hits = slots.into_iter().filter(|&slot| accept(slot)).filter_map(|slot| {
            self.row(slot)
                .map(|row| SearchHit::new(slot, squared_l2(query, row)))
        });

        nearest(hits, k)
    }

    /// Validate and normalise a query against the fixed dimension
    pub(crate) fn prepare_query(&self, query: &[f32]) -> Result<Vec<f32>, DomainError> {
        self.check_dimension(query.len())?;
        normalized(query)
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn len(&self) -> usize {
        match self.dimension {
            Some(dimension) => self.data.len() / dimension,
            None => 0,
        }
    }

    fn insert(&mut self, vector: &[f32]) -> Result<usize, DomainError> {
        self.check_dimension(vector.len())?;
        let unit = normalized(vector)?;

        let slot = self.len();
        self.dimension.get_or_insert(unit.len());
        self.data.extend(unit);

        Ok(slot)
    }

    fn search_where(
        &self,
        query: &[f32],
        k: usize,
        accept: &dyn Fn(usize) -> bool,
    ) -> Result<Vec<SearchHit>, DomainError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query = self.prepare_query(query)?;
        Ok(self.scan(&query, 0..self.len(), k, accept))
    }

    fn reconstruct(&self, slot: usize) -> Option<Vec<f32>> {
        self.row(slot).map(<[f32]>::to_vec)
    }
}

/// The `k` closest hits, ascending by distance then slot
pub(crate) fn nearest(hits: impl Iterator<Item = SearchHit>, k: usize) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = hits.collect();

    hits.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.slot.cmp(&b.slot))
    });
    hits.truncate(k);

    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_fixes_dimension() {
        let mut index = FlatIndex::new();
        assert_eq!(index.dimension(), None);

        assert_eq!(index.insert(&[3.0, 4.0]).unwrap(), 0);
        assert_eq!(index.insert(&[0.0, 2.0]).unwrap(), 1);

        assert_eq!(index.dimension(), Some(2));
        assert_eq!(index.len(), 2);
        assert!(matches!(
            index.insert(&[1.0, 0.0, 0.0]),
            Err(DomainError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_insert_normalises() {
        let mut index = FlatIndex::new();
        index.insert(&[3.0, 4.0]).unwrap();

        let stored = index.reconstruct(0).unwrap();
        assert!((stored[0] - 0.6).abs() < 1e-6);
        assert!((stored[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_degenerate_vectors() {
        let mut index = FlatIndex::new();

        assert!(matches!(
            index.insert(&[0.0, 0.0]),
            Err(DomainError::InvalidVector { .. })
        ));
        assert!(index.insert(&[f32::NAN, 1.0]).is_err());
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
    }

    #[test]
    fn test_search_orders_by_distance() {
        let mut index = FlatIndex::new();
        index.insert(&[1.0, 0.0]).unwrap();
        index.insert(&[0.0, 1.0]).unwrap();
        index.insert(&[1.0, 1.0]).unwrap();

        let hits = index.search(&[2.0, 0.1], 2).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].slot, 0);
        assert_eq!(hits[1].slot, 2);
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[0].similarity() > 0.99);
    }

    #[test]
    fn test_rejected_slots_do_not_take_places() {
        let mut index = FlatIndex::new();
        for _ in 0..5 {
            index.insert(&[1.0, 0.0]).unwrap();
        }
        index.insert(&[0.9, 0.1]).unwrap();
        index.insert(&[1.0, 0.0]).unwrap();

        let hits = index.search_where(&[1.0, 0.0], 1, &|slot| slot >= 5).unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slot, 6);
        assert!(index.search_where(&[1.0, 0.0], 3, &|_| false).unwrap().is_empty());
    }

    #[test]
    fn test_search_bounded_by_count() {
        let mut index = FlatIndex::new();
        index.insert(&[1.0, 0.0]).unwrap();

        assert_eq!(index.search(&[1.0, 0.0], 10).unwrap().len(), 1);
    }

    #[test]
    fn test_search_empty_index_is_empty() {
        let index = FlatIndex::new();
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let mut index = FlatIndex::new();
        index.insert(&[1.0, 0.0]).unwrap();

        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 1),
            Err(DomainError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_from_rows_rejects_ragged_data() {
        assert!(FlatIndex::from_rows(Some(3), vec![1.0; 7]).is_err());
        assert!(FlatIndex::from_rows(None, vec![1.0]).is_err());

        let index = FlatIndex::from_rows(Some(2), vec![1.0, 0.0, 0.0, 5.0]).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.reconstruct(1), Some(vec![0.0, 1.0]));
    }
}
