//! Index that starts exhaustive and switches to clustered search at scale

use tracing::info;

use super::clustered::ClusterLayout;
use super::flat::FlatIndex;
use crate::domain::semantic_cache::{IndexConfig, SearchHit, VectorIndex};
use crate::domain::DomainError;

/// Flat storage plus an optional cluster layout over it
///
/// Below `clustered_threshold` vectors every query is exhaustive. Reaching the
/// threshold trains the layout once; later insertions join their nearest
/// cluster without retraining. Slots and stored vectors are identical in both
/// modes, only the set of scanned candidates changes.
#[derive(Debug, Clone)]
pub struct AdaptiveIndex {
    storage: FlatIndex,
    layout: Option<ClusterLayout>,
    config: IndexConfig,
}

impl AdaptiveIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            storage: FlatIndex::new(),
            layout: None,
            config,
        }
    }

    /// Rebuild from snapshot rows; the layout is retrained when large enough
    pub fn from_rows(
        dimension: Option<usize>,
        data: Vec<f32>,
        config: IndexConfig,
    ) -> Result<Self, DomainError> {
        let mut index = Self {
            storage: FlatIndex::from_rows(dimension, data)?,
            layout: None,
            config,
        };
        index.maybe_upgrade();
        Ok(index)
    }

    pub fn is_clustered(&self) -> bool {
        self.layout.is_some()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn storage(&self) -> &FlatIndex {
        &self.storage
    }

    fn maybe_upgrade(&mut self) {
        if self.layout.is_some() || self.storage.len() < self.config.clustered_threshold.max(1) {
            return;
        }

        let layout = ClusterLayout::train(
            &self.storage,
            self.config.clusters,
            self.config.probes,
            self.config.training_iterations,
        );

        info!(
            vectors = self.storage.len(),
            clusters = layout.clusters(),
            probes = layout.probes(),
            "Vector index switched to clustered search"
        );

        self.layout = Some(layout);
    }
}

impl VectorIndex for AdaptiveIndex {
    fn dimension(&self) -> Option<usize> {
        self.storage.dimension()
    }

    fn len(&self) -> usize {
        self.storage.len()
    }

    fn insert(&mut self, vector: &[f32]) -> Result<usize, DomainError> {
        let slot = self.storage.insert(vector)?;

        if let Some(layout) = self.layout.as_mut() {
            if let Some(row) = self.storage.row(slot) {
                layout.assign(slot, row);
            }
        } else {
            self.maybe_upgrade();
        }

        Ok(slot)
    }

    fn search_where(
        &self,
        query: &[f32],
        k: usize,
        accept: &dyn Fn(usize) -> bool,
    ) -> Result<Vec<SearchHit>, DomainError> {
        let Some(layout) = &self.layout else {
            return self.storage.search_where(query, k, accept);
        };

        if k == 0 {
            return Ok(Vec::new());
        }

        let query = self.storage.prepare_query(query)?;
        let candidates = layout.candidates(&query);

        Ok(self.storage.scan(&query, candidates, k, accept))
    }

    fn reconstruct(&self, slot: usize) -> Option<Vec<f32>> {
        self.storage.reconstruct(slot)
    }
}
