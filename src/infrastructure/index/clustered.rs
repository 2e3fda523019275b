//! Coarse quantiser for probing a subset of the stored vectors
//!
//! Centroids are seeded by farthest-point selection starting from slot 0 and
//! refined with Lloyd iterations, so the same rows always train the same
//! layout. Queries scan only the members of the `probes` nearest clusters.

use tracing::debug;

use super::flat::FlatIndex;
use crate::domain::embedding::squared_l2;
use crate::domain::semantic_cache::VectorIndex;

/// Rows sampled per centroid while training
const TRAINING_ROWS_PER_CLUSTER: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterLayout {
    centroids: Vec<Vec<f32>>,
    members: Vec<Vec<usize>>,
    probes: usize,
}

impl ClusterLayout {
    /// Train on the rows of `storage` and assign every slot to a cluster
    pub fn train(storage: &FlatIndex, clusters: Option<usize>, probes: usize, iterations: usize) -> Self {
        let count = storage.len();
        let k = clusters
            .unwrap_or_else(|| (count as f64).sqrt().ceil() as usize)
            .clamp(1, count.max(1));

        let sample = training_sample(count, k);
        let rows: Vec<&[f32]> = sample.iter().filter_map(|&slot| storage.row(slot)).collect();

        let mut centroids = farthest_point_seeds(&rows, k);
        let mut assignments = vec![0usize; rows.len()];

        for iteration in 0..iterations.max(1) {
            let mut changed = false;

            for (i, row) in rows.iter().enumerate() {
                let nearest = nearest_centroid(row, &centroids);
                if nearest != assignments[i] {
                    assignments[i] = nearest;
                    changed = true;
                }
            }

            recompute_centroids(&rows, &assignments, &mut centroids);

            if !changed && iteration > 0 {
                debug!(iteration, "cluster training converged");
                break;
            }
        }

        let mut layout = Self {
            members: vec![Vec::new(); centroids.len()],
            centroids,
            probes: probes.max(1),
        };

        for slot in 0..count {
            if let Some(row) = storage.row(slot) {
                layout.assign(slot, row);
            }
        }

        layout
    }

    pub fn clusters(&self) -> usize {
        self.centroids.len()
    }

    pub fn probes(&self) -> usize {
        self.probes
    }

    /// Append a slot to its nearest cluster
    pub fn assign(&mut self, slot: usize, row: &[f32]) {
        let nearest = nearest_centroid(row, &self.centroids);
        if let Some(list) = self.members.get_mut(nearest) {
            list.push(slot);
        }
    }

    /// Slots of the `probes` clusters closest to `query`
    pub fn candidates(&self, query: &[f32]) -> Vec<usize> {
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(idx, centroid)| (idx, squared_l2(query, centroid)))
            .collect();

        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        ranked
            .into_iter()
            .take(self.probes)
            .flat_map(|(idx, _)| self.members[idx].iter().copied())
            .collect()
    }
}

/// Evenly strided slots, at most `TRAINING_ROWS_PER_CLUSTER` per centroid
fn training_sample(count: usize, k: usize) -> Vec<usize> {
    let cap = k.saturating_mul(TRAINING_ROWS_PER_CLUSTER).max(1);

    if count <= cap {
        return (0..count).collect();
    }

    (0..cap).map(|i| i * count / cap).collect()
}

fn farthest_point_seeds(rows: &[&[f32]], k: usize) -> Vec<Vec<f32>> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };

    let mut centroids = vec![first.to_vec()];
    let mut min_distances: Vec<f32> = rows.iter().map(|row| squared_l2(row, first)).collect();

    while centroids.len() < k {
        let Some((best, &distance)) = min_distances
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(&a.0)))
        else {
            break;
        };

        // Every remaining row duplicates an existing centroid
        if distance <= 0.0 {
            break;
        }

        let seed = rows[best].to_vec();
        for (min, row) in min_distances.iter_mut().zip(rows) {
            *min = min.min(squared_l2(row, &seed));
        }
        centroids.push(seed);
    }

    centroids
}

fn nearest_centroid(row: &[f32], centroids: &[Vec<f32>]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(idx, centroid)| (idx, squared_l2(row, centroid)))
        .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

/// Mean of each cluster's rows; empty clusters keep their previous centroid
fn recompute_centroids(rows: &[&[f32]], assignments: &[usize], centroids: &mut [Vec<f32>]) {
    let Some(dimension) = rows.first().map(|row| row.len()) else {
        return;
    };

    let mut sums = vec![vec![0.0f32; dimension]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];

    for (row, &cluster) in rows.iter().zip(assignments) {
        counts[cluster] += 1;
        for (sum, value) in sums[cluster].iter_mut().zip(row.iter()) {
            *sum += value;
        }
    }

    for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
        if count > 0 {
            *centroid = sum.into_iter().map(|v| v / count as f32).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two tight groups around the x and y axes
    fn grouped_storage() -> FlatIndex {
        let mut storage = FlatIndex::new();
        for i in 0..20 {
            let jitter = i as f32 * 0.001;
            storage.insert(&[1.0, jitter, 0.0]).unwrap();
            storage.insert(&[jitter, 1.0, 0.0]).unwrap();
        }
        storage
    }

    #[test]
    fn test_training_is_deterministic() {
        let storage = grouped_storage();

        let a = ClusterLayout::train(&storage, Some(2), 1, 10);
        let b = ClusterLayout::train(&storage, Some(2), 1, 10);

        assert_eq!(a, b);
        assert_eq!(a.clusters(), 2);
    }

    #[test]
    fn test_every_slot_is_assigned_once() {
        let storage = grouped_storage();
        let layout = ClusterLayout::train(&storage, Some(4), 4, 5);

        let mut slots = layout.candidates(&[1.0, 0.0, 0.0]);
        slots.sort_unstable();

        assert_eq!(slots, (0..storage.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_probe_stays_in_nearest_group() {
        let storage = grouped_storage();
        let layout = ClusterLayout::train(&storage, Some(2), 1, 10);

        let candidates = layout.candidates(&[1.0, 0.0, 0.0]);

        assert_eq!(candidates.len(), 20);
        assert!(candidates.iter().all(|slot| slot % 2 == 0));
    }

    #[test]
    fn test_duplicate_rows_collapse_clusters() {
        let mut storage = FlatIndex::new();
        for _ in 0..10 {
            storage.insert(&[1.0, 0.0]).unwrap();
        }

        let layout = ClusterLayout::train(&storage, Some(5), 2, 3);
        assert_eq!(layout.clusters(), 1);
        assert_eq!(layout.candidates(&[1.0, 0.0]).len(), 10);
    }

    #[test]
    fn test_training_sample_is_strided() {
        assert_eq!(training_sample(5, 1), vec![0, 1, 2, 3, 4]);

        let sample = training_sample(1000, 2);
        assert_eq!(sample.len(), 80);
        assert_eq!(sample[0], 0);
        assert!(sample.windows(2).all(|w| w[0] < w[1]));
    }
}
