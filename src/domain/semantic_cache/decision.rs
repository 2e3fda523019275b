//! Hit/miss decision over nearest-neighbour candidates

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{EntryKind, SimilarityThresholds, VectorIndex};
use crate::domain::DomainError;

/// What the entry store knows about the owner of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotOwner<'a> {
    pub key: &'a str,
    pub partition: &'a str,
    pub valid: bool,
}

/// Maps index slots back to live entries
pub trait SlotResolver {
    /// `None` for dead slots (entry removed or replaced)
    fn resolve(&self, slot: usize, now: DateTime<Utc>) -> Option<SlotOwner<'_>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Hit,
    BelowThreshold,
    /// Best candidate exists but its TTL has run out
    Expired,
    NoCandidate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub outcome: DecisionOutcome,
    pub slot: Option<usize>,
    pub key: Option<String>,
    pub similarity: Option<f32>,
    pub threshold: f32,
}

impl Decision {
    pub fn is_hit(&self) -> bool {
        self.outcome == DecisionOutcome::Hit
    }

    pub fn no_candidate(threshold: f32) -> Self {
        Self {
            outcome: DecisionOutcome::NoCandidate,
            slot: None,
            key: None,
            similarity: None,
            threshold,
        }
    }
}

/// Applies kind-specific thresholds to the best candidate of a search
#[derive(Debug, Clone)]
pub struct SimilarityDecider {
    thresholds: SimilarityThresholds,
}

impl SimilarityDecider {
    pub fn new(thresholds: SimilarityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn threshold_for(&self, kind: EntryKind) -> f32 {
        self.thresholds.for_kind(kind)
    }

    /// Judge the nearest neighbour of `query` owned by an entry of
    /// `partition`. Dead slots and foreign partitions are filtered inside the
    /// search, so they never crowd out a live candidate. An expired best
    /// candidate is a miss, never a fallback to the next one.
    #[allow(clippy::too_many_arguments)]
    pub fn decide(
        &self,
        query: &[f32],
        kind: EntryKind,
        partition: &str,
        index: &dyn VectorIndex,
        resolver: &dyn SlotResolver,
        k: usize,
        now: DateTime<Utc>,
    ) -> Result<Decision, DomainError> {
        let threshold = self.threshold_for(kind);
        let owned_here = |slot: usize| {
            resolver
                .resolve(slot, now)
                .is_some_and(|owner| owner.partition == partition)
        };
        let hits = index.search_where(query, k, &owned_here)?;

        let best = hits.into_iter().find_map(|hit| {
            resolver
                .resolve(hit.slot, now)
                .filter(|owner| owner.partition == partition)
                .map(|owner| (hit, owner))
        });

        let Some((hit, owner)) = best else {
            return Ok(Decision::no_candidate(threshold));
        };

        let similarity = hit.similarity();
        let outcome = if !owner.valid {
            DecisionOutcome::Expired
        } else if similarity >= threshold {
            DecisionOutcome::Hit
        } else {
            DecisionOutcome::BelowThreshold
        };

        debug!(
            slot = hit.slot,
            similarity,
            threshold,
            ?outcome,
            "similarity decision"
        );

        Ok(Decision {
            outcome,
            slot: Some(hit.slot),
            key: Some(owner.key.to_string()),
            similarity: Some(similarity),
            threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;
    use crate::infrastructure::index::FlatIndex;

    #[derive(Default)]
    struct TestResolver {
        owners: HashMap<usize, (String, String, bool)>,
    }

    impl TestResolver {
        fn with(mut self, slot: usize, key: &str, partition: &str, valid: bool) -> Self {
            self.owners
                .insert(slot, (key.to_string(), partition.to_string(), valid));
            self
        }
    }

    impl SlotResolver for TestResolver {
        fn resolve(&self, slot: usize, _now: DateTime<Utc>) -> Option<SlotOwner<'_>> {
            self.owners.get(&slot).map(|(key, partition, valid)| SlotOwner {
                key,
                partition,
                valid: *valid,
            })
        }
    }

    fn index(rows: &[[f32; 2]]) -> FlatIndex {
        let mut index = FlatIndex::new();
        for row in rows {
            index.insert(row).unwrap();
        }
        index
    }

    fn decider(threshold: f32) -> SimilarityDecider {
        SimilarityDecider::new(SimilarityThresholds::uniform(threshold))
    }

    #[test]
    fn test_identical_vector_is_hit() {
        let index = index(&[[1.0, 0.0], [0.0, 1.0]]);
        let resolver = TestResolver::default()
            .with(0, "a", "p", true)
            .with(1, "b", "p", true);

        let decision = decider(0.95)
            .decide(&[2.0, 0.0], EntryKind::Query, "p", &index, &resolver, 4, Utc::now())
            .unwrap();

        assert!(decision.is_hit());
        assert_eq!(decision.key.as_deref(), Some("a"));
        assert!(decision.similarity.unwrap() > 0.999);
    }

    #[test]
    fn test_below_threshold() {
        let index = index(&[[1.0, 0.0]]);
        let resolver = TestResolver::default().with(0, "a", "p", true);

        let decision = decider(0.95)
            .decide(&[1.0, 1.0], EntryKind::Query, "p", &index, &resolver, 4, Utc::now())
            .unwrap();

        assert_eq!(decision.outcome, DecisionOutcome::BelowThreshold);
        assert!((decision.similarity.unwrap() - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-4);
    }

    #[test]
    fn test_expired_best_candidate_does_not_fall_back() {
        let index = index(&[[1.0, 0.0], [0.9, 0.1]]);
        let resolver = TestResolver::default()
            .with(0, "stale", "p", false)
            .with(1, "fresh", "p", true);

        let decision = decider(0.5)
            .decide(&[1.0, 0.0], EntryKind::Query, "p", &index, &resolver, 4, Utc::now())
            .unwrap();

        assert_eq!(decision.outcome, DecisionOutcome::Expired);
        assert_eq!(decision.key.as_deref(), Some("stale"));
    }

    #[test]
    fn test_dead_slots_and_foreign_partitions_are_skipped() {
        let index = index(&[[1.0, 0.0], [0.99, 0.01], [0.9, 0.1]]);
        let resolver = TestResolver::default()
            .with(1, "other", "q", true)
            .with(2, "mine", "p", true);

        let decision = decider(0.5)
            .decide(&[1.0, 0.0], EntryKind::Query, "p", &index, &resolver, 4, Utc::now())
            .unwrap();

        assert!(decision.is_hit());
        assert_eq!(decision.slot, Some(2));
    }

    #[test]
    fn test_no_candidate_in_partition() {
        let index = index(&[[1.0, 0.0], [0.0, 1.0]]);
        let resolver = TestResolver::default().with(1, "elsewhere", "q", true);

        let decision = decider(0.1)
            .decide(&[1.0, 0.0], EntryKind::Query, "p", &index, &resolver, 4, Utc::now())
            .unwrap();

        assert_eq!(decision, Decision::no_candidate(0.1));
    }

    #[test]
    fn test_dead_and_foreign_ties_do_not_hide_live_entry() {
        let rows = [[1.0, 0.0]; 12];
        let index = index(&rows);
        let mut resolver = TestResolver::default();
        for slot in 0..6 {
            resolver = resolver.with(slot, &format!("other-{}", slot), "q", true);
        }
        resolver = resolver.with(11, "live", "p", true);

        let decision = decider(0.9)
            .decide(&[1.0, 0.0], EntryKind::Query, "p", &index, &resolver, 1, Utc::now())
            .unwrap();

        assert!(decision.is_hit());
        assert_eq!(decision.slot, Some(11));
        assert_eq!(decision.key.as_deref(), Some("live"));
    }

    #[test]
    fn test_kind_specific_threshold() {
        let thresholds = SimilarityThresholds::uniform(0.95).with_kind(EntryKind::Completion, 0.5);
        let decider = SimilarityDecider::new(thresholds);
        let index = index(&[[1.0, 0.0]]);
        let resolver = TestResolver::default().with(0, "a", "p", true);

        let query = [1.0, 1.0];
        let as_query = decider
            .decide(&query, EntryKind::Query, "p", &index, &resolver, 1, Utc::now())
            .unwrap();
        let as_completion = decider
            .decide(&query, EntryKind::Completion, "p", &index, &resolver, 1, Utc::now())
            .unwrap();

        assert!(!as_query.is_hit());
        assert!(as_completion.is_hit());
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let index = index(&[[1.0, 0.0]]);
        let resolver = TestResolver::default();

        let result = decider(0.5).decide(
            &[1.0, 0.0, 0.0],
            EntryKind::Query,
            "p",
            &index,
            &resolver,
            1,
            Utc::now(),
        );

        assert!(matches!(result, Err(DomainError::DimensionMismatch { .. })));
    }

    proptest! {
        #[test]
        fn prop_lower_threshold_never_loses_a_hit(
            x in -1.0f32..1.0,
            y in -1.0f32..1.0,
            low in 0.0f32..1.0,
            delta in 0.0f32..1.0,
        ) {
            prop_assume!(x.abs() + y.abs() > 1e-3);
            let high = (low + delta).min(1.0);

            let index = index(&[[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0]]);
            let resolver = TestResolver::default()
                .with(0, "a", "p", true)
                .with(1, "b", "p", true)
                .with(2, "c", "p", true);
            let now = Utc::now();

            let strict = decider(high)
                .decide(&[x, y], EntryKind::Other, "p", &index, &resolver, 3, now)
                .unwrap();
            let loose = decider(low)
                .decide(&[x, y], EntryKind::Other, "p", &index, &resolver, 3, now)
                .unwrap();

            if strict.is_hit() {
                prop_assert!(loose.is_hit());
            }
            prop_assert_eq!(strict.similarity, loose.similarity);
        }
    }
}
