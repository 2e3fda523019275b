//! Lookup outcomes

use super::{CachePayload, EntryKind};

/// How a hit was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Fingerprint matched
    Exact,
    /// Embedding similarity cleared the threshold
    Semantic,
    /// Batch rebuilt from per-item hits
    Assembled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    /// Key of the entry served (the request's own key for assembled batches)
    pub key: String,
    pub payload: CachePayload,
    pub match_type: MatchType,
    /// 1.0 for exact matches; lowest item similarity for assembled batches
    pub similarity: f32,
    pub kind: EntryKind,
}

/// Why nothing was served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    NotCached,
    BelowThreshold,
    Expired,
    SimilarityDisabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheMiss {
    /// Key the result should be stored under
    pub key: String,
    pub reason: MissReason,
    /// Best similarity seen, if a candidate existed
    pub best_similarity: Option<f32>,
    /// Vector computed for a single-input lookup; pass it back to `put`
    pub query_vector: Option<Vec<f32>>,
    /// Batch only: cached payload per item, `None` where the item missed
    pub resolved_items: Vec<Option<Vec<f32>>>,
    /// Batch only: vectors the provider computed for unresolved items
    pub item_vectors: Vec<Option<Vec<f32>>>,
}

impl CacheMiss {
    pub fn new(key: impl Into<String>, reason: MissReason) -> Self {
        Self {
            key: key.into(),
            reason,
            best_similarity: None,
            query_vector: None,
            resolved_items: Vec::new(),
            item_vectors: Vec::new(),
        }
    }

    /// Indexes of batch items that still need a provider call
    pub fn missing_items(&self) -> Vec<usize> {
        self.resolved_items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_none())
            .map(|(idx, _)| idx)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(CacheHit),
    Miss(CacheMiss),
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn hit(&self) -> Option<&CacheHit> {
        match self {
            CacheLookup::Hit(hit) => Some(hit),
            CacheLookup::Miss(_) => None,
        }
    }

    pub fn miss(&self) -> Option<&CacheMiss> {
        match self {
            CacheLookup::Hit(_) => None,
            CacheLookup::Miss(miss) => Some(miss),
        }
    }

    pub fn payload(&self) -> Option<&CachePayload> {
        self.hit().map(|hit| &hit.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_items() {
        let mut miss = CacheMiss::new("k", MissReason::NotCached);
        miss.resolved_items = vec![Some(vec![1.0]), None, Some(vec![2.0]), None];

        assert_eq!(miss.missing_items(), vec![1, 3]);
    }

    #[test]
    fn test_lookup_accessors() {
        let hit = CacheLookup::Hit(CacheHit {
            key: "k".into(),
            payload: CachePayload::CompletionText("cached".into()),
            match_type: MatchType::Exact,
            similarity: 1.0,
            kind: EntryKind::Completion,
        });

        assert!(hit.is_hit());
        assert_eq!(hit.payload().and_then(CachePayload::as_text), Some("cached"));
        assert!(hit.miss().is_none());
    }
}
