//! Cached entry model

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Classification of a cached item; drives TTL and threshold selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Query,
    Document,
    Passage,
    Completion,
    Other,
}

impl EntryKind {
    pub const ALL: [EntryKind; 5] = [
        EntryKind::Query,
        EntryKind::Document,
        EntryKind::Passage,
        EntryKind::Completion,
        EntryKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Query => "query",
            EntryKind::Document => "document",
            EntryKind::Passage => "passage",
            EntryKind::Completion => "completion",
            EntryKind::Other => "other",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = std::convert::Infallible;

    /// Unknown input types fall back to `Other`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "query" | "search_query" => EntryKind::Query,
            "document" | "search_document" => EntryKind::Document,
            "passage" => EntryKind::Passage,
            "completion" | "chat" => EntryKind::Completion,
            _ => EntryKind::Other,
        })
    }
}

/// What a cache entry hands back on a hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CachePayload {
    CompletionText(String),
    SingleVector(Vec<f32>),
    VectorBatch(Vec<Vec<f32>>),
}

impl CachePayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CachePayload::CompletionText(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            CachePayload::SingleVector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_batch(&self) -> Option<&[Vec<f32>]> {
        match self {
            CachePayload::VectorBatch(v) => Some(v),
            _ => None,
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            CachePayload::CompletionText(_) => "completion_text",
            CachePayload::SingleVector(_) => "single_vector",
            CachePayload::VectorBatch(_) => "vector_batch",
        }
    }

    /// Reject payloads that could never be served back meaningfully
    pub fn check_shape(&self) -> Result<(), String> {
        match self {
            CachePayload::CompletionText(_) => Ok(()),
            CachePayload::SingleVector(v) if v.is_empty() => Err("empty vector".to_string()),
            CachePayload::SingleVector(_) => Ok(()),
            CachePayload::VectorBatch(vs) if vs.is_empty() => Err("empty batch".to_string()),
            CachePayload::VectorBatch(vs) => {
                let width = vs[0].len();
                if width == 0 || vs.iter().any(|v| v.len() != width) {
                    Err("batch vectors have inconsistent lengths".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// A stored result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    key: String,
    partition: String,
    kind: EntryKind,
    payload: CachePayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query_text: Option<String>,
    /// Index slot holding this entry's search vector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    slot: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dimension: Option<usize>,
    created_at: DateTime<Utc>,
    /// Entries written without a TTL never expire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl_secs: Option<u64>,
    #[serde(default)]
    hit_count: u64,
}

impl CacheEntry {
    pub fn new(
        key: impl Into<String>,
        partition: impl Into<String>,
        kind: EntryKind,
        payload: CachePayload,
        created_at: DateTime<Utc>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            key: key.into(),
            partition: partition.into(),
            kind,
            payload,
            query_text: None,
            slot: None,
            dimension: None,
            created_at,
            ttl_secs: ttl.map(|t| t.as_secs()),
            hit_count: 0,
        }
    }

    pub fn with_query_text(mut self, text: impl Into<String>) -> Self {
        self.query_text = Some(text.into());
        self
    }

    /// Bind the entry to the index slot holding its vector
    pub fn with_slot(mut self, slot: usize, dimension: usize) -> Self {
        self.slot = Some(slot);
        self.dimension = Some(dimension);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn payload(&self) -> &CachePayload {
        &self.payload
    }

    pub fn query_text(&self) -> Option<&str> {
        self.query_text.as_deref()
    }

    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn record_hit(&mut self) {
        self.hit_count += 1;
    }

    /// Instant after which the entry is stale, if it ever is
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.ttl_secs?).ok()?;
        self.created_at
            .checked_add_signed(TimeDelta::try_seconds(secs)?)
    }

    /// Valid while `now - created_at < ttl`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_secs {
            None => true,
            Some(_) => match self.expires_at() {
                Some(expires_at) => now < expires_at,
                // TTL too large to represent: never reached
                None => true,
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Loaded entries must reference a real slot and carry a well-formed payload
    pub fn validate(&self, index_len: usize, index_dimension: Option<usize>) -> Result<(), DomainError> {
        self.payload
            .check_shape()
            .map_err(|reason| DomainError::corrupt_entry(&self.key, reason))?;

        if let Some(slot) = self.slot {
            if slot >= index_len {
                return Err(DomainError::corrupt_entry(
                    &self.key,
                    format!("slot {} out of range (index holds {})", slot, index_len),
                ));
            }

            if self.dimension.is_some() && self.dimension != index_dimension {
                return Err(DomainError::corrupt_entry(
                    &self.key,
                    format!(
                        "dimension {:?} does not match index dimension {:?}",
                        self.dimension, index_dimension
                    ),
                ));
            }
        }

        Ok(())
    }

    pub(crate) fn clear_slot(&mut self) {
        self.slot = None;
    }

    pub(crate) fn set_slot(&mut self, slot: usize) {
        self.slot = Some(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_ttl(ttl: Option<Duration>) -> CacheEntry {
        CacheEntry::new(
            "key",
            "mode=embedding",
            EntryKind::Query,
            CachePayload::SingleVector(vec![1.0, 0.0]),
            Utc::now(),
            ttl,
        )
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Query".parse::<EntryKind>().unwrap(), EntryKind::Query);
        assert_eq!("document".parse::<EntryKind>().unwrap(), EntryKind::Document);
        assert_eq!("passage".parse::<EntryKind>().unwrap(), EntryKind::Passage);
        assert_eq!("weird".parse::<EntryKind>().unwrap(), EntryKind::Other);
    }

    #[test]
    fn test_ttl_boundary() {
        let entry = entry_with_ttl(Some(Duration::from_secs(2 * 3600)));
        let created = entry.created_at();
        let epsilon = TimeDelta::milliseconds(1);
        let ttl = TimeDelta::hours(2);

        assert!(entry.is_valid_at(created + ttl - epsilon));
        assert!(!entry.is_valid_at(created + ttl));
        assert!(!entry.is_valid_at(created + ttl + epsilon));
    }

    #[test]
    fn test_entry_without_ttl_is_always_valid() {
        let entry = entry_with_ttl(None);
        assert!(entry.expires_at().is_none());
        assert!(entry.is_valid_at(entry.created_at() + TimeDelta::days(3650)));
    }

    #[test]
    fn test_zero_ttl_is_immediately_stale() {
        let entry = entry_with_ttl(Some(Duration::ZERO));
        assert!(!entry.is_valid_at(entry.created_at()));
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let entry = entry_with_ttl(Some(Duration::from_secs(u64::MAX)));
        assert!(entry.is_valid());
    }

    #[test]
    fn test_record_hit() {
        let mut entry = entry_with_ttl(None);
        entry.record_hit();
        entry.record_hit();
        assert_eq!(entry.hit_count(), 2);
    }

    #[test]
    fn test_validate_rejects_out_of_range_slot() {
        let entry = entry_with_ttl(None).with_slot(5, 2);

        assert!(entry.validate(6, Some(2)).is_ok());
        assert!(matches!(
            entry.validate(5, Some(2)),
            Err(DomainError::CorruptEntry { .. })
        ));
        assert!(entry.validate(6, Some(3)).is_err());
    }

    #[test]
    fn test_validate_rejects_malformed_batch() {
        let entry = CacheEntry::new(
            "batch",
            "p",
            EntryKind::Other,
            CachePayload::VectorBatch(vec![vec![1.0], vec![1.0, 2.0]]),
            Utc::now(),
            None,
        );

        assert!(entry.validate(0, None).is_err());
    }

    #[test]
    fn test_payload_serialization_is_tagged() {
        let json = serde_json::to_string(&CachePayload::CompletionText("hi".into())).unwrap();
        assert_eq!(json, r#"{"type":"completion_text","value":"hi"}"#);
    }

    #[test]
    fn test_entry_round_trips_with_subsecond_timestamp() {
        let entry = entry_with_ttl(Some(Duration::from_secs(60)))
            .with_query_text("q")
            .with_slot(0, 2);

        let json = serde_json::to_string(&entry).unwrap();
        let back: CacheEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(back, entry);
        assert_eq!(back.created_at().timestamp_subsec_nanos(), entry.created_at().timestamp_subsec_nanos());
    }
}
