//! Request fingerprinting
//!
//! A fingerprint is `<input digest>:<partition>`. The digest covers the input
//! text(s); the partition is the sorted list of every other attribute that
//! changes what the provider returns. Two requests share a key exactly when
//! they agree on all of them.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::domain::semantic_cache::CacheRequest;

/// Parameters for cache key generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheKeyParams {
    /// Digest of the primary input
    pub primary: String,
    /// Secondary components, kept sorted by name
    pub components: BTreeMap<String, String>,
}

impl CacheKeyParams {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            components: BTreeMap::new(),
        }
    }

    /// Adds a component; the value is escaped so it cannot forge a delimiter
    pub fn with_component(mut self, key: impl Into<String>, value: impl AsRef<str>) -> Self {
        self.components
            .insert(key.into(), escape_component(value.as_ref()));
        self
    }

    /// `k=v` pairs joined by `:`, in name order
    pub fn partition(&self) -> String {
        self.components
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn generate(&self) -> String {
        if self.components.is_empty() {
            return self.primary.clone();
        }

        format!("{}:{}", self.primary, self.partition())
    }
}

/// A request's exact-match key and its similarity partition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    key: String,
    partition: String,
}

impl Fingerprint {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn into_key(self) -> String {
        self.key
    }
}

/// Deterministic fingerprint generator
#[derive(Debug, Clone, Default)]
pub struct FingerprintGenerator;

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Key for the request as a whole (one key per ordered batch)
    pub fn fingerprint(&self, request: &CacheRequest) -> Fingerprint {
        let items = request.input().items();

        let primary = if request.input().is_batch() {
            batch_digest(&items)
        } else {
            single_digest(items.first().copied().unwrap_or_default())
        };

        self.build(primary, request)
    }

    /// Per-item keys, identical to what a single-item request would produce
    pub fn item_fingerprints(&self, request: &CacheRequest) -> Vec<Fingerprint> {
        request
            .input()
            .items()
            .into_iter()
            .map(|text| self.build(single_digest(text), request))
            .collect()
    }

    fn build(&self, primary: String, request: &CacheRequest) -> Fingerprint {
        let params = Self::partition_params(primary, request);

        Fingerprint {
            key: params.generate(),
            partition: params.partition(),
        }
    }

    fn partition_params(primary: String, request: &CacheRequest) -> CacheKeyParams {
        let dims = request
            .dimensions()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "auto".to_string());
        let encoding = request
            .encoding_format()
            .map(|e| e.trim().to_lowercase())
            .unwrap_or_else(|| "-".to_string());

        CacheKeyParams::new(primary)
            .with_component("mode", request.mode().as_str())
            .with_component("kind", request.kind().as_str())
            .with_component("dims", dims)
            .with_component("enc", encoding)
            .with_component("user", request.user().unwrap_or("-"))
            .with_component("model", request.model().unwrap_or("-"))
            .with_component("meta", metadata_digest(request.metadata()))
    }
}

fn single_digest(text: &str) -> String {
    format!("s{}", hex::encode(Sha256::digest(text.as_bytes())))
}

/// Each item is length-prefixed so `["ab","c"]` and `["a","bc"]` differ
fn batch_digest(items: &[&str]) -> String {
    let mut hasher = Sha256::new();

    for item in items {
        hasher.update((item.len() as u64).to_le_bytes());
        hasher.update(item.as_bytes());
    }

    format!("b{}-{}", items.len(), hex::encode(hasher.finalize()))
}

fn metadata_digest(metadata: &BTreeMap<String, String>) -> String {
    if metadata.is_empty() {
        return "-".to_string();
    }

    let mut hasher = Sha256::new();

    for (k, v) in metadata {
        hasher.update((k.len() as u64).to_le_bytes());
        hasher.update(k.as_bytes());
        hasher.update((v.len() as u64).to_le_bytes());
        hasher.update(v.as_bytes());
    }

    hex::encode(&hasher.finalize()[..16])
}

fn escape_component(value: &str) -> String {
    value.replace('%', "%25").replace(':', "%3A").replace('=', "%3D")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::semantic_cache::EntryKind;
    use proptest::prelude::*;

    fn generator() -> FingerprintGenerator {
        FingerprintGenerator::new()
    }

    fn base() -> CacheRequest {
        CacheRequest::embedding("What are the best practices for Python?")
            .with_kind(EntryKind::Query)
            .with_dimensions(3072)
            .with_user("test-user")
    }

    #[test]
    fn test_components_are_sorted() {
        let params = CacheKeyParams::new("digest")
            .with_component("zebra", "z")
            .with_component("apple", "a")
            .with_component("mango", "m");

        assert_eq!(params.generate(), "digest:apple=a:mango=m:zebra=z");
        assert_eq!(params.partition(), "apple=a:mango=m:zebra=z");
    }

    #[test]
    fn test_component_values_are_escaped() {
        let params = CacheKeyParams::new("d").with_component("user", "a:b=c%");
        assert_eq!(params.generate(), "d:user=a%3Ab%3Dc%25");
    }

    #[test]
    fn test_identical_requests_share_key() {
        assert_eq!(
            generator().fingerprint(&base()),
            generator().fingerprint(&base())
        );
    }

    #[test]
    fn test_each_attribute_changes_key() {
        let reference = generator().fingerprint(&base());
        let variants = vec![
            CacheRequest::embedding("What are the best practices for Python programming?")
                .with_kind(EntryKind::Query)
                .with_dimensions(3072)
                .with_user("test-user"),
            base().with_kind(EntryKind::Document),
            base().with_dimensions(1536),
            base().with_user("different-user"),
            base().with_encoding_format("base64"),
            base().with_model("text-embedding-3-small"),
            base().with_metadata("tenant", "acme"),
        ];

        for variant in variants {
            assert_ne!(generator().fingerprint(&variant), reference, "{:?}", variant);
        }
    }

    #[test]
    fn test_partition_excludes_text() {
        let a = generator().fingerprint(&base());
        let b = generator().fingerprint(
            &CacheRequest::embedding("Explain Python idioms")
                .with_kind(EntryKind::Query)
                .with_dimensions(3072)
                .with_user("test-user"),
        );

        assert_ne!(a.key(), b.key());
        assert_eq!(a.partition(), b.partition());
    }

    #[test]
    fn test_batch_grouping_is_unambiguous() {
        let left = CacheRequest::embedding_batch(vec!["ab".into(), "c".into()]);
        let right = CacheRequest::embedding_batch(vec!["a".into(), "bc".into()]);

        assert_ne!(generator().fingerprint(&left), generator().fingerprint(&right));
    }

    #[test]
    fn test_batch_order_matters() {
        let forward = CacheRequest::embedding_batch(vec!["x".into(), "y".into()]);
        let reverse = CacheRequest::embedding_batch(vec!["y".into(), "x".into()]);

        assert_ne!(
            generator().fingerprint(&forward),
            generator().fingerprint(&reverse)
        );
    }

    #[test]
    fn test_item_keys_match_single_requests() {
        let batch = CacheRequest::embedding_batch(vec!["x".into(), "y".into()]).with_user("u1");
        let items = generator().item_fingerprints(&batch);

        let x = generator().fingerprint(&CacheRequest::embedding("x").with_user("u1"));
        let y = generator().fingerprint(&CacheRequest::embedding("y").with_user("u1"));

        assert_eq!(items, vec![x, y]);
        assert_ne!(generator().fingerprint(&batch).key(), items[0].key());
    }

    #[test]
    fn test_single_request_item_key_is_its_key() {
        let request = base();
        assert_eq!(
            generator().item_fingerprints(&request),
            vec![generator().fingerprint(&request)]
        );
    }

    #[test]
    fn test_metadata_order_is_irrelevant() {
        let a = base().with_metadata("a", "1").with_metadata("b", "2");
        let b = base().with_metadata("b", "2").with_metadata("a", "1");

        assert_eq!(generator().fingerprint(&a), generator().fingerprint(&b));
    }

    #[test]
    fn test_completion_and_embedding_never_collide() {
        let embedding = CacheRequest::embedding("hello").with_kind(EntryKind::Completion);
        let completion = CacheRequest::completion("hello");

        assert_ne!(
            generator().fingerprint(&embedding),
            generator().fingerprint(&completion)
        );
    }

    proptest! {
        #[test]
        fn prop_fingerprint_is_deterministic(text in ".*", user in "[a-z:%=]{0,8}") {
            let a = CacheRequest::embedding(text.clone()).with_user(user.clone());
            let b = CacheRequest::embedding(text).with_user(user);
            prop_assert_eq!(generator().fingerprint(&a), generator().fingerprint(&b));
        }

        #[test]
        fn prop_different_text_different_key(a in ".{0,32}", b in ".{0,32}") {
            prop_assume!(a != b);
            let ka = generator().fingerprint(&CacheRequest::embedding(a));
            let kb = generator().fingerprint(&CacheRequest::embedding(b));
            prop_assert_ne!(ka.key(), kb.key());
            prop_assert_eq!(ka.partition(), kb.partition());
        }

        #[test]
        fn prop_different_user_different_key(u1 in "[a-z:=%]{1,8}", u2 in "[a-z:=%]{1,8}") {
            prop_assume!(u1 != u2);
            let a = generator().fingerprint(&CacheRequest::embedding("same").with_user(u1));
            let b = generator().fingerprint(&CacheRequest::embedding("same").with_user(u2));
            prop_assert_ne!(a, b);
        }
    }
}
