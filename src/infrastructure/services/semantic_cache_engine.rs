//! Semantic cache engine
//!
//! Serves exact fingerprint hits first, then embedding-similarity hits from
//! entries in the same partition. Provider calls run outside the state lock
//! and are bounded by a timeout; a failed or timed-out call is an error, never
//! a miss and never a hit.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::domain::cache::FingerprintGenerator;
use crate::domain::embedding::{normalized, EmbeddingProvider, EmbeddingRequest};
use crate::domain::llm::{LlmProvider, LlmRequest, LlmResponse};
use crate::domain::semantic_cache::{
    CacheEntry, CacheHit, CacheLookup, CacheMiss, CacheMode, CachePayload, CacheRequest,
    CacheStats, Decision, DecisionOutcome, EntryKind, IndexConfig, MatchType, MissReason,
    SemanticCacheConfig, SimilarityDecider, SlotResolver, VectorIndex,
};
use crate::domain::DomainError;
use crate::infrastructure::index::{snapshot, AdaptiveIndex};
use crate::infrastructure::semantic_cache::{
    estimate_tokens, CompactionReport, EntrySnapshot, EntryStore, LoadReport, SnapshotStore,
    StatsRecorder,
};

#[derive(Debug)]
struct EngineState {
    entries: EntryStore,
    index: AdaptiveIndex,
    last_load: LoadReport,
}

impl EngineState {
    fn empty(config: &IndexConfig) -> Self {
        Self {
            entries: EntryStore::new(),
            index: AdaptiveIndex::new(config.clone()),
            last_load: LoadReport::default(),
        }
    }

    fn exact_hit(&mut self, key: &str, now: DateTime<Utc>) -> Option<CacheHit> {
        let entry = self.entries.get_valid(key, now)?;

        let hit = CacheHit {
            key: key.to_string(),
            payload: entry.payload().clone(),
            match_type: MatchType::Exact,
            similarity: 1.0,
            kind: entry.kind(),
        };

        self.entries.record_hit(key);
        Some(hit)
    }

    fn semantic_hit(&mut self, decision: &Decision) -> Option<CacheHit> {
        let key = decision.key.as_deref()?;
        let entry = self.entries.get(key)?;

        let hit = CacheHit {
            key: key.to_string(),
            payload: entry.payload().clone(),
            match_type: MatchType::Semantic,
            similarity: decision.similarity.unwrap_or_default(),
            kind: entry.kind(),
        };

        self.entries.record_hit(key);
        Some(hit)
    }

    fn assembled_hit(
        &mut self,
        key: &str,
        kind: EntryKind,
        items: Vec<Option<Vec<f32>>>,
        sources: &[Option<String>],
        similarity: f32,
    ) -> CacheHit {
        for source in sources.iter().flatten() {
            self.entries.record_hit(source);
        }

        CacheHit {
            key: key.to_string(),
            payload: CachePayload::VectorBatch(items.into_iter().flatten().collect()),
            match_type: MatchType::Assembled,
            similarity,
            kind,
        }
    }

    /// Index `vector` and store the entry bound to its slot
    ///
    /// A replacement whose vector equals the one already indexed under the
    /// same key keeps that slot instead of leaving it dead.
    fn insert_indexed(&mut self, entry: CacheEntry, vector: &[f32]) -> Result<(), DomainError> {
        if let Some(slot) = self.indexed_slot(entry.key(), vector) {
            self.entries.put(entry.with_slot(slot, vector.len()));
            return Ok(());
        }

        let initialising = self.index.is_empty() && self.index.dimension().is_none();
        let slot = self.index.insert(vector)?;

        if initialising {
            info!(dimension = vector.len(), "Vector index initialised");
        }

        let entry = entry.with_slot(slot, vector.len());
        if let Some(previous) = self.entries.put(entry) {
            debug!(
                key = previous.key(),
                dead_slot = ?previous.slot(),
                "Replaced cache entry"
            );
        }

        Ok(())
    }

    fn indexed_slot(&self, key: &str, vector: &[f32]) -> Option<usize> {
        let slot = self.entries.get(key)?.slot()?;
        let stored = self.index.reconstruct(slot)?;
        let unit = normalized(vector).ok()?;

        (stored == unit).then_some(slot)
    }
}

/// One raw nearest-neighbour result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub slot: usize,
    pub similarity: f32,
    /// Entry owning the slot; `None` for dead slots
    pub key: Option<String>,
    /// Whether the owning entry is still within its TTL
    pub valid: bool,
}

/// Value returned by a cache-through call
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult<T> {
    pub value: T,
    /// Served from the cache without calling the upstream provider
    pub cached: bool,
    pub match_type: Option<MatchType>,
    pub similarity: Option<f32>,
}

impl<T> CachedResult<T> {
    fn from_cache(value: T, hit: &CacheHit) -> Self {
        Self {
            value,
            cached: true,
            match_type: Some(hit.match_type),
            similarity: Some(hit.similarity),
        }
    }

    fn fresh(value: T) -> Self {
        Self {
            value,
            cached: false,
            match_type: None,
            similarity: None,
        }
    }
}

/// Similarity-indexed cache in front of embedding and completion providers
#[derive(Debug)]
pub struct SemanticCacheEngine {
    config: SemanticCacheConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    snapshots: Option<SnapshotStore>,
    fingerprints: FingerprintGenerator,
    decider: SimilarityDecider,
    state: RwLock<EngineState>,
    stats: StatsRecorder,
}

impl SemanticCacheEngine {
    pub fn new(config: SemanticCacheConfig, embedding_provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            decider: SimilarityDecider::new(config.thresholds),
            state: RwLock::new(EngineState::empty(&config.index)),
            fingerprints: FingerprintGenerator::new(),
            stats: StatsRecorder::new(),
            snapshots: None,
            embedding_provider,
            config,
        }
    }

    /// Attach the snapshot pair used by `save` and `load`
    pub fn with_snapshots(mut self, snapshots: SnapshotStore) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn config(&self) -> &SemanticCacheConfig {
        &self.config
    }

    /// Look up a request, bounding provider calls by the configured timeout
    pub async fn get(&self, request: &CacheRequest) -> Result<CacheLookup, DomainError> {
        self.get_with_timeout(request, self.config.provider_timeout())
            .await
    }

    /// Look up a request, bounding provider calls by `limit`
    pub async fn get_with_timeout(
        &self,
        request: &CacheRequest,
        limit: Duration,
    ) -> Result<CacheLookup, DomainError> {
        validate_request(request)?;

        let class = request.class();
        let result = if request.is_batch() {
            self.lookup_batch(request, limit).await
        } else {
            self.lookup_single(request, limit).await
        };

        match &result {
            Ok(CacheLookup::Hit(hit)) => {
                let (tokens, cost) = self.estimated_savings(request, &hit.payload);
                self.stats
                    .record_hit(class, hit.match_type, hit.similarity, tokens, cost);
            }
            Ok(CacheLookup::Miss(miss)) => {
                debug!(key = %miss.key, reason = ?miss.reason, "Cache miss");
                self.stats.record_miss(class);
            }
            Err(e) => {
                warn!("Cache lookup could not complete: {}", e);
                self.stats.record_lookup_error(class);
            }
        }

        result
    }

    async fn lookup_single(
        &self,
        request: &CacheRequest,
        limit: Duration,
    ) -> Result<CacheLookup, DomainError> {
        let fingerprint = self.fingerprints.fingerprint(request);

        {
            let mut state = self.state.write().await;
            if let Some(hit) = state.exact_hit(fingerprint.key(), Utc::now()) {
                debug!(key = fingerprint.key(), "Exact cache hit");
                return Ok(CacheLookup::Hit(hit));
            }
        }

        if !self.config.similarity_enabled {
            return Ok(CacheLookup::Miss(CacheMiss::new(
                fingerprint.into_key(),
                MissReason::SimilarityDisabled,
            )));
        }

        let text = request.input().as_single().unwrap_or_default().to_string();
        let vector = self
            .embed_texts(self.vectorize_request(request, vec![text]), limit)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::internal("provider returned no vector"))?;

        let mut state = self.state.write().await;
        let decision = self.decide(
            &state,
            &vector,
            request.kind(),
            fingerprint.partition(),
            Utc::now(),
        )?;

        if decision.is_hit() {
            if let Some(hit) = state.semantic_hit(&decision) {
                return Ok(CacheLookup::Hit(hit));
            }
        }

        if decision.outcome == DecisionOutcome::Expired {
            self.stats.record_stale_candidate();
        }

        let mut miss = CacheMiss::new(fingerprint.into_key(), miss_reason(&decision));
        miss.best_similarity = decision.similarity;
        miss.query_vector = Some(vector);

        Ok(CacheLookup::Miss(miss))
    }

    /// Whole-batch key, then per-item keys, then one provider call for the
    /// unresolved items and a similarity decision per item
    async fn lookup_batch(
        &self,
        request: &CacheRequest,
        limit: Duration,
    ) -> Result<CacheLookup, DomainError> {
        let fingerprint = self.fingerprints.fingerprint(request);
        let items = self.fingerprints.item_fingerprints(request);

        let mut resolved: Vec<Option<Vec<f32>>> = vec![None; items.len()];
        let mut sources: Vec<Option<String>> = vec![None; items.len()];

        {
            let mut state = self.state.write().await;
            let now = Utc::now();

            if let Some(hit) = state.exact_hit(fingerprint.key(), now) {
                debug!(key = fingerprint.key(), "Exact batch cache hit");
                return Ok(CacheLookup::Hit(hit));
            }

            for (idx, item) in items.iter().enumerate() {
                let cached = state
                    .entries
                    .get_valid(item.key(), now)
                    .and_then(|entry| entry.payload().as_vector())
                    .map(<[f32]>::to_vec);

                if cached.is_some() {
                    resolved[idx] = cached;
                    sources[idx] = Some(item.key().to_string());
                }
            }

            if resolved.iter().all(Option::is_some) {
                let hit = state.assembled_hit(
                    fingerprint.key(),
                    request.kind(),
                    resolved,
                    &sources,
                    1.0,
                );
                return Ok(CacheLookup::Hit(hit));
            }
        }

        let mut miss = CacheMiss::new(fingerprint.key(), MissReason::NotCached);
        miss.item_vectors = vec![None; items.len()];

        if !self.config.similarity_enabled {
            miss.reason = MissReason::SimilarityDisabled;
            miss.resolved_items = resolved;
            return Ok(CacheLookup::Miss(miss));
        }

        let inputs = request.input().items();
        let missing: Vec<usize> = (0..items.len()).filter(|&i| resolved[i].is_none()).collect();
        let texts = missing.iter().map(|&i| inputs[i].to_string()).collect();

        let vectors = self
            .embed_texts(self.vectorize_request(request, texts), limit)
            .await?;

        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut lowest = 1.0f32;

        for (idx, vector) in missing.into_iter().zip(vectors) {
            let decision = self.decide(&state, &vector, request.kind(), items[idx].partition(), now)?;

            let matched = decision
                .is_hit()
                .then(|| decision.key.as_deref())
                .flatten()
                .and_then(|key| state.entries.get(key))
                .and_then(|entry| entry.payload().as_vector())
                .map(<[f32]>::to_vec);

            match matched {
                Some(payload) => {
                    resolved[idx] = Some(payload);
                    sources[idx] = decision.key.clone();
                    lowest = lowest.min(decision.similarity.unwrap_or_default());
                }
                None => {
                    if decision.outcome == DecisionOutcome::Expired {
                        self.stats.record_stale_candidate();
                    }
                    miss.item_vectors[idx] = Some(vector);
                }
            }
        }

        if resolved.iter().all(Option::is_some) {
            let hit = state.assembled_hit(fingerprint.key(), request.kind(), resolved, &sources, lowest);
            return Ok(CacheLookup::Hit(hit));
        }

        miss.resolved_items = resolved;
        Ok(CacheLookup::Miss(miss))
    }

    fn decide(
        &self,
        state: &EngineState,
        vector: &[f32],
        kind: EntryKind,
        partition: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision, DomainError> {
        let resolver: &dyn SlotResolver = &state.entries;

        match self.decider.decide(
            vector,
            kind,
            partition,
            &state.index,
            resolver,
            self.config.search_candidates,
            now,
        ) {
            // The index holds one dimension; other dimensions have no candidates
            Err(DomainError::DimensionMismatch { expected, actual }) => {
                debug!(expected, actual, "Query dimension differs from index");
                Ok(Decision::no_candidate(self.decider.threshold_for(kind)))
            }
            other => other,
        }
    }

    /// Store a provider result
    ///
    /// `vector` is the search vector. Completion entries require it; single
    /// embedding entries default to their own payload vector. Batches are
    /// indexed by their item vectors and reject an explicit `vector`; they are
    /// stored under the batch key and decomposed into per-item entries.
    /// Everything is validated before the index is touched.
    pub async fn put(
        &self,
        request: &CacheRequest,
        payload: CachePayload,
        vector: Option<Vec<f32>>,
    ) -> Result<String, DomainError> {
        validate_request(request)?;
        payload.check_shape().map_err(DomainError::validation)?;

        let fingerprint = self.fingerprints.fingerprint(request);
        let kind = request.kind();
        let ttl = self.config.ttl.ttl_for(kind);
        let now = Utc::now();

        let mut state = self.state.write().await;

        match (request.mode(), &payload) {
            (CacheMode::Completion, CachePayload::CompletionText(_)) => {
                let vector = vector.ok_or_else(|| {
                    DomainError::validation("completion entries need the prompt vector")
                })?;
                check_insertable(&state.index, &[vector.as_slice()])?;

                let entry = CacheEntry::new(
                    fingerprint.key(),
                    fingerprint.partition(),
                    kind,
                    payload.clone(),
                    now,
                    ttl,
                )
                .with_query_text(request.input().as_single().unwrap_or_default());
                state.insert_indexed(entry, &vector)?;
            }
            (CacheMode::Embedding, CachePayload::SingleVector(own)) if !request.is_batch() => {
                let vector = vector.unwrap_or_else(|| own.clone());
                check_insertable(&state.index, &[vector.as_slice()])?;

                let entry = CacheEntry::new(
                    fingerprint.key(),
                    fingerprint.partition(),
                    kind,
                    payload.clone(),
                    now,
                    ttl,
                )
                .with_query_text(request.input().as_single().unwrap_or_default());
                state.insert_indexed(entry, &vector)?;
            }
            (CacheMode::Embedding, CachePayload::VectorBatch(vectors)) if request.is_batch() => {
                if vector.is_some() {
                    return Err(DomainError::validation(
                        "batch entries are indexed by their item vectors",
                    ));
                }

                let inputs = request.input().items();
                if vectors.len() != inputs.len() {
                    return Err(DomainError::validation(format!(
                        "batch payload holds {} vectors for {} inputs",
                        vectors.len(),
                        inputs.len()
                    )));
                }

                let rows: Vec<&[f32]> = vectors.iter().map(Vec::as_slice).collect();
                check_insertable(&state.index, &rows)?;

                let items = self.fingerprints.item_fingerprints(request);
                for ((item, text), vector) in items.iter().zip(&inputs).zip(vectors) {
                    let own = CachePayload::SingleVector(vector.clone());

                    let unchanged = state
                        .entries
                        .get_valid(item.key(), now)
                        .is_some_and(|entry| entry.payload() == &own && entry.slot().is_some());
                    if unchanged {
                        continue;
                    }

                    let entry = CacheEntry::new(
                        item.key(),
                        item.partition(),
                        kind,
                        own,
                        now,
                        ttl,
                    )
                    .with_query_text(*text);
                    state.insert_indexed(entry, vector)?;
                }

                let batch = CacheEntry::new(
                    fingerprint.key(),
                    fingerprint.partition(),
                    kind,
                    payload.clone(),
                    now,
                    ttl,
                );
                state.entries.put(batch);
            }
            _ => {
                return Err(DomainError::validation(format!(
                    "{} payload does not fit a {} {} request",
                    payload.variant_name(),
                    if request.is_batch() { "batch" } else { "single" },
                    request.mode().as_str()
                )));
            }
        }

        debug!(key = fingerprint.key(), kind = %kind, "Cached entry stored");
        Ok(fingerprint.into_key())
    }

    /// Embed through the cache: serve hits, call the provider for misses only
    pub async fn embed_with_cache(
        &self,
        request: &CacheRequest,
    ) -> Result<CachedResult<CachePayload>, DomainError> {
        if request.mode() != CacheMode::Embedding {
            return Err(DomainError::validation(
                "embed_with_cache needs an embedding request",
            ));
        }

        let miss = match self.get(request).await? {
            CacheLookup::Hit(hit) => return Ok(CachedResult::from_cache(hit.payload.clone(), &hit)),
            CacheLookup::Miss(miss) => miss,
        };

        let limit = self.config.provider_timeout();

        let payload = if request.is_batch() {
            let inputs = request.input().items();
            let mut vectors: Vec<Option<Vec<f32>>> = (0..inputs.len())
                .map(|i| {
                    miss.resolved_items
                        .get(i)
                        .cloned()
                        .flatten()
                        .or_else(|| miss.item_vectors.get(i).cloned().flatten())
                })
                .collect();

            let missing: Vec<usize> = (0..inputs.len()).filter(|&i| vectors[i].is_none()).collect();
            if !missing.is_empty() {
                let texts = missing.iter().map(|&i| inputs[i].to_string()).collect();
                let fresh = self.embed_texts(request.embedding_request(texts), limit).await?;
                for (idx, vector) in missing.into_iter().zip(fresh) {
                    vectors[idx] = Some(vector);
                }
            }

            CachePayload::VectorBatch(vectors.into_iter().flatten().collect())
        } else {
            let vector = match miss.query_vector {
                Some(vector) => vector,
                None => {
                    let text = request.input().as_single().unwrap_or_default().to_string();
                    self.embed_texts(request.embedding_request(vec![text]), limit)
                        .await?
                        .into_iter()
                        .next()
                        .ok_or_else(|| DomainError::internal("provider returned no vector"))?
                }
            };
            CachePayload::SingleVector(vector)
        };

        self.put(request, payload.clone(), None).await?;
        Ok(CachedResult::fresh(payload))
    }

    /// Complete through the cache, keyed by the user prompt of `llm_request`
    /// and partitioned by the rest of the conversation
    ///
    /// When the cache cannot be consulted the provider answers directly and
    /// nothing is stored.
    pub async fn complete_with_cache(
        &self,
        provider: &dyn LlmProvider,
        model: &str,
        llm_request: LlmRequest,
    ) -> Result<CachedResult<String>, DomainError> {
        let request = CacheRequest::from_llm_request(model, &llm_request);
        let limit = self.config.provider_timeout();

        let prompt = request.input().as_single().unwrap_or_default().to_string();
        if prompt.is_empty() {
            let response = self.chat(provider, model, llm_request, limit).await?;
            return Ok(CachedResult::fresh(response.content().to_string()));
        }

        let miss = match self.get(&request).await {
            Ok(CacheLookup::Hit(hit)) => {
                let text = hit
                    .payload
                    .as_text()
                    .ok_or_else(|| {
                        DomainError::corrupt_entry(&hit.key, "completion entry holds no text")
                    })?
                    .to_string();
                return Ok(CachedResult::from_cache(text, &hit));
            }
            Ok(CacheLookup::Miss(miss)) => miss,
            Err(e) if e.is_provider_failure() => {
                let response = self.chat(provider, model, llm_request, limit).await?;
                return Ok(CachedResult::fresh(response.content().to_string()));
            }
            Err(e) => return Err(e),
        };

        let response = self.chat(provider, model, llm_request, limit).await?;
        let text = response.content().to_string();

        let vector = match miss.query_vector {
            Some(vector) => vector,
            None => self
                .embed_texts(self.vectorize_request(&request, vec![prompt]), limit)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| DomainError::internal("provider returned no vector"))?,
        };

        self.put(&request, CachePayload::CompletionText(text.clone()), Some(vector))
            .await?;

        Ok(CachedResult::fresh(text))
    }

    /// Raw nearest neighbours, dead and expired slots included
    pub async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>, DomainError> {
        let state = self.state.read().await;
        let now = Utc::now();

        let hits = state.index.search(vector, k)?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let owner = state.entries.resolve(hit.slot, now);
                SearchResult {
                    slot: hit.slot,
                    similarity: hit.similarity(),
                    key: owner.map(|o| o.key.to_string()),
                    valid: owner.is_some_and(|o| o.valid),
                }
            })
            .collect())
    }

    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.stats.snapshot();
        let state = self.state.read().await;

        stats.total_entries = state.entries.len();
        stats.index_size = state.index.len();
        stats.dead_slots = state.entries.dead_slots(state.index.len());
        stats.dimension = state.index.dimension();
        stats.clustered = state.index.is_clustered();
        stats.skipped_on_load = state.last_load.skipped;

        stats
    }

    /// Write both snapshot artifacts while holding the state exclusively
    pub async fn save(&self) -> Result<(), DomainError> {
        let store = self.snapshot_store()?;
        let state = self.state.write().await;

        let index = snapshot::encode(&state.index)?;
        let entries = EntrySnapshot::new(state.index.dimension(), state.entries.sorted_entries())
            .with_index(&index);
        let count = entries.entries.len();

        store.write(index, &entries).await?;

        info!(
            entries = count,
            vectors = state.index.len(),
            "Semantic cache snapshot saved"
        );

        Ok(())
    }

    /// Replace the state with the persisted snapshot
    ///
    /// Any failure leaves an empty cache and returns `false`; see
    /// [`Self::load_report`] for the reason.
    pub async fn load(&self) -> bool {
        let mut state = self.state.write().await;

        let (restored, report) = match self.read_snapshot().await {
            Ok(Some((restored, report))) => {
                info!(
                    entries = report.entries,
                    vectors = report.vectors,
                    skipped = report.skipped,
                    "Semantic cache snapshot loaded"
                );
                (restored, report)
            }
            Ok(None) => {
                info!("No semantic cache snapshot found, starting empty");
                (
                    EngineState::empty(&self.config.index),
                    LoadReport::failed("no snapshot found"),
                )
            }
            Err(e) => {
                warn!("Failed to load semantic cache snapshot, starting empty: {}", e);
                (
                    EngineState::empty(&self.config.index),
                    LoadReport::failed(e.to_string()),
                )
            }
        };

        *state = restored;
        state.last_load = report;
        state.last_load.loaded
    }

    /// Outcome of the most recent `load`
    pub async fn load_report(&self) -> LoadReport {
        self.state.read().await.last_load.clone()
    }

    async fn read_snapshot(&self) -> Result<Option<(EngineState, LoadReport)>, DomainError> {
        let store = self.snapshot_store()?;

        let Some(files) = store.read().await? else {
            return Ok(None);
        };

        files.entries.check_index(&files.index)?;
        let index = snapshot::decode(&files.index, self.config.index.clone())?;

        if files.entries.dimension != index.dimension() {
            return Err(DomainError::persistence(format!(
                "entry snapshot dimension {:?} disagrees with index dimension {:?}",
                files.entries.dimension,
                index.dimension()
            )));
        }

        let mut state = EngineState {
            entries: EntryStore::new(),
            last_load: LoadReport::default(),
            index,
        };

        let index_len = state.index.len();
        let dimension = state.index.dimension();
        let mut skipped = 0;

        for entry in files.entries.entries {
            if let Err(e) = state.entries.restore(entry, index_len, dimension) {
                warn!("Skipping cache entry on load: {}", e);
                skipped += 1;
            }
        }

        let report = LoadReport {
            loaded: true,
            entries: state.entries.len(),
            vectors: index_len,
            skipped,
            failure: None,
        };

        Ok(Some((state, report)))
    }

    /// Drop expired entries; their slots stay dead until `compact`
    pub async fn expire(&self) -> usize {
        let removed = self.state.write().await.entries.expire(Utc::now());

        self.stats.record_expired(removed);
        info!(removed, "Expired stale cache entries");

        removed
    }

    /// Expire, then rebuild the index from live entries only
    ///
    /// Slots are renumbered; earlier `search` results no longer apply.
    pub async fn compact(&self) -> Result<CompactionReport, DomainError> {
        let mut state = self.state.write().await;

        let expired_removed = state.entries.expire(Utc::now());
        self.stats.record_expired(expired_removed);

        let index_size_before = state.index.len();
        let mut index = AdaptiveIndex::new(self.config.index.clone());
        let mut bindings = Vec::new();

        for (slot, key) in state.entries.slotted_keys() {
            let Some(vector) = state.index.reconstruct(slot) else {
                continue;
            };
            bindings.push((key, index.insert(&vector)?));
        }

        state.entries.clear_slots();
        for (key, slot) in &bindings {
            state.entries.rebind(key, *slot);
        }
        state.index = index;

        let report = CompactionReport {
            expired_removed,
            live_entries: state.entries.len(),
            index_size_before,
            index_size_after: state.index.len(),
        };

        info!(
            expired = report.expired_removed,
            reclaimed = report.reclaimed_slots(),
            vectors = report.index_size_after,
            "Semantic cache compacted"
        );

        Ok(report)
    }

    /// Drop every entry and vector; statistics are kept
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.index = AdaptiveIndex::new(self.config.index.clone());

        info!("Semantic cache cleared");
    }

    fn snapshot_store(&self) -> Result<&SnapshotStore, DomainError> {
        self.snapshots
            .as_ref()
            .ok_or_else(|| DomainError::configuration("no snapshot location configured"))
    }

    /// Provider request that yields the search vector for `texts`
    fn vectorize_request(&self, request: &CacheRequest, texts: Vec<String>) -> EmbeddingRequest {
        match request.mode() {
            CacheMode::Embedding => request.embedding_request(texts),
            CacheMode::Completion => {
                let embedding_request = EmbeddingRequest::batch(texts);
                match &self.config.embedding_model {
                    Some(model) => embedding_request.with_model(model),
                    None => embedding_request,
                }
            }
        }
    }

    async fn embed_texts(
        &self,
        request: EmbeddingRequest,
        limit: Duration,
    ) -> Result<Vec<Vec<f32>>, DomainError> {
        let expected = request.input().len();
        let provider = self.embedding_provider.provider_name();

        let response = match timeout(limit, self.embedding_provider.embed(request)).await {
            Ok(result) => result?,
            Err(_) => return Err(DomainError::timeout(provider, limit.as_millis() as u64)),
        };

        let vectors = response.into_ordered_vectors();
        if vectors.len() != expected {
            return Err(DomainError::provider(
                provider,
                format!("expected {} embeddings, got {}", expected, vectors.len()),
            ));
        }

        Ok(vectors)
    }

    async fn chat(
        &self,
        provider: &dyn LlmProvider,
        model: &str,
        request: LlmRequest,
        limit: Duration,
    ) -> Result<LlmResponse, DomainError> {
        match timeout(limit, provider.chat(model, request)).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::timeout(
                provider.provider_name(),
                limit.as_millis() as u64,
            )),
        }
    }

    fn estimated_savings(&self, request: &CacheRequest, payload: &CachePayload) -> (u64, f64) {
        let input_tokens: u64 = request
            .input()
            .items()
            .into_iter()
            .map(estimate_tokens)
            .sum();

        let (tokens, price) = match request.mode() {
            CacheMode::Embedding => (input_tokens, self.config.cost.embedding_per_1k_tokens),
            CacheMode::Completion => (
                input_tokens + payload.as_text().map(estimate_tokens).unwrap_or_default(),
                self.config.cost.completion_per_1k_tokens,
            ),
        };

        (tokens, tokens as f64 / 1000.0 * price)
    }
}

fn validate_request(request: &CacheRequest) -> Result<(), DomainError> {
    if request.is_batch() && request.input().is_empty() {
        return Err(DomainError::validation("batch request has no inputs"));
    }

    if request.is_batch() && request.mode() == CacheMode::Completion {
        return Err(DomainError::validation(
            "completion requests take a single prompt",
        ));
    }

    Ok(())
}

fn miss_reason(decision: &Decision) -> MissReason {
    match decision.outcome {
        DecisionOutcome::Expired => MissReason::Expired,
        DecisionOutcome::BelowThreshold => MissReason::BelowThreshold,
        DecisionOutcome::Hit | DecisionOutcome::NoCandidate => MissReason::NotCached,
    }
}

/// Fail before any insertion if one of `vectors` could not be indexed
fn check_insertable(index: &AdaptiveIndex, vectors: &[&[f32]]) -> Result<(), DomainError> {
    let expected = index.dimension().or_else(|| vectors.first().map(|v| v.len()));

    for vector in vectors {
        if let Some(expected) = expected {
            if vector.len() != expected {
                return Err(DomainError::dimension_mismatch(expected, vector.len()));
            }
        }
        normalized(vector)?;
    }

    Ok(())
}
