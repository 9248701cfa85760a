//! Rule retrieval strategies.
//!
//! [`KeywordRetriever`] and [`SemanticRetriever`] implement the same
//! [`RuleRetriever`] capability. [`FallbackRetriever`] runs a semantic
//! retriever and switches to keywords when the embedding provider fails or
//! exceeds its time bound.
//!
//! Both modes score only rules whose predicate holds for the profile, drop
//! scores below the configured minimum, and rank by score descending with
//! ties broken by the rule's declared order.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::OnceCell;

use super::corpus::{PhysioRule, RuleCorpus};
use super::embeddings::{cosine_similarity, Embedding, EmbeddingProvider};
use crate::config::{RetrievalMode, RetrievalSettings};
use crate::types::{BiochemicalProfile, CorrectionDirective};
use crate::utilities::errors::RetrievalError;
use crate::utilities::string_utils::word_set;

/// Directives for one profile plus how they were obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalOutcome {
    pub directives: Vec<CorrectionDirective>,
    /// Mode that actually produced the directives.
    pub mode: RetrievalMode,
    /// Why semantic retrieval was abandoned, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// The Physio-RAG retrieval capability.
#[async_trait]
pub trait RuleRetriever: Send + Sync {
    /// Mode this retriever is configured for.
    fn mode(&self) -> RetrievalMode;

    async fn retrieve(&self, profile: &BiochemicalProfile)
        -> Result<RetrievalOutcome, RetrievalError>;
}

/// Ranking limits shared by every retriever.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingOptions {
    pub top_k: usize,
    pub min_relevance: f64,
}

impl RankingOptions {
    pub fn new(top_k: usize, min_relevance: f64) -> Self {
        Self {
            top_k,
            min_relevance,
        }
    }
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self::from(&RetrievalSettings::default())
    }
}

impl From<&RetrievalSettings> for RankingOptions {
    fn from(settings: &RetrievalSettings) -> Self {
        Self::new(settings.top_k, settings.min_relevance)
    }
}

/// Filter, order and truncate scored rules.
fn rank(mut scored: Vec<(&PhysioRule, f64)>, options: RankingOptions) -> Vec<CorrectionDirective> {
    scored.retain(|(_, score)| *score >= options.min_relevance);
    scored.sort_by(|(ra, a), (rb, b)| {
        b.partial_cmp(a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| ra.order.cmp(&rb.order))
            .then_with(|| ra.id.cmp(&rb.id))
    });
    scored.truncate(options.top_k);
    scored
        .into_iter()
        .map(|(rule, score)| rule.directive(score))
        .collect()
}

// ---------------------------------------------------------------------------
// Keyword mode
// ---------------------------------------------------------------------------

/// Relevance = fraction of profile keywords (skin type, pH band, temperature
/// band) that occur as words in the rule text.
#[derive(Debug, Clone)]
pub struct KeywordRetriever {
    corpus: Arc<RuleCorpus>,
    options: RankingOptions,
}

impl KeywordRetriever {
    pub fn new(corpus: Arc<RuleCorpus>, options: RankingOptions) -> Self {
        Self { corpus, options }
    }

    /// Keyword overlap of one rule, in [0, 1].
    pub fn score(rule: &PhysioRule, profile: &BiochemicalProfile) -> f64 {
        let words = word_set(&rule.text());
        let keywords = profile.keywords();
        let hits = keywords.iter().filter(|k| words.contains(**k)).count();
        hits as f64 / keywords.len() as f64
    }

    /// Synchronous ranking; never fails.
    pub fn rank(&self, profile: &BiochemicalProfile) -> Vec<CorrectionDirective> {
        let scored = self
            .corpus
            .applicable(profile)
            .map(|rule| (rule, Self::score(rule, profile)))
            .collect();
        rank(scored, self.options)
    }
}

#[async_trait]
impl RuleRetriever for KeywordRetriever {
    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Keyword
    }

    async fn retrieve(
        &self,
        profile: &BiochemicalProfile,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        Ok(RetrievalOutcome {
            directives: self.rank(profile),
            mode: RetrievalMode::Keyword,
            fallback_reason: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Semantic mode
// ---------------------------------------------------------------------------

/// Relevance = cosine similarity between the profile rendering and each rule
/// text, clamped to [0, 1]. Rule embeddings are computed once and reused.
pub struct SemanticRetriever {
    corpus: Arc<RuleCorpus>,
    provider: Arc<dyn EmbeddingProvider>,
    options: RankingOptions,
    timeout: Duration,
    rule_embeddings: OnceCell<Vec<Embedding>>,
}

impl SemanticRetriever {
    pub fn new(
        corpus: Arc<RuleCorpus>,
        provider: Arc<dyn EmbeddingProvider>,
        options: RankingOptions,
        timeout: Duration,
    ) -> Self {
        Self {
            corpus,
            provider,
            options,
            timeout,
            rule_embeddings: OnceCell::new(),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    async fn embed_rules(&self) -> Result<&Vec<Embedding>, RetrievalError> {
        self.rule_embeddings
            .get_or_try_init(|| async {
                let texts: Vec<String> = self.corpus.list().iter().map(|r| r.text()).collect();
                let vectors = self.provider.embed_batch(&texts).await?;
                log::debug!(
                    "Embedded {} rules with {} provider",
                    vectors.len(),
                    self.provider.name()
                );
                Ok::<_, RetrievalError>(vectors)
            })
            .await
    }

    async fn rank_semantic(
        &self,
        profile: &BiochemicalProfile,
    ) -> Result<Vec<CorrectionDirective>, RetrievalError> {
        if self.corpus.is_empty() {
            return Ok(Vec::new());
        }
        let rule_vectors = self.embed_rules().await?;
        let query = self.provider.embed(&profile.render_text()).await?;
        let scored = self
            .corpus
            .list()
            .iter()
            .zip(rule_vectors.iter())
            .filter(|(rule, _)| rule.applies_to(profile))
            .map(|(rule, vector)| {
                let similarity = cosine_similarity(&query, vector).unwrap_or(0.0);
                (rule, similarity.clamp(0.0, 1.0))
            })
            .collect();
        Ok(rank(scored, self.options))
    }
}

#[async_trait]
impl RuleRetriever for SemanticRetriever {
    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Semantic
    }

    async fn retrieve(
        &self,
        profile: &BiochemicalProfile,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        let directives = tokio::time::timeout(self.timeout, self.rank_semantic(profile))
            .await
            .map_err(|_| RetrievalError::Timeout(self.timeout.as_millis() as u64))??;
        Ok(RetrievalOutcome {
            directives,
            mode: RetrievalMode::Semantic,
            fallback_reason: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Semantic retrieval with keyword fallback. Never returns an error.
pub struct FallbackRetriever {
    semantic: SemanticRetriever,
    keyword: KeywordRetriever,
}

impl FallbackRetriever {
    pub fn new(semantic: SemanticRetriever, keyword: KeywordRetriever) -> Self {
        Self { semantic, keyword }
    }
}

#[async_trait]
impl RuleRetriever for FallbackRetriever {
    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Semantic
    }

    async fn retrieve(
        &self,
        profile: &BiochemicalProfile,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        match self.semantic.retrieve(profile).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                log::warn!("Semantic retrieval unavailable ({err}); using keyword mode");
                let mut outcome = self.keyword.retrieve(profile).await?;
                outcome.fallback_reason = Some(err.to_string());
                Ok(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::embeddings::HashingEmbedder;
    use crate::types::SkinType;
    use crate::utilities::errors::EmbeddingError;
    use proptest::prelude::*;

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        fn name(&self) -> &str {
            "slow"
        }

        async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![1.0])
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        fn name(&self) -> &str {
            "broken"
        }

        async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
            Err(EmbeddingError::InvalidResponse("no vectors".into()))
        }
    }

    fn corpus() -> Arc<RuleCorpus> {
        Arc::new(RuleCorpus::builtin().unwrap())
    }

    fn dry_profile() -> BiochemicalProfile {
        BiochemicalProfile::new(5.5, SkinType::Dry, 36.5)
    }

    fn semantic(provider: Arc<dyn EmbeddingProvider>, timeout_ms: u64) -> SemanticRetriever {
        SemanticRetriever::new(
            corpus(),
            provider,
            RankingOptions::default(),
            Duration::from_millis(timeout_ms),
        )
    }

    fn fallback(provider: Arc<dyn EmbeddingProvider>, timeout_ms: u64) -> FallbackRetriever {
        FallbackRetriever::new(
            semantic(provider, timeout_ms),
            KeywordRetriever::new(corpus(), RankingOptions::default()),
        )
    }

    #[tokio::test]
    async fn test_dry_profile_ranks_fixative_boost_first_in_both_modes() {
        let keyword = KeywordRetriever::new(corpus(), RankingOptions::default());
        let outcome = keyword.retrieve(&dry_profile()).await.unwrap();
        assert_eq!(outcome.directives[0].rule_id, "dry-skin-fixative-boost");

        let semantic = semantic(Arc::new(HashingEmbedder::default()), 1000);
        let outcome = semantic.retrieve(&dry_profile()).await.unwrap();
        assert_eq!(outcome.mode, RetrievalMode::Semantic);
        assert_eq!(outcome.directives[0].rule_id, "dry-skin-fixative-boost");
        assert!((0.0..=1.0).contains(&outcome.directives[0].relevance_score));
    }

    #[tokio::test]
    async fn test_keyword_scores_are_overlap_fractions() {
        let keyword = KeywordRetriever::new(corpus(), RankingOptions::new(10, 0.0));
        let profile = BiochemicalProfile::new(4.2, SkinType::Oily, 37.6);
        let directives = keyword.rank(&profile);
        assert!(!directives.is_empty());
        for d in &directives {
            let thirds = d.relevance_score * 3.0;
            assert!((thirds - thirds.round()).abs() < 1e-12, "{}", d.relevance_score);
        }
        let scores: Vec<f64> = directives.iter().map(|d| d.relevance_score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_keyword_mode() {
        let retriever = fallback(Arc::new(SlowEmbedder), 20);
        let outcome = retriever.retrieve(&dry_profile()).await.unwrap();
        assert_eq!(outcome.mode, RetrievalMode::Keyword);
        assert!(outcome.fallback_reason.unwrap().contains("timed out after 20 ms"));

        let expected = KeywordRetriever::new(corpus(), RankingOptions::default()).rank(&dry_profile());
        assert_eq!(outcome.directives, expected);
        assert_eq!(outcome.directives[0].rule_id, "dry-skin-fixative-boost");
        assert!((outcome.directives[0].relevance_score - 1.0 / 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back() {
        let retriever = fallback(Arc::new(BrokenEmbedder), 1000);
        let outcome = retriever.retrieve(&dry_profile()).await.unwrap();
        assert_eq!(outcome.mode, RetrievalMode::Keyword);
        assert!(outcome.fallback_reason.unwrap().contains("no vectors"));
    }

    #[tokio::test]
    async fn test_bare_semantic_reports_timeout() {
        let err = semantic(Arc::new(SlowEmbedder), 10)
            .retrieve(&dry_profile())
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Timeout(10)));
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_nothing() {
        let empty = Arc::new(RuleCorpus::default());
        let keyword = KeywordRetriever::new(empty.clone(), RankingOptions::default());
        assert!(keyword.retrieve(&dry_profile()).await.unwrap().directives.is_empty());

        let semantic = SemanticRetriever::new(
            empty,
            Arc::new(SlowEmbedder),
            RankingOptions::default(),
            Duration::from_millis(10),
        );
        assert!(semantic.retrieve(&dry_profile()).await.unwrap().directives.is_empty());
    }

    #[tokio::test]
    async fn test_top_k_and_threshold() {
        let profile = BiochemicalProfile::new(4.2, SkinType::Oily, 37.6);
        let one = KeywordRetriever::new(corpus(), RankingOptions::new(1, 0.0)).rank(&profile);
        assert_eq!(one.len(), 1);
        let strict = KeywordRetriever::new(corpus(), RankingOptions::new(10, 0.99)).rank(&profile);
        assert!(strict.iter().all(|d| d.relevance_score >= 0.99));
    }

    #[tokio::test]
    async fn test_semantic_ranking_ignores_storage_order() {
        let profile = BiochemicalProfile::new(4.2, SkinType::Oily, 37.6);
        let forward = SemanticRetriever::new(
            corpus(),
            Arc::new(HashingEmbedder::default()),
            RankingOptions::new(10, 0.0),
            Duration::from_secs(1),
        );
        let mut reversed_rules = corpus().list().to_vec();
        reversed_rules.reverse();
        let reversed = SemanticRetriever::new(
            Arc::new(RuleCorpus::from_rules(reversed_rules, "test").unwrap()),
            Arc::new(HashingEmbedder::default()),
            RankingOptions::new(10, 0.0),
            Duration::from_secs(1),
        );
        assert_eq!(
            forward.retrieve(&profile).await.unwrap(),
            reversed.retrieve(&profile).await.unwrap()
        );
    }

    fn arb_profile() -> impl Strategy<Value = BiochemicalProfile> {
        (
            3.0f64..9.0,
            prop_oneof![Just(SkinType::Dry), Just(SkinType::Normal), Just(SkinType::Oily)],
            35.0f64..38.0,
        )
            .prop_map(|(ph, skin, t)| BiochemicalProfile::new(ph, skin, t))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_keyword_ranking_stable_under_reordering(
            rules in Just(RuleCorpus::builtin().unwrap().list().to_vec()).prop_shuffle(),
            profile in arb_profile(),
        ) {
            let shuffled = KeywordRetriever::new(
                Arc::new(RuleCorpus::from_rules(rules, "shuffled").unwrap()),
                RankingOptions::new(10, 0.0),
            );
            let reference = KeywordRetriever::new(corpus(), RankingOptions::new(10, 0.0));
            prop_assert_eq!(shuffled.rank(&profile), reference.rank(&profile));
        }
    }
}
