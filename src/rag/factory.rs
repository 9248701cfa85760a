//! Factory functions for building retrievers from settings.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingProviderKind, RetrievalMode, Settings};
use crate::rag::corpus::RuleCorpus;
use crate::rag::embeddings::{EmbeddingProvider, HashingEmbedder, OpenAiEmbedder};
use crate::rag::retriever::{
    FallbackRetriever, KeywordRetriever, RankingOptions, RuleRetriever, SemanticRetriever,
};
use crate::utilities::errors::EmbeddingError;

/// Create the configured embedding provider.
///
/// # Errors
/// Returns [`EmbeddingError::NotConfigured`] when the OpenAI provider is
/// selected without an API key.
pub fn create_embedding_provider(
    settings: &Settings,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match settings.embedding.provider {
        EmbeddingProviderKind::Hashing => {
            Ok(Arc::new(HashingEmbedder::new(settings.embedding.dimensions)))
        }
        EmbeddingProviderKind::OpenAi => {
            Ok(Arc::new(OpenAiEmbedder::from_settings(&settings.embedding)?))
        }
    }
}

/// Create the retriever selected by `settings.retrieval.mode`.
///
/// Semantic mode is always wrapped in keyword fallback. If the embedding
/// provider cannot even be constructed, keyword mode is used from the start.
pub fn create_retriever(settings: &Settings, corpus: Arc<RuleCorpus>) -> Arc<dyn RuleRetriever> {
    let options = RankingOptions::from(&settings.retrieval);
    let keyword = KeywordRetriever::new(corpus.clone(), options);

    match settings.retrieval.mode {
        RetrievalMode::Keyword => Arc::new(keyword),
        RetrievalMode::Semantic => match create_embedding_provider(settings) {
            Ok(provider) => {
                log::info!(
                    "Semantic retrieval with {} embeddings (timeout {} ms, top_k {})",
                    provider.name(),
                    settings.retrieval.embedding_timeout_ms,
                    options.top_k
                );
                let semantic = SemanticRetriever::new(
                    corpus,
                    provider,
                    options,
                    Duration::from_millis(settings.retrieval.embedding_timeout_ms),
                );
                Arc::new(FallbackRetriever::new(semantic, keyword))
            }
            Err(err) => {
                log::warn!("{err}; using keyword retrieval");
                Arc::new(keyword)
            }
        },
    }
}
