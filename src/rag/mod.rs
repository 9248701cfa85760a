//! Physio-RAG: retrieval of physiological correction rules.
//!
//! The rule corpus is a small YAML data set. Retrieval ranks the rules that
//! apply to a biochemical profile, either by embedding similarity or by
//! keyword overlap, and turns the top hits into correction directives.

pub mod corpus;
pub mod embeddings;
pub mod factory;
pub mod retriever;

pub use corpus::{PhysioRule, RuleCorpus, RulePredicate};
pub use embeddings::{EmbeddingProvider, HashingEmbedder, OpenAiEmbedder};
pub use factory::{create_embedding_provider, create_retriever};
pub use retriever::{
    FallbackRetriever, KeywordRetriever, RankingOptions, RetrievalOutcome, RuleRetriever,
    SemanticRetriever,
};
