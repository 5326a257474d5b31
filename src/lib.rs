//! # conflict-core
//!
//! Core pipeline for contract clause conflict detection: claim extraction,
//! deterministic candidate generation, and LLM-adjudicated conflicts between
//! clause pairs.
//!
//! ## Core components
//!
//! - **LLM Client**: a single abstraction over an Ollama-shaped generation
//!   endpoint, unary and streaming, with bounded-concurrency batch execution
//!   layered on top.
//! - **Claim Extractor**: turns clause prose into structured, normalized
//!   claims.
//! - **Conflict Graph Builder**: deterministic rules over claims, for the
//!   claim-based pipeline.
//! - **Conflict Judge**: focused LLM adjudication of a single claim pair.
//! - **Multi-Tier Candidate Generator** / **Pair Adjudicator**: the hybrid
//!   and accurate pipelines' clause-pair candidate source and batched
//!   classification stage.
//! - **Orchestrator**: sequences either pipeline variant and exposes the
//!   interactive streaming adapters.
//!
//! ## Example
//!
//! ```rust,ignore
//! use conflict_core::{Orchestrator, RunOptions, Strategy, InMemoryConflictStore, OllamaClient, ClientConfig};
//! use std::sync::Arc;
//!
//! let client = Arc::new(OllamaClient::new(ClientConfig::new("http://localhost:11434")));
//! let store = Arc::new(InMemoryConflictStore::new());
//! let orchestrator = Orchestrator::new(client, store);
//! let options = RunOptions::new(Strategy::Hybrid, "llama3");
//! // let result = orchestrator.run_conflict_detection(&clauses, &options).await?;
//! ```

pub mod adjudicator;
pub mod candidates;
pub mod cancellation;
pub mod claims;
pub mod config;
pub mod error;
pub mod graph;
pub mod judge;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod prompts;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adjudicator::{AdjudicatorOptions, PairAdjudicator};
pub use candidates::{
    classify_clause_function, clause_function_cached, functions_compatible, generate_candidates,
    ClusterTopic, GenerationStats, KeywordTopicClusterer, TopicClusterer,
};
pub use cancellation::CancellationToken;
pub use claims::{is_non_substantive, ClaimExtractor};
pub use config::{RunOptions, Strategy, StrategyOptions};
pub use error::{Error, Result};
pub use graph::{build_candidate_pairs, GraphCandidate};
pub use judge::ConflictJudge;
pub use llm::{
    BatchConfig, BatchExecutor, BatchQueryResult, BatchedQuery, BatchedQueryResults, BoxStream,
    CacheKey, CacheStats, ClauseFunctionCache, ClientConfig, GenerateOptions, LLMClient,
    OllamaClient, PerformanceMetrics, StreamEvent, DEFAULT_MAX_PARALLEL,
};
pub use model::{
    CandidatePair, Claim, Classification, Clause, ClauseFunction, ClauseId, Conflict, Evidence,
    Modality, Provenance, Severity, Topic, ValueType,
};
pub use orchestrator::streaming::{stream_all_vs_all, stream_one_to_n, stream_pair_compare, PairResult, SseEvent, SseStream};
pub use orchestrator::{clause_set_version_id, Orchestrator, PhaseStats, RunResult};
pub use store::{ConflictStore, InMemoryConflictStore};
