//! LLM client abstraction: a single Ollama-shaped generation backend with
//! batch execution and a clause-function cache layered on top.

mod batch;
mod cache;
mod client;
mod types;

pub use batch::{BatchConfig, BatchExecutor, BatchQueryResult, BatchedQuery, BatchedQueryResults, DEFAULT_MAX_PARALLEL};
pub use cache::{CacheKey, CacheStats, ClauseFunctionCache};
pub use client::{BoxStream, ClientConfig, LLMClient, OllamaClient};
pub use types::{GenerateOptions, PerformanceMetrics, StreamEvent};
