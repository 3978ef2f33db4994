//! Retrieval
//!
//! Semantic search over stored vectors and the keyword/semantic hybrid merger.

pub mod hybrid;
pub mod semantic;

pub use hybrid::{merge_results, HybridResult, HybridSearchEngine, HybridSearchOutcome, MatchType};
pub use semantic::{collect_semantic_matches, SemanticSearchResult};
