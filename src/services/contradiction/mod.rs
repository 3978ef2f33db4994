//! Contradiction Detection
//!
//! Candidate retrieval, pairwise analyzers, and the auto-link step that
//! records confirmed conflicts as `contradicts` links.

pub mod analyzer;
pub mod analyzer_llm;
pub mod auto_link;
pub mod candidates;

pub use analyzer::{
    ContradictionAnalyzer, ContradictionFinding, ContradictionResult, ContradictionType,
    HeuristicAnalyzer, RecordForAnalysis,
};
pub use analyzer_llm::LlmContradictionAnalyzer;
pub use auto_link::{AutoCheckOutcome, AutoLinkPolicy, AutoLinker};
pub use candidates::{CandidateFinder, CandidateSource, ContradictionCandidate, ContradictionOptions};
