//! Record Types
//!
//! Value types exchanged between the engine and the record-owning
//! collaborators: the closed set of record kinds, content lookups, keyword
//! hits, and link rows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Relation name used for contradiction links.
pub const RELATION_CONTRADICTS: &str = "contradicts";

// ============================================================================
// RecordKind
// ============================================================================

/// The three kinds of knowledge records the engine embeds and searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Free-form notes.
    Idea,
    /// Commitments the team has made.
    Decision,
    /// Reinforced heuristics.
    Learning,
}

impl RecordKind {
    /// Convert to the storage string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Idea => "idea",
            RecordKind::Decision => "decision",
            RecordKind::Learning => "learning",
        }
    }

    /// Prefix carried by ids minted for this kind (e.g. `d_3f2a...`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            RecordKind::Idea => "i_",
            RecordKind::Decision => "d_",
            RecordKind::Learning => "l_",
        }
    }

    /// All kinds, in backfill order.
    pub fn all() -> &'static [RecordKind] {
        &[RecordKind::Idea, RecordKind::Decision, RecordKind::Learning]
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idea" => Ok(RecordKind::Idea),
            "decision" => Ok(RecordKind::Decision),
            "learning" => Ok(RecordKind::Learning),
            other => Err(CoreError::validation(format!(
                "unknown record kind: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Collaborator value types
// ============================================================================

/// Content and creation time of a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordContent {
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A record that has no stored embedding yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecord {
    pub id: String,
    pub content: String,
}

/// A single keyword (full-text) search match.
///
/// `score` is a rank score where higher means a better match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordHit {
    pub id: String,
    pub kind: RecordKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub score: f64,
}

/// Which end of a link the queried record sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDirection {
    /// The queried record is the link source.
    Outgoing,
    /// The queried record is the link target.
    Incoming,
}

/// The record on the other end of a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedRecord {
    pub id: String,
    pub kind: RecordKind,
    pub relation: String,
    pub direction: LinkDirection,
}
