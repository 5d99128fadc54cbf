//! Domain values exchanged with the remote scoring authority.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Opaque identifier of a player as known by the scoring authority.
pub type SubjectId = String;

/// Prefix the game puts in front of custom song hashes.
const CUSTOM_LEVEL_PREFIX: &str = "custom_level_";

/// Difficulty labels understood by the scoring authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    /// Index 0.
    Easy,
    /// Index 1.
    Normal,
    /// Index 2.
    Hard,
    /// Index 3.
    Expert,
    /// Index 4.
    ExpertPlus,
}

impl Difficulty {
    /// Every difficulty in ascending index order.
    pub const ALL: [Difficulty; 5] = [
        Difficulty::Easy,
        Difficulty::Normal,
        Difficulty::Hard,
        Difficulty::Expert,
        Difficulty::ExpertPlus,
    ];

    /// Map the numeric difficulty used by game clients onto a label.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    /// Numeric difficulty used by game clients.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Label used by the scoring authority (`EXPERT_PLUS`, ...).
    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Normal => "NORMAL",
            Difficulty::Hard => "HARD",
            Difficulty::Expert => "EXPERT",
            Difficulty::ExpertPlus => "EXPERT_PLUS",
        }
    }

    /// Parse a label as returned by the scoring authority.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.label() == label)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A song hash paired with a difficulty; the cache key for level keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LevelRef {
    song_hash: String,
    difficulty: Difficulty,
}

impl LevelRef {
    /// Build a level reference, stripping the `custom_level_` prefix game clients send.
    pub fn new(level_id: impl AsRef<str>, difficulty: Difficulty) -> Self {
        let level_id = level_id.as_ref();
        let song_hash = level_id
            .strip_prefix(CUSTOM_LEVEL_PREFIX)
            .unwrap_or(level_id)
            .to_string();
        Self {
            song_hash,
            difficulty,
        }
    }

    /// Song hash without any client prefix.
    pub fn song_hash(&self) -> &str {
        &self.song_hash
    }

    /// Difficulty of the level.
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }
}

impl fmt::Display for LevelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.song_hash, self.difficulty)
    }
}

/// Row identifier the scoring authority uses for a (song, difficulty) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelKey(pub i64);

impl fmt::Display for LevelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a score row created upstream for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreId(pub i64);

impl fmt::Display for ScoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One entry of the remote level catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Song and difficulty described by the entry.
    pub level: LevelRef,
    /// Remote key for that pair.
    pub key: LevelKey,
}

/// Bearer credential issued to a subject.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Subject the token was issued for.
    pub subject: SubjectId,
    /// Opaque bearer token.
    pub token: String,
    /// Instant after which the token must not be used.
    pub expires_at: OffsetDateTime,
}

impl Credential {
    /// A credential is usable strictly before its expiry instant.
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("subject", &self.subject)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Remote operations, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoringOperation {
    /// Credential issuance.
    Authenticate,
    /// Bulk level catalog download.
    FetchCatalog,
    /// Remaining attempt count for a level.
    QueryRemainingAttempts,
    /// Score row creation when an attempt starts.
    CreateScore,
    /// Score value submission when an attempt ends.
    SubmitScore,
}

impl ScoringOperation {
    /// Stable name used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            ScoringOperation::Authenticate => "authenticate",
            ScoringOperation::FetchCatalog => "fetch_catalog",
            ScoringOperation::QueryRemainingAttempts => "query_remaining_attempts",
            ScoringOperation::CreateScore => "create_score",
            ScoringOperation::SubmitScore => "submit_score",
        }
    }
}

impl fmt::Display for ScoringOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
