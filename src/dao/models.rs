use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::dao::scoring::Difficulty;

/// Persisted copy of a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Match identifier.
    pub id: Uuid,
    /// Players in roster order.
    pub players: Vec<Uuid>,
    /// Song selected for the match.
    pub selected_song: Option<SongEntity>,
    /// Serialized name of the selected characteristic.
    pub selected_characteristic: Option<String>,
    /// Selected difficulty.
    pub selected_difficulty: Option<Difficulty>,
    /// Number of changes applied to the match.
    pub version: u64,
    /// Last time this match was written.
    pub updated_at: SystemTime,
}

/// Song selected for a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SongEntity {
    /// Level identifier as the game knows it.
    pub level_id: String,
    /// Display name.
    pub name: String,
    /// Characteristics offered by the song.
    pub characteristics: Vec<CharacteristicEntity>,
}

/// One characteristic of a song.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CharacteristicEntity {
    /// Name the game uses for the characteristic.
    pub serialized_name: String,
    /// Difficulties offered for it.
    pub difficulties: Vec<Difficulty>,
}

/// Where a recorded attempt stands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Score row created upstream, value not submitted yet.
    Open,
    /// Value accepted upstream.
    Submitted,
    /// Submission failed; the slot was released anyway.
    SubmitFailed,
}

/// Audit record of a qualifier attempt. Credentials are never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttemptEntity {
    /// Player the attempt belongs to.
    pub subject: String,
    /// Song hash without client prefix.
    pub song_hash: String,
    /// Difficulty played.
    pub difficulty: Difficulty,
    /// Remote key of the level.
    pub level_key: i64,
    /// Remote score row; unique per attempt.
    pub score_id: i64,
    /// Submitted value, once known.
    pub score: Option<i64>,
    /// Current status.
    pub status: AttemptStatus,
    /// When the score row was created.
    pub opened_at: SystemTime,
    /// When the submission finished, successfully or not.
    pub closed_at: Option<SystemTime>,
}
