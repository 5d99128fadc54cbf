use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::scoring::Difficulty,
    dto::validation::validate_level_id,
    state::matches::{
        GameplayModifier, MatchChange, MatchState, PlaySong, PlayerOption, SelectedSong,
    },
};

/// Maximum number of players listed in one match.
const MAX_PLAYERS: u64 = 64;

/// Snapshot of a match as sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchSnapshot {
    /// Match identifier.
    pub id: Uuid,
    /// Players in roster order.
    pub players: Vec<Uuid>,
    /// Selected song, if any.
    pub selected_song: Option<SelectedSong>,
    /// Serialized name of the selected characteristic.
    pub selected_characteristic: Option<String>,
    /// Selected difficulty.
    pub selected_difficulty: Option<Difficulty>,
    /// Number of changes applied so far.
    pub version: u64,
}

impl From<&MatchState> for MatchSnapshot {
    fn from(state: &MatchState) -> Self {
        Self {
            id: state.id(),
            players: state.players().collect(),
            selected_song: state.selected_song().cloned(),
            selected_characteristic: state
                .selected_characteristic()
                .map(|c| c.serialized_name.clone()),
            selected_difficulty: state.selected_difficulty(),
            version: state.version(),
        }
    }
}

/// Payload used to open a new match.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateMatchRequest {
    /// Initial roster.
    #[validate(length(max = MAX_PLAYERS))]
    #[serde(default)]
    pub players: Vec<Uuid>,
}

/// Partial update of a match.
///
/// An omitted field is left unchanged and an explicit `null` clears it.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct UpdateMatchRequest {
    /// Replacement roster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<Uuid>>,
    /// Song to select; `null` clears the whole selection.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    #[schema(value_type = Option<SelectedSong>, nullable)]
    pub selected_song: Option<Option<SelectedSong>>,
    /// Characteristic to select, by serialized name.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    #[schema(value_type = Option<String>, nullable)]
    pub selected_characteristic: Option<Option<String>>,
    /// Difficulty to select.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    #[schema(value_type = Option<Difficulty>, nullable)]
    pub selected_difficulty: Option<Option<Difficulty>>,
}

impl Validate for UpdateMatchRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(players) = &self.players {
            if players.len() as u64 > MAX_PLAYERS {
                let mut err = ValidationError::new("players_length");
                err.message = Some(format!("at most {MAX_PLAYERS} players per match").into());
                errors.add("players", err);
            }
        }

        if let Some(Some(song)) = &self.selected_song {
            if let Err(e) = validate_level_id(&song.level_id) {
                errors.add("selected_song", e);
            }
            if song.characteristics.is_empty() {
                errors.add(
                    "selected_song",
                    ValidationError::new("song_without_characteristics"),
                );
            }
        }

        if let Some(Some(name)) = &self.selected_characteristic {
            if name.trim().is_empty() {
                errors.add(
                    "selected_characteristic",
                    ValidationError::new("characteristic_empty"),
                );
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl From<UpdateMatchRequest> for MatchChange {
    fn from(request: UpdateMatchRequest) -> Self {
        Self {
            players: request.players,
            selected_song: request.selected_song,
            selected_characteristic: request.selected_characteristic,
            selected_difficulty: request.selected_difficulty,
        }
    }
}

/// Ask players to start the selected level.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct PlayRequest {
    /// Players to address; every player of the match when omitted.
    #[serde(default)]
    #[validate(length(min = 1, max = MAX_PLAYERS))]
    pub targets: Option<Vec<Uuid>>,
    /// Gameplay modifiers to enable.
    #[serde(default)]
    pub modifiers: BTreeSet<GameplayModifier>,
    /// Player settings to enforce.
    #[serde(default)]
    pub player_settings: BTreeSet<PlayerOption>,
}

/// Outcome of a play command.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayResponse {
    /// Command as sent to the players.
    pub command: PlaySong,
    /// Targets the command was queued for; disconnected players are skipped.
    pub delivered: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_and_null_fields_are_distinguished() {
        let request: UpdateMatchRequest =
            serde_json::from_str(r#"{"selected_characteristic":null}"#).unwrap();

        assert_eq!(request.selected_characteristic, Some(None));
        assert_eq!(request.selected_song, None);
        assert_eq!(request.selected_difficulty, None);

        let change = MatchChange::from(request);
        assert_eq!(change.selected_characteristic, Some(None));
        assert!(change.players.is_none());
    }

    #[test]
    fn difficulty_uses_scoring_labels() {
        let request: UpdateMatchRequest =
            serde_json::from_str(r#"{"selected_difficulty":"EXPERT_PLUS"}"#).unwrap();
        assert_eq!(request.selected_difficulty, Some(Some(Difficulty::ExpertPlus)));
    }

    #[test]
    fn song_with_bad_level_id_is_rejected() {
        let request = UpdateMatchRequest {
            selected_song: Some(Some(SelectedSong {
                level_id: "custom_level_zz".into(),
                name: "Broken".into(),
                characteristics: Vec::new(),
            })),
            ..Default::default()
        };

        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("selected_song"));
    }

    #[test]
    fn empty_target_list_is_rejected() {
        let request = PlayRequest {
            targets: Some(Vec::new()),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }
}
