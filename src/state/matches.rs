use std::{collections::BTreeSet, sync::Arc, time::SystemTime};

use dashmap::{DashMap, mapref::entry::Entry};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::sync::{MatchSyncBroadcaster, SyncMessage};
use crate::dao::{
    models::{CharacteristicEntity, MatchEntity, SongEntity},
    scoring::{Difficulty, LevelRef},
};

/// Identifier of a match.
pub type MatchId = Uuid;
/// Identifier of a player taking part in matches.
pub type PlayerId = Uuid;

/// Failures raised when a match change or command is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    /// No live match carries this id.
    #[error("match {0} not found")]
    NotFound(MatchId),
    /// The selected song does not offer this characteristic.
    #[error("characteristic `{0}` is not offered by the selected song")]
    UnknownCharacteristic(String),
    /// The selected characteristic does not offer this difficulty.
    #[error("difficulty {difficulty} is not available for characteristic `{characteristic}`")]
    DifficultyNotAvailable {
        /// Characteristic currently selected.
        characteristic: String,
        /// Difficulty that was requested.
        difficulty: Difficulty,
    },
    /// A characteristic was chosen before any song.
    #[error("no song is selected")]
    NoSongSelected,
    /// A difficulty was chosen (or a song started) before any characteristic.
    #[error("no characteristic is selected")]
    NoCharacteristicSelected,
    /// A song was started before any difficulty was chosen.
    #[error("no difficulty is selected")]
    NoDifficultySelected,
    /// A play command addressed someone outside the roster.
    #[error("player {player} is not part of match {match_id}")]
    PlayerNotInMatch {
        /// Match that was looked up.
        match_id: MatchId,
        /// Player missing from its roster.
        player: PlayerId,
    },
}

/// One characteristic (game mode) of a song and its playable difficulties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Characteristic {
    /// Name the game uses for the characteristic (`Standard`, `OneSaber`, ...).
    pub serialized_name: String,
    /// Difficulties with a beatmap for this characteristic.
    pub difficulties: Vec<Difficulty>,
}

/// Song picked for a match, with the metadata displayed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SelectedSong {
    /// Level identifier as the game knows it.
    pub level_id: String,
    /// Display name.
    pub name: String,
    /// Characteristics the song offers.
    pub characteristics: Vec<Characteristic>,
}

impl SelectedSong {
    /// Characteristic with the given serialized name.
    pub fn characteristic(&self, serialized_name: &str) -> Option<&Characteristic> {
        self.characteristics
            .iter()
            .find(|c| c.serialized_name == serialized_name)
    }

    /// Level reference used to address the scoring authority.
    pub fn level_ref(&self, difficulty: Difficulty) -> LevelRef {
        LevelRef::new(&self.level_id, difficulty)
    }
}

/// Gameplay modifiers forwarded with a play command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameplayModifier {
    /// Failing does not end the level.
    NoFail,
    /// Bombs are removed.
    NoBombs,
    /// Walls are removed.
    NoObstacles,
    /// Notes can be cut in any direction.
    NoArrows,
    /// Any miss fails the level.
    InstaFail,
    /// Energy behaves like a battery with four lives.
    BatteryEnergy,
    /// Notes fade out before reaching the player.
    GhostNotes,
    /// Arrows fade out before reaching the player.
    DisappearingArrows,
    /// Song plays slower.
    SlowSong,
    /// Song plays faster.
    FastSong,
}

/// Player-side settings forwarded with a play command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlayerOption {
    /// Mirror the map for left-handed play.
    LeftHanded,
    /// Disable light animations.
    StaticLights,
    /// Hide the HUD.
    NoHud,
    /// Show the extended HUD.
    AdvancedHud,
    /// Reduce cut debris.
    ReduceDebris,
}

/// Command asking players to start a level with given settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlaySong {
    /// Match the command belongs to.
    pub match_id: Uuid,
    /// Level identifier as the game knows it.
    pub level_id: String,
    /// Serialized name of the characteristic to play.
    pub characteristic: String,
    /// Difficulty to play.
    pub difficulty: Difficulty,
    /// Gameplay modifiers to enable.
    pub modifiers: BTreeSet<GameplayModifier>,
    /// Player settings to enforce.
    pub player_settings: BTreeSet<PlayerOption>,
}

/// Partial change to a match; `None` leaves a field untouched and
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchChange {
    /// Replacement roster.
    pub players: Option<Vec<PlayerId>>,
    /// Song to select or clear.
    pub selected_song: Option<Option<SelectedSong>>,
    /// Characteristic to select or clear, by serialized name.
    pub selected_characteristic: Option<Option<String>>,
    /// Difficulty to select or clear.
    pub selected_difficulty: Option<Option<Difficulty>>,
}

/// Authoritative state of one match.
///
/// Selections always form a chain: a characteristic belongs to the selected
/// song and a difficulty belongs to the selected characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchState {
    id: MatchId,
    players: IndexSet<PlayerId>,
    selected_song: Option<SelectedSong>,
    selected_characteristic: Option<String>,
    selected_difficulty: Option<Difficulty>,
    version: u64,
}

impl MatchState {
    fn new(id: MatchId, players: impl IntoIterator<Item = PlayerId>) -> Self {
        Self {
            id,
            players: players.into_iter().collect(),
            selected_song: None,
            selected_characteristic: None,
            selected_difficulty: None,
            version: 0,
        }
    }

    /// Rebuild a match from a persisted copy, dropping selections that no
    /// longer chain together.
    pub fn restore(
        id: MatchId,
        players: impl IntoIterator<Item = PlayerId>,
        song: Option<SelectedSong>,
        characteristic: Option<String>,
        difficulty: Option<Difficulty>,
        version: u64,
    ) -> Self {
        let mut state = Self::new(id, players);
        state.version = version;
        state.select_song(song);
        let restored = state
            .select_characteristic(characteristic)
            .and_then(|_| state.select_difficulty(difficulty));
        if let Err(err) = restored {
            warn!(match_id = %id, error = %err, "stored selection no longer valid; dropped");
        }
        state
    }

    /// Match identifier.
    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Players in roster order.
    pub fn players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players.iter().copied()
    }

    /// Whether `player` is part of the roster.
    pub fn has_player(&self, player: &PlayerId) -> bool {
        self.players.contains(player)
    }

    /// Selected song, if any.
    pub fn selected_song(&self) -> Option<&SelectedSong> {
        self.selected_song.as_ref()
    }

    /// Selected characteristic, if any.
    pub fn selected_characteristic(&self) -> Option<&Characteristic> {
        let name = self.selected_characteristic.as_deref()?;
        self.selected_song.as_ref()?.characteristic(name)
    }

    /// Selected difficulty, if any.
    pub fn selected_difficulty(&self) -> Option<Difficulty> {
        self.selected_difficulty
    }

    /// Number of applied changes.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn set_players(&mut self, players: Vec<PlayerId>) -> bool {
        let players: IndexSet<PlayerId> = players.into_iter().collect();
        if players == self.players {
            return false;
        }
        self.players = players;
        true
    }

    /// Picking another song clears the characteristic and difficulty.
    fn select_song(&mut self, song: Option<SelectedSong>) -> bool {
        if song == self.selected_song {
            return false;
        }
        self.selected_song = song;
        self.selected_characteristic = None;
        self.selected_difficulty = None;
        true
    }

    fn select_characteristic(&mut self, name: Option<String>) -> Result<bool, MatchError> {
        if name == self.selected_characteristic {
            return Ok(false);
        }
        if let Some(name) = &name {
            let song = self.selected_song.as_ref().ok_or(MatchError::NoSongSelected)?;
            if song.characteristic(name).is_none() {
                return Err(MatchError::UnknownCharacteristic(name.clone()));
            }
        }
        self.selected_characteristic = name;
        self.selected_difficulty = None;
        Ok(true)
    }

    fn select_difficulty(&mut self, difficulty: Option<Difficulty>) -> Result<bool, MatchError> {
        if difficulty == self.selected_difficulty {
            return Ok(false);
        }
        if let Some(difficulty) = difficulty {
            let characteristic = self
                .selected_characteristic()
                .ok_or(MatchError::NoCharacteristicSelected)?;
            if !characteristic.difficulties.contains(&difficulty) {
                return Err(MatchError::DifficultyNotAvailable {
                    characteristic: characteristic.serialized_name.clone(),
                    difficulty,
                });
            }
        }
        self.selected_difficulty = difficulty;
        Ok(true)
    }

    /// Apply `change` as a whole. On error `self` is untouched; otherwise the
    /// return value tells whether anything changed.
    fn apply(&mut self, change: MatchChange) -> Result<bool, MatchError> {
        let mut next = self.clone();
        let mut changed = false;

        if let Some(players) = change.players {
            changed |= next.set_players(players);
        }
        if let Some(song) = change.selected_song {
            changed |= next.select_song(song);
        }
        if let Some(characteristic) = change.selected_characteristic {
            changed |= next.select_characteristic(characteristic)?;
        }
        if let Some(difficulty) = change.selected_difficulty {
            changed |= next.select_difficulty(difficulty)?;
        }

        if changed {
            next.version += 1;
            *self = next;
        }
        Ok(changed)
    }

    /// Build the play command for the current selection.
    pub fn play_command(
        &self,
        modifiers: BTreeSet<GameplayModifier>,
        player_settings: BTreeSet<PlayerOption>,
    ) -> Result<PlaySong, MatchError> {
        let song = self.selected_song.as_ref().ok_or(MatchError::NoSongSelected)?;
        let characteristic = self
            .selected_characteristic()
            .ok_or(MatchError::NoCharacteristicSelected)?;
        let difficulty = self
            .selected_difficulty
            .ok_or(MatchError::NoDifficultySelected)?;

        Ok(PlaySong {
            match_id: self.id,
            level_id: song.level_id.clone(),
            characteristic: characteristic.serialized_name.clone(),
            difficulty,
            modifiers,
            player_settings,
        })
    }
}

/// Outcome of [`MatchRegistry::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatchUpdate {
    /// State after the change.
    pub state: MatchState,
    /// Whether the change did anything (and was broadcast).
    pub changed: bool,
}

/// Owner of every live match. All mutations go through here and are
/// published on the broadcaster.
pub struct MatchRegistry {
    matches: DashMap<MatchId, MatchState>,
    sync: Arc<MatchSyncBroadcaster>,
}

impl MatchRegistry {
    /// Create an empty registry publishing on `sync`.
    pub fn new(sync: Arc<MatchSyncBroadcaster>) -> Self {
        Self {
            matches: DashMap::new(),
            sync,
        }
    }

    /// Broadcaster this registry publishes on.
    pub fn sync(&self) -> &Arc<MatchSyncBroadcaster> {
        &self.sync
    }

    /// Create a match with no selection and announce it.
    pub fn create(&self, players: Vec<PlayerId>) -> MatchState {
        let state = MatchState::new(Uuid::new_v4(), players);
        let entry = self.matches.entry(state.id).or_insert(state);
        info!(match_id = %entry.id, players = entry.players.len(), "match created");
        self.sync.broadcast(SyncMessage::MatchUpdated(entry.clone()));
        entry.clone()
    }

    /// Put back a match loaded from storage without announcing it. A match
    /// already live in memory wins over its stored copy.
    pub fn restore(&self, state: MatchState) -> bool {
        match self.matches.entry(state.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                debug!(match_id = %state.id, version = state.version, "match restored");
                slot.insert(state);
                true
            }
        }
    }

    /// Snapshot of one match.
    pub fn get(&self, id: MatchId) -> Result<MatchState, MatchError> {
        self.matches
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(MatchError::NotFound(id))
    }

    /// Snapshots of every live match, ordered by id.
    pub fn list(&self) -> Vec<MatchState> {
        let mut matches: Vec<MatchState> = self
            .matches
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by_key(|state| state.id);
        matches
    }

    /// Number of live matches.
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Whether no match is live.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Apply `change` to a match and publish the new snapshot.
    ///
    /// Nothing is published when the change is rejected or is a no-op. The
    /// snapshot is published while the match is still locked, so observers see
    /// the updates of one match in the order they were applied.
    pub fn update(&self, id: MatchId, change: MatchChange) -> Result<MatchUpdate, MatchError> {
        let mut entry = self.matches.get_mut(&id).ok_or(MatchError::NotFound(id))?;
        let changed = entry.apply(change)?;
        let state = entry.clone();

        if changed {
            self.sync.broadcast(SyncMessage::MatchUpdated(state.clone()));
            info!(match_id = %id, version = state.version, "match updated");
        } else {
            debug!(match_id = %id, "match update was a no-op");
        }
        drop(entry);

        Ok(MatchUpdate { state, changed })
    }

    /// Remove a match and announce the deletion.
    pub fn delete(&self, id: MatchId) -> Result<MatchState, MatchError> {
        let (_, state) = self.matches.remove(&id).ok_or(MatchError::NotFound(id))?;
        self.sync.notify_deleted(id);
        info!(match_id = %id, "match deleted");
        Ok(state)
    }

    /// Send `command` to `targets`, which must all belong to its match.
    pub fn send_play_command(
        &self,
        targets: &[PlayerId],
        command: PlaySong,
    ) -> Result<usize, MatchError> {
        let state = self.get(command.match_id)?;
        if let Some(stranger) = targets.iter().find(|player| !state.has_player(player)) {
            return Err(MatchError::PlayerNotInMatch {
                match_id: state.id,
                player: *stranger,
            });
        }

        let match_id = command.match_id;
        let delivered = self.sync.send_command(targets, command);
        info!(%match_id, targets = targets.len(), delivered, "play command sent");
        Ok(delivered)
    }
}

impl From<CharacteristicEntity> for Characteristic {
    fn from(value: CharacteristicEntity) -> Self {
        Self {
            serialized_name: value.serialized_name,
            difficulties: value.difficulties,
        }
    }
}

impl From<Characteristic> for CharacteristicEntity {
    fn from(value: Characteristic) -> Self {
        Self {
            serialized_name: value.serialized_name,
            difficulties: value.difficulties,
        }
    }
}

impl From<SongEntity> for SelectedSong {
    fn from(value: SongEntity) -> Self {
        Self {
            level_id: value.level_id,
            name: value.name,
            characteristics: value.characteristics.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<SelectedSong> for SongEntity {
    fn from(value: SelectedSong) -> Self {
        Self {
            level_id: value.level_id,
            name: value.name,
            characteristics: value.characteristics.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&MatchState> for MatchEntity {
    fn from(state: &MatchState) -> Self {
        Self {
            id: state.id,
            players: state.players().collect(),
            selected_song: state.selected_song.clone().map(Into::into),
            selected_characteristic: state.selected_characteristic.clone(),
            selected_difficulty: state.selected_difficulty,
            version: state.version,
            updated_at: SystemTime::now(),
        }
    }
}

impl From<MatchEntity> for MatchState {
    fn from(entity: MatchEntity) -> Self {
        MatchState::restore(
            entity.id,
            entity.players,
            entity.selected_song.map(Into::into),
            entity.selected_characteristic,
            entity.selected_difficulty,
            entity.version,
        )
    }
}
