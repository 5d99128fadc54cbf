use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::MatchEntity,
    dto::matches::{
        CreateMatchRequest, MatchSnapshot, PlayRequest, PlayResponse, UpdateMatchRequest,
    },
    error::ServiceError,
    state::{SharedState, matches::MatchState},
};

/// Snapshots of every live match.
pub fn list_matches(state: &SharedState) -> Vec<MatchSnapshot> {
    state
        .matches()
        .list()
        .iter()
        .map(MatchSnapshot::from)
        .collect()
}

/// Snapshot of a single match.
pub fn get_match(state: &SharedState, id: Uuid) -> Result<MatchSnapshot, ServiceError> {
    let current = state.matches().get(id)?;
    Ok(MatchSnapshot::from(&current))
}

/// Open a match with the given players and no selection.
pub async fn create_match(
    state: &SharedState,
    request: CreateMatchRequest,
) -> Result<MatchSnapshot, ServiceError> {
    let created = state.matches().create(request.players);
    persist_match(state, &created).await;
    Ok(MatchSnapshot::from(&created))
}

/// Apply a partial update; every subscriber, including the one the change
/// came from, receives the new snapshot through its queue.
pub async fn update_match(
    state: &SharedState,
    id: Uuid,
    request: UpdateMatchRequest,
) -> Result<MatchSnapshot, ServiceError> {
    let update = state.matches().update(id, request.into())?;
    if update.changed {
        persist_match(state, &update.state).await;
    }
    Ok(MatchSnapshot::from(&update.state))
}

/// Close a match and drop its stored copy.
pub async fn delete_match(state: &SharedState, id: Uuid) -> Result<MatchSnapshot, ServiceError> {
    let removed = state.matches().delete(id)?;

    match state.match_store().await {
        Some(store) => {
            if let Err(err) = store.delete_match(id).await {
                warn!(match_id = %id, error = %err, "failed to delete stored match");
            }
        }
        None => debug!(match_id = %id, "degraded mode; stored match left behind"),
    }

    Ok(MatchSnapshot::from(&removed))
}

/// Ask players of a match to start its selected level.
pub fn play_match(
    state: &SharedState,
    id: Uuid,
    request: PlayRequest,
) -> Result<PlayResponse, ServiceError> {
    let current = state.matches().get(id)?;
    let command = current.play_command(request.modifiers, request.player_settings)?;
    let targets = request
        .targets
        .unwrap_or_else(|| current.players().collect());

    let delivered = state
        .matches()
        .send_play_command(&targets, command.clone())?;
    Ok(PlayResponse { command, delivered })
}

/// Persist a match snapshot. Failures are logged and never undo the change.
async fn persist_match(state: &SharedState, current: &MatchState) {
    let Some(store) = state.match_store().await else {
        debug!(match_id = %current.id(), "degraded mode; match not persisted");
        return;
    };

    if let Err(err) = store.save_match(MatchEntity::from(current)).await {
        warn!(match_id = %current.id(), error = %err, "failed to persist match");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            match_store::{MatchStore, memory::MemoryMatchStore},
            scoring::{Difficulty, fake::FakeGateway},
        },
        state::{
            AppState, ObserverRole, SyncMessage,
            matches::{Characteristic, SelectedSong},
        },
    };

    async fn setup() -> (SharedState, Arc<MemoryMatchStore>) {
        let state = AppState::new(AppConfig::default(), Arc::new(FakeGateway::new()));
        let store = Arc::new(MemoryMatchStore::new());
        state.install_match_store(store.clone()).await;
        (state, store)
    }

    fn song() -> SelectedSong {
        SelectedSong {
            level_id: "custom_level_ab12cd34".into(),
            name: "Example".into(),
            characteristics: vec![Characteristic {
                serialized_name: "Standard".into(),
                difficulties: vec![Difficulty::Expert],
            }],
        }
    }

    fn full_selection() -> UpdateMatchRequest {
        UpdateMatchRequest {
            selected_song: Some(Some(song())),
            selected_characteristic: Some(Some("Standard".into())),
            selected_difficulty: Some(Some(Difficulty::Expert)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn mutations_are_written_through() {
        let (state, store) = setup().await;
        let created = create_match(&state, CreateMatchRequest { players: vec![Uuid::new_v4()] })
            .await
            .unwrap();

        update_match(&state, created.id, full_selection())
            .await
            .unwrap();
        let stored = store.list_matches().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].selected_difficulty, Some(Difficulty::Expert));
        assert_eq!(stored[0].version, 1);

        delete_match(&state, created.id).await.unwrap();
        assert!(store.list_matches().await.unwrap().is_empty());
        assert!(state.matches().is_empty());
    }

    #[tokio::test]
    async fn play_defaults_to_every_player() {
        let (state, _store) = setup().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let mut alice_sub = state.sync().subscribe(alice, ObserverRole::Player);
        let _bob_sub = state.sync().subscribe(bob, ObserverRole::Player);

        let created = create_match(&state, CreateMatchRequest { players: vec![alice, bob] })
            .await
            .unwrap();
        update_match(&state, created.id, full_selection())
            .await
            .unwrap();

        let response = play_match(&state, created.id, PlayRequest::default()).unwrap();
        assert_eq!(response.delivered, 2);
        assert_eq!(response.command.characteristic, "Standard");

        let mut saw_command = false;
        while let Ok(Some(message)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), alice_sub.recv()).await
        {
            saw_command |= matches!(message, SyncMessage::PlaySong(_));
        }
        assert!(saw_command);
    }

    #[tokio::test]
    async fn play_without_selection_is_refused() {
        let (state, _store) = setup().await;
        let created = create_match(&state, CreateMatchRequest { players: vec![Uuid::new_v4()] })
            .await
            .unwrap();

        let err = play_match(&state, created.id, PlayRequest::default()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn unknown_match_is_not_found() {
        let (state, _store) = setup().await;
        let err = update_match(&state, Uuid::new_v4(), UpdateMatchRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
