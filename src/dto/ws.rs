use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::matches::{MatchSnapshot, UpdateMatchRequest},
    state::{ObserverRole, SyncMessage, matches::PlaySong},
};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from observer WebSocket clients.
#[serde(tag = "type")]
pub enum ObserverInboundMessage {
    /// First frame of every connection.
    #[serde(rename = "identification")]
    Identification {
        /// Identifier chosen by the client; players use their player id.
        observer_id: Uuid,
        /// Role the client connects as.
        role: ObserverRole,
    },
    /// Partial change to a match.
    #[serde(rename = "update_match")]
    UpdateMatch {
        /// Match to change.
        match_id: Uuid,
        /// Fields to change.
        change: UpdateMatchRequest,
    },
    /// Any other frame type; ignored.
    #[serde(other)]
    Unknown,
}

impl ObserverInboundMessage {
    /// Parse a text frame.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Messages pushed to observer WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverOutboundMessage {
    /// Acknowledges the identification frame.
    Identified {
        /// Identifier the connection is registered under.
        observer_id: Uuid,
        /// Role granted to the connection.
        role: ObserverRole,
    },
    /// Every live match, sent once right after identification.
    MatchList {
        /// Snapshots ordered by match id.
        matches: Vec<MatchSnapshot>,
    },
    /// A match changed.
    MatchUpdated {
        /// Full snapshot after the change.
        #[serde(rename = "match")]
        snapshot: MatchSnapshot,
    },
    /// A match was closed; later updates for it are stale.
    MatchDeleted {
        /// Closed match.
        match_id: Uuid,
    },
    /// Start a level now.
    PlaySong {
        /// Level and settings to play.
        command: PlaySong,
    },
    /// An inbound frame was refused.
    Error {
        /// Reason for the refusal.
        message: String,
    },
}

impl From<SyncMessage> for ObserverOutboundMessage {
    fn from(message: SyncMessage) -> Self {
        match message {
            SyncMessage::MatchUpdated(state) => Self::MatchUpdated {
                snapshot: MatchSnapshot::from(&state),
            },
            SyncMessage::MatchDeleted(match_id) => Self::MatchDeleted { match_id },
            SyncMessage::PlaySong(command) => Self::PlaySong { command },
        }
    }
}
