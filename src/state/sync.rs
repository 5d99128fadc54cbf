//! Fan-out of match changes to connected observers.
//!
//! Every subscriber owns a bounded queue, so publishing never waits on a slow
//! reader. A subscriber whose queue is full is evicted; its stream ends and the
//! client is expected to reconnect and resynchronise from a fresh listing.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::matches::{MatchId, MatchState, PlayerId, PlaySong};

/// Identifier chosen by a connected client; players use their player id.
pub type ObserverId = Uuid;

/// Default per-subscriber queue length.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// What a connected client is allowed to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ObserverRole {
    /// Game client; the only role that receives play commands.
    Player,
    /// Organiser tooling or spectator.
    Coordinator,
}

/// Message delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    /// Full snapshot of a match after a change.
    MatchUpdated(MatchState),
    /// The match is gone; later updates for it are stale.
    MatchDeleted(MatchId),
    /// Addressed command asking players to start a level.
    PlaySong(PlaySong),
}

impl SyncMessage {
    /// Match the message is about.
    pub fn match_id(&self) -> MatchId {
        match self {
            SyncMessage::MatchUpdated(state) => state.id(),
            SyncMessage::MatchDeleted(id) => *id,
            SyncMessage::PlaySong(command) => command.match_id,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::MatchUpdated(_) => "match_updated",
            SyncMessage::MatchDeleted(_) => "match_deleted",
            SyncMessage::PlaySong(_) => "play_song",
        }
    }
}

struct Subscriber {
    token: u64,
    role: ObserverRole,
    tx: mpsc::Sender<SyncMessage>,
}

type SubscriberMap = DashMap<ObserverId, Subscriber>;

/// Registry of subscribed observers and the delivery paths to them.
pub struct MatchSyncBroadcaster {
    subscribers: Arc<SubscriberMap>,
    buffer: usize,
    next_token: AtomicU64,
}

impl Default for MatchSyncBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl MatchSyncBroadcaster {
    /// Create a broadcaster whose subscribers each buffer `buffer` messages.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            buffer: buffer.max(1),
            next_token: AtomicU64::new(1),
        }
    }

    /// Register `observer`, replacing any previous subscription under that id.
    pub fn subscribe(&self, observer: ObserverId, role: ObserverRole) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        if self
            .subscribers
            .insert(observer, Subscriber { token, role, tx })
            .is_some()
        {
            info!(%observer, "observer re-subscribed; previous stream closed");
        } else {
            info!(%observer, ?role, "observer subscribed");
        }

        Subscription {
            observer,
            token,
            rx,
            deleted: HashSet::new(),
            delivered: HashMap::new(),
            subscribers: self.subscribers.clone(),
        }
    }

    /// Drop the subscription of `observer` after its connection closed.
    pub fn disconnect(&self, observer: ObserverId) {
        if self.subscribers.remove(&observer).is_some() {
            info!(%observer, "observer disconnected");
        }
    }

    /// Deliver `message` to every subscriber. Returns how many accepted it.
    pub fn broadcast(&self, message: SyncMessage) -> usize {
        self.deliver(&message, |_, _| true)
    }

    /// Deliver `message` to every subscriber not listed in `exclude`.
    pub fn broadcast_except(&self, exclude: &HashSet<ObserverId>, message: SyncMessage) -> usize {
        self.deliver(&message, |observer, _| !exclude.contains(observer))
    }

    /// Deliver a play command to the listed players only.
    pub fn send_command(&self, targets: &[PlayerId], command: PlaySong) -> usize {
        let message = SyncMessage::PlaySong(command);
        self.deliver(&message, |observer, subscriber| {
            subscriber.role == ObserverRole::Player && targets.contains(observer)
        })
    }

    /// Announce that `match_id` is gone.
    pub fn notify_deleted(&self, match_id: MatchId) -> usize {
        self.broadcast(SyncMessage::MatchDeleted(match_id))
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn deliver<F>(&self, message: &SyncMessage, accept: F) -> usize
    where
        F: Fn(&ObserverId, &Subscriber) -> bool,
    {
        let mut delivered = 0;
        let mut evicted = Vec::new();

        for entry in self.subscribers.iter() {
            if !accept(entry.key(), entry.value()) {
                continue;
            }
            match entry.tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        observer = %entry.key(),
                        kind = message.kind(),
                        match_id = %message.match_id(),
                        "subscriber queue full; evicting"
                    );
                    evicted.push((*entry.key(), entry.token));
                }
                Err(TrySendError::Closed(_)) => evicted.push((*entry.key(), entry.token)),
            }
        }

        for (observer, token) in evicted {
            if self
                .subscribers
                .remove_if(&observer, |_, subscriber| subscriber.token == token)
                .is_some()
            {
                debug!(%observer, "subscriber removed");
            }
        }

        debug!(kind = message.kind(), match_id = %message.match_id(), delivered, "sync message published");
        delivered
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    observer: ObserverId,
    token: u64,
    rx: mpsc::Receiver<SyncMessage>,
    deleted: HashSet<MatchId>,
    delivered: HashMap<MatchId, u64>,
    subscribers: Arc<SubscriberMap>,
}

impl Subscription {
    /// Observer this subscription was registered for.
    pub fn observer(&self) -> ObserverId {
        self.observer
    }

    /// Record snapshots handed to the observer outside of this stream, such as
    /// the initial listing. Queued snapshots no newer than these are skipped.
    pub fn mark_delivered<'a>(&mut self, snapshots: impl IntoIterator<Item = &'a MatchState>) {
        for state in snapshots {
            self.advance(state);
        }
    }

    /// Next message for this observer, or `None` once the stream is closed.
    ///
    /// Updates and commands for a match this subscriber already saw deleted are
    /// discarded, as are snapshots older than one already delivered.
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        loop {
            let message = self.rx.recv().await?;
            match &message {
                SyncMessage::MatchDeleted(id) => {
                    self.deleted.insert(*id);
                    self.delivered.remove(id);
                }
                SyncMessage::MatchUpdated(state)
                    if !self.deleted.contains(&state.id()) && !self.advance(state) =>
                {
                    debug!(
                        observer = %self.observer,
                        match_id = %state.id(),
                        version = state.version(),
                        "discarding outdated snapshot"
                    );
                    continue;
                }
                SyncMessage::MatchUpdated(_) | SyncMessage::PlaySong(_)
                    if self.deleted.contains(&message.match_id()) =>
                {
                    debug!(
                        observer = %self.observer,
                        kind = message.kind(),
                        match_id = %message.match_id(),
                        "discarding message for deleted match"
                    );
                    continue;
                }
                _ => {}
            }
            return Some(message);
        }
    }

    /// Remember `state` as the newest snapshot of its match. Returns `false`
    /// when a snapshot at least as new was already delivered.
    fn advance(&mut self, state: &MatchState) -> bool {
        match self.delivered.get(&state.id()) {
            Some(seen) if *seen >= state.version() => false,
            _ => {
                self.delivered.insert(state.id(), state.version());
                true
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let token = self.token;
        if self
            .subscribers
            .remove_if(&self.observer, |_, subscriber| subscriber.token == token)
            .is_some()
        {
            debug!(observer = %self.observer, "subscription released");
        }
    }
}
