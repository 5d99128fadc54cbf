use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        matches::{MatchSnapshot, UpdateMatchRequest},
        ws::{ObserverInboundMessage, ObserverOutboundMessage},
    },
    error::ServiceError,
    services::match_service,
    state::{ObserverId, ObserverRole, SharedState},
};

/// Internal error type for inbound frame handling.
///
/// Distinct from `ServiceError`, which is used for HTTP responses.
#[derive(Debug, Error)]
enum ObserverError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
    /// A player tried to change a match it does not take part in.
    #[error("player {observer} is not part of match {match_id}")]
    NotAParticipant {
        /// Observer that sent the change.
        observer: ObserverId,
        /// Match it tried to change.
        match_id: Uuid,
    },
    /// The change failed validation.
    #[error("invalid change: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    /// The change was refused by the match registry.
    #[error("{0}")]
    Service(#[from] ServiceError),
}

/// Handle the full lifecycle of an observer WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let ident_timeout = state.config().sync.ident_timeout;
    let initial_message = match tokio::time::timeout(ident_timeout, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let (observer, role) = match ObserverInboundMessage::from_json_str(&initial_message) {
        Ok(ObserverInboundMessage::Identification { observer_id, role }) => (observer_id, role),
        Ok(_) => {
            warn!("first message was not identification");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse observer message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    // Subscribe before taking the listing so no change falls between the two.
    let mut subscription = state.sync().subscribe(observer, role);
    info!(%observer, ?role, "observer connected");

    let listing = state.matches().list();
    subscription.mark_delivered(&listing);
    let greeting = [
        ObserverOutboundMessage::Identified {
            observer_id: observer,
            role,
        },
        ObserverOutboundMessage::MatchList {
            matches: listing.iter().map(MatchSnapshot::from).collect(),
        },
    ];
    if greeting
        .iter()
        .any(|message| send_message_to_websocket(&outbound_tx, message).is_err())
    {
        finalize(writer_task, outbound_tx).await;
        return;
    }

    loop {
        tokio::select! {
            published = subscription.recv() => {
                let Some(message) = published else {
                    info!(%observer, "subscription ended; closing connection");
                    let _ = outbound_tx.send(Message::Close(None));
                    break;
                };
                if send_message_to_websocket(&outbound_tx, &ObserverOutboundMessage::from(message)).is_err() {
                    break;
                }
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    debug!(%observer, payload = %text, "received observer message");
                    if let Err(err) = handle_text(&state, observer, role, &text).await {
                        warn!(%observer, error = %err, "observer message refused");
                        let refusal = ObserverOutboundMessage::Error { message: err.to_string() };
                        if send_message_to_websocket(&outbound_tx, &refusal).is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = outbound_tx.send(Message::Pong(payload));
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(%observer, "observer closed");
                    let _ = outbound_tx.send(Message::Close(frame));
                    break;
                }
                Some(Ok(Message::Binary(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Err(err)) => {
                    warn!(%observer, error = %err, "websocket error");
                    break;
                }
                None => break,
            }
        }
    }

    drop(subscription);
    info!(%observer, "observer disconnected");

    finalize(writer_task, outbound_tx).await;
}

async fn handle_text(
    state: &SharedState,
    observer: ObserverId,
    role: ObserverRole,
    text: &str,
) -> Result<(), ObserverError> {
    let message = match ObserverInboundMessage::from_json_str(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(%observer, error = %err, "failed to parse observer message");
            return Ok(());
        }
    };

    match message {
        // The new snapshot reaches this observer through its own subscription.
        ObserverInboundMessage::UpdateMatch { match_id, change } => {
            apply_update(state, observer, role, match_id, change).await?;
            Ok(())
        }
        ObserverInboundMessage::Identification { .. } => {
            warn!(%observer, "ignoring duplicate identification message");
            Ok(())
        }
        ObserverInboundMessage::Unknown => {
            debug!(%observer, "ignoring unknown observer message");
            Ok(())
        }
    }
}

async fn apply_update(
    state: &SharedState,
    observer: ObserverId,
    role: ObserverRole,
    match_id: Uuid,
    change: UpdateMatchRequest,
) -> Result<MatchSnapshot, ObserverError> {
    change.validate()?;
    if role == ObserverRole::Player {
        let current = state.matches().get(match_id).map_err(ServiceError::from)?;
        if !current.has_player(&observer) {
            return Err(ObserverError::NotAParticipant { observer, match_id });
        }
    }
    Ok(match_service::update_match(state, match_id, change).await?)
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; a closed writer is
/// reported as [`ObserverError::ConnectionClosed`].
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ObserverError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ObserverError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
