use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{matches::MatchSnapshot, ws::ObserverOutboundMessage},
    state::{ObserverRole, SharedState, Subscription},
};

/// Register a read-only coordinator subscription for an SSE client.
pub fn subscribe(state: &SharedState) -> Subscription {
    let observer = Uuid::new_v4();
    info!(%observer, "new match SSE connection");
    state.sync().subscribe(observer, ObserverRole::Coordinator)
}

/// Convert a subscription into an SSE response. The current match list is
/// sent first, then every published change; the subscription is released once
/// the client disconnects.
pub fn to_sse_stream(
    state: &SharedState,
    mut subscription: Subscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);
    let matches = state.matches().list();
    subscription.mark_delivered(&matches);
    let listing = ObserverOutboundMessage::MatchList {
        matches: matches.iter().map(MatchSnapshot::from).collect(),
    };

    tokio::spawn(async move {
        let observer = subscription.observer();
        if let Some(event) = to_event("match_list", &listing) {
            if tx.send(Ok(event)).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                published = subscription.recv() => {
                    let Some(message) = published else {
                        info!(%observer, "subscription ended; closing SSE stream");
                        break;
                    };
                    let kind = message.kind();
                    let Some(event) = to_event(kind, &ObserverOutboundMessage::from(message)) else {
                        continue;
                    };
                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
            }
        }

        info!(%observer, "match SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(name: &str, payload: &ObserverOutboundMessage) -> Option<Event> {
    match serde_json::to_string(payload) {
        Ok(data) => Some(Event::default().event(name).data(data)),
        Err(err) => {
            warn!(error = %err, event = name, "failed to serialize SSE payload");
            None
        }
    }
}
