use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use pitstop_chat::Subscription;
use pitstop_types::events::{GatewayCommand, GatewayEvent};
use pitstop_types::models::Identity;

use crate::routes::AppState;

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// One WebSocket connection: Identify handshake, then commands in and
/// pushed snapshots out. Subscriptions created here are owned by the
/// connection and cancel on drop, so a disconnect tears everything down.
async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let identity = match wait_for_identify(&mut receiver, &state).await {
        Some(identity) => identity,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!(
        "{} ({}) connected to gateway",
        identity.display_name, identity.id
    );

    let ready = GatewayEvent::Ready {
        user_id: identity.id,
        display_name: identity.display_name.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    // Subscription callbacks push into this channel; the select loop
    // forwards to the socket.
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<GatewayEvent>();
    let mut subscriptions: Vec<Subscription> = Vec::new();

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                let text = serde_json::to_string(&event).unwrap();
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<GatewayCommand>(&text) {
                            Ok(cmd) => {
                                handle_command(&state, &identity, cmd, &events_tx, &mut subscriptions);
                            }
                            Err(e) => {
                                warn!(
                                    "{} ({}) bad command: {} -- raw: {}",
                                    identity.display_name,
                                    identity.id,
                                    e,
                                    &text[..text.len().min(200)]
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Dropping the Vec cancels every subscription
    info!(
        "{} ({}) disconnected from gateway",
        identity.display_name, identity.id
    );
}

fn handle_command(
    state: &AppState,
    identity: &Identity,
    cmd: GatewayCommand,
    events_tx: &mpsc::UnboundedSender<GatewayEvent>,
    subscriptions: &mut Vec<Subscription>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {
            // Already identified; ignore
        }
        GatewayCommand::SubscribeThread { thread_id } => {
            let tx = events_tx.clone();
            match state.feed.subscribe(identity, thread_id, move |messages| {
                let _ = tx.send(GatewayEvent::ThreadSnapshot {
                    thread_id,
                    messages,
                });
            }) {
                Ok(sub) => subscriptions.push(sub),
                Err(e) => {
                    warn!(
                        "{} ({}) denied thread subscription: {}",
                        identity.display_name, identity.id, e
                    );
                    let _ = events_tx.send(GatewayEvent::Denied {
                        reason: e.to_string(),
                    });
                }
            }
        }
        GatewayCommand::SubscribeRoster => {
            let tx = events_tx.clone();
            match state.roster.subscribe(identity, move |records| {
                let _ = tx.send(GatewayEvent::RosterSnapshot { records });
            }) {
                Ok(sub) => subscriptions.push(sub),
                Err(e) => {
                    warn!(
                        "{} ({}) denied roster subscription: {}",
                        identity.display_name, identity.id, e
                    );
                    let _ = events_tx.send(GatewayEvent::Denied {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    state: &AppState,
) -> Option<Identity> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                else {
                    return None;
                };

                return match state.resolver.resolve(&token) {
                    Ok(identity) => Some(identity),
                    Err(_) => None,
                };
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }

    None
}
