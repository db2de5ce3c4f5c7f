use axum::{
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use cogito_core::events::StateChange;
use cogito_core::query::ReadModel;
use cogito_sdk::objects::ws::{WsCloseCode, WsServerMessage};
use cogito_sdk::objects::{ActivitiesQuery, Address, DepositId, PageLimits, TransferId};
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

/// `GET /subscribe/transfers/{id}` — WebSocket transfer stream.
///
/// Closes normally once the transfer is `COMPLETED`.
pub(super) async fn transfer_ws(
    state: State<AppState>,
    Path(id): Path<TransferId>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let app_state = state.0.clone();
    ws.on_upgrade(move |socket| handle_subscription(socket, app_state, Topic::Transfer(id)))
}

/// `GET /subscribe/deposits/{id}` — WebSocket deposit stream.
///
/// Closes normally once the deposit is released.
pub(super) async fn deposit_ws(
    state: State<AppState>,
    Path(id): Path<DepositId>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let app_state = state.0.clone();
    ws.on_upgrade(move |socket| handle_subscription(socket, app_state, Topic::Deposit(id)))
}

/// `GET /subscribe/users/{address}` — WebSocket activity stream.
///
/// Pushes the first page of the user's feed, newest first, whenever a new
/// entry is appended. Never closes on its own.
pub(super) async fn activities_ws(
    state: State<AppState>,
    Path(address): Path<Address>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let app_state = state.0.clone();
    ws.on_upgrade(move |socket| handle_subscription(socket, app_state, Topic::User(address)))
}

/// What a connection is subscribed to.
#[derive(Debug, Clone)]
enum Topic {
    Transfer(TransferId),
    Deposit(DepositId),
    User(Address),
}

impl Topic {
    fn label(&self) -> &str {
        match self {
            Topic::Transfer(id) => id.as_str(),
            Topic::Deposit(id) => id.as_str(),
            Topic::User(address) => address.as_str(),
        }
    }

    /// Current state of the topic as a frame.
    fn render(&self, model: &ReadModel, limits: PageLimits) -> WsServerMessage {
        let not_found = || WsServerMessage::NotFound {
            id: self.label().to_string(),
        };
        match self {
            Topic::Transfer(id) => model
                .transfer(id)
                .map(|transfer| WsServerMessage::Transfer { transfer })
                .unwrap_or_else(not_found),
            Topic::Deposit(id) => model
                .deposit(id)
                .map(|deposit| WsServerMessage::Deposit { deposit })
                .unwrap_or_else(not_found),
            Topic::User(address) => WsServerMessage::Activities {
                activities: model.activities(
                    &ActivitiesQuery {
                        user: Some(address.clone()),
                        ..ActivitiesQuery::default()
                    },
                    limits,
                ),
            },
        }
    }

    /// Whether `change` can alter what [`render`](Self::render) returns.
    fn is_affected_by(&self, change: &StateChange, model: &ReadModel) -> bool {
        match (self, change) {
            (_, StateChange::Rebuilt) => true,
            (Topic::Transfer(id), StateChange::TransferChanged(changed)) => id == changed,
            // The embedded deposit summary.
            (Topic::Transfer(id), StateChange::DepositChanged(deposit_id)) => model
                .projection
                .transfer(id)
                .is_some_and(|transfer| &transfer.deposit_id == deposit_id),
            (Topic::Deposit(id), StateChange::DepositChanged(changed)) => id == changed,
            // The embedded transfer list.
            (Topic::Deposit(id), StateChange::TransferChanged(transfer_id)) => model
                .projection
                .transfer(transfer_id)
                .is_some_and(|transfer| &transfer.deposit_id == id),
            (Topic::User(address), StateChange::ActivityAppended(user)) => address == user,
            _ => false,
        }
    }
}

/// Whether the stream is over after `msg` was delivered.
fn is_final(msg: &WsServerMessage) -> bool {
    match msg {
        WsServerMessage::Transfer { transfer } => transfer.status.is_terminal(),
        WsServerMessage::Deposit { deposit } => deposit.released,
        _ => false,
    }
}

enum Push {
    /// Sent, or skipped because nothing changed.
    Continue,
    /// A terminal state was delivered.
    Done,
    /// The client went away, or the stream was closed on an error.
    Disconnected,
}

/// Background task that drives a single WebSocket connection.
///
/// 1. Sends the current state (or `not_found`) as the first message.
/// 2. Re-renders on every relevant change notice and sends the frame if it
///    differs from the last one.
/// 3. Closes normally after a terminal state, with `GOING_AWAY` on shutdown.
async fn handle_subscription(mut socket: WebSocket, state: AppState, topic: Topic) {
    // Subscribe *before* reading the snapshot so that a change racing with
    // the first render is still in the receiver's buffer.
    let mut changes = state.subscribe_changes();
    let mut shutdown = state.shutdown.clone();
    let mut last_sent: Option<WsServerMessage> = None;

    tracing::debug!(topic = ?topic, "WS: subscription opened");

    match push_current(&mut socket, &state, &topic, &mut last_sent).await {
        Push::Continue => {}
        Push::Done => {
            close(&mut socket, WsCloseCode::NORMAL, "final state reached").await;
            return;
        }
        Push::Disconnected => return,
    }

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    close(&mut socket, WsCloseCode::GOING_AWAY, "server shutting down").await;
                    return;
                }
            }

            result = changes.recv() => {
                let outcome = match result {
                    Ok(change) => {
                        if !topic.is_affected_by(&change, &state.reader.snapshot()) {
                            continue;
                        }
                        push_current(&mut socket, &state, &topic, &mut last_sent).await
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            topic = ?topic,
                            skipped,
                            "WS: change receiver lagged, re-sending current state"
                        );
                        push_current(&mut socket, &state, &topic, &mut last_sent).await
                    }
                    Err(RecvError::Closed) => {
                        close(&mut socket, WsCloseCode::GOING_AWAY, "server shutting down").await;
                        return;
                    }
                };
                match outcome {
                    Push::Continue => {}
                    Push::Done => {
                        close(&mut socket, WsCloseCode::NORMAL, "final state reached").await;
                        return;
                    }
                    Push::Disconnected => return,
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        tracing::debug!(topic = ?topic, "WS: client disconnected");
                        return;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn push_current(
    socket: &mut WebSocket,
    state: &AppState,
    topic: &Topic,
    last_sent: &mut Option<WsServerMessage>,
) -> Push {
    let limits = *state.config.query.read().await;
    let msg = topic.render(&state.reader.snapshot(), limits);
    if last_sent.as_ref() == Some(&msg) {
        return Push::Continue;
    }
    let json = match serde_json::to_string(&msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(topic = ?topic, error = %e, "WS: failed to encode frame");
            let error = WsServerMessage::Error {
                code: WsCloseCode::INTERNAL_ERROR,
                reason: "failed to encode state".to_string(),
            };
            let _ = send_json(socket, &error).await;
            close(socket, WsCloseCode::INTERNAL_ERROR, "internal error").await;
            return Push::Disconnected;
        }
    };
    if socket.send(Message::Text(json.into())).await.is_err() {
        return Push::Disconnected;
    }
    let done = is_final(&msg);
    *last_sent = Some(msg);
    if done { Push::Done } else { Push::Continue }
}

async fn close(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{advance_to_completed, deposit_created, initiated, project};

    #[test]
    fn test_transfer_topic_follows_its_deposit() {
        let model = project(&[deposit_created(1, "D1", 100), initiated(2, "T1", "D1")]);
        let topic = Topic::Transfer(TransferId::from("T1"));

        assert!(topic.is_affected_by(&StateChange::DepositChanged(DepositId::from("D1")), &model));
        assert!(!topic.is_affected_by(&StateChange::DepositChanged(DepositId::from("D2")), &model));
        assert!(topic.is_affected_by(&StateChange::Rebuilt, &model));
        assert!(!topic.is_affected_by(
            &StateChange::ActivityAppended(Address::new("0xalice")),
            &model
        ));
    }

    #[test]
    fn test_deposit_topic_follows_its_transfers() {
        let model = project(&[deposit_created(1, "D1", 100), initiated(2, "T1", "D1")]);
        let topic = Topic::Deposit(DepositId::from("D1"));
        assert!(topic.is_affected_by(&StateChange::TransferChanged(TransferId::from("T1")), &model));
        assert!(!topic.is_affected_by(&StateChange::TransferChanged(TransferId::from("T9")), &model));
    }

    #[test]
    fn test_render_missing_entity_as_not_found() {
        let model = project(&[]);
        let msg = Topic::Transfer(TransferId::from("T9")).render(&model, PageLimits::default());
        assert_eq!(msg, WsServerMessage::NotFound { id: "T9".to_string() });
        assert!(!is_final(&msg));
    }

    #[test]
    fn test_completed_transfer_is_final() {
        let mut events = vec![deposit_created(1, "D1", 100), initiated(2, "T1", "D1")];
        events.extend(advance_to_completed(3, "T1", 40));
        let model = project(&events);

        let msg = Topic::Transfer(TransferId::from("T1")).render(&model, PageLimits::default());
        assert!(is_final(&msg));
        let msg = Topic::Deposit(DepositId::from("D1")).render(&model, PageLimits::default());
        assert!(!is_final(&msg));
    }
}
