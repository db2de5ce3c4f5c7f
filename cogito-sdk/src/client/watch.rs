//! Live views over the subscription endpoints, with polling as a fallback.
//!
//! Each `watch_*` method first tries the WebSocket endpoint. If the upgrade
//! fails (proxy without WebSocket support, older server, …) it falls back
//! to polling the REST endpoint on a fixed interval and only yields when the
//! value changed. Either way the stream yields `None` while the entity is
//! not indexed and ends once a terminal state has been delivered.

use std::future::Future;
use std::time::Duration;

use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::{ClientError, QueryClient};
use crate::objects::ws::WsServerMessage;
use crate::objects::{
    ActivitiesQuery, Address, DepositId, DepositView, OrderDirection, Page, TransferId,
    TransferView, UserActivityView,
};

/// Poll period for single transfers and activity feeds.
const FAST_POLL: Duration = Duration::from_secs(5);
/// Poll period for single deposits.
const SLOW_POLL: Duration = Duration::from_secs(10);

/// Stream of successive states of a watched entity.
pub type WatchStream<T> = BoxStream<'static, Result<Option<T>, ClientError>>;

impl QueryClient {
    /// Follow a transfer until it is `COMPLETED`.
    pub async fn watch_transfer(&self, id: &TransferId) -> Result<WatchStream<TransferView>, ClientError> {
        let path = format!("/api/v1/subscribe/transfers/{}", urlencoding::encode(id.as_str()));
        let extract = |msg: WsServerMessage| match msg {
            WsServerMessage::Transfer { transfer } => Some(Ok(Some(transfer))),
            other => passthrough(other),
        };
        if let Some(ws) = self.try_subscribe(&path, extract).await? {
            return Ok(ws);
        }

        let client = self.clone();
        let id = id.clone();
        Ok(poll_stream(
            FAST_POLL,
            move || {
                let client = client.clone();
                let id = id.clone();
                async move { client.transfer(&id).await }
            },
            |transfer: &TransferView| transfer.status.is_terminal(),
        ))
    }

    /// Follow a deposit until it is released.
    pub async fn watch_deposit(&self, id: &DepositId) -> Result<WatchStream<DepositView>, ClientError> {
        let path = format!("/api/v1/subscribe/deposits/{}", urlencoding::encode(id.as_str()));
        let extract = |msg: WsServerMessage| match msg {
            WsServerMessage::Deposit { deposit } => Some(Ok(Some(deposit))),
            other => passthrough(other),
        };
        if let Some(ws) = self.try_subscribe(&path, extract).await? {
            return Ok(ws);
        }

        let client = self.clone();
        let id = id.clone();
        Ok(poll_stream(
            SLOW_POLL,
            move || {
                let client = client.clone();
                let id = id.clone();
                async move { client.deposit(&id).await }
            },
            |deposit: &DepositView| deposit.released,
        ))
    }

    /// Follow the newest page of a user's activity feed. Never ends on its own.
    pub async fn watch_activities(
        &self,
        user: &Address,
    ) -> Result<WatchStream<Page<UserActivityView>>, ClientError> {
        let path = format!("/api/v1/subscribe/users/{}", urlencoding::encode(user.as_str()));
        let extract = |msg: WsServerMessage| match msg {
            WsServerMessage::Activities { activities } => Some(Ok(Some(activities))),
            other => passthrough(other),
        };
        if let Some(ws) = self.try_subscribe(&path, extract).await? {
            return Ok(ws);
        }

        let client = self.clone();
        let query = ActivitiesQuery {
            user: Some(user.clone()),
            order_direction: OrderDirection::Desc,
            ..Default::default()
        };
        Ok(poll_stream(
            FAST_POLL,
            move || {
                let client = client.clone();
                let query = query.clone();
                async move { client.activities(&query).await.map(Some) }
            },
            |_: &Page<UserActivityView>| false,
        ))
    }

    /// Connect to a subscription endpoint. `Ok(None)` means the upgrade
    /// failed and the caller should poll instead.
    async fn try_subscribe<T, F>(
        &self,
        path: &str,
        extract: F,
    ) -> Result<Option<WatchStream<T>>, ClientError>
    where
        T: Send + 'static,
        F: Fn(WsServerMessage) -> Option<Result<Option<T>, ClientError>> + Send + 'static,
    {
        let url = websocket_url(&self.base_url.join(path)?)?;
        let Ok((socket, _)) = connect_async(url.as_str()).await else {
            return Ok(None);
        };

        let frames = socket
            .map_err(ClientError::from)
            .try_filter_map(move |message| {
                let item = match message {
                    Message::Text(text) => match serde_json::from_str::<WsServerMessage>(&text) {
                        Ok(msg) => extract(msg).transpose(),
                        Err(e) => Err(ClientError::Json(e)),
                    },
                    _ => Ok(None),
                };
                std::future::ready(item)
            });
        Ok(Some(frames.boxed()))
    }
}

/// Frames that mean the same thing on every subscription.
fn passthrough<T>(msg: WsServerMessage) -> Option<Result<Option<T>, ClientError>> {
    match msg {
        WsServerMessage::NotFound { .. } => Some(Ok(None)),
        WsServerMessage::Error { code, reason } => {
            Some(Err(ClientError::Subscription { code, reason }))
        }
        _ => None,
    }
}

fn websocket_url(http_url: &Url) -> Result<Url, ClientError> {
    let scheme = match http_url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(ClientError::Scheme(other.to_string())),
    };
    let mut url = http_url.clone();
    url.set_scheme(scheme)
        .map_err(|()| ClientError::Scheme(http_url.scheme().to_string()))?;
    Ok(url)
}

struct PollState<T, F> {
    interval: Interval,
    fetch: F,
    last: Option<Option<T>>,
    done: bool,
}

fn poll_stream<T, F, Fut>(period: Duration, fetch: F, is_terminal: fn(&T) -> bool) -> WatchStream<T>
where
    T: PartialEq + Clone + Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<T>, ClientError>> + Send + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let state = PollState {
        interval,
        fetch,
        last: None,
        done: false,
    };

    stream::unfold(state, move |mut state| async move {
        if state.done {
            return None;
        }
        loop {
            state.interval.tick().await;
            match (state.fetch)().await {
                Err(e) => return Some((Err(e), state)),
                Ok(value) => {
                    if state.last.as_ref() == Some(&value) {
                        continue;
                    }
                    state.done = value.as_ref().is_some_and(is_terminal);
                    state.last = Some(value.clone());
                    return Some((Ok(value), state));
                }
            }
        }
    })
    .boxed()
}
