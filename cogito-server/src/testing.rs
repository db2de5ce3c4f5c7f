//! In-process server and event builders for router tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, header};
use axum::Router;
use cogito_core::config::{
    AdminConfig, IngestSettings, PageLimits, ServerConfig, SettingsStore, SharedConfig,
};
use cogito_core::events::{ingest_command_channel, projection_command_channel, state_change_channel};
use cogito_core::issues::IssueLog;
use cogito_core::log::{EventLog, MemoryEventLog};
use cogito_core::processors::{IngestHandle, Ingester, Projector};
use cogito_core::projection::replay;
use cogito_core::query::{ReadModel, read_model_channel};
use cogito_sdk::objects::admin::ADMIN_AUTH_HEADER;
use cogito_sdk::objects::{Address, Amount, ChainEvent, DepositId, EventPayload, TransferId};
use serde_json::{Value, json};
use tokio::sync::{RwLock, watch};
use tower::ServiceExt;

use crate::server::build_router;
use crate::state::AppState;

pub(crate) const TEST_SECRET: &str = "test-admin-secret";

pub(crate) struct TestServer {
    pub router: Router,
    pub state: AppState,
    _shutdown_tx: watch::Sender<bool>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_settings(IngestSettings::default()).await
    }

    pub async fn with_settings(settings: IngestSettings) -> Self {
        let log: Arc<dyn EventLog> = Arc::new(MemoryEventLog::new());
        let (projection_tx, projection_rx) = projection_command_channel();
        let (ingest_tx, ingest_rx) = ingest_command_channel();
        let (publisher, reader) = read_model_channel();
        let (change_tx, _) = state_change_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let issues = IssueLog::default();

        let config = SharedConfig {
            server: Arc::new(RwLock::new(ServerConfig {
                listen: "127.0.0.1:0".parse().unwrap(),
            })),
            admin: Arc::new(RwLock::new(AdminConfig::new(
                cogito_sdk::config::hash_secret(TEST_SECRET).unwrap(),
            ))),
            query: Arc::new(RwLock::new(PageLimits::default())),
            ingest: SettingsStore::new(settings),
        };

        let ingester = Ingester::bootstrap(log, issues.clone(), projection_tx)
            .await
            .unwrap();
        tokio::spawn(ingester.run(
            shutdown_rx.clone(),
            ingest_rx,
            config.ingest.subscribe(),
        ));
        tokio::spawn(
            Projector::new(publisher, change_tx.clone())
                .with_workers(2)
                .run(shutdown_rx.clone(), projection_rx),
        );

        let state = AppState::new(
            config,
            IngestHandle::new(ingest_tx),
            reader,
            change_tx,
            issues,
            shutdown_rx,
        );
        Self {
            router: build_router(state.clone()),
            state,
            _shutdown_tx: shutdown_tx,
        }
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn admin_get(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::get(uri)
                .header(ADMIN_AUTH_HEADER, TEST_SECRET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn admin_post(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header(ADMIN_AUTH_HEADER, TEST_SECRET)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Ingest `events` and wait until they are queryable.
    pub async fn ingest(&self, events: Vec<ChainEvent>) -> Value {
        let response = self
            .admin_post("/api/v1/admin/events?wait=true", json!({ "events": events }))
            .await;
        assert_eq!(response.status(), 200);
        body_json(response).await
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub(crate) async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Project `events` sequentially into a read model.
pub(crate) fn project(events: &[ChainEvent]) -> ReadModel {
    ReadModel {
        revision: 1,
        projection: replay(events),
    }
}

pub(crate) fn event(block: u64, payload: EventPayload) -> ChainEvent {
    ChainEvent {
        block_number: block,
        log_index: 0,
        block_timestamp: 1_700_000_000 + block as i64,
        tx_hash: format!("0x{block:06x}"),
        payload,
    }
}

pub(crate) fn deposit_created(block: u64, id: &str, amount: u128) -> ChainEvent {
    event(
        block,
        EventPayload::DepositCreated {
            deposit_id: DepositId::from(id),
            depositor: Address::new("0xAlice"),
            token: Address::new("0xToken"),
            is_native: false,
            amount: Amount::from_u128(amount),
        },
    )
}

pub(crate) fn initiated(block: u64, transfer: &str, deposit: &str) -> ChainEvent {
    event(
        block,
        EventPayload::TransferInitiated {
            transfer_id: TransferId::from(transfer),
            deposit_id: DepositId::from(deposit),
            sender: Address::new("0xAlice"),
            amount: None,
            encrypted_data_hash: None,
        },
    )
}

/// The remaining stages of `transfer` on consecutive blocks from `block`,
/// completing for `amount` to 0xBob.
pub(crate) fn advance_to_completed(block: u64, transfer: &str, amount: u128) -> Vec<ChainEvent> {
    let transfer_id = TransferId::from(transfer);
    vec![
        event(
            block,
            EventPayload::TransferStored {
                transfer_id: transfer_id.clone(),
            },
        ),
        event(
            block + 1,
            EventPayload::TransferAcknowledged {
                transfer_id: transfer_id.clone(),
            },
        ),
        event(
            block + 2,
            EventPayload::TransferProcessed {
                transfer_id: transfer_id.clone(),
                receiver: Address::new("0xBob"),
                amount: None,
            },
        ),
        event(
            block + 3,
            EventPayload::TransferCompleted {
                transfer_id,
                deposit_id: None,
                amount: Some(Amount::from_u128(amount)),
            },
        ),
    ]
}
