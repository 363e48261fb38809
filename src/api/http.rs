//! HTTP API Server
//!
//! REST API for writes, reads, slave push delivery and acknowledgements.
//! Each role mounts its own router.

use std::sync::Arc;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::Role;
use crate::error::{Error, Result};
use crate::log::SeqNum;
use crate::replication::{
    Acknowledgement, AppendDataRequest, AppendDataResponse, DataElement, Master, Slave,
};

/// Shared state of a master node's API
pub struct MasterState {
    pub master: Arc<Master>,
    pub replica_id: String,
    /// Slave addresses, reported in status
    pub peers: Vec<String>,
    pub started_at: DateTime<Utc>,
}

/// Shared state of a slave node's API
pub struct SlaveState {
    pub slave: Arc<Slave>,
    pub started_at: DateTime<Utc>,
}

impl MasterState {
    pub fn new(master: Arc<Master>, replica_id: String, peers: Vec<String>) -> Self {
        Self {
            master,
            replica_id,
            peers,
            started_at: Utc::now(),
        }
    }
}

impl SlaveState {
    pub fn new(slave: Arc<Slave>) -> Self {
        Self {
            slave,
            started_at: Utc::now(),
        }
    }
}

/// HTTP API server
pub struct HttpServer {
    bind_address: String,
    router: Router,
}

impl HttpServer {
    /// Serve the master API on `bind_address`
    pub fn master(bind_address: impl Into<String>, state: Arc<MasterState>) -> Self {
        Self {
            bind_address: bind_address.into(),
            router: master_router(state),
        }
    }

    /// Serve the slave API on `bind_address`
    pub fn slave(bind_address: impl Into<String>, state: Arc<SlaveState>) -> Self {
        Self {
            bind_address: bind_address.into(),
            router: slave_router(state),
        }
    }

    /// Start the HTTP server, returning once `shutdown` fires
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.bind_address);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        tracing::info!("HTTP API on {} stopped", self.bind_address);
        Ok(())
    }
}

/// Routes served by the master
pub fn master_router(state: Arc<MasterState>) -> Router {
    Router::new()
        // Data
        .route("/master/data/append_data", post(handle_append_data))
        .route("/master/data/get_data", get(handle_master_get_all))
        .route("/master/data/get_data/:from", get(handle_master_get_from))
        // Replication
        .route(
            "/master/replication/acknowledge_reception",
            post(handle_acknowledge_reception),
        )
        // Status and info
        .route("/health", get(handle_master_health))
        .route("/status", get(handle_master_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routes served by a slave
pub fn slave_router(state: Arc<SlaveState>) -> Router {
    Router::new()
        .route("/slave/data/get_data", get(handle_slave_get_all))
        .route("/slave/replication/append_data", post(handle_slave_append))
        .route("/health", get(handle_slave_health))
        .route("/status", get(handle_slave_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============ Response Types ============

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub role: Role,
    #[serde(rename = "replicaId")]
    pub replica_id: String,
}

/// Master status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterStatusResponse {
    pub role: Role,
    pub last_sequence: SeqNum,
    pub pending_writes: usize,
    pub peers: Vec<String>,
    pub started_at: DateTime<Utc>,
}

/// Slave status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaveStatusResponse {
    pub role: Role,
    pub replica_id: String,
    pub applied_sequence: SeqNum,
    pub last_sequence: SeqNum,
    pub running: bool,
    pub started_at: DateTime<Utc>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal details stay in the log
        let message = match &self {
            Error::InvalidArgument(_) | Error::InvalidState(_) => self.to_string(),
            Error::Timeout { .. } => "Timeout during request processing".to_string(),
            Error::Cancelled => "Service shutting down".to_string(),
            _ => "Internal problem".to_string(),
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: self.code().to_string(),
            }),
        )
            .into_response()
    }
}

// ============ Master Handlers ============

async fn handle_append_data(
    State(state): State<Arc<MasterState>>,
    Json(req): Json<AppendDataRequest>,
) -> Result<Json<AppendDataResponse>> {
    let sequence_number = state
        .master
        .append_data(req.min_acknowledgments, &req.data)
        .await?;
    Ok(Json(AppendDataResponse { sequence_number }))
}

async fn handle_master_get_all(State(state): State<Arc<MasterState>>) -> Json<Vec<DataElement>> {
    Json(state.master.get_data(0).await)
}

async fn handle_master_get_from(
    State(state): State<Arc<MasterState>>,
    Path(from): Path<SeqNum>,
) -> Json<Vec<DataElement>> {
    Json(state.master.get_data(from).await)
}

async fn handle_acknowledge_reception(
    State(state): State<Arc<MasterState>>,
    Json(ack): Json<Acknowledgement>,
) -> StatusCode {
    state.master.acknowledge_reception(&ack);
    StatusCode::OK
}

async fn handle_master_health(State(state): State<Arc<MasterState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        role: Role::Master,
        replica_id: state.replica_id.clone(),
    })
}

async fn handle_master_status(State(state): State<Arc<MasterState>>) -> impl IntoResponse {
    Json(MasterStatusResponse {
        role: Role::Master,
        last_sequence: state.master.last_sequence().await,
        pending_writes: state.master.pending_count(),
        peers: state.peers.clone(),
        started_at: state.started_at,
    })
}

// ============ Slave Handlers ============

async fn handle_slave_get_all(State(state): State<Arc<SlaveState>>) -> Json<Vec<DataElement>> {
    Json(state.slave.read_local(0).await)
}

async fn handle_slave_append(
    State(state): State<Arc<SlaveState>>,
    Json(element): Json<DataElement>,
) -> StatusCode {
    state.slave.enqueue(element);
    StatusCode::OK
}

async fn handle_slave_health(State(state): State<Arc<SlaveState>>) -> impl IntoResponse {
    let healthy = state.slave.is_running().await;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            healthy,
            role: Role::Slave,
            replica_id: state.slave.replica_id().to_string(),
        }),
    )
}

async fn handle_slave_status(State(state): State<Arc<SlaveState>>) -> impl IntoResponse {
    let slave = &state.slave;
    Json(SlaveStatusResponse {
        role: Role::Slave,
        replica_id: slave.replica_id().to_string(),
        applied_sequence: slave.applied_sequence(),
        last_sequence: slave.last_sequence().await,
        running: slave.is_running().await,
        started_at: state.started_at,
    })
}
