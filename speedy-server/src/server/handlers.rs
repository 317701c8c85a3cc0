use super::service::CacheService;
use crate::core::{CacheStats, NodeInfo, SpeedyError};
use crate::protocol::commands::*;
use crate::protocol::{Request, Response};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CacheService>,
}

impl AppState {
    pub fn new(service: Arc<CacheService>) -> Self {
        Self { service }
    }
}

// Request/Response types for REST API
#[derive(Debug, Deserialize)]
pub struct PutRequest {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct PutResponse {
    pub success: bool,
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub node: String,
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct NodesResponse {
    pub node: String,
    pub nodes: Vec<NodeInfo>,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "speedy",
        "node": state.service.node().id,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /cache/{key}
pub async fn cache_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>, SpeedyError> {
    debug!("REST GET key={}", key);

    let value = state.service.get(&key)?;
    Ok(Json(GetResponse { key, value }))
}

/// PUT /cache/{key}
pub async fn cache_put(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<PutRequest>,
) -> Json<PutResponse> {
    debug!("REST PUT key={}", key);

    state.service.put(key.clone(), req.value);
    Json(PutResponse { success: true, key })
}

/// GET /cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.service.cache_stats();
    Json(StatsResponse {
        node: state.service.node().id.clone(),
        hit_rate: stats.hit_rate(),
        stats,
    })
}

/// GET /cluster/nodes
pub async fn cluster_nodes(State(state): State<AppState>) -> Json<NodesResponse> {
    Json(NodesResponse {
        node: state.service.node().id.clone(),
        nodes: state.service.cluster_config(),
    })
}

/// GET /cluster/leader
pub async fn cluster_leader(State(state): State<AppState>) -> Result<Json<Value>, SpeedyError> {
    let leader = state.service.leader()?;
    Ok(Json(json!({
        "leader_id": leader,
        "is_leader": state.service.election().is_leader(),
    })))
}

// ==================== Command Endpoint ====================

/// POST /api/v1/command
pub async fn command_handler(
    State(state): State<AppState>,
    Json(request): Json<Request>,
) -> Json<Response> {
    debug!(
        "Command: {} (request_id={})",
        request.command, request.request_id
    );

    Json(handle_command(&state, request).await)
}

/// Dispatch one command envelope
pub async fn handle_command(state: &AppState, request: Request) -> Response {
    let request_id = request.request_id.clone();
    let service = &state.service;

    let result = match request.command.as_str() {
        CACHE_GET => handle_cache_get_cmd(service, &request),
        CACHE_PUT => handle_cache_put_cmd(service, &request),
        CACHE_LEN => Ok(json!(LenBody { len: service.len() })),
        CLUSTER_GET_CONFIG => Ok(json!(ClusterConfigBody {
            nodes: service.cluster_config()
        })),
        CLUSTER_UPDATE_CONFIG => handle_update_config_cmd(service, &request).await,
        CLUSTER_REGISTER_NODE => handle_register_node_cmd(service, &request).await,
        ELECTION_GET_PID => handle_get_pid_cmd(service, &request),
        ELECTION_REQUEST => handle_request_election_cmd(service, &request),
        ELECTION_UPDATE_LEADER => handle_update_leader_cmd(service, &request),
        ELECTION_HEARTBEAT => handle_heartbeat_cmd(service, &request),
        ELECTION_GET_LEADER => service
            .get_leader()
            .await
            .map(|leader_id| json!(LeaderBody { leader_id })),
        _ => Err(SpeedyError::UnknownCommand(request.command.clone())),
    };

    match result {
        Ok(payload) => Response::success(request_id, payload),
        Err(e) => {
            if matches!(e, SpeedyError::KeyNotFound(_) | SpeedyError::LeaderNotFound) {
                debug!("Command {}: {}", request.command, e);
            } else {
                error!("Command error: {}", e);
            }
            Response::error(request_id, &e)
        }
    }
}

fn handle_cache_get_cmd(service: &CacheService, request: &Request) -> Result<Value, SpeedyError> {
    let body: KeyBody = request.parse()?;
    let value = service.get(&body.key)?;
    Ok(json!(ValueBody { value }))
}

fn handle_cache_put_cmd(service: &CacheService, request: &Request) -> Result<Value, SpeedyError> {
    let body: PutBody = request.parse()?;
    service.put(body.key, body.value);
    Ok(json!(AckBody::ok()))
}

async fn handle_update_config_cmd(
    service: &CacheService,
    request: &Request,
) -> Result<Value, SpeedyError> {
    let body: ClusterConfigBody = request.parse()?;
    let report = service.update_cluster_config(body.nodes).await;
    Ok(json!({ "ok": true, "changed": report.changed }))
}

async fn handle_register_node_cmd(
    service: &CacheService,
    request: &Request,
) -> Result<Value, SpeedyError> {
    let body: RegisterNodeBody = request.parse()?;
    service.register_node_with_cluster(body.node).await?;
    Ok(json!(AckBody::ok()))
}

fn handle_get_pid_cmd(service: &CacheService, request: &Request) -> Result<Value, SpeedyError> {
    let body: PidBody = request.parse()?;
    Ok(json!(PidBody {
        pid: service.get_pid(body.pid)
    }))
}

fn handle_request_election_cmd(
    service: &CacheService,
    request: &Request,
) -> Result<Value, SpeedyError> {
    let body: ElectionBody = request.parse()?;
    service.request_election(body.caller_pid, &body.caller_id);
    Ok(json!(AckBody::ok()))
}

fn handle_update_leader_cmd(
    service: &CacheService,
    request: &Request,
) -> Result<Value, SpeedyError> {
    let body: LeaderBody = request.parse()?;
    service.update_leader(&body.leader_id);
    Ok(json!(AckBody::ok()))
}

fn handle_heartbeat_cmd(service: &CacheService, request: &Request) -> Result<Value, SpeedyError> {
    let body: HeartbeatBody = request.parse()?;
    service.heartbeat(&body.caller_id);
    Ok(json!(AckBody::ok()))
}
