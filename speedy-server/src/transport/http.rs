use super::{CacheRpc, Connector};
use crate::core::{NodeInfo, Result, SpeedyError};
use crate::protocol::commands::*;
use crate::protocol::{Request, Response};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection handle speaking command envelopes over HTTP
pub struct HttpClient {
    http_client: Client,
    command_url: String,
    closed: AtomicBool,
}

impl HttpClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SpeedyError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            command_url: format!("http://{}:{}/api/v1/command", host, port),
            closed: AtomicBool::new(false),
        })
    }

    /// Send one command envelope and unwrap the response envelope
    async fn send_command(&self, command: &str, payload: Value) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SpeedyError::Transport("connection closed".to_string()));
        }

        let request = Request::new(command, payload);
        debug!("-> {} {} ({})", self.command_url, command, request.request_id);

        let response = self
            .http_client
            .post(&self.command_url)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpeedyError::Transport(format!("{}: {}", status, error_text)));
        }

        let envelope: Response = response.json().await.map_err(map_reqwest_error)?;
        envelope.into_result()
    }

    async fn call<T: DeserializeOwned>(&self, command: &str, payload: Value) -> Result<T> {
        let value = self.send_command(command, payload).await?;
        serde_json::from_value(value).map_err(|e| SpeedyError::Serialization(e.to_string()))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SpeedyError {
    if e.is_timeout() {
        SpeedyError::Timeout(e.to_string())
    } else if e.is_decode() {
        SpeedyError::Serialization(e.to_string())
    } else {
        SpeedyError::Transport(e.to_string())
    }
}

#[async_trait]
impl CacheRpc for HttpClient {
    async fn get(&self, key: &str) -> Result<String> {
        let body: ValueBody = self.call(CACHE_GET, json!({ "key": key })).await?;
        Ok(body.value)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.send_command(CACHE_PUT, json!({ "key": key, "value": value }))
            .await
            .map(|_| ())
    }

    async fn len(&self) -> Result<u32> {
        let body: LenBody = self.call(CACHE_LEN, json!({})).await?;
        Ok(body.len)
    }

    async fn get_cluster_config(&self) -> Result<Vec<NodeInfo>> {
        let body: ClusterConfigBody = self.call(CLUSTER_GET_CONFIG, json!({})).await?;
        Ok(body.nodes)
    }

    async fn update_cluster_config(&self, nodes: Vec<NodeInfo>) -> Result<()> {
        self.send_command(CLUSTER_UPDATE_CONFIG, json!({ "nodes": nodes }))
            .await
            .map(|_| ())
    }

    async fn register_node_with_cluster(&self, node: NodeInfo) -> Result<()> {
        self.send_command(CLUSTER_REGISTER_NODE, json!({ "node": node }))
            .await
            .map(|_| ())
    }

    async fn get_pid(&self, caller_pid: u32) -> Result<u32> {
        let body: PidBody = self
            .call(ELECTION_GET_PID, json!({ "pid": caller_pid }))
            .await?;
        Ok(body.pid)
    }

    async fn request_election(&self, caller_pid: u32, caller_id: &str) -> Result<()> {
        self.send_command(
            ELECTION_REQUEST,
            json!({ "caller_pid": caller_pid, "caller_id": caller_id }),
        )
        .await
        .map(|_| ())
    }

    async fn update_leader(&self, leader_id: &str) -> Result<()> {
        self.send_command(ELECTION_UPDATE_LEADER, json!({ "leader_id": leader_id }))
            .await
            .map(|_| ())
    }

    async fn get_heartbeat(&self, caller_id: &str) -> Result<()> {
        self.send_command(ELECTION_HEARTBEAT, json!({ "caller_id": caller_id }))
            .await
            .map(|_| ())
    }

    async fn get_leader(&self) -> Result<String> {
        let body: LeaderBody = self.call(ELECTION_GET_LEADER, json!({})).await?;
        Ok(body.leader_id)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(SpeedyError::Transport("connection already closed".to_string()));
        }
        Ok(())
    }
}

/// Builds [`HttpClient`] handles
#[derive(Debug, Clone, Default)]
pub struct HttpConnector;

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn CacheRpc>> {
        Ok(Arc::new(HttpClient::new(host, port)?))
    }
}
