//! Command names and payload bodies carried in the envelope

use crate::core::NodeInfo;
use serde::{Deserialize, Serialize};

pub const CACHE_GET: &str = "cache.get";
pub const CACHE_PUT: &str = "cache.put";
pub const CACHE_LEN: &str = "cache.len";
pub const CLUSTER_GET_CONFIG: &str = "cluster.get_config";
pub const CLUSTER_UPDATE_CONFIG: &str = "cluster.update_config";
pub const CLUSTER_REGISTER_NODE: &str = "cluster.register_node";
pub const ELECTION_GET_PID: &str = "election.get_pid";
pub const ELECTION_REQUEST: &str = "election.request";
pub const ELECTION_UPDATE_LEADER: &str = "election.update_leader";
pub const ELECTION_HEARTBEAT: &str = "election.heartbeat";
pub const ELECTION_GET_LEADER: &str = "election.get_leader";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyBody {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutBody {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueBody {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LenBody {
    pub len: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfigBody {
    pub nodes: Vec<NodeInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterNodeBody {
    pub node: NodeInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidBody {
    pub pid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionBody {
    pub caller_pid: u32,
    pub caller_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderBody {
    pub leader_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatBody {
    pub caller_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckBody {
    pub ok: bool,
}

impl AckBody {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}
