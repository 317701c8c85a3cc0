//! Bully leader election
//!
//! Priority is the `(pid, node_id)` pair: the lowest pair wins. A node that
//! finds a stronger reachable peer asks it to run the election and waits
//! for the announcement; a node with no stronger reachable peer declares
//! itself leader.

use super::config::ClusterConfig;
use super::membership::NodesConfig;
use super::node::Node;
use crate::core::{Result, SpeedyError};
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timeouts and periods used by the coordinator
#[derive(Debug, Clone, Copy)]
pub struct ElectionSettings {
    pub rpc_timeout: Duration,
    pub decision_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
}

impl Default for ElectionSettings {
    fn default() -> Self {
        Self::from(&ClusterConfig::default())
    }
}

impl From<&ClusterConfig> for ElectionSettings {
    fn from(config: &ClusterConfig) -> Self {
        Self {
            rpc_timeout: config.rpc_timeout(),
            decision_timeout: config.election_decision_timeout(),
            heartbeat_interval: config.heartbeat_interval(),
            poll_interval: config.election_poll_interval(),
        }
    }
}

#[derive(Debug, Default)]
struct ElectionState {
    leader: Option<String>,
    running: bool,
}

/// Whether `(peer_pid, peer_id)` outranks `(local_pid, local_id)`
pub fn outranks(peer_pid: u32, peer_id: &str, local_pid: u32, local_id: &str) -> bool {
    (peer_pid, peer_id) < (local_pid, local_id)
}

/// Per-node election state machine
pub struct ElectionCoordinator {
    node_id: String,
    pid: u32,
    membership: Arc<NodesConfig>,
    state: Mutex<ElectionState>,
    decision_tx: mpsc::Sender<String>,
    decision_rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
    settings: ElectionSettings,
    shutdown: CancellationToken,
}

impl ElectionCoordinator {
    pub fn new(
        node_id: impl Into<String>,
        pid: u32,
        membership: Arc<NodesConfig>,
        settings: ElectionSettings,
    ) -> Self {
        let (decision_tx, decision_rx) = mpsc::channel(1);

        Self {
            node_id: node_id.into(),
            pid,
            membership,
            state: Mutex::new(ElectionState::default()),
            decision_tx,
            decision_rx: tokio::sync::Mutex::new(decision_rx),
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Leader currently recorded, if any
    pub fn leader(&self) -> Option<String> {
        self.state.lock().leader.clone()
    }

    pub fn is_leader(&self) -> bool {
        self.state.lock().leader.as_deref() == Some(self.node_id.as_str())
    }

    pub fn settings(&self) -> &ElectionSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Run one Bully election. Calls made while an election is already in
    /// flight on this node return immediately.
    pub async fn run_election(&self) {
        {
            let mut state = self.state.lock();
            if state.running {
                info!("Election already in progress on {}", self.node_id);
                return;
            }
            state.running = true;
        }

        let mut decisions = self.decision_rx.lock().await;
        while decisions.try_recv().is_ok() {}

        loop {
            info!("Node {} (pid {}) starting election", self.node_id, self.pid);

            if !self.defer_to_stronger_peer().await {
                self.state.lock().leader = Some(self.node_id.clone());
                info!("Node {} elected itself leader", self.node_id);
                crate::metrics::record_election("won");
                self.announce_new_leader(&self.node_id).await;
                break;
            }

            match timeout(self.settings.decision_timeout, decisions.recv()).await {
                Ok(Some(leader)) => {
                    info!("Node {} accepted leader {}", self.node_id, leader);
                    crate::metrics::record_election("deferred");
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!("No election decision within {:?}, restarting", self.settings.decision_timeout);
                    crate::metrics::record_election("timeout");
                }
            }
        }

        drop(decisions);
        self.state.lock().running = false;
    }

    /// Probe every peer's pid and hand the election to the strongest
    /// reachable peer that outranks this node. Returns false when there is
    /// none.
    async fn defer_to_stronger_peer(&self) -> bool {
        let peers = self.membership.peers(&self.node_id);
        let probes = peers.iter().map(|peer| self.probe_pid(peer));
        let mut stronger: Vec<(u32, Arc<Node>)> = join_all(probes)
            .await
            .into_iter()
            .zip(peers.iter())
            .filter_map(|(pid, peer)| {
                let pid = pid?;
                outranks(pid, &peer.id, self.pid, &self.node_id).then(|| (pid, peer.clone()))
            })
            .collect();

        stronger.sort_by(|a, b| (a.0, &a.1.id).cmp(&(b.0, &b.1.id)));

        for (pid, peer) in stronger {
            debug!("Peer {} (pid {}) outranks {}", peer.id, pid, self.node_id);
            match self.request_election_from(&peer).await {
                Ok(()) => return true,
                Err(e) => warn!("Election request to {} failed: {}", peer.id, e),
            }
        }

        false
    }

    async fn probe_pid(&self, peer: &Node) -> Option<u32> {
        let outcome: Result<u32> = async {
            let client = peer.rpc(self.membership.connector()).await?;
            timeout(self.settings.rpc_timeout, client.get_pid(self.pid))
                .await
                .map_err(|_| SpeedyError::Timeout(format!("pid probe to {}", peer.id)))?
        }
        .await;

        match outcome {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!("Peer {} unreachable during election: {}", peer.id, e);
                None
            }
        }
    }

    async fn request_election_from(&self, peer: &Node) -> Result<()> {
        let client = peer.rpc(self.membership.connector()).await?;
        timeout(
            self.settings.rpc_timeout,
            client.request_election(self.pid, &self.node_id),
        )
        .await
        .map_err(|_| SpeedyError::Timeout(format!("election request to {}", peer.id)))?
    }

    /// Tell every peer who the leader is. Failures are logged per peer.
    pub async fn announce_new_leader(&self, leader_id: &str) {
        let peers = self.membership.peers(&self.node_id);
        let announcements = peers.iter().map(|peer| async move {
            let client = peer.rpc(self.membership.connector()).await?;
            timeout(self.settings.rpc_timeout, client.update_leader(leader_id))
                .await
                .map_err(|_| SpeedyError::Timeout(format!("leader announce to {}", peer.id)))?
        });

        for (peer, result) in peers.iter().zip(join_all(announcements).await) {
            if let Err(e) = result {
                warn!("Failed to announce leader {} to {}: {}", leader_id, peer.id, e);
            }
        }
    }

    /// Adopt an announced leader and wake a waiting election
    pub fn update_leader(&self, leader_id: &str) {
        self.state.lock().leader = Some(leader_id.to_string());
        info!("Node {} now follows leader {}", self.node_id, leader_id);

        if self.decision_tx.try_send(leader_id.to_string()).is_err() {
            debug!("Decision slot already full");
        }
    }

    /// Wait until a leader is known, triggering elections meanwhile
    pub async fn get_leader(&self, token: &CancellationToken) -> Result<String> {
        loop {
            if let Some(leader) = self.leader() {
                return Ok(leader);
            }

            self.run_election().await;
            if let Some(leader) = self.leader() {
                return Ok(leader);
            }

            tokio::select! {
                _ = token.cancelled() => return Err(SpeedyError::LeaderNotFound),
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    /// Heartbeat the recorded leader
    pub async fn is_leader_alive(&self) -> bool {
        let Some(leader) = self.leader() else {
            return false;
        };
        if leader == self.node_id {
            return true;
        }
        let Some(node) = self.membership.get_node(&leader) else {
            debug!("Leader {} is not a cluster member", leader);
            return false;
        };

        self.heartbeat(&node).await.is_ok()
    }

    async fn heartbeat(&self, node: &Node) -> Result<()> {
        let client = node.rpc(self.membership.connector()).await?;
        timeout(self.settings.rpc_timeout, client.get_heartbeat(&self.node_id))
            .await
            .map_err(|_| SpeedyError::Timeout(format!("heartbeat to {}", node.id)))?
    }

    /// Leader duty: drop unresponsive peers and push the new membership.
    /// Returns how many peers were removed.
    pub async fn sync_nodes_config(&self) -> usize {
        let peers = self.membership.peers(&self.node_id);
        let checks = peers.iter().map(|peer| self.heartbeat(peer));
        let results = join_all(checks).await;

        let mut removed = 0;
        for (peer, result) in peers.iter().zip(results) {
            if let Err(e) = result {
                warn!("Peer {} failed health check: {}", peer.id, e);
                match self.membership.remove_node(&peer.id).await {
                    Ok(_) => removed += 1,
                    Err(e) => debug!("Peer {} already removed: {}", peer.id, e),
                }
            }
        }

        if removed > 0 {
            crate::metrics::set_cluster_members(self.membership.len());
            self.push_cluster_config().await;
        }
        removed
    }

    /// Send the full membership to every peer
    pub async fn push_cluster_config(&self) {
        let nodes = self.membership.infos();
        let peers = self.membership.peers(&self.node_id);

        let pushes = peers.iter().map(|peer| {
            let nodes = nodes.clone();
            async move {
                let client = peer.rpc(self.membership.connector()).await?;
                timeout(self.settings.rpc_timeout, client.update_cluster_config(nodes))
                    .await
                    .map_err(|_| SpeedyError::Timeout(format!("config push to {}", peer.id)))?
            }
        });

        for (peer, result) in peers.iter().zip(join_all(pushes).await) {
            match result {
                Ok(()) => debug!("Pushed cluster config to {}", peer.id),
                Err(e) => error!("Failed to push cluster config to {}: {}", peer.id, e),
            }
        }
    }

    /// Spawn the heartbeat monitor. Followers check the leader and start an
    /// election when it is gone; the leader health-checks its peers.
    pub fn start_leader_heartbeat_monitor(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let election = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(election.settings.heartbeat_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = election.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if election.is_leader() {
                            election.sync_nodes_config().await;
                        } else if !election.is_leader_alive().await {
                            warn!("Leader {:?} unreachable, starting election", election.leader());
                            election.run_election().await;
                        }
                    }
                }
            }

            info!("Heartbeat monitor on {} stopped", election.node_id);
        })
    }

    /// Stop the heartbeat monitor
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
