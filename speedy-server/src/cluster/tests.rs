#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use crate::cluster::*;
    use crate::config::ServerConfig;
    use crate::core::{NodeInfo, Result, SpeedyError};
    use crate::server::CacheService;
    use crate::sharding::{self, AlgorithmType, default_hash};
    use crate::transport::{CacheRpc, Connector, LocalConnector, LocalNetwork};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn info(id: &str, port: u16) -> NodeInfo {
        NodeInfo::new(id, "local", port)
    }

    fn fast_cluster_config(nodes: Vec<NodeInfo>) -> ClusterConfig {
        ClusterConfig {
            nodes,
            rpc_timeout_ms: 200,
            heartbeat_interval_ms: 100,
            election_poll_interval_ms: 100,
            sync_interval_ms: 50,
            node_selector: SelectorKind::RoundRobin,
        }
    }

    /// Start one service per `(id, port, pid)` on `network`, all sharing
    /// the same initial membership
    fn start_cluster(network: &Arc<LocalNetwork>, specs: &[(&str, u16, u32)]) -> Vec<Arc<CacheService>> {
        let members: Vec<NodeInfo> = specs.iter().map(|(id, port, _)| info(id, *port)).collect();
        specs
            .iter()
            .map(|(id, port, pid)| start_node(network, info(id, *port), *pid, members.clone()))
            .collect()
    }

    fn start_node(
        network: &Arc<LocalNetwork>,
        node: NodeInfo,
        pid: u32,
        members: Vec<NodeInfo>,
    ) -> Arc<CacheService> {
        let mut config = ServerConfig::default();
        config.node.id = Some(node.id.clone());
        config.node.pid = Some(pid);
        config.cache.capacity = 100;
        config.cluster = fast_cluster_config(members);

        let connector = Arc::new(LocalConnector::new(network.clone()));
        let service = Arc::new(CacheService::from_config(&config, node, connector));
        network.register(service.clone());
        service
    }

    fn client_membership(network: &Arc<LocalNetwork>, seeds: Vec<NodeInfo>) -> NodesConfig {
        NodesConfig::new(
            seeds,
            Arc::new(LocalConnector::new(network.clone())),
            SelectorKind::RoundRobin,
            Duration::from_millis(200),
        )
    }

    async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..250 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    fn leaders(services: &[Arc<CacheService>]) -> Vec<Option<String>> {
        services.iter().map(|s| s.election().leader()).collect()
    }

    /// Connector whose handles only count how often they are closed
    #[derive(Default)]
    struct CountingConnector {
        connects: AtomicUsize,
        closes: Arc<AtomicUsize>,
    }

    struct CountingClient {
        closes: Arc<AtomicUsize>,
    }

    fn unused<T>() -> Result<T> {
        Err(SpeedyError::Transport("not wired".into()))
    }

    #[async_trait]
    impl CacheRpc for CountingClient {
        async fn get(&self, _key: &str) -> Result<String> {
            unused()
        }
        async fn put(&self, _key: &str, _value: &str) -> Result<()> {
            unused()
        }
        async fn len(&self) -> Result<u32> {
            unused()
        }
        async fn get_cluster_config(&self) -> Result<Vec<NodeInfo>> {
            unused()
        }
        async fn update_cluster_config(&self, _nodes: Vec<NodeInfo>) -> Result<()> {
            unused()
        }
        async fn register_node_with_cluster(&self, _node: NodeInfo) -> Result<()> {
            unused()
        }
        async fn get_pid(&self, _caller_pid: u32) -> Result<u32> {
            unused()
        }
        async fn request_election(&self, _caller_pid: u32, _caller_id: &str) -> Result<()> {
            unused()
        }
        async fn update_leader(&self, _leader_id: &str) -> Result<()> {
            unused()
        }
        async fn get_heartbeat(&self, _caller_id: &str) -> Result<()> {
            unused()
        }
        async fn get_leader(&self) -> Result<String> {
            unused()
        }
        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, host: &str, _port: u16) -> Result<Arc<dyn CacheRpc>> {
            if host == "unreachable" {
                return Err(SpeedyError::Transport("connection refused".into()));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            // Let concurrent adds interleave at the connect point
            tokio::task::yield_now().await;
            Ok(Arc::new(CountingClient {
                closes: self.closes.clone(),
            }))
        }
    }

    // ==================== Node ====================

    #[tokio::test]
    async fn test_refresh_client_reuses_handle() {
        let connector = CountingConnector::default();
        let node = Node::new(info("n1", 1));

        let first = node.refresh_client(&connector).await.unwrap();
        let second = node.refresh_client(&connector).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_node_closes_exactly_once() {
        let connector = CountingConnector::default();
        let node = Node::new(info("n1", 1));
        node.refresh_client(&connector).await.unwrap();

        node.close().await.unwrap();
        node.close().await.unwrap();

        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
        assert!(node.is_closed());
        assert!(node.refresh_client(&connector).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_failure_reported() {
        let connector = CountingConnector::default();
        let node = Node::new(NodeInfo::new("n1", "unreachable", 1));

        let Err(err) = node.refresh_client(&connector).await else {
            panic!("connect to an unreachable node should fail");
        };
        assert!(matches!(err, ClusterError::Connect { ref node, .. } if node == "n1"));
        assert!(node.client().is_none());
    }

    // ==================== Membership ====================

    #[tokio::test]
    async fn test_initial_membership_order_and_dedup() {
        let membership = NodesConfig::new(
            vec![info("b", 2), info("a", 1), info("b", 3)],
            Arc::new(CountingConnector::default()),
            SelectorKind::RoundRobin,
            Duration::from_millis(100),
        );

        assert_eq!(membership.ids(), vec!["b", "a"]);
        assert_eq!(membership.get_node("b").unwrap().port, 2);
        assert!(membership.get_node("c").is_none());
        let shard_ids: Vec<String> = membership.get_shards().into_iter().map(|s| s.id).collect();
        assert_eq!(shard_ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_sync_states_applies_diff() {
        let connector = Arc::new(CountingConnector::default());
        let shards = sharding::shared(sharding::new_algorithm(
            AlgorithmType::Consistent,
            vec![info("A", 1), info("B", 2)].iter().map(Into::into).collect(),
            default_hash(),
        ));
        let membership = NodesConfig::new(
            vec![info("A", 1), info("B", 2)],
            connector.clone(),
            SelectorKind::RoundRobin,
            Duration::from_millis(100),
        )
        .with_shards(shards.clone());
        // Connect A so its removal has a handle to close
        membership
            .get_node("A")
            .unwrap()
            .refresh_client(connector.as_ref())
            .await
            .unwrap();

        let report = membership.sync_states(&[info("B", 2), info("C", 3)]).await;

        assert!(report.changed);
        assert!(report.failures.is_empty());
        assert_eq!(report.total, 3);

        let mut ids = membership.ids();
        ids.sort();
        assert_eq!(ids, vec!["B", "C"]);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);

        let mut shard_ids: Vec<String> = shards.read().shards().into_iter().map(|s| s.id).collect();
        shard_ids.sort();
        assert_eq!(shard_ids, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_sync_states_unchanged() {
        let membership = NodesConfig::new(
            vec![info("A", 1)],
            Arc::new(CountingConnector::default()),
            SelectorKind::RoundRobin,
            Duration::from_millis(100),
        );

        let report = membership.sync_states(&[info("A", 1)]).await;
        assert!(!report.changed);
        assert!(report.error().is_none());
    }

    #[tokio::test]
    async fn test_partial_apply_still_reports_changed() {
        let membership = NodesConfig::new(
            vec![info("A", 1)],
            Arc::new(CountingConnector::default()),
            SelectorKind::RoundRobin,
            Duration::from_millis(100),
        );

        let report = membership
            .sync_states(&[
                info("A", 1),
                info("B", 2),
                NodeInfo::new("C", "unreachable", 3),
            ])
            .await;

        assert!(report.changed);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.error(), Some(ClusterError::PartialSync { .. })));
        assert!(membership.contains("B"));
        assert!(!membership.contains("C"));
    }

    #[tokio::test]
    async fn test_concurrent_add_closes_losing_handle() {
        let connector = Arc::new(CountingConnector::default());
        let membership = NodesConfig::new(
            vec![],
            connector.clone(),
            SelectorKind::RoundRobin,
            Duration::from_millis(100),
        );

        let (first, second) = tokio::join!(
            membership.add_node(info("A", 1)),
            membership.add_node(info("A", 1))
        );

        assert!(first.is_ok() != second.is_ok());
        let loser = if first.is_err() { first } else { second };
        assert!(matches!(loser, Err(ClusterError::NodeExists(ref id)) if id == "A"));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
        assert_eq!(membership.len(), 1);
    }

    #[tokio::test]
    async fn test_add_existing_and_remove_missing() {
        let membership = NodesConfig::new(
            vec![info("A", 1)],
            Arc::new(CountingConnector::default()),
            SelectorKind::RoundRobin,
            Duration::from_millis(100),
        );

        assert_eq!(
            membership.add_node(info("A", 1)).await.unwrap_err(),
            ClusterError::NodeExists("A".into())
        );
        assert_eq!(
            membership.remove_node("Z").await.unwrap_err(),
            ClusterError::NodeNotFound("Z".into())
        );
    }

    #[tokio::test]
    async fn test_sync_pulls_peer_view() {
        let network = LocalNetwork::new();
        start_cluster(&network, &[("A", 1, 1), ("B", 2, 2), ("C", 3, 3)]);

        let membership = client_membership(&network, vec![info("A", 1)]);
        let report = membership.sync().await.unwrap();

        assert!(report.changed);
        assert_eq!(membership.len(), 3);
    }

    #[tokio::test]
    async fn test_sync_with_empty_membership() {
        let network = LocalNetwork::new();
        let membership = client_membership(&network, Vec::new());

        assert_eq!(
            membership.sync().await.unwrap_err(),
            ClusterError::NoNodeSelected
        );
    }

    #[tokio::test]
    async fn test_sync_against_down_peer_fails() {
        let network = LocalNetwork::new();
        start_cluster(&network, &[("A", 1, 1)]);
        network.take_down("local:1");

        let membership = client_membership(&network, vec![info("A", 1)]);
        assert!(matches!(
            membership.sync().await,
            Err(ClusterError::Rpc(SpeedyError::Transport(_)))
        ));
    }

    // ==================== Syncer ====================

    #[tokio::test]
    async fn test_syncer_updates_shard_table() {
        let network = LocalNetwork::new();
        start_cluster(&network, &[("A", 1, 1), ("B", 2, 2), ("C", 3, 3)]);

        let shards = sharding::shared(sharding::new_algorithm(
            AlgorithmType::Rendezvous,
            vec![(&info("A", 1)).into()],
            default_hash(),
        ));
        let membership = Arc::new(client_membership(&network, vec![info("A", 1)]));
        let syncer = ClusterSyncer::new(membership.clone(), shards.clone(), Duration::from_millis(20));

        let token = CancellationToken::new();
        let (handle, mut errors) = syncer.start(token.clone());

        assert!(wait_until(|| shards.read().len() == 3).await);
        assert_eq!(membership.len(), 3);

        token.cancel();
        handle.await.unwrap();
        // Loop exit closes the error channel
        assert!(errors.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_syncer_surfaces_errors() {
        let network = LocalNetwork::new();
        let shards = sharding::shared(sharding::new_algorithm(
            AlgorithmType::Consistent,
            Vec::new(),
            default_hash(),
        ));
        let membership = Arc::new(client_membership(&network, vec![info("ghost", 9)]));
        let syncer = ClusterSyncer::new(membership, shards, Duration::from_millis(20));

        let token = CancellationToken::new();
        let (handle, mut errors) = syncer.start(token.clone());

        let first = tokio::time::timeout(Duration::from_secs(2), errors.recv())
            .await
            .unwrap();
        assert!(matches!(first, Some(ClusterError::Rpc(_))));

        token.cancel();
        handle.await.unwrap();
    }

    // ==================== Election ====================

    #[test]
    fn test_outranks_ordering() {
        assert!(outranks(10, "b", 20, "a"));
        assert!(!outranks(20, "a", 10, "b"));
        // Equal pids fall back to the lower id
        assert!(outranks(5, "a", 5, "b"));
        assert!(!outranks(5, "b", 5, "a"));
        assert!(!outranks(5, "a", 5, "a"));
    }

    #[tokio::test]
    async fn test_single_node_elects_itself() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("solo", 1, 42)]);
        let election = services[0].election();

        election.run_election().await;

        assert!(election.is_leader());
        assert!(election.is_leader_alive().await);
        assert!(!election.is_running());
    }

    #[tokio::test]
    async fn test_lowest_pid_wins() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("n1", 1, 30), ("n2", 2, 10), ("n3", 3, 20)]);

        services[0].election().run_election().await;

        let all_agree = wait_until(|| {
            leaders(&services)
                .iter()
                .all(|l| l.as_deref() == Some("n2"))
        })
        .await;
        assert!(all_agree, "leaders: {:?}", leaders(&services));
        assert!(services[1].election().is_leader());
    }

    #[tokio::test]
    async fn test_pid_tie_broken_by_lowest_id() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("c", 3, 5), ("b", 2, 5), ("a", 1, 5)]);

        services[0].election().run_election().await;

        let all_agree =
            wait_until(|| leaders(&services).iter().all(|l| l.as_deref() == Some("a"))).await;
        assert!(all_agree, "leaders: {:?}", leaders(&services));
    }

    #[tokio::test]
    async fn test_unreachable_stronger_peer_is_skipped() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("n1", 1, 1), ("n2", 2, 2), ("n3", 3, 3)]);
        network.take_down("local:1");

        services[2].election().run_election().await;

        assert!(
            wait_until(|| {
                services[1].election().leader().as_deref() == Some("n2")
                    && services[2].election().leader().as_deref() == Some("n2")
            })
            .await
        );
    }

    #[tokio::test]
    async fn test_leader_failure_detected() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("n1", 1, 30), ("n2", 2, 10), ("n3", 3, 20)]);

        services[0].election().run_election().await;
        assert!(wait_until(|| services[2].election().leader().as_deref() == Some("n2")).await);
        assert!(services[2].election().is_leader_alive().await);

        network.take_down("local:2");
        assert!(!services[2].election().is_leader_alive().await);

        services[2].election().run_election().await;
        assert!(services[2].election().is_leader());
        assert!(wait_until(|| services[0].election().leader().as_deref() == Some("n3")).await);
    }

    #[tokio::test]
    async fn test_leader_not_in_membership_is_dead() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("n1", 1, 1), ("n2", 2, 2)]);

        services[0].update_leader("ghost");
        assert!(!services[0].election().is_leader_alive().await);
        assert!(!services[0].election().is_leader());
    }

    #[tokio::test]
    async fn test_update_leader_with_full_slot() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("n1", 1, 1)]);

        services[0].update_leader("x");
        services[0].update_leader("y");

        assert_eq!(services[0].leader().unwrap(), "y");
    }

    #[tokio::test]
    async fn test_get_leader_runs_election() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("n1", 1, 1), ("n2", 2, 2)]);
        let token = CancellationToken::new();

        let leader = services[1].election().get_leader(&token).await.unwrap();
        assert_eq!(leader, "n1");
    }

    #[tokio::test]
    async fn test_get_leader_rpc_elects_when_none_known() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("n1", 1, 1), ("n2", 2, 2)]);
        let rpc = LocalConnector::new(network.clone()).connect("local", 1).await.unwrap();

        assert_eq!(rpc.get_leader().await.unwrap(), "n1");
        assert_eq!(services[0].election().leader().as_deref(), Some("n1"));
        assert!(wait_until(|| services[1].election().leader().as_deref() == Some("n1")).await);
    }

    #[tokio::test]
    async fn test_get_leader_skips_down_stronger_peer() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("n1", 1, 1), ("n2", 2, 2)]);
        network.take_down("local:1");

        assert_eq!(services[1].get_leader().await.unwrap(), "n2");
        assert!(services[1].election().is_leader());
    }

    #[tokio::test]
    async fn test_no_leader_reported_before_election() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("n1", 1, 1)]);
        assert_eq!(services[0].leader(), Err(SpeedyError::LeaderNotFound));
    }

    #[tokio::test]
    async fn test_leader_removes_dead_peer_and_pushes_config() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("n1", 1, 1), ("n2", 2, 2), ("n3", 3, 3)]);

        services[0].election().run_election().await;
        assert!(services[0].election().is_leader());

        network.take_down("local:3");
        let removed = services[0].election().sync_nodes_config().await;

        assert_eq!(removed, 1);
        assert!(!services[0].membership().contains("n3"));
        assert!(!services[1].membership().contains("n3"));
        assert!(services[1].membership().contains("n2"));
    }

    #[tokio::test]
    async fn test_heartbeat_monitor_reelects() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("n1", 1, 30), ("n2", 2, 10), ("n3", 3, 20)]);
        let token = CancellationToken::new();

        services[0].election().run_election().await;
        assert!(wait_until(|| leaders(&services).iter().all(|l| l.as_deref() == Some("n2"))).await);

        let monitors: Vec<_> = services
            .iter()
            .map(|s| s.election().start_leader_heartbeat_monitor(token.clone()))
            .collect();

        network.take_down("local:2");

        let reelected = wait_until(|| {
            services[0].election().leader().as_deref() == Some("n3")
                && services[2].election().leader().as_deref() == Some("n3")
        })
        .await;
        assert!(reelected, "leaders: {:?}", leaders(&services));

        token.cancel();
        for monitor in monitors {
            monitor.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_monitor() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("n1", 1, 1)]);

        let monitor = services[0]
            .election()
            .start_leader_heartbeat_monitor(CancellationToken::new());
        services[0].shutdown().await;

        tokio::time::timeout(Duration::from_secs(1), monitor)
            .await
            .unwrap()
            .unwrap();
    }

    // ==================== Join ====================

    #[tokio::test]
    async fn test_join_propagates_to_peers() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("A", 1, 1), ("B", 2, 2)]);
        let newcomer = start_node(
            &network,
            info("N", 9),
            9,
            vec![info("A", 1), info("B", 2), info("N", 9)],
        );

        newcomer.register_with_cluster().await;

        assert!(services[0].membership().contains("N"));
        assert!(services[1].membership().contains("N"));
        assert_eq!(newcomer.membership().len(), 3);
    }

    #[tokio::test]
    async fn test_register_known_node_is_noop() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("A", 1, 1), ("B", 2, 2)]);

        services[0].register_node_with_cluster(info("B", 2)).await.unwrap();
        assert_eq!(services[0].membership().len(), 2);
    }

    #[tokio::test]
    async fn test_config_update_keeps_self() {
        let network = LocalNetwork::new();
        let services = start_cluster(&network, &[("A", 1, 1), ("B", 2, 2)]);

        let report = services[0].update_cluster_config(vec![info("B", 2)]).await;

        assert!(!report.changed);
        assert!(services[0].membership().contains("A"));
    }
}
