//! # Shutdown Drain Across Nodes
//!
//! Draining one node must not disturb the others on the broker, and work
//! accepted before the drain must finish.

#[cfg(test)]
mod tests {
    use super::super::harness::{config, get, post, start, start_role};
    use relay_gateway::adapters::{MemoryCache, SqliteStore};
    use relay_gateway::{Collaborators, RelayService, Role, RunningInstance};
    use shared_bus::InMemoryBus;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    async fn start_data_on_file(hub: &InMemoryBus, path: &Path) -> RunningInstance {
        let collaborators = Collaborators {
            bus: Arc::new(hub.connection()),
            cache: Arc::new(MemoryCache::new()),
            store: Some(Arc::new(SqliteStore::open(path).unwrap())),
        };
        RelayService::start(config(Role::Data), collaborators)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_worker_drain_leaves_ingress_running() {
        let hub = InMemoryBus::new();
        let api = start_role(&hub, Role::Api).await;
        let ascii = start_role(&hub, Role::Ascii).await;
        let addr = api.local_addr();

        assert_eq!(get(addr, "/?target=ascii&text=hi").await.status, 200);

        let report = ascii.shutdown().await;
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.requests_total, 1);

        // nobody serves ascii any more; the ingress still answers
        let reply = get(addr, "/?target=ascii&text=hi").await;
        assert_eq!(reply.status, 504);
        assert_eq!(get(addr, "/readinez").await.status, 200);

        api.shutdown().await;
    }

    #[tokio::test]
    async fn test_draining_ingress_rejects_new_requests() {
        let hub = InMemoryBus::new();
        let api = start_role(&hub, Role::Api).await;
        let addr = api.local_addr();

        assert!(api.drain_handle().begin());

        let reply = get(addr, "/?target=ascii&text=hi").await;
        assert_eq!(reply.status, 503);
        assert_eq!(reply.json()["error"], "draining");

        let ready = get(addr, "/readinez").await;
        assert_eq!(ready.status, 503);
        assert_eq!(ready.json()["draining"], true);

        let report = api.shutdown().await;
        assert_eq!(report.abandoned, 0);
        assert_eq!(report.dispatched, 0);
    }

    #[tokio::test]
    async fn test_ingress_drain_waits_for_in_flight_request() {
        let hub = InMemoryBus::new();
        let api = start_role(&hub, Role::Api).await;
        let addr = api.local_addr();

        // no img worker: the request stays pending until its wait runs out
        let in_flight = tokio::spawn(async move { get(addr, "/?target=img&text=00").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(api.pending_count(), 1);

        let report = api.shutdown().await;
        assert_eq!(report.abandoned, 0);

        // the response still reached the client before the server stopped
        let reply = in_flight.await.unwrap();
        assert_eq!(reply.status, 504);
    }

    #[tokio::test]
    async fn test_acknowledged_writes_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        let hub = InMemoryBus::new();

        let data = start_data_on_file(&hub, &path).await;
        let put = post(data.local_addr(), "/?cmd=put&token=9", "kept").await;
        assert_eq!(put.status, 200);
        data.shutdown().await;

        // fresh node, empty cache: the read goes to the store
        let data = start_data_on_file(&hub, &path).await;
        let read = get(data.local_addr(), "/?token=9").await;
        assert_eq!(read.status, 200);
        assert_eq!(read.body, "kept");
        assert_eq!(
            data.metrics()
                .cache_misses
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
        data.shutdown().await;
    }

    #[tokio::test]
    async fn test_data_node_without_store_starts_degraded() {
        let hub = InMemoryBus::new();
        let api = start_role(&hub, Role::Api).await;
        let collaborators = Collaborators {
            bus: Arc::new(hub.connection()),
            cache: Arc::new(MemoryCache::new()),
            store: None,
        };
        let data = RelayService::start(config(Role::Data), collaborators)
            .await
            .unwrap();

        let ready = get(data.local_addr(), "/readinez").await;
        assert_eq!(ready.status, 503);
        assert_eq!(ready.json()["store"], false);
        assert_eq!(ready.json()["bus"], true);

        let direct = post(data.local_addr(), "/?cmd=put&token=1", "lost").await;
        assert_eq!(direct.status, 502);
        assert_eq!(direct.json()["error"], "compute_failed");
        assert!(direct.json()["message"]
            .as_str()
            .unwrap()
            .contains("durable store unavailable"));

        // still subscribed: the ingress gets an error reply, not a timeout
        let relayed = post(api.local_addr(), "/?target=data&cmd=put&token=2", "lost").await;
        assert_eq!(relayed.status, 502);
        assert_eq!(relayed.json()["error"], "remote_error");

        data.shutdown().await;
        api.shutdown().await;
    }

    #[tokio::test]
    async fn test_wait_budget_bounds_ingress_drain() {
        let hub = InMemoryBus::new();
        let mut cfg = config(Role::Api);
        cfg.wait_timeout = Duration::from_millis(150);
        let api = start(&hub, cfg).await;
        let addr = api.local_addr();

        let started = tokio::time::Instant::now();
        let in_flight = tokio::spawn(async move { get(addr, "/?target=ml5&text=ok").await });
        tokio::time::sleep(Duration::from_millis(30)).await;

        api.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(in_flight.await.unwrap().status, 504);
    }
}
