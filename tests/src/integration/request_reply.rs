//! # Request/Reply Across Nodes
//!
//! An `api` node and worker nodes share one broker. Each test drives the
//! ingress over HTTP and checks that the reply comes back from the right
//! worker, correlated by token.

#[cfg(test)]
mod tests {
    use super::super::harness::{get, post, start, start_role, wait_for_roles};
    use futures::future::join_all;
    use relay_gateway::compute::ascii::render_banner;
    use relay_gateway::Role;
    use shared_bus::InMemoryBus;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ascii_round_trip_through_ingress() {
        let hub = InMemoryBus::new();
        let api = start_role(&hub, Role::Api).await;
        let ascii = start_role(&hub, Role::Ascii).await;

        let reply = get(api.local_addr(), "/?target=ascii&text=hello").await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, render_banner("hello").unwrap());

        // same payload again is a cache hit on the worker
        let again = post(api.local_addr(), "/?target=ascii&cmd=render", "hello").await;
        assert_eq!(again.body, reply.body);
        assert_eq!(ascii.metrics().cache_hits.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(api.pending_count(), 0);

        ascii.shutdown().await;
        api.shutdown().await;
    }

    #[tokio::test]
    async fn test_data_put_then_get_by_token() {
        let hub = InMemoryBus::new();
        let api = start_role(&hub, Role::Api).await;
        let data = start_role(&hub, Role::Data).await;
        let addr = api.local_addr();

        let put = post(addr, "/?target=data&cmd=put&token=42", "hello").await;
        assert_eq!(put.status, 200);
        assert_eq!(put.body, "hello");

        let read = get(addr, "/?target=data&cmd=get&token=42").await;
        assert_eq!(read.status, 200);
        assert_eq!(read.body, "hello");

        // the worker answers with an error reply, not silence
        let missing = get(addr, "/?target=data&cmd=get&token=43").await;
        assert_eq!(missing.status, 502);
        assert_eq!(missing.json()["error"], "remote_error");

        // the same record through the worker's own HTTP surface
        let direct = get(data.local_addr(), "/?token=42").await;
        assert_eq!(direct.body, "hello");

        data.shutdown().await;
        api.shutdown().await;
    }

    #[tokio::test]
    async fn test_every_worker_role_answers() {
        let hub = InMemoryBus::new();
        let api = start_role(&hub, Role::Api).await;
        let ml5 = start_role(&hub, Role::Ml5).await;
        let img = start_role(&hub, Role::Img).await;
        let addr = api.local_addr();

        let sentiment = get(addr, "/?target=ml5&text=great").await;
        assert_eq!(sentiment.status, 200);
        assert_eq!(sentiment.json()["label"], "positive");

        // GIF89a, 2x3
        let image = post(addr, "/?target=img", "474946383961 0200 0300").await;
        assert_eq!(image.status, 200);
        let info = image.json();
        assert_eq!(info["format"], "gif");
        assert_eq!(info["width"], 2);
        assert_eq!(info["height"], 3);

        img.shutdown().await;
        ml5.shutdown().await;
        api.shutdown().await;
    }

    #[tokio::test]
    async fn test_workers_announce_to_running_ingress() {
        let hub = InMemoryBus::new();
        let api = start_role(&hub, Role::Api).await;
        let ascii = start_role(&hub, Role::Ascii).await;
        let data = start_role(&hub, Role::Data).await;

        let roles = wait_for_roles(api.local_addr(), 2).await;
        let environments: Vec<&str> = roles
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["environment"].as_str().unwrap())
            .collect();
        assert_eq!(
            environments,
            vec![
                format!("k8sdiy-ascii:{}", relay_gateway::VERSION),
                format!("k8sdiy-data:{}", relay_gateway::VERSION),
            ]
        );
        assert_eq!(roles[1]["usage"], Role::Data.usage());

        data.shutdown().await;
        ascii.shutdown().await;
        api.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_requests_get_their_own_reply() {
        let hub = InMemoryBus::new();
        let api = start_role(&hub, Role::Api).await;
        let ascii = start_role(&hub, Role::Ascii).await;
        let addr = api.local_addr();

        let requests = (0..16).map(|i| async move {
            let text = format!("n{i}");
            let reply = get(addr, &format!("/?target=ascii&text={text}")).await;
            (text, reply)
        });

        for (text, reply) in join_all(requests).await {
            assert_eq!(reply.status, 200);
            assert_eq!(reply.body, render_banner(&text).unwrap());
        }
        assert_eq!(api.metrics().requests(), 16);
        assert_eq!(api.pending_count(), 0);

        ascii.shutdown().await;
        api.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_worker_times_out() {
        let hub = InMemoryBus::new();
        let mut config = super::super::harness::config(Role::Api);
        config.wait_timeout = Duration::from_millis(100);
        let api = start(&hub, config).await;

        let reply = get(api.local_addr(), "/?target=img&text=00").await;
        assert_eq!(reply.status, 504);
        assert_eq!(reply.json()["error"], "timeout");
        assert_eq!(api.pending_count(), 0);

        let metrics = get(api.local_addr(), "/metrics").await.json();
        assert_eq!(metrics["requests"]["timeouts"], 1);
        assert_eq!(metrics["requests"]["error"], 1);

        api.shutdown().await;
    }

    #[tokio::test]
    async fn test_client_token_in_flight_is_rejected() {
        let hub = InMemoryBus::new();
        let api = start_role(&hub, Role::Api).await;
        let addr = api.local_addr();

        // nobody answers img, so the first request holds token 7 until it times out
        let first = tokio::spawn(async move { get(addr, "/?target=img&token=7&text=00").await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = get(addr, "/?target=img&token=7&text=00").await;
        assert_eq!(second.status, 409);
        assert_eq!(first.await.unwrap().status, 504);

        api.shutdown().await;
    }
}
