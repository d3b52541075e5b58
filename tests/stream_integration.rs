// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the event subsystem using wiremock.

use std::time::Duration;

use nimbus_lib::{CloudClient, CloudConfig, CloudEvent, Error, Session};
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type Item = Result<CloudEvent, Error>;

type Collector = Box<dyn Fn(Item) + Send + Sync>;

/// Builds a subscription handler that forwards every invocation to a
/// channel the test can drain.
fn collector() -> (Collector, mpsc::UnboundedReceiver<Item>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = Box::new(move |item: Item| {
        let _ = tx.send(item);
    });
    (handler, rx)
}

async fn next_item(rx: &mut mpsc::UnboundedReceiver<Item>) -> Item {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a dispatched item")
        .expect("handler channel closed")
}

/// Config pointed at the mock server with reconnects slowed far past test
/// duration, so a stream ending does not refetch the mock and replay it.
fn no_reconnect_config(server: &MockServer) -> CloudConfig {
    CloudConfig::new()
        .with_base_url(server.uri())
        .with_reconnect_backoff(Duration::from_secs(60), Duration::from_secs(60))
}

fn frame(name: &str, data: &str, device_id: &str) -> String {
    format!("event: {name}\ndata: {data}\ncoreid: {device_id}\n\n")
}

// ============================================================================
// Streaming delivery
// ============================================================================

mod streaming {
    use super::*;

    #[tokio::test]
    async fn firehose_events_are_delivered_in_order() {
        let server = MockServer::start().await;

        let body = [
            frame("temperature", "1", "d1"),
            frame("temperature", "2", "d2"),
            frame("temperature", "3", "d3"),
        ]
        .concat();
        Mock::given(method("GET"))
            .and(path("/v1/events"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        let (handler, mut rx) = collector();
        client.subscribe_to_events("temp", handler).await.unwrap();

        for expected in ["1", "2", "3"] {
            let event = next_item(&mut rx).await.unwrap();
            assert_eq!(event.name(), "temperature");
            assert_eq!(event.data(), expected);
        }

        client.shutdown();
    }

    #[tokio::test]
    async fn multibyte_payload_split_across_reads_is_not_corrupted() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        // wiremock sends bodies whole, so a raw server controls exactly
        // where the read boundary falls: between the two bytes of 'é'.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            socket
                .write_all(b"event: label\ndata: caf\xC3")
                .await
                .unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            socket
                .write_all(b"\xA9\ncoreid: abc123\n\n")
                .await
                .unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let client = CloudClient::new(
            CloudConfig::new()
                .with_base_url(format!("http://{addr}"))
                .with_reconnect_backoff(Duration::from_secs(60), Duration::from_secs(60)),
        )
        .unwrap();
        let (handler, mut rx) = collector();
        client.subscribe_to_events("", handler).await.unwrap();

        let event = next_item(&mut rx).await.unwrap();
        assert_eq!(event.data(), "café");

        client.shutdown();
    }

    #[tokio::test]
    async fn single_device_scope_filters_by_device_and_prefix() {
        let server = MockServer::start().await;

        // Only temperature@abc123 may get through.
        let body = [
            frame("temperature", "hit", "abc123"),
            frame("temperature", "wrong-device", "xyz999"),
            frame("humidity", "wrong-prefix", "abc123"),
            frame("temperature", "done", "abc123"),
        ]
        .concat();
        Mock::given(method("GET"))
            .and(path("/v1/devices/abc123/events"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        let (handler, mut rx) = collector();
        client
            .subscribe_to_device_events("temp", "abc123", handler)
            .await
            .unwrap();

        let first = next_item(&mut rx).await.unwrap();
        assert_eq!(first.data(), "hit");
        // The sentinel arriving next proves the two middle records were
        // filtered out rather than still in flight.
        let second = next_item(&mut rx).await.unwrap();
        assert_eq!(second.data(), "done");

        client.shutdown();
    }

    #[tokio::test]
    async fn malformed_frame_surfaces_one_error_and_stream_survives() {
        let server = MockServer::start().await;

        let body = format!(
            "event: broken\nttl: 60\n\n{}",
            frame("temperature", "after", "d1")
        );
        Mock::given(method("GET"))
            .and(path("/v1/events"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        let (handler, mut rx) = collector();
        client.subscribe_to_events("", handler).await.unwrap();

        let first = next_item(&mut rx).await;
        assert!(matches!(first, Err(Error::Parse(_))));

        let second = next_item(&mut rx).await.unwrap();
        assert_eq!(second.data(), "after");

        client.shutdown();
    }

    #[tokio::test]
    async fn reconnects_after_stream_drop_and_discards_partial_frame() {
        let server = MockServer::start().await;

        // First connection: two whole frames, then the stream dies in the
        // middle of a third.
        let first_body = format!(
            "{}{}event: cut\ndata: off-mid",
            frame("temperature", "1", "d1"),
            frame("temperature", "2", "d1"),
        );
        Mock::given(method("GET"))
            .and(path("/v1/events"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(first_body, "text/event-stream"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        // Reconnected stream resumes with fresh frames.
        Mock::given(method("GET"))
            .and(path("/v1/events"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(frame("temperature", "3", "d1"), "text/event-stream")
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;

        let config = CloudConfig::new()
            .with_base_url(server.uri())
            .with_reconnect_backoff(Duration::from_millis(50), Duration::from_millis(200));
        let client = CloudClient::new(config).unwrap();
        let (handler, mut rx) = collector();
        client.subscribe_to_events("", handler).await.unwrap();

        let mut names_and_data = Vec::new();
        for _ in 0..3 {
            let event = next_item(&mut rx).await.unwrap();
            names_and_data.push((event.name().to_string(), event.data().to_string()));
        }

        // Subscriber never re-subscribed, yet delivery resumed; the
        // truncated "cut" frame was discarded, not delivered or errored.
        assert_eq!(
            names_and_data,
            [
                ("temperature".to_string(), "1".to_string()),
                ("temperature".to_string(), "2".to_string()),
                ("temperature".to_string(), "3".to_string()),
            ]
        );

        client.shutdown();
    }

    #[tokio::test]
    async fn revoked_token_is_terminal_and_fans_out_once_per_subscription() {
        let server = MockServer::start().await;

        // Delayed so both subscriptions are registered before the terminal
        // error fans out.
        Mock::given(method("GET"))
            .and(path("/v1/events"))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        let (handler_a, mut rx_a) = collector();
        let (handler_b, mut rx_b) = collector();
        client.subscribe_to_events("temp", handler_a).await.unwrap();
        client.subscribe_to_events("humidity", handler_b).await.unwrap();

        assert!(matches!(next_item(&mut rx_a).await, Err(Error::Authentication)));
        assert!(matches!(next_item(&mut rx_b).await, Err(Error::Authentication)));

        // Exactly once: nothing further arrives on either handler.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());

        client.shutdown();
    }

    #[tokio::test]
    async fn private_events_delivered_only_for_owned_devices() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/devices"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "abc123", "name": "porch", "connected": true}
            ])))
            .mount(&server)
            .await;

        let body = [
            "event: reading\ndata: mine\ncoreid: abc123\nprivate: true\n\n".to_string(),
            "event: reading\ndata: theirs\ncoreid: xyz999\nprivate: true\n\n".to_string(),
            frame("reading", "public", "xyz999"),
        ]
        .concat();
        Mock::given(method("GET"))
            .and(path("/v1/events"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        client.set_session(Session::new("ada@example.com", "tok-1"));

        let (handler, mut rx) = collector();
        client.subscribe_to_events("", handler).await.unwrap();

        // Subscribing refreshed the owned-device snapshot from the cloud
        assert!(client.device_snapshot().owns("abc123"));

        let first = next_item(&mut rx).await.unwrap();
        assert_eq!(first.data(), "mine");
        let second = next_item(&mut rx).await.unwrap();
        assert_eq!(second.data(), "public");

        client.shutdown();
    }

    #[tokio::test]
    async fn owned_devices_scope_delivers_only_claimed_devices() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/devices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "mine-1"}
            ])))
            .mount(&server)
            .await;

        let body = [
            frame("state", "claimed", "mine-1"),
            frame("state", "foreign", "other-9"),
            frame("state", "claimed-again", "mine-1"),
        ]
        .concat();
        Mock::given(method("GET"))
            .and(path("/v1/devices/events"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        client.set_session(Session::new("ada@example.com", "tok-2"));

        let (handler, mut rx) = collector();
        client
            .subscribe_to_owned_devices_events("", handler)
            .await
            .unwrap();

        let first = next_item(&mut rx).await.unwrap();
        assert_eq!(first.data(), "claimed");
        let second = next_item(&mut rx).await.unwrap();
        assert_eq!(second.data(), "claimed-again");

        client.shutdown();
    }
}

// ============================================================================
// Publishing
// ============================================================================

mod publishing {
    use super::*;

    #[tokio::test]
    async fn publish_posts_expected_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/devices/events"))
            .and(body_json(serde_json::json!({
                "name": "temp/porch",
                "data": "21.0",
                "private": false,
                "ttl": 120
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        client.publish_event("temp/porch", "21.0", false, 120).await.unwrap();
    }

    #[tokio::test]
    async fn private_publish_carries_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/devices/events"))
            .and(header("authorization", "Bearer tok-3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        client.set_session(Session::new("ada@example.com", "tok-3"));
        client.publish_event("door", "open", true, 60).await.unwrap();
    }

    #[tokio::test]
    async fn private_publish_without_session_sends_nothing() {
        let server = MockServer::start().await;

        // The mock records every request; zero calls proves the rejection
        // happened before any bytes hit the wire.
        Mock::given(method("POST"))
            .and(path("/v1/devices/events"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        let err = client.publish_event("door", "open", true, 60).await.unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));

        server.verify().await;
    }

    #[tokio::test]
    async fn publish_maps_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/devices/events"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        let err = client.publish_event("ghost", "", false, 60).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn publish_maps_revoked_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/devices/events"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        client.set_session(Session::new("ada@example.com", "revoked"));
        let err = client.publish_event("door", "open", true, 60).await.unwrap_err();
        assert!(matches!(err, Error::Authentication));
    }
}

// ============================================================================
// Device directory
// ============================================================================

mod devices {
    use super::*;

    #[tokio::test]
    async fn refresh_devices_installs_snapshot() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/devices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "a"}, {"id": "b", "connected": true}
            ])))
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        client.set_session(Session::new("ada@example.com", "tok"));

        let snapshot = client.refresh_devices().await.unwrap();
        assert_eq!(snapshot.ids().len(), 2);
        assert!(snapshot.owns("a"));
        assert!(snapshot.owns("b"));
        assert_eq!(snapshot.version(), 1);
    }

    #[tokio::test]
    async fn refresh_devices_maps_revoked_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/devices"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = CloudClient::new(no_reconnect_config(&server)).unwrap();
        client.set_session(Session::new("ada@example.com", "stale"));

        let err = client.refresh_devices().await.unwrap_err();
        assert!(matches!(err, Error::Authentication));
    }
}
