//! Reconnect behavior: resubscription, dropped requests, keepalive failure,
//! and lifecycle events.

mod support;

use std::time::Duration;

use tokio::time::timeout;
use twitch_pubsub::{ClientEvent, PubSubClient, PubSubError};

use support::{connected_client, mock_link, next_connection, test_config};

/// Confirm a listen for `topic` over the given server handle.
async fn confirm_listen(
    client: &PubSubClient,
    server: &mut support::ServerHandle,
    topic: &'static str,
) -> String {
    let worker = client.clone();
    let listen = tokio::spawn(async move { worker.listen("c1", topic).await });
    let (nonce, sent_topic, _) = server.expect_topic_request("LISTEN").await;
    assert_eq!(sent_topic, topic);
    server.respond(&nonce, "");
    timeout(Duration::from_secs(3), listen)
        .await
        .expect("resolved")
        .expect("task")
        .expect("confirmed");
    nonce
}

#[tokio::test]
async fn confirmed_topics_are_resent_after_a_reconnect() {
    let (client, mut server, _connector, mut handles) = connected_client(test_config()).await;
    let mut events = client.events();
    let old_nonce = confirm_listen(&client, &mut server, "topic.x").await;

    drop(server);

    let mut server = next_connection(&mut handles).await;
    let (nonce, topic, auth) = server.expect_topic_request("LISTEN").await;
    assert_eq!(topic, "topic.x");
    assert_eq!(auth, "tok1");
    assert_ne!(nonce, old_nonce, "resubscription uses a fresh request");
    server.respond(&nonce, "");

    timeout(Duration::from_secs(3), async {
        loop {
            if client.topics().iter().any(|t| t.topic == "topic.x") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("topic reconfirmed");

    // The caller sees the bounce only through lifecycle events.
    let mut saw = (false, false, false);
    timeout(Duration::from_secs(3), async {
        while !(saw.0 && saw.1 && saw.2) {
            match events.recv().await {
                Ok(ClientEvent::Disconnected) => saw.0 = true,
                Ok(ClientEvent::Reconnecting) => saw.1 = true,
                Ok(ClientEvent::Connected) => saw.2 = true,
                Ok(_) => {}
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("lifecycle events observed");
}

#[tokio::test]
async fn pending_unlisten_is_cancelled_by_a_reconnect() {
    let (client, mut server, _connector, mut handles) = connected_client(test_config()).await;
    confirm_listen(&client, &mut server, "topic.x").await;

    let worker = client.clone();
    let unlisten = tokio::spawn(async move { worker.unlisten("c1", "topic.x").await });
    let (_nonce, topic, _) = server.expect_topic_request("UNLISTEN").await;
    assert_eq!(topic, "topic.x");

    drop(server);

    let result = timeout(Duration::from_secs(3), unlisten)
        .await
        .expect("resolved")
        .expect("task");
    assert!(matches!(result, Err(PubSubError::Cancelled)), "{result:?}");

    // The mid-unlisten topic reappears as confirmed-to-be: it is resubscribed.
    let mut server = next_connection(&mut handles).await;
    let (nonce, topic, _) = server.expect_topic_request("LISTEN").await;
    assert_eq!(topic, "topic.x");
    server.respond(&nonce, "");
}

#[tokio::test]
async fn pending_listen_survives_a_reconnect_with_its_nonce() {
    let (client, mut server, _connector, mut handles) = connected_client(test_config()).await;

    let worker = client.clone();
    let listen = tokio::spawn(async move { worker.listen("c1", "topic.y").await });
    let (first_nonce, _, _) = server.expect_topic_request("LISTEN").await;

    drop(server);

    // The caller keeps waiting; the request goes out again on the new
    // connection under the same nonce.
    let mut server = next_connection(&mut handles).await;
    let (nonce, topic, _) = server.expect_topic_request("LISTEN").await;
    assert_eq!(topic, "topic.y");
    assert_eq!(nonce, first_nonce);
    server.respond(&nonce, "");

    timeout(Duration::from_secs(3), listen)
        .await
        .expect("resolved")
        .expect("task")
        .expect("confirmed across the reconnect");
}

#[tokio::test]
async fn server_reconnect_frame_forces_a_reconnect() {
    let (client, mut server, _connector, mut handles) = connected_client(test_config()).await;
    confirm_listen(&client, &mut server, "topic.x").await;

    server.send_raw(r#"{"type":"RECONNECT"}"#);

    let mut server = next_connection(&mut handles).await;
    let (nonce, topic, _) = server.expect_topic_request("LISTEN").await;
    assert_eq!(topic, "topic.x");
    server.respond(&nonce, "");
}

#[tokio::test]
async fn missing_pong_forces_a_reconnect() {
    let config = test_config()
        .ping_interval(Duration::from_millis(100))
        .pong_grace(Duration::from_millis(100));
    let (_client, mut server, _connector, mut handles) = connected_client(config).await;

    let frame = server.expect_frame().await;
    assert_eq!(frame["type"], "PING");
    // No PONG: the grace window elapses and the client reconnects.
    let _server = next_connection(&mut handles).await;
}

#[tokio::test]
async fn pong_within_grace_keeps_the_connection() {
    let config = test_config()
        .ping_interval(Duration::from_millis(100))
        .pong_grace(Duration::from_millis(100));
    let (client, mut server, _connector, mut handles) = connected_client(config).await;

    for _ in 0..2 {
        let frame = server.expect_frame().await;
        assert_eq!(frame["type"], "PING");
        server.send_raw(r#"{"type":"PONG"}"#);
    }

    assert!(
        timeout(Duration::from_millis(120), handles.recv()).await.is_err(),
        "client must not reconnect while pongs arrive"
    );
    assert!(client.is_connected());
}

#[tokio::test]
async fn failed_attempts_retry_until_the_server_accepts() {
    let (connector, mut handles) = mock_link();
    connector.fail_next(2);
    let client =
        PubSubClient::with_connector(test_config(), connector.clone()).expect("valid config");
    client.add_channel("c1", "tok1").expect("valid channel");

    timeout(Duration::from_secs(3), client.connect())
        .await
        .expect("connect resolved")
        .expect("connected after retries");
    let _server = next_connection(&mut handles).await;
    assert!(client.is_connected());
}

#[tokio::test]
async fn disconnect_cancels_in_flight_requests() {
    let (client, mut server, _connector, _handles) = connected_client(test_config()).await;
    let mut events = client.events();

    let worker = client.clone();
    let listen = tokio::spawn(async move { worker.listen("c1", "topic.x").await });
    let (_nonce, _, _) = server.expect_topic_request("LISTEN").await;

    client.disconnect().await;

    let result = timeout(Duration::from_secs(3), listen)
        .await
        .expect("resolved")
        .expect("task");
    assert!(matches!(result, Err(PubSubError::Cancelled)), "{result:?}");
    assert!(!client.is_connected());

    timeout(Duration::from_secs(3), async {
        loop {
            if let Ok(ClientEvent::Disconnected) = events.recv().await {
                return;
            }
        }
    })
    .await
    .expect("disconnected event");
}

#[tokio::test]
async fn disconnect_cancels_a_connect_in_progress() {
    let (connector, _handles) = mock_link();
    connector.fail_next(usize::MAX);
    let client =
        PubSubClient::with_connector(test_config(), connector.clone()).expect("valid config");

    let worker = client.clone();
    let connecting = tokio::spawn(async move { worker.connect().await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    client.disconnect().await;

    let result = timeout(Duration::from_secs(3), connecting)
        .await
        .expect("resolved")
        .expect("task");
    assert!(matches!(result, Err(PubSubError::Cancelled)), "{result:?}");
}

#[tokio::test]
async fn client_can_reconnect_after_an_explicit_disconnect() {
    let (client, mut server, _connector, mut handles) = connected_client(test_config()).await;
    confirm_listen(&client, &mut server, "topic.x").await;

    client.disconnect().await;
    assert!(!client.is_connected());

    client.connect().await.expect("second connect");
    let mut server = next_connection(&mut handles).await;

    // Confirmed topics survive an explicit disconnect and are resubscribed.
    let (nonce, topic, _) = server.expect_topic_request("LISTEN").await;
    assert_eq!(topic, "topic.x");
    server.respond(&nonce, "");
}
