mod common;

use common::{eventually, start_server, test_config, TestClient};
use hostel_common::protocol::{publish_line, subscribe_line};

#[tokio::test]
async fn publish_reaches_other_subscribers_only() {
    let server = start_server(test_config(&["room1"], 128)).await;
    let mut alice = TestClient::connect(server.addr).await;
    let mut bob = TestClient::connect(server.addr).await;
    let mut carol = TestClient::connect(server.addr).await;

    alice.send(&subscribe_line([("room1", "alice")])).await;
    alice.sync().await;
    bob.send(&subscribe_line([("room1", "bob")])).await;
    bob.sync().await;
    carol.send(&subscribe_line([("room1", "carol")])).await;
    carol.sync().await;

    alice.send(&publish_line("room1", "hello | all")).await;

    assert_eq!(bob.recv().await, "alice@room1: hello | all");
    assert_eq!(carol.recv().await, "alice@room1: hello | all");
    // The sender gets no copy: the next line it sees is the sync reply.
    alice.sync().await;

    let history = server.state.hub.list_history("room1");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].nick, "alice");
    assert_eq!(history[0].text, "hello | all");
}

#[tokio::test]
async fn new_subscriber_gets_bounded_history() {
    let server = start_server(test_config(&["room1"], 2)).await;
    let mut alice = TestClient::connect(server.addr).await;

    alice.send("subscribe|room1:alice").await;
    for text in ["m1", "m2", "m3"] {
        alice.send(&format!("publish|room1|{text}")).await;
    }
    alice.sync().await;

    let mut bob = TestClient::connect(server.addr).await;
    bob.send("subscribe|room1:bob").await;
    assert_eq!(bob.recv().await, "alice@room1: m2");
    assert_eq!(bob.recv().await, "alice@room1: m3");
    bob.sync().await;
}

#[tokio::test]
async fn subscribe_batch_reports_unknown_room() {
    let server = start_server(test_config(&["room1"], 128)).await;
    let mut alice = TestClient::connect(server.addr).await;

    alice.send("subscribe|room1:alice|badroom:bob").await;
    assert_eq!(alice.recv().await, "Cannot subscribe to unknown room: badroom.");
    alice.sync().await;

    let subscribers = server.state.hub.list_subscribers("room1");
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers.values().next().unwrap().nick, "alice");
}

#[tokio::test]
async fn nick_is_unique_per_room_only() {
    let server = start_server(test_config(&["room1", "room2"], 128)).await;
    let mut first = TestClient::connect(server.addr).await;
    let mut second = TestClient::connect(server.addr).await;

    first.send("subscribe|room1:alice").await;
    first.sync().await;

    second.send("subscribe|room1:ALICE|room2:alice").await;
    assert_eq!(second.recv().await, "User alice already joined room1.");
    second.sync().await;

    assert_eq!(server.state.hub.list_subscribers("room1").len(), 1);
    assert_eq!(server.state.hub.list_subscribers("room2").len(), 1);
}

#[tokio::test]
async fn errors_keep_the_connection_usable() {
    let server = start_server(test_config(&["room1"], 128)).await;
    let mut alice = TestClient::connect(server.addr).await;

    alice.send("dance|now").await;
    assert_eq!(alice.recv().await, "Unknown command: dance.");
    alice.send("subscribe|room1").await;
    assert_eq!(alice.recv().await, "Nickname for room1 is missing.");
    alice.send("publish|room1|hi").await;
    assert_eq!(alice.recv().await, "You are not subscribed to room1.");
    alice.send("publish|room1|   ").await;
    assert_eq!(alice.recv().await, "Message is empty.");
    alice.send(&format!("publish|room1|{}", "x".repeat(255))).await;
    assert_eq!(alice.recv().await, "Message is too long.");

    alice.send("subscribe|room1:alice").await;
    alice.sync().await;
    assert_eq!(server.state.hub.list_subscribers("room1").len(), 1);
}

#[tokio::test]
async fn disconnect_releases_subscriptions_and_nick() {
    let server = start_server(test_config(&["room1", "room2"], 128)).await;
    let mut alice = TestClient::connect(server.addr).await;
    let mut bob = TestClient::connect(server.addr).await;

    alice.send("subscribe|room1:alice|room2:alice").await;
    alice.sync().await;
    bob.send("subscribe|room1:bob").await;
    bob.sync().await;

    alice.hang_up().await;
    assert_eq!(alice.recv_or_eof().await, None);

    let hub = server.state.hub.clone();
    eventually(|| hub.list_subscribers("room2").is_empty()).await;
    assert_eq!(hub.list_subscribers("room1").len(), 1);
    let service = server.state.service.clone();
    eventually(|| service.sessions().len() == 1).await;

    // The nick is free again, and bob is untouched.
    let mut again = TestClient::connect(server.addr).await;
    again.send("subscribe|room1:alice").await;
    again.sync().await;
    again.send("publish|room1|back").await;
    assert_eq!(bob.recv().await, "alice@room1: back");
}

#[tokio::test]
async fn replies_sent_before_hang_up_are_flushed() {
    let server = start_server(test_config(&["room1"], 128)).await;
    let mut alice = TestClient::connect(server.addr).await;

    for i in 0..10 {
        alice.send(&format!("nope{i}")).await;
    }
    alice.hang_up().await;

    for i in 0..10 {
        assert_eq!(alice.recv().await, format!("Unknown command: nope{i}."));
    }
    assert_eq!(alice.recv_or_eof().await, None);
}

#[tokio::test]
async fn shutdown_stops_accepting_but_keeps_live_connections() {
    let server = start_server(test_config(&["room1"], 128)).await;
    let mut alice = TestClient::connect(server.addr).await;
    alice.sync().await;

    server.shutdown.send(()).expect("server still running");

    // Established connections keep working.
    alice.send("publish|room1|x").await;
    assert_eq!(alice.recv().await, "You are not subscribed to room1.");
}
