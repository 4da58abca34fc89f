use crate::{client_config, loopback_config, start};
use framewire::{Client, Payload};
use framewire_core::wire;
use serde_json::json;

#[tokio::test]
async fn typed_payloads_round_trip_both_ways() {
    let mut server = start(loopback_config()).await;
    let client = Client::connect(server.addr, client_config())
        .await
        .expect("connect");
    let session = server.next_session().await;

    let cases = vec![
        Payload::from(""),
        Payload::from("a string"),
        Payload::Int(0),
        Payload::Int(-1),
        Payload::Int(i64::MAX),
        Payload::Bytes(Vec::new()),
        Payload::Bytes(vec![0x00, 0xFF]),
        Payload::Json(json!({"k": 1, "l": [1, 2]})),
    ];
    for payload in &cases {
        assert!(client.send(payload).await > 0);
        assert_eq!(server.server.receive(&session).await.as_ref(), Some(payload));

        assert!(session.send(payload).await > 0);
        assert_eq!(client.receive().await.as_ref(), Some(payload));
    }

    client.disconnect().await;
}

#[tokio::test]
async fn pings_never_reach_the_application() {
    let mut server = start(loopback_config()).await;
    let client = Client::connect(server.addr, client_config())
        .await
        .expect("connect");
    let session = server.next_session().await;

    for _ in 0..3 {
        assert!(session.send(&Payload::from(wire::PING)).await > 0);
    }
    assert!(session.send(&Payload::from("hello")).await > 0);

    assert_eq!(client.receive().await, Some(Payload::from("hello")));

    client.disconnect().await;
}

#[tokio::test]
async fn client_disconnect_removes_the_session() {
    let mut server = start(loopback_config()).await;
    let client = Client::connect(server.addr, client_config())
        .await
        .expect("connect");
    let session = server.next_session().await;
    assert_eq!(server.server.session_count().await, 1);

    client.disconnect().await;
    assert_eq!(server.server.receive(&session).await, None);
    assert_eq!(server.server.session_count().await, 0);
    assert!(!session.is_active());

    // close is idempotent on both sides
    client.disconnect().await;
    session.close().await;
}

#[tokio::test]
async fn fan_out_skips_the_sender() {
    let mut server = start(loopback_config()).await;

    let sender = Client::connect(server.addr, client_config())
        .await
        .expect("connect");
    let sender_session = server.next_session().await;
    let listener_a = Client::connect(server.addr, client_config())
        .await
        .expect("connect");
    server.next_session().await;
    let listener_b = Client::connect(server.addr, client_config())
        .await
        .expect("connect");
    server.next_session().await;

    let counts = server
        .server
        .multi_send(&Payload::from("to everyone else"), Some(&sender_session))
        .await;
    assert_eq!(counts.len(), 2);
    assert!(counts.iter().all(|&n| n > 0));

    assert_eq!(
        listener_a.receive().await,
        Some(Payload::from("to everyone else"))
    );
    assert_eq!(
        listener_b.receive().await,
        Some(Payload::from("to everyone else"))
    );
    // the sender hears nothing
    assert_eq!(sender.receive_timeout(1, false).await, None);

    for client in [sender, listener_a, listener_b] {
        client.disconnect().await;
    }
}
