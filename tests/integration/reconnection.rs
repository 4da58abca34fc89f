use crate::{client_config, loopback_config, start};
use framewire::{Client, Payload, SessionError};
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn identities_are_unique_across_accepts() {
    let mut server = start(loopback_config()).await;

    let mut ids = HashSet::new();
    let mut clients = Vec::new();
    for _ in 0..5 {
        let client = Client::connect(server.addr, client_config())
            .await
            .expect("connect");
        let session = server.next_session().await;
        assert_eq!(client.id(), session.id());
        ids.insert(client.id());
        clients.push(client);
    }
    assert_eq!(ids.len(), 5, "identities must be pairwise distinct");

    for client in clients {
        client.disconnect().await;
    }
}

#[tokio::test]
async fn reconnect_swaps_the_stream_and_keeps_the_identity() {
    let mut server = start(loopback_config()).await;
    let client = Client::connect(server.addr, client_config())
        .await
        .expect("connect");
    let session = server.next_session().await;
    let id = client.id();

    client.reconnect(server.addr).await.expect("reconnect");

    assert_eq!(client.id(), id, "identity must survive the reconnect");
    assert_eq!(server.server.session_count().await, 1);
    let found = server
        .server
        .find_by_id(id)
        .await
        .expect("session should still be registered");
    assert!(
        Arc::ptr_eq(&found, &session),
        "the prior session record must be reused"
    );
    assert!(session.is_active());

    // traffic flows over the fresh stream in both directions
    assert!(session.send(&Payload::from("post-reconnect")).await > 0);
    assert_eq!(client.receive().await, Some(Payload::from("post-reconnect")));
    assert!(client.send(&Payload::from("ack")).await > 0);
    assert_eq!(
        server.server.receive(&session).await,
        Some(Payload::from("ack"))
    );

    client.disconnect().await;
}

#[tokio::test]
async fn unknown_identity_is_denied() {
    let server_a = start(loopback_config()).await;
    let server_b = start(loopback_config()).await;

    // identity assigned by A means nothing to B
    let client = Client::connect(server_a.addr, client_config())
        .await
        .expect("connect");

    let result = client.reconnect(server_b.addr).await;
    assert!(matches!(result, Err(SessionError::ReconnectionDenied)));
    assert_eq!(server_b.server.session_count().await, 0);

    client.disconnect().await;
}
