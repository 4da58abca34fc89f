use crate::{client_config, loopback_config, start};
use framewire::{Client, Payload};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn concurrent_senders_produce_whole_frames() {
    const SENDERS: usize = 4;
    const PER_SENDER: usize = 10;

    let mut config = loopback_config();
    config.protocol.chunk_size = 512;
    let mut server = start(config).await;

    let client = Arc::new(
        Client::connect(server.addr, client_config())
            .await
            .expect("connect"),
    );
    let session = server.next_session().await;

    let mut handles = Vec::new();
    for sender in 0..SENDERS {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            for message in 0..PER_SENDER {
                // larger than one chunk so interleaving would corrupt frames
                let text = format!("sender-{sender}-message-{message}-{}", "x".repeat(1500));
                assert!(client.send(&Payload::from(text)).await > 0);
            }
        }));
    }

    let mut seen = HashSet::new();
    for _ in 0..SENDERS * PER_SENDER {
        match server.server.receive(&session).await {
            Some(Payload::Str(text)) => {
                assert!(text.starts_with("sender-"), "corrupted frame: {text}");
                seen.insert(text);
            }
            other => panic!("expected a string payload, got {other:?}"),
        }
    }
    assert_eq!(
        seen.len(),
        SENDERS * PER_SENDER,
        "every payload arrives exactly once"
    );

    for handle in handles {
        handle.await.expect("sender task");
    }
    client.disconnect().await;
}

#[tokio::test]
async fn liveness_prunes_dead_clients() {
    let mut config = loopback_config();
    config.liveness.ping_interval_secs = 1;
    let mut server = start(config).await;

    let client = Client::connect(server.addr, client_config())
        .await
        .expect("connect");
    server.next_session().await;
    assert_eq!(server.server.session_count().await, 1);

    // vanish without an orderly disconnect
    drop(client);

    let mut pruned = false;
    for _ in 0..100 {
        if server.server.session_count().await == 0 {
            pruned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(pruned, "liveness worker should prune the dead session");
}

#[tokio::test]
async fn bidirectional_traffic_shares_one_session() {
    let mut server = start(loopback_config()).await;
    let client = Arc::new(
        Client::connect(server.addr, client_config())
            .await
            .expect("connect"),
    );
    let session = server.next_session().await;

    // one writer and one reader proceed in parallel on the same session
    let downlink = {
        let session = session.clone();
        tokio::spawn(async move {
            for i in 0..20i64 {
                assert!(session.send(&Payload::Int(i)).await > 0);
            }
        })
    };
    let uplink = {
        let client = client.clone();
        tokio::spawn(async move {
            for i in 0..20i64 {
                assert!(client.send(&Payload::Int(-i)).await > 0);
            }
        })
    };

    let mut from_server = Vec::new();
    for _ in 0..20 {
        match client.receive().await {
            Some(Payload::Int(n)) => from_server.push(n),
            other => panic!("unexpected downlink payload: {other:?}"),
        }
    }
    let mut from_client = Vec::new();
    for _ in 0..20 {
        match server.server.receive(&session).await {
            Some(Payload::Int(n)) => from_client.push(n),
            other => panic!("unexpected uplink payload: {other:?}"),
        }
    }

    // per-direction ordering is preserved
    assert_eq!(from_server, (0..20).collect::<Vec<i64>>());
    assert_eq!(from_client, (0..20).map(|i| -i).collect::<Vec<i64>>());

    downlink.await.expect("downlink task");
    uplink.await.expect("uplink task");
    client.disconnect().await;
}
