use crate::{client_config, loopback_config, start};
use framewire::{Client, Payload};

#[tokio::test]
async fn fixed_chunk_dictated_by_server() {
    let mut config = loopback_config();
    config.protocol.chunk_size = 512;
    let mut server = start(config).await;

    let client = Client::connect(server.addr, client_config())
        .await
        .expect("connect");
    let session = server.next_session().await;

    // a payload spanning several 512-byte chunks survives intact
    let blob: Vec<u8> = (0..2000u32).map(|i| (i % 256) as u8).collect();
    assert!(client.send(&Payload::Bytes(blob.clone())).await > 0);
    assert_eq!(
        server.server.receive(&session).await,
        Some(Payload::Bytes(blob))
    );

    client.disconnect().await;
}

#[tokio::test]
async fn client_suggestion_is_adopted() {
    let mut config = loopback_config();
    config.protocol.enforce_chunks = false;
    let mut server = start(config).await;

    let mut preferences = client_config();
    preferences.chunk_size = 4096;
    let client = Client::connect(server.addr, preferences)
        .await
        .expect("connect");
    let session = server.next_session().await;

    let blob = vec![0xA5u8; 10_000];
    assert!(client.send(&Payload::Bytes(blob.clone())).await > 0);
    assert_eq!(
        server.server.receive(&session).await,
        Some(Payload::Bytes(blob))
    );

    client.disconnect().await;
}

#[tokio::test]
async fn compressed_round_trip_shrinks_the_wire() {
    let mut config = loopback_config();
    config.protocol.compression_level = 3;
    let mut server = start(config).await;

    let client = Client::connect(server.addr, client_config())
        .await
        .expect("connect");
    let session = server.next_session().await;

    // 10 KiB of a single repeated byte compresses far below its raw size
    let blob = vec![0x41u8; 10 * 1024];
    let on_wire = client.send(&Payload::Bytes(blob.clone())).await;
    assert!(on_wire > 0);
    assert!(
        on_wire < blob.len() as u64,
        "on-wire length {on_wire} should be smaller than the original"
    );
    assert_eq!(
        server.server.receive(&session).await,
        Some(Payload::Bytes(blob))
    );

    client.disconnect().await;
}
