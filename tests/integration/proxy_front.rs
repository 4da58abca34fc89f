use crate::{loopback_config, start};
use framewire::{Client, Payload};
use framewire_core::config::ClientConfig;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[tokio::test]
async fn v1_preamble_sets_the_canonical_address() {
    let mut config = loopback_config();
    config.protocol.allow_proxy = true;
    let mut server = start(config).await;

    let mut stream = TcpStream::connect(server.addr).await.expect("connect");
    stream
        .write_all(b"PROXY TCP4 203.0.113.7 198.51.100.1 51234 443\r\n")
        .await
        .expect("preamble");
    // let the preamble land before the handshake bytes follow it
    tokio::time::sleep(Duration::from_millis(100)).await;

    let peer_addr = stream.peer_addr().expect("peer addr");
    let (r, w) = stream.into_split();
    let client = Client::connect_wrapped(
        Box::new(r),
        Box::new(w),
        peer_addr,
        ClientConfig::default(),
    )
    .await
    .expect("connect through the proxy preamble");

    let session = server.next_session().await;
    assert_eq!(
        session.canonical_addr(),
        Some(("203.0.113.7".parse().unwrap(), 51234))
    );

    // the session works normally after the preamble
    assert!(client.send(&Payload::from("via proxy")).await > 0);
    assert_eq!(
        server.server.receive(&session).await,
        Some(Payload::from("via proxy"))
    );

    client.disconnect().await;
}

#[tokio::test]
async fn plain_clients_still_connect_when_proxy_is_allowed() {
    let mut config = loopback_config();
    config.protocol.allow_proxy = true;
    let mut server = start(config).await;

    let client = Client::connect(server.addr, ClientConfig::default())
        .await
        .expect("connect");
    let session = server.next_session().await;
    assert_eq!(session.canonical_addr(), None);

    client.disconnect().await;
}
