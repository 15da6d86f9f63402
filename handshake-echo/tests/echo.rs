//! End-to-end tests: a real `Server` on loopback driven by `Session` clients.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

use handshake_echo::{
    config::CLIENT_ISN,
    link::Link,
    packet::{Header, HANDSHAKE_SLOT},
    state::Phase,
    status::Status,
    ClientConfig, RetryPolicy, Server, ServerConfig, Session,
};

const LIMIT: Duration = Duration::from_secs(10);

fn fast() -> RetryPolicy {
    RetryPolicy::with_delay(Duration::from_millis(1))
}

/// Start a server on an ephemeral port; dropping the sender stops it.
async fn start_server(max_clients: usize) -> (SocketAddr, oneshot::Sender<()>) {
    let config = ServerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        max_clients,
        retry: fast(),
        ..ServerConfig::default()
    };
    let server = Server::bind(config).await.expect("bind server");
    let addr = server.local_addr().unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(server.run_until(async move {
        let _ = stop_rx.await;
    }));
    (addr, stop_tx)
}

fn client_config(server: SocketAddr) -> ClientConfig {
    ClientConfig {
        server,
        retry: fast(),
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn echo_round_trip() {
    let (addr, _stop) = start_server(30).await;

    let mut session = timeout(LIMIT, Session::connect(&client_config(addr)))
        .await
        .unwrap()
        .expect("handshake");
    assert!(session.handshake().is_established());
    assert_eq!(session.bufsize(), 4096);

    let echo = timeout(LIMIT, session.exchange(b"hello")).await.unwrap().unwrap();
    assert_eq!(echo, b"hello");

    let echo = timeout(LIMIT, session.exchange(b"second message")).await.unwrap().unwrap();
    assert_eq!(echo, b"second message");

    session.close().await.unwrap();
}

#[tokio::test]
async fn echo_is_capped_at_1024_bytes() {
    let (addr, _stop) = start_server(30).await;
    let mut session = Session::connect(&client_config(addr)).await.unwrap();

    let long = vec![b'x'; 3000];
    let echo = timeout(LIMIT, session.exchange(&long)).await.unwrap().unwrap();
    assert_eq!(echo.len(), 1024);
    assert!(echo.iter().all(|&b| b == b'x'));
}

#[tokio::test]
async fn small_bufsize_truncates_to_the_slot() {
    let (addr, _stop) = start_server(30).await;
    let config = ClientConfig {
        bufsize: 20,
        ..client_config(addr)
    };
    let mut session = Session::connect(&config).await.unwrap();
    assert_eq!(session.bufsize(), 20);

    // 20-byte slot leaves 7 bytes of payload.
    let echo = timeout(LIMIT, session.exchange(b"truncated message")).await.unwrap().unwrap();
    assert_eq!(echo, b"truncat");
}

#[tokio::test]
async fn empty_message_is_refused_locally() {
    let (addr, _stop) = start_server(30).await;
    let mut session = Session::connect(&client_config(addr)).await.unwrap();
    assert!(matches!(
        session.exchange(b"").await,
        Err(handshake_echo::ConnError::EmptyMessage)
    ));
    // The connection is still usable.
    assert_eq!(session.exchange(b"ok").await.unwrap(), b"ok");
}

#[tokio::test]
async fn concurrent_clients_are_served_independently() {
    let (addr, _stop) = start_server(30).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        handles.push(tokio::spawn(async move {
            let mut session = Session::connect(&client_config(addr)).await?;
            for round in 0..3 {
                let msg = format!("client {i} round {round}");
                let echo = session.exchange(msg.as_bytes()).await?;
                assert_eq!(echo, msg.as_bytes());
            }
            session.close().await
        }));
    }

    for handle in handles {
        timeout(LIMIT, handle).await.unwrap().unwrap().unwrap();
    }
}

#[tokio::test]
async fn full_server_rejects_then_admits_after_disconnect() {
    let (addr, _stop) = start_server(1).await;

    let mut first = Session::connect(&client_config(addr)).await.unwrap();
    assert_eq!(first.exchange(b"mine").await.unwrap(), b"mine");

    let rejected = timeout(LIMIT, Session::connect(&client_config(addr)))
        .await
        .unwrap();
    assert!(rejected.is_err(), "second client should be rejected");

    first.close().await.unwrap();

    // The slot frees once the server notices the disconnect.
    let admitted = timeout(LIMIT, async {
        loop {
            match Session::connect(&client_config(addr)).await {
                Ok(session) => break session,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await
    .expect("slot was never released");
    assert!(admitted.handshake().is_established());
}

/// A peer that refuses every SYN-ACK costs the server its retries; the
/// connection is dropped, its slot freed, and the server keeps serving.
#[tokio::test]
async fn exhausted_connection_frees_its_slot() {
    let (addr, _stop) = start_server(1).await;

    let mut peer = Link::new(TcpStream::connect(addr).await.unwrap());
    let syn = Header::handshake(0, true, CLIENT_ISN, 4096);
    peer.send_slot(&syn.encode(), HANDSHAKE_SLOT).await.unwrap();
    assert_eq!(peer.recv_status(Phase::Syn).await.unwrap(), Status::Success);

    let refused = timeout(LIMIT, async {
        let mut sent = 0;
        while peer.recv_slot(HANDSHAKE_SLOT, Phase::SynAck).await.unwrap().is_some() {
            sent += 1;
            peer.send_status(Status::Failure).await.unwrap();
        }
        sent
    })
    .await
    .unwrap();
    assert_eq!(refused, 4);

    let mut session = timeout(LIMIT, async {
        loop {
            match Session::connect(&client_config(addr)).await {
                Ok(session) => break session,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await
    .expect("slot was never released");
    assert_eq!(session.exchange(b"alive").await.unwrap(), b"alive");
}

#[tokio::test]
async fn session_run_prints_each_echo() {
    let (addr, _stop) = start_server(30).await;
    let mut session = Session::connect(&client_config(addr)).await.unwrap();

    let input = BufReader::new(&b"hello\n\n   \n  world  \n"[..]);
    let mut output = Vec::new();
    timeout(LIMIT, session.run(input, &mut output))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        String::from_utf8(output).unwrap(),
        "Received: hello\nReceived: world\n"
    );
}

#[tokio::test]
async fn connecting_to_a_closed_port_fails() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    assert!(Session::connect(&client_config(addr)).await.is_err());
}

#[tokio::test]
async fn session_run_sends_raw_bytes() {
    let (addr, _stop) = start_server(30).await;
    let mut session = Session::connect(&client_config(addr)).await.unwrap();

    let input = BufReader::new(&b"caf\xe9\r\nhello\n"[..]);
    let mut output = Vec::new();
    timeout(LIMIT, session.run(input, &mut output))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(output, b"Received: caf\xef\xbf\xbd\nReceived: hello\n");
}
