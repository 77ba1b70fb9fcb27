/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use g3_ssl_socket::config::SslClientConfig;
use g3_ssl_socket::{AcceptSslHandler, SslServer, SslSocket, SslSocketState};

mod common;

struct EchoHandler {
    done: mpsc::UnboundedSender<SocketAddr>,
}

#[async_trait]
impl AcceptSslHandler for EchoHandler {
    async fn handle_ssl(
        &self,
        socket: &mut SslSocket,
        peer_addr: SocketAddr,
    ) -> anyhow::Result<()> {
        assert_eq!(socket.state(), SslSocketState::Established);
        let mut buf = [0u8; 64];
        let n = socket.read(&mut buf).await?;
        socket.write_all(&buf[..n]).await?;
        let _ = self.done.send(peer_addr);
        Ok(())
    }
}

enum FailMode {
    Error,
    Panic,
}

struct FailingHandler {
    mode: FailMode,
}

#[async_trait]
impl AcceptSslHandler for FailingHandler {
    async fn handle_ssl(
        &self,
        _socket: &mut SslSocket,
        _peer_addr: SocketAddr,
    ) -> anyhow::Result<()> {
        match self.mode {
            FailMode::Error => Err(anyhow!("boom")),
            FailMode::Panic => panic!("handler bug"),
        }
    }
}

async fn bind_server(cert: &common::TestCert) -> (SslServer, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = SslServer::new(listener, common::server_config(cert, &[]));
    let addr = server.local_addr().unwrap();
    (server, addr)
}

async fn echo_client(config: &SslClientConfig, addr: SocketAddr, msg: &[u8]) -> SocketAddr {
    let stream = TcpStream::connect(addr).await.unwrap();
    let local_addr = stream.local_addr().unwrap();
    let mut socket = config.connect(stream, Some("localhost")).await.unwrap();
    socket.write_all(msg).await.unwrap();
    let mut buf = vec![0u8; msg.len()];
    socket.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, msg);
    local_addr
}

#[tokio::test]
async fn stalled_handshake_does_not_block() {
    let cert = common::valid_cert();
    let (server, addr) = bind_server(&cert).await;
    let stats = server.stats();
    let sink = Arc::new(common::CollectSink::default());
    let mut server = server;
    server.set_diagnostic_sink(sink.clone());

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let handler = Arc::new(EchoHandler { done: done_tx });
    let (quit_tx, quit_rx) = watch::channel(false);
    let server_task = tokio::spawn(async move { server.serve(handler, quit_rx).await });

    // connected but never says anything
    let stalled = TcpStream::connect(addr).await.unwrap();

    let config = common::client_config(&cert, &[]);
    let (addr2, addr3) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(
            echo_client(&config, addr, b"client 2"),
            echo_client(&config, addr, b"client 3"),
        )
    })
    .await
    .unwrap();

    let mut handled = HashSet::new();
    handled.insert(done_rx.recv().await.unwrap());
    handled.insert(done_rx.recv().await.unwrap());
    assert_eq!(handled, HashSet::from([addr2, addr3]));

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.accepted, 3);
    assert_eq!(snapshot.established, 2);
    assert_eq!(snapshot.failed, 0);
    assert!(sink.errors().is_empty());

    quit_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .unwrap()
        .unwrap();
    drop(stalled);
}

#[tokio::test]
async fn handshake_failure_is_reported() {
    let cert = common::valid_cert();
    let (mut server, addr) = bind_server(&cert).await;
    let sink = Arc::new(common::CollectSink::default());
    server.set_diagnostic_sink(sink.clone());
    let handler = Arc::new(FailingHandler {
        mode: FailMode::Error,
    });

    let mut garbage = TcpStream::connect(addr).await.unwrap();
    garbage
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let task = server.accept_with(handler.clone()).await.unwrap();
    task.await.unwrap();

    let errors = sink.wait_for(1).await;
    assert!(errors[0].starts_with("SslServer: "));
    assert!(errors[0].contains("tls handshake failed"));

    // the server side socket is released after the failure
    let mut buf = [0u8; 64];
    loop {
        match garbage.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }

    // later connections are still served
    let config = common::client_config(&cert, &[]);
    let client = tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut socket = config.connect(stream, Some("localhost")).await.unwrap();
        let mut buf = [0u8; 8];
        // closed by the server right after the handler failed
        assert_eq!(socket.read(&mut buf).await.unwrap(), 0);
    });
    let task = server.accept_with(handler).await.unwrap();
    task.await.unwrap();
    client.await.unwrap();

    let errors = sink.wait_for(2).await;
    assert!(errors[1].contains("connection handler failed"));
    assert!(errors[1].contains("boom"));

    let snapshot = server.stats().snapshot();
    assert_eq!(snapshot.accepted, 2);
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.established, 1);
    assert_eq!(snapshot.handler_failed, 1);
}

#[tokio::test]
async fn handler_panic_is_contained() {
    let cert = common::valid_cert();
    let (mut server, addr) = bind_server(&cert).await;
    let sink = Arc::new(common::CollectSink::default());
    server.set_diagnostic_sink(sink.clone());
    let handler = Arc::new(FailingHandler {
        mode: FailMode::Panic,
    });

    let config = common::client_config(&cert, &[]);
    let client = tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut socket = config.connect(stream, Some("localhost")).await.unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(socket.read(&mut buf).await.unwrap(), 0);
    });

    let task = server.accept_with(handler).await.unwrap();
    // the panic does not escape the task
    task.await.unwrap();
    client.await.unwrap();

    let errors = sink.wait_for(1).await;
    assert!(errors[0].contains("connection handler panicked"));
    assert!(errors[0].contains("handler bug"));

    let snapshot = server.stats().snapshot();
    assert_eq!(snapshot.established, 1);
    assert_eq!(snapshot.handler_failed, 1);
}

#[tokio::test]
async fn handshake_timeout() {
    let cert = common::valid_cert();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = common::server_config(&cert, &[]);
    config.accept_timeout = Duration::from_millis(200);
    let mut server = SslServer::new(listener, config);
    let addr = server.local_addr().unwrap();
    let sink = Arc::new(common::CollectSink::default());
    server.set_diagnostic_sink(sink.clone());

    let (done_tx, _done_rx) = mpsc::unbounded_channel();
    let handler = Arc::new(EchoHandler { done: done_tx });

    let _stalled = TcpStream::connect(addr).await.unwrap();
    let task = server.accept_with(handler).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    let errors = sink.wait_for(1).await;
    assert!(errors[0].contains("timed out"));
    let snapshot = server.stats().snapshot();
    assert_eq!(snapshot.timeout, 1);
    assert_eq!(snapshot.handler_failed, 0);
}

#[tokio::test]
async fn dup_listener() {
    let cert = common::valid_cert();
    let (server, addr) = bind_server(&cert).await;
    server.listen(64).unwrap();

    let dup = server.dup().unwrap();
    assert_eq!(dup.local_addr().unwrap(), addr);
    assert_eq!(
        dup.config().accept_timeout,
        server.config().accept_timeout
    );
    drop(server);

    let config = common::client_config(&cert, &[]);
    let client = tokio::spawn(async move { echo_client(&config, addr, b"dup").await });

    let (mut socket, peer_addr) = dup.accept().await.unwrap();
    socket.accept().await.unwrap();
    let mut buf = [0u8; 3];
    socket.read_exact(&mut buf).await.unwrap();
    socket.write_all(&buf).await.unwrap();

    assert_eq!(client.await.unwrap(), peer_addr);
    assert_eq!(dup.stats().accepted(), 1);
}

#[tokio::test]
async fn serve_stops_on_quit() {
    let cert = common::valid_cert();
    let (server, _addr) = bind_server(&cert).await;
    let (done_tx, _done_rx) = mpsc::unbounded_channel();
    let handler = Arc::new(EchoHandler { done: done_tx });

    let (quit_tx, quit_rx) = watch::channel(false);
    let server_task = tokio::spawn(async move { server.serve(handler, quit_rx).await });
    tokio::task::yield_now().await;
    drop(quit_tx);
    tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .unwrap()
        .unwrap();
}
