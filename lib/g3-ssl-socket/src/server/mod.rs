/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use log::info;
use socket2::SockRef;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SslServerConfig;
use crate::{DiagnosticSink, LogDiagnosticSink, SslSocket, SslSocketError};

mod handler;
pub use handler::AcceptSslHandler;

mod stats;
pub use stats::{SslServerSnapshot, SslServerStats};

mod task;
use task::{COMPONENT, SslAcceptTask};

/// Accept tcp connections and upgrade them to tls.
///
/// With a handler, each handshake runs in its own spawned task, so a client
/// that never finishes its handshake only holds up itself.
pub struct SslServer {
    listener: TcpListener,
    config: SslServerConfig,
    stats: Arc<SslServerStats>,
    sink: Arc<dyn DiagnosticSink>,
}

impl SslServer {
    pub fn new(listener: TcpListener, config: SslServerConfig) -> Self {
        SslServer {
            listener,
            config,
            stats: Arc::new(SslServerStats::default()),
            sink: Arc::new(LogDiagnosticSink),
        }
    }

    /// Build from a bound std listener. Must be called inside a tokio runtime.
    pub fn from_std(listener: std::net::TcpListener, config: SslServerConfig) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        Ok(SslServer::new(listener, config))
    }

    pub fn set_diagnostic_sink(&mut self, sink: Arc<dyn DiagnosticSink>) {
        self.sink = sink;
    }

    #[inline]
    pub fn config(&self) -> &SslServerConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> Arc<SslServerStats> {
        self.stats.clone()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn socket_ref(&self) -> SockRef<'_> {
        SockRef::from(&self.listener)
    }

    pub fn listen(&self, backlog: i32) -> io::Result<()> {
        self.socket_ref().listen(backlog)
    }

    /// Create a new server on a duplicate of the listening socket.
    ///
    /// The tls context, stats and diagnostic sink are shared with `self`.
    pub fn dup(&self) -> io::Result<Self> {
        let socket = self.socket_ref().try_clone()?;
        socket.set_nonblocking(true)?;
        let listener = TcpListener::from_std(socket.into())?;
        Ok(SslServer {
            listener,
            config: self.config.clone(),
            stats: self.stats.clone(),
            sink: self.sink.clone(),
        })
    }

    /// Accept one connection and wrap it, leaving the handshake to the caller.
    pub async fn accept(&self) -> Result<(SslSocket, SocketAddr), SslSocketError> {
        let (stream, peer_addr) = self.listener.accept().await?;
        self.stats.add_accepted();
        let socket = SslSocket::wrap(stream, &self.config.ssl_context)?;
        Ok((socket, peer_addr))
    }

    /// Accept one connection and run its handshake and `handler` in a new task.
    ///
    /// Failures inside the task are reported to the diagnostic sink only.
    pub async fn accept_with<H>(&self, handler: Arc<H>) -> Result<JoinHandle<()>, SslSocketError>
    where
        H: AcceptSslHandler,
    {
        let (socket, peer_addr) = self.accept().await?;
        let task = SslAcceptTask {
            socket,
            peer_addr,
            accept_timeout: self.config.accept_timeout,
            handler,
            stats: self.stats.clone(),
            sink: self.sink.clone(),
            established: false,
        };
        Ok(tokio::spawn(task.into_running()))
    }

    /// Run the accept loop until `quit` is set to true or its sender is gone.
    pub async fn serve<H>(&self, handler: Arc<H>, mut quit: watch::Receiver<bool>)
    where
        H: AcceptSslHandler,
    {
        let local_addr = self.local_addr().ok();
        info!("ssl server {local_addr:?} started");
        if *quit.borrow_and_update() {
            return;
        }

        loop {
            tokio::select! {
                biased;

                r = quit.changed() => {
                    if r.is_err() || *quit.borrow() {
                        break;
                    }
                }
                r = self.accept_with(handler.clone()) => {
                    if let Err(e) = r {
                        self.sink.log_error(COMPONENT, &anyhow!(e).context("accept failed"));
                    }
                }
            }
        }
        info!("ssl server {local_addr:?} stopped");
    }
}
