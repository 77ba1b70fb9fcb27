/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use futures_util::FutureExt;
use log::debug;

use super::{AcceptSslHandler, SslServerStats};
use crate::{DiagnosticSink, SslSocket, SslSocketError};

pub(super) const COMPONENT: &str = "SslServer";

pub(super) struct SslAcceptTask<H> {
    pub(super) socket: SslSocket,
    pub(super) peer_addr: SocketAddr,
    pub(super) accept_timeout: Duration,
    pub(super) handler: Arc<H>,
    pub(super) stats: Arc<SslServerStats>,
    pub(super) sink: Arc<dyn DiagnosticSink>,
    pub(super) established: bool,
}

impl<H: AcceptSslHandler> SslAcceptTask<H> {
    pub(super) async fn into_running(mut self) {
        let r = AssertUnwindSafe(self.run()).catch_unwind().await;
        match r {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => self.sink.log_error(COMPONENT, &e),
            Err(payload) => {
                let phase = if self.established {
                    self.stats.add_handler_failed();
                    "connection handler"
                } else {
                    "tls handshake"
                };
                let e = anyhow!(
                    "{} {phase} panicked: {}",
                    self.peer_addr,
                    panic_message(&*payload)
                );
                self.sink.log_error(COMPONENT, &e);
            }
        }
        self.socket.close();
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        debug!("{} tls handshake start", self.peer_addr);
        match tokio::time::timeout(self.accept_timeout, self.socket.accept()).await {
            Ok(Ok(_)) => {
                self.established = true;
                self.stats.add_established();
                debug!(
                    "{} tls handshake done, protocol: {}",
                    self.peer_addr,
                    self.socket.version_str().unwrap_or("unknown")
                );
            }
            Ok(Err(e)) => {
                self.stats.add_failed();
                debug!("{} tls error: {e}", self.peer_addr);
                return Err(e).context(format!("{} tls handshake failed", self.peer_addr));
            }
            Err(_) => {
                self.stats.add_timeout();
                debug!("{} tls timeout", self.peer_addr);
                return Err(SslSocketError::Timeout)
                    .context(format!("{} tls handshake failed", self.peer_addr));
            }
        }

        self.handler
            .handle_ssl(&mut self.socket, self.peer_addr)
            .await
            .inspect_err(|_| self.stats.add_handler_failed())
            .context(format!("{} connection handler failed", self.peer_addr))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
