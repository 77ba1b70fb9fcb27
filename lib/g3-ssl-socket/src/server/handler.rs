/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::SslSocket;

/// Per connection callback run after a successful server handshake.
///
/// The socket is closed by the server once this returns, whatever the result.
#[async_trait]
pub trait AcceptSslHandler: Send + Sync + 'static {
    async fn handle_ssl(&self, socket: &mut SslSocket, peer_addr: SocketAddr)
    -> anyhow::Result<()>;
}
