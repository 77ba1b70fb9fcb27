/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Non-blocking OpenSSL sockets on top of the tokio reactor.
//!
//! [`SslSocket`] drives the synchronous OpenSSL handshake and record API
//! over a non-blocking descriptor, suspending the current task whenever the
//! engine reports `WANT_READ` / `WANT_WRITE`. [`SslServer`] accepts raw
//! connections and runs every handshake in its own task, so a slow peer never
//! holds up the accept loop.

mod error;
pub use error::SslSocketError;

pub mod retry;

mod sink;
pub use sink::{DiagnosticSink, LogDiagnosticSink};

mod socket;
pub use socket::{SslSocket, SslSocketState};

mod server;
pub use server::{AcceptSslHandler, SslServer, SslServerSnapshot, SslServerStats};

pub mod config;
