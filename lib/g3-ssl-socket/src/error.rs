/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;

use openssl::error::ErrorStack;
use openssl::ssl;
use openssl::x509::X509VerifyResult;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SslSocketError {
    #[error("tls handshake failed: {source} (verify result: {verify_result})")]
    HandshakeFailure {
        #[source]
        source: ssl::Error,
        verify_result: X509VerifyResult,
    },
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("tls handshake timed out")]
    Timeout,
    #[error("socket already closed")]
    Closed,
}

impl SslSocketError {
    /// Classify a failed handshake step.
    ///
    /// A syscall failure is a transport problem, everything else came out of
    /// the tls layer. Without an io error it means the peer hung up.
    pub(crate) fn from_handshake(e: ssl::Error, verify_result: X509VerifyResult) -> Self {
        if e.code() == ssl::ErrorCode::SYSCALL && e.ssl_error().is_none() {
            match e.into_io_error() {
                Ok(io) => SslSocketError::Connection(io),
                Err(_) => SslSocketError::Connection(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer during tls handshake",
                )),
            }
        } else {
            SslSocketError::HandshakeFailure {
                source: e,
                verify_result,
            }
        }
    }

    pub fn verify_result(&self) -> Option<X509VerifyResult> {
        match self {
            SslSocketError::HandshakeFailure { verify_result, .. } => Some(*verify_result),
            _ => None,
        }
    }
}

impl From<ErrorStack> for SslSocketError {
    fn from(e: ErrorStack) -> Self {
        SslSocketError::Configuration(e.to_string())
    }
}

impl From<ssl::Error> for SslSocketError {
    fn from(e: ssl::Error) -> Self {
        SslSocketError::from_handshake(e, X509VerifyResult::OK)
    }
}

impl From<SslSocketError> for io::Error {
    fn from(e: SslSocketError) -> Self {
        match e {
            SslSocketError::Connection(e) => e,
            SslSocketError::Timeout => io::Error::new(io::ErrorKind::TimedOut, e),
            SslSocketError::Closed => io::Error::new(io::ErrorKind::NotConnected, e),
            SslSocketError::Configuration(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
            SslSocketError::HandshakeFailure { .. } => io::Error::other(e),
        }
    }
}
