/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

use openssl::ssl::{self, ErrorCode, ShutdownResult, SslRef, SslStream};

use crate::retry::Attempt;

pub(crate) struct SslIoWrapper {
    stream: SslStream<TcpStream>,
}

impl SslIoWrapper {
    pub(crate) fn new(stream: SslStream<TcpStream>) -> Self {
        SslIoWrapper { stream }
    }

    #[inline]
    pub(crate) fn ssl(&self) -> &SslRef {
        self.stream.ssl()
    }

    #[inline]
    pub(crate) fn ssl_mut(&mut self) -> &mut SslRef {
        self.stream.ssl_mut()
    }

    #[inline]
    pub(crate) fn tcp(&self) -> &TcpStream {
        self.stream.get_ref()
    }

    pub(crate) fn connect(&mut self) -> Result<(), Attempt<ssl::Error>> {
        self.stream.connect().map_err(Attempt::from)
    }

    pub(crate) fn accept(&mut self) -> Result<(), Attempt<ssl::Error>> {
        self.stream.accept().map_err(Attempt::from)
    }

    pub(crate) fn read(&mut self, buf: &mut [u8]) -> Result<usize, Attempt<io::Error>> {
        match self.stream.ssl_read(buf) {
            Ok(n) => Ok(n),
            Err(e) => match e.code() {
                ErrorCode::ZERO_RETURN => Ok(0),
                ErrorCode::SYSCALL if e.io_error().is_none() => Ok(0),
                _ => Err(Attempt::from(e).map_failed(into_io_error)),
            },
        }
    }

    pub(crate) fn write(&mut self, buf: &[u8]) -> Result<usize, Attempt<io::Error>> {
        self.stream
            .ssl_write(buf)
            .map_err(|e| Attempt::from(e).map_failed(into_io_error))
    }

    pub(crate) fn shutdown(&mut self) -> Result<(), Attempt<io::Error>> {
        match self.stream.shutdown() {
            Ok(ShutdownResult::Sent) | Ok(ShutdownResult::Received) => {}
            Err(e) if e.code() == ErrorCode::ZERO_RETURN => {}
            Err(e) => return Err(Attempt::from(e).map_failed(into_io_error)),
        }
        match self.tcp().shutdown(Shutdown::Write) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Attempt::Failed(e)),
        }
    }

    /// Send close_notify if the socket buffer allows it right now.
    pub(crate) fn try_notify_close(&mut self) {
        let _ = self.stream.shutdown();
    }
}

impl AsRawFd for SslIoWrapper {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.get_ref().as_raw_fd()
    }
}

fn into_io_error(e: ssl::Error) -> io::Error {
    e.into_io_error().unwrap_or_else(io::Error::other)
}
