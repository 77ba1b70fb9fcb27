/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use openssl::ssl::{NameType, Ssl, SslContextRef, SslRef, SslSession, SslSessionRef, SslStream};
use openssl::x509::{X509, X509VerifyResult};
use socket2::SockRef;
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::SslSocketError;
use crate::retry;

mod wrapper;
use wrapper::SslIoWrapper;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SslSocketState {
    Wrapped,
    Handshaking,
    Established,
    Closed,
}

#[derive(Clone, Copy)]
enum HandshakeRole {
    Connect,
    Accept,
}

/// A tls session on top of a tcp connection owned exclusively by this value.
///
/// The descriptor is registered to the tokio reactor through the inner
/// `AsyncFd`, and nowhere else, for as long as the socket is open.
pub struct SslSocket {
    io: Option<AsyncFd<SslIoWrapper>>,
    state: SslSocketState,
}

impl SslSocket {
    /// Take over a connected tokio stream.
    ///
    /// The stream is removed from its reactor registration before the tls
    /// layer is built on top of it, and the resulting socket is registered
    /// again under this value. Must be called inside a tokio runtime.
    pub fn wrap(stream: TcpStream, ctx: &SslContextRef) -> Result<Self, SslSocketError> {
        let stream = stream.into_std()?;
        Self::build(stream, ctx)
    }

    /// Take over a connected std stream. Must be called inside a tokio runtime.
    pub fn from_std(
        stream: std::net::TcpStream,
        ctx: &SslContextRef,
    ) -> Result<Self, SslSocketError> {
        stream.set_nonblocking(true)?;
        Self::build(stream, ctx)
    }

    fn build(stream: std::net::TcpStream, ctx: &SslContextRef) -> Result<Self, SslSocketError> {
        let ssl = Ssl::new(ctx).map_err(|e| {
            SslSocketError::Configuration(format!("failed to get new Ssl state: {e}"))
        })?;
        let stream = SslStream::new(ssl, stream).map_err(|e| {
            SslSocketError::Configuration(format!("failed to create ssl stream: {e}"))
        })?;
        let io = AsyncFd::new(SslIoWrapper::new(stream))?;
        Ok(SslSocket {
            io: Some(io),
            state: SslSocketState::Wrapped,
        })
    }

    /// Wrap `stream` and run the client handshake.
    ///
    /// The socket is closed before the error is returned if the handshake fails.
    pub async fn connect(
        stream: TcpStream,
        ctx: &SslContextRef,
        hostname: Option<&str>,
    ) -> Result<Self, SslSocketError> {
        let mut socket = SslSocket::wrap(stream, ctx)?;
        if let Some(name) = hostname {
            socket.set_hostname(name)?;
        }
        socket.handshake_connect().await?;
        Ok(socket)
    }

    /// Connect and hand the established socket to `f`, closing it after `f`
    /// has finished.
    pub async fn connect_with<F, R>(
        stream: TcpStream,
        ctx: &SslContextRef,
        hostname: Option<&str>,
        f: F,
    ) -> Result<R, SslSocketError>
    where
        F: AsyncFnOnce(&mut SslSocket) -> R,
    {
        let mut socket = SslSocket::connect(stream, ctx, hostname).await?;
        let r = f(&mut socket).await;
        socket.close();
        Ok(r)
    }

    #[inline]
    pub fn state(&self) -> SslSocketState {
        self.state
    }

    /// Set the name used for SNI and for peer certificate verification.
    ///
    /// IP literals are only used for verification.
    pub fn set_hostname(&mut self, hostname: &str) -> Result<(), SslSocketError> {
        let ssl = self.unstarted_ssl_mut("hostname")?;
        if let Ok(ip) = hostname.parse::<IpAddr>() {
            ssl.param_mut().set_ip(ip).map_err(|e| {
                SslSocketError::Configuration(format!("failed to set cert verify ip: {e}"))
            })?;
        } else {
            ssl.param_mut().set_host(hostname).map_err(|e| {
                SslSocketError::Configuration(format!("failed to set cert verify domain: {e}"))
            })?;
            ssl.set_hostname(hostname).map_err(|e| {
                SslSocketError::Configuration(format!("failed to set sni hostname: {e}"))
            })?;
        }
        Ok(())
    }

    /// Offer a previous session for resumption.
    ///
    /// # Safety
    ///
    /// The session must have been created with the same context as this socket.
    pub unsafe fn set_session(&mut self, session: &SslSessionRef) -> Result<(), SslSocketError> {
        let ssl = self.unstarted_ssl_mut("session")?;
        unsafe { ssl.set_session(session) }.map_err(|e| {
            SslSocketError::Configuration(format!("failed to set ssl session: {e}"))
        })
    }

    fn unstarted_ssl_mut(&mut self, what: &str) -> Result<&mut SslRef, SslSocketError> {
        match (self.state, self.io.as_mut()) {
            (SslSocketState::Wrapped, Some(io)) => Ok(io.get_mut().ssl_mut()),
            (SslSocketState::Closed, _) | (_, None) => Err(SslSocketError::Closed),
            (state, _) => Err(SslSocketError::Configuration(format!(
                "unable to set {what} in state {state:?}"
            ))),
        }
    }

    pub async fn handshake_connect(&mut self) -> Result<(), SslSocketError> {
        self.handshake(HandshakeRole::Connect).await
    }

    /// Run the server side handshake on a wrapped socket.
    pub async fn accept(&mut self) -> Result<(), SslSocketError> {
        self.handshake(HandshakeRole::Accept).await
    }

    async fn handshake(&mut self, role: HandshakeRole) -> Result<(), SslSocketError> {
        let io = match (self.state, self.io.as_mut()) {
            (SslSocketState::Wrapped | SslSocketState::Handshaking, Some(io)) => io,
            (SslSocketState::Established, Some(_)) => {
                return Err(SslSocketError::Configuration(
                    "tls handshake has already finished".to_string(),
                ));
            }
            _ => return Err(SslSocketError::Closed),
        };
        self.state = SslSocketState::Handshaking;

        let r = retry::retry(io, |wrapper: &mut SslIoWrapper| {
            let r = match role {
                HandshakeRole::Connect => wrapper.connect(),
                HandshakeRole::Accept => wrapper.accept(),
            };
            r.map_err(|attempt| {
                attempt.map_failed(|e| {
                    SslSocketError::from_handshake(e, wrapper.ssl().verify_result())
                })
            })
        })
        .await;

        match r {
            Ok(_) => {
                self.state = SslSocketState::Established;
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn established_io(&mut self) -> io::Result<&mut AsyncFd<SslIoWrapper>> {
        match (self.state, self.io.as_mut()) {
            (SslSocketState::Established, Some(io)) => Ok(io),
            (state, _) => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("tls session not established, current state: {state:?}"),
            )),
        }
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let io = self.established_io()?;
        if buf.is_empty() {
            return Ok(0);
        }
        retry::retry(io, |wrapper: &mut SslIoWrapper| wrapper.read(buf)).await
    }

    pub async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let io = self.established_io()?;
        if buf.is_empty() {
            return Ok(0);
        }
        retry::retry(io, |wrapper: &mut SslIoWrapper| wrapper.write(buf)).await
    }

    /// Send close_notify and shut down the write half of the connection.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        let io = self.established_io()?;
        retry::retry(io, |wrapper: &mut SslIoWrapper| wrapper.shutdown()).await
    }

    /// Release the connection. Calling it again is a no-op.
    pub fn close(&mut self) {
        let Some(io) = self.io.take() else {
            self.state = SslSocketState::Closed;
            return;
        };
        let established = self.state == SslSocketState::Established;
        self.state = SslSocketState::Closed;

        // deregister before the descriptor gets closed on drop
        let mut wrapper = io.into_inner();
        if established {
            wrapper.try_notify_close();
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.io.is_none()
    }

    fn io_ref(&self) -> io::Result<&SslIoWrapper> {
        self.io
            .as_ref()
            .map(|io| io.get_ref())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket closed"))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.io_ref()?.tcp().local_addr()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.io_ref()?.tcp().peer_addr()
    }

    /// Borrow the underlying socket for socket option calls.
    pub fn socket_ref(&self) -> io::Result<SockRef<'_>> {
        Ok(SockRef::from(self.io_ref()?.tcp()))
    }

    pub fn ssl(&self) -> Option<&SslRef> {
        self.io.as_ref().map(|io| io.get_ref().ssl())
    }

    pub fn peer_certificate(&self) -> Option<X509> {
        self.ssl()?.peer_certificate()
    }

    pub fn peer_cert_chain(&self) -> Option<Vec<X509>> {
        let chain = self.ssl()?.peer_cert_chain()?;
        Some(chain.iter().map(|c| c.to_owned()).collect())
    }

    pub fn certificate(&self) -> Option<X509> {
        self.ssl()?.certificate().map(|c| c.to_owned())
    }

    pub fn session(&self) -> Option<SslSession> {
        self.ssl()?.session().map(|s| s.to_owned())
    }

    pub fn session_reused(&self) -> Option<bool> {
        self.ssl().map(|ssl| ssl.session_reused())
    }

    pub fn selected_alpn_protocol(&self) -> Option<&[u8]> {
        self.ssl()?.selected_alpn_protocol()
    }

    pub fn cipher_name(&self) -> Option<&'static str> {
        self.ssl()?.current_cipher().map(|c| c.name())
    }

    pub fn version_str(&self) -> Option<&'static str> {
        self.ssl().map(|ssl| ssl.version_str())
    }

    pub fn verify_result(&self) -> Option<X509VerifyResult> {
        self.ssl().map(|ssl| ssl.verify_result())
    }

    pub fn servername(&self) -> Option<&str> {
        self.ssl()?.servername(NameType::HOST_NAME)
    }

    /// Decrypted bytes that can be read without touching the socket.
    pub fn pending(&self) -> usize {
        self.ssl().map(|ssl| ssl.pending()).unwrap_or(0)
    }
}

impl Drop for SslSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for SslSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslSocket")
            .field("state", &self.state)
            .field("local_addr", &self.local_addr().ok())
            .field("peer_addr", &self.peer_addr().ok())
            .finish()
    }
}

impl AsyncRead for SslSocket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let io = self.get_mut().established_io()?;
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let n = ready!(retry::poll_retry(io, cx, |wrapper: &mut SslIoWrapper| {
            wrapper.read(buf.initialize_unfilled())
        }))?;
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for SslSocket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let io = self.get_mut().established_io()?;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        retry::poll_retry(io, cx, |wrapper: &mut SslIoWrapper| wrapper.write(buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // records are written straight to the socket
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let io = self.get_mut().established_io()?;
        retry::poll_retry(io, cx, |wrapper: &mut SslIoWrapper| wrapper.shutdown())
    }
}
