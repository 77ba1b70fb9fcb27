/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Turn a non-blocking primitive into a task-suspending retry loop.
//!
//! The primitive is attempted first. Whenever it reports that it would block,
//! the current task is parked until the reactor reports the matching readiness
//! on the descriptor, and the primitive is tried again. Only the would-block
//! class is retried, every other error is handed back untouched.

use std::future;
use std::io;
use std::os::fd::AsRawFd;
use std::task::{Context, Poll};

use openssl::ssl::{self, ErrorCode};
use tokio::io::unix::{AsyncFd, AsyncFdReadyMutGuard};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockedOn {
    Read,
    Write,
}

/// The failed outcome of a single non-blocking attempt.
#[derive(Debug)]
pub enum Attempt<E> {
    WantRead,
    WantWrite,
    Failed(E),
}

impl<E> Attempt<E> {
    pub fn map_failed<U, F>(self, f: F) -> Attempt<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            Attempt::WantRead => Attempt::WantRead,
            Attempt::WantWrite => Attempt::WantWrite,
            Attempt::Failed(e) => Attempt::Failed(f(e)),
        }
    }
}

impl From<ssl::Error> for Attempt<ssl::Error> {
    fn from(e: ssl::Error) -> Self {
        match e.code() {
            ErrorCode::WANT_READ => Attempt::WantRead,
            ErrorCode::WANT_WRITE => Attempt::WantWrite,
            _ => Attempt::Failed(e),
        }
    }
}

pub trait ReadinessGuard {
    type Io;

    fn io_mut(&mut self) -> &mut Self::Io;

    /// Forget the readiness observed by this guard, so the next poll parks
    /// the task until the reactor reports a new event.
    fn clear_ready(&mut self);
}

/// A reactor registration owning the io object it watches.
pub trait Readiness {
    type Io;
    type Guard<'a>: ReadinessGuard<Io = Self::Io>
    where
        Self: 'a;

    fn io_mut(&mut self) -> &mut Self::Io;

    fn poll_ready<'a>(
        &'a mut self,
        cx: &mut Context<'_>,
        blocked: BlockedOn,
    ) -> Poll<io::Result<Self::Guard<'a>>>;
}

impl<T: AsRawFd> Readiness for AsyncFd<T> {
    type Io = T;
    type Guard<'a>
        = AsyncFdReadyMutGuard<'a, T>
    where
        Self: 'a;

    #[inline]
    fn io_mut(&mut self) -> &mut T {
        self.get_mut()
    }

    fn poll_ready<'a>(
        &'a mut self,
        cx: &mut Context<'_>,
        blocked: BlockedOn,
    ) -> Poll<io::Result<AsyncFdReadyMutGuard<'a, T>>> {
        match blocked {
            BlockedOn::Read => self.poll_read_ready_mut(cx),
            BlockedOn::Write => self.poll_write_ready_mut(cx),
        }
    }
}

impl<T: AsRawFd> ReadinessGuard for AsyncFdReadyMutGuard<'_, T> {
    type Io = T;

    #[inline]
    fn io_mut(&mut self) -> &mut T {
        self.get_inner_mut()
    }

    #[inline]
    fn clear_ready(&mut self) {
        AsyncFdReadyMutGuard::clear_ready(self)
    }
}

pub fn poll_retry<R, T, E, F>(
    registration: &mut R,
    cx: &mut Context<'_>,
    mut op: F,
) -> Poll<Result<T, E>>
where
    R: Readiness,
    E: From<io::Error>,
    F: FnMut(&mut R::Io) -> Result<T, Attempt<E>>,
{
    let mut blocked = match op(registration.io_mut()) {
        Ok(v) => return Poll::Ready(Ok(v)),
        Err(Attempt::WantRead) => BlockedOn::Read,
        Err(Attempt::WantWrite) => BlockedOn::Write,
        Err(Attempt::Failed(e)) => return Poll::Ready(Err(e)),
    };

    loop {
        let mut guard = match registration.poll_ready(cx, blocked) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(guard)) => guard,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(E::from(e))),
        };

        let next = match op(guard.io_mut()) {
            Ok(v) => return Poll::Ready(Ok(v)),
            Err(Attempt::WantRead) => BlockedOn::Read,
            Err(Attempt::WantWrite) => BlockedOn::Write,
            Err(Attempt::Failed(e)) => return Poll::Ready(Err(e)),
        };
        // readiness of the other direction has not been consumed yet
        if next == blocked {
            guard.clear_ready();
        }
        blocked = next;
    }
}

pub async fn retry<R, T, E, F>(registration: &mut R, mut op: F) -> Result<T, E>
where
    R: Readiness,
    E: From<io::Error>,
    F: FnMut(&mut R::Io) -> Result<T, Attempt<E>>,
{
    future::poll_fn(|cx| poll_retry(registration, cx, &mut op)).await
}
