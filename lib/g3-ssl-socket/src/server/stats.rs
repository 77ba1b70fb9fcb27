/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SslServerSnapshot {
    pub accepted: u64,
    pub established: u64,
    pub failed: u64,
    pub timeout: u64,
    pub handler_failed: u64,
}

#[derive(Debug, Default)]
pub struct SslServerStats {
    accepted: AtomicU64,
    established: AtomicU64,
    failed: AtomicU64,
    timeout: AtomicU64,
    handler_failed: AtomicU64,
}

impl SslServerStats {
    pub fn add_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn add_established(&self) {
        self.established.fetch_add(1, Ordering::Relaxed);
    }
    pub fn established(&self) -> u64 {
        self.established.load(Ordering::Relaxed)
    }

    pub fn add_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn add_timeout(&self) {
        self.timeout.fetch_add(1, Ordering::Relaxed);
    }
    pub fn timeout(&self) -> u64 {
        self.timeout.load(Ordering::Relaxed)
    }

    pub fn add_handler_failed(&self) {
        self.handler_failed.fetch_add(1, Ordering::Relaxed);
    }
    pub fn handler_failed(&self) -> u64 {
        self.handler_failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SslServerSnapshot {
        SslServerSnapshot {
            accepted: self.accepted(),
            established: self.established(),
            failed: self.failed(),
            timeout: self.timeout(),
            handler_failed: self.handler_failed(),
        }
    }
}
