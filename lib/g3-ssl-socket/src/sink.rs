/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use log::warn;

/// Where failures of detached tasks get reported.
pub trait DiagnosticSink: Send + Sync {
    fn log_error(&self, component: &str, error: &anyhow::Error);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LogDiagnosticSink;

impl DiagnosticSink for LogDiagnosticSink {
    fn log_error(&self, component: &str, error: &anyhow::Error) {
        warn!("{component}: {error:?}");
    }
}
