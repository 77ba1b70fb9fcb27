/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod alpn;
pub use alpn::encode_alpn_protocols;

mod cert_pair;
pub use cert_pair::SslCertificatePair;

mod protocol;
pub use protocol::SslProtocol;

mod client;
pub use client::{SslClientConfig, SslClientConfigBuilder};

mod server;
pub use server::{SslServerConfig, SslServerConfigBuilder};

#[cfg(feature = "yaml")]
pub mod yaml;
