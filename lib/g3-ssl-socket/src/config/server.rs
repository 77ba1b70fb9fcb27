/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use anyhow::{Context, anyhow};
use openssl::ssl::{
    AlpnError, SslAcceptor, SslContext, SslMethod, SslSessionCacheMode, SslVerifyMode,
};
use openssl::stack::Stack;
use openssl::x509::X509;
use openssl::x509::store::X509StoreBuilder;

use super::{SslCertificatePair, SslProtocol};

const MINIMAL_ACCEPT_TIMEOUT: Duration = Duration::from_millis(100);
const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SESSION_ID_CONTEXT: &str = "g3-ssl-socket";

#[derive(Clone)]
pub struct SslServerConfig {
    pub ssl_context: SslContext,
    pub accept_timeout: Duration,
}

impl SslServerConfig {
    pub fn new(ssl_context: SslContext) -> Self {
        SslServerConfig {
            ssl_context,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SslServerConfigBuilder {
    cert_pairs: Vec<SslCertificatePair>,
    client_auth: bool,
    client_auth_certs: Vec<Vec<u8>>,
    session_id_context: String,
    alpn_protocols: Vec<String>,
    min_protocol: Option<SslProtocol>,
    max_protocol: Option<SslProtocol>,
    accept_timeout: Duration,
}

impl SslServerConfigBuilder {
    pub fn empty() -> Self {
        SslServerConfigBuilder {
            cert_pairs: Vec::with_capacity(1),
            client_auth: false,
            client_auth_certs: Vec::new(),
            session_id_context: String::new(),
            alpn_protocols: Vec::new(),
            min_protocol: None,
            max_protocol: None,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
        }
    }

    pub fn check(&mut self) -> anyhow::Result<()> {
        if self.cert_pairs.is_empty() {
            return Err(anyhow!("no cert pair is set"));
        }

        if let (Some(min), Some(max)) = (self.min_protocol, self.max_protocol)
            && min > max
        {
            return Err(anyhow!("min protocol {min:?} is newer than max protocol {max:?}"));
        }

        if self.accept_timeout < MINIMAL_ACCEPT_TIMEOUT {
            self.accept_timeout = MINIMAL_ACCEPT_TIMEOUT;
        }

        Ok(())
    }

    pub fn enable_client_auth(&mut self) {
        self.client_auth = true;
    }

    pub fn set_client_auth_certificates(&mut self, certs: Vec<X509>) -> anyhow::Result<()> {
        for (i, cert) in certs.into_iter().enumerate() {
            let bytes = cert
                .to_der()
                .map_err(|e| anyhow!("failed to encode client chain certificate #{i}: {e}"))?;
            self.client_auth_certs.push(bytes);
        }
        Ok(())
    }

    pub fn set_session_id_context(&mut self, context: String) {
        self.session_id_context = context;
    }

    pub fn push_cert_pair(&mut self, cert_pair: SslCertificatePair) -> anyhow::Result<()> {
        cert_pair.check()?;
        self.cert_pairs.push(cert_pair);
        Ok(())
    }

    /// Protocols in server preference order.
    pub fn set_alpn_protocols(&mut self, protocols: Vec<String>) {
        self.alpn_protocols = protocols;
    }

    pub fn set_min_protocol(&mut self, protocol: SslProtocol) {
        self.min_protocol = Some(protocol);
    }

    pub fn set_max_protocol(&mut self, protocol: SslProtocol) {
        self.max_protocol = Some(protocol);
    }

    pub fn set_accept_timeout(&mut self, timeout: Duration) {
        self.accept_timeout = timeout;
    }

    pub fn build(&self) -> anyhow::Result<SslServerConfig> {
        let mut ssl_builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server())
            .map_err(|e| anyhow!("failed to build ssl context: {e}"))?;

        for (i, pair) in self.cert_pairs.iter().enumerate() {
            pair.add_to_server_ssl_context(&mut ssl_builder)
                .context(format!("failed to add cert pair #{i} to ssl context"))?;
        }

        if let Some(protocol) = self.min_protocol {
            ssl_builder
                .set_min_proto_version(Some(protocol.into()))
                .map_err(|e| anyhow!("failed to set min protocol version: {e}"))?;
        }
        if let Some(protocol) = self.max_protocol {
            ssl_builder
                .set_max_proto_version(Some(protocol.into()))
                .map_err(|e| anyhow!("failed to set max protocol version: {e}"))?;
        }

        ssl_builder.set_session_cache_mode(SslSessionCacheMode::SERVER);
        let id_ctx = if self.session_id_context.is_empty() {
            DEFAULT_SESSION_ID_CONTEXT
        } else {
            self.session_id_context.as_str()
        };
        ssl_builder
            .set_session_id_context(id_ctx.as_bytes())
            .map_err(|e| anyhow!("failed to set session id context: {e}"))?;

        if self.client_auth {
            ssl_builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);

            let mut store_builder = X509StoreBuilder::new()
                .map_err(|e| anyhow!("failed to create ca cert store builder: {e}"))?;
            let mut subject_stack =
                Stack::new().map_err(|e| anyhow!("failed to get new ca name stack: {e}"))?;

            if self.client_auth_certs.is_empty() {
                store_builder
                    .set_default_paths()
                    .map_err(|e| anyhow!("failed to load default ca certs: {e}"))?;
            } else {
                for (i, cert) in self.client_auth_certs.iter().enumerate() {
                    let ca_cert = X509::from_der(cert.as_slice())
                        .map_err(|e| anyhow!("[#{i}] invalid ca certificate: {e}"))?;
                    let subject = ca_cert
                        .subject_name()
                        .to_owned()
                        .map_err(|e| anyhow!("[#{i}] failed to get ca subject name: {e}"))?;
                    store_builder
                        .add_cert(ca_cert)
                        .map_err(|e| anyhow!("[#{i}] failed to add ca certificate: {e}"))?;
                    subject_stack
                        .push(subject)
                        .map_err(|e| anyhow!("[#{i}] failed to push to ca name stack: {e}"))?;
                }
            }
            ssl_builder
                .set_verify_cert_store(store_builder.build())
                .map_err(|e| anyhow!("failed to set ca certs: {e}"))?;
            if !subject_stack.is_empty() {
                ssl_builder.set_client_ca_list(subject_stack);
            }
        } else {
            ssl_builder.set_verify(SslVerifyMode::NONE);
        }

        if !self.alpn_protocols.is_empty() {
            super::encode_alpn_protocols(&self.alpn_protocols).context("invalid alpn protocols")?;
            let preference: Vec<Vec<u8>> = self
                .alpn_protocols
                .iter()
                .map(|p| p.as_bytes().to_vec())
                .collect();
            ssl_builder.set_alpn_select_callback(move |_ssl, client| {
                super::alpn::select_alpn(&preference, client).ok_or(AlpnError::NOACK)
            });
        }

        Ok(SslServerConfig {
            ssl_context: ssl_builder.build().into_context(),
            accept_timeout: self.accept_timeout,
        })
    }
}
