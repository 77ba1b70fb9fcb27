/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use anyhow::{Context, anyhow};
use openssl::ssl::{SslConnector, SslContext, SslMethod, SslVerifyMode};
use openssl::x509::X509;
use openssl::x509::store::X509StoreBuilder;
use tokio::net::TcpStream;

use super::{SslCertificatePair, SslProtocol};
use crate::{SslSocket, SslSocketError};

const MINIMAL_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(100);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct SslClientConfig {
    pub ssl_context: SslContext,
    pub handshake_timeout: Duration,
}

impl SslClientConfig {
    pub fn new(ssl_context: SslContext) -> Self {
        SslClientConfig {
            ssl_context,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Wrap `stream` and finish the client handshake within the handshake timeout.
    pub async fn connect(
        &self,
        stream: TcpStream,
        hostname: Option<&str>,
    ) -> Result<SslSocket, SslSocketError> {
        match tokio::time::timeout(
            self.handshake_timeout,
            SslSocket::connect(stream, &self.ssl_context, hostname),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(SslSocketError::Timeout),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SslClientConfigBuilder {
    min_protocol: Option<SslProtocol>,
    max_protocol: Option<SslProtocol>,
    ciphers: Vec<String>,
    ciphersuites: Vec<String>,
    ca_certs: Vec<Vec<u8>>,
    no_default_ca_certs: bool,
    client_cert_pair: Option<SslCertificatePair>,
    insecure: bool,
    alpn_protocols: Vec<String>,
    handshake_timeout: Duration,
}

impl Default for SslClientConfigBuilder {
    fn default() -> Self {
        SslClientConfigBuilder {
            min_protocol: None,
            max_protocol: None,
            ciphers: Vec::new(),
            ciphersuites: Vec::new(),
            ca_certs: Vec::new(),
            no_default_ca_certs: false,
            client_cert_pair: None,
            insecure: false,
            alpn_protocols: Vec::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl SslClientConfigBuilder {
    pub fn check(&mut self) -> anyhow::Result<()> {
        if let Some(cert_pair) = &self.client_cert_pair {
            cert_pair.check()?;
        }

        if let (Some(min), Some(max)) = (self.min_protocol, self.max_protocol)
            && min > max
        {
            return Err(anyhow!("min protocol {min:?} is newer than max protocol {max:?}"));
        }

        if self.handshake_timeout < MINIMAL_HANDSHAKE_TIMEOUT {
            self.handshake_timeout = MINIMAL_HANDSHAKE_TIMEOUT;
        }

        Ok(())
    }

    pub fn set_min_protocol(&mut self, protocol: SslProtocol) {
        self.min_protocol = Some(protocol);
    }

    pub fn set_max_protocol(&mut self, protocol: SslProtocol) {
        self.max_protocol = Some(protocol);
    }

    pub fn set_ciphers(&mut self, ciphers: Vec<String>) {
        self.ciphers = ciphers;
    }

    pub fn set_ciphersuites(&mut self, ciphersuites: Vec<String>) {
        self.ciphersuites = ciphersuites;
    }

    pub fn set_ca_certificates(&mut self, certs: Vec<X509>) -> anyhow::Result<()> {
        let mut all_der = Vec::with_capacity(certs.len());
        for (i, cert) in certs.into_iter().enumerate() {
            let bytes = cert
                .to_der()
                .map_err(|e| anyhow!("failed to encode ca certificate #{i}: {e}"))?;
            all_der.push(bytes);
        }
        self.ca_certs = all_der;
        Ok(())
    }

    pub fn set_no_default_ca_certificates(&mut self) {
        self.no_default_ca_certs = true;
    }

    pub fn set_cert_pair(&mut self, pair: SslCertificatePair) -> Option<SslCertificatePair> {
        self.client_cert_pair.replace(pair)
    }

    /// Skip the verification of the server certificate.
    pub fn set_insecure(&mut self, insecure: bool) {
        self.insecure = insecure;
    }

    pub fn set_alpn_protocols(&mut self, protocols: Vec<String>) {
        self.alpn_protocols = protocols;
    }

    pub fn set_handshake_timeout(&mut self, timeout: Duration) {
        self.handshake_timeout = timeout;
    }

    pub fn build(&self) -> anyhow::Result<SslClientConfig> {
        let mut ctx_builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| anyhow!("failed to create ssl context builder: {e}"))?;
        if self.insecure {
            ctx_builder.set_verify(SslVerifyMode::NONE);
        } else {
            ctx_builder.set_verify(SslVerifyMode::PEER);
        }

        ctx_builder
            .set_min_proto_version(self.min_protocol.map(Into::into))
            .map_err(|e| anyhow!("failed to set min protocol version: {e}"))?;
        ctx_builder
            .set_max_proto_version(self.max_protocol.map(Into::into))
            .map_err(|e| anyhow!("failed to set max protocol version: {e}"))?;

        if !self.ciphers.is_empty() {
            let cipher_list = self.ciphers.join(":");
            ctx_builder
                .set_cipher_list(&cipher_list)
                .map_err(|e| anyhow!("failed to set cipher list {cipher_list}: {e}"))?;
        }
        if !self.ciphersuites.is_empty() {
            let ciphersuites = self.ciphersuites.join(":");
            ctx_builder
                .set_ciphersuites(&ciphersuites)
                .map_err(|e| anyhow!("failed to set ciphersuites {ciphersuites}: {e}"))?;
        }

        let mut store_builder = X509StoreBuilder::new()
            .map_err(|e| anyhow!("failed to create ca cert store builder: {e}"))?;
        if !self.no_default_ca_certs {
            store_builder
                .set_default_paths()
                .map_err(|e| anyhow!("failed to load default ca certs: {e}"))?;
        }
        for (i, cert) in self.ca_certs.iter().enumerate() {
            let ca_cert = X509::from_der(cert.as_slice())
                .map_err(|e| anyhow!("invalid ca certificate #{i}: {e}"))?;
            store_builder
                .add_cert(ca_cert)
                .map_err(|e| anyhow!("failed to add ca certificate #{i}: {e}"))?;
        }
        ctx_builder
            .set_verify_cert_store(store_builder.build())
            .map_err(|e| anyhow!("failed to set ca certs: {e}"))?;

        if let Some(cert_pair) = &self.client_cert_pair {
            cert_pair.add_to_client_ssl_context(&mut ctx_builder)?;
        }

        if !self.alpn_protocols.is_empty() {
            let buf = super::encode_alpn_protocols(&self.alpn_protocols)
                .context("invalid alpn protocols")?;
            ctx_builder
                .set_alpn_protos(buf.as_slice())
                .map_err(|e| anyhow!("failed to set alpn protocols: {e}"))?;
        }

        Ok(SslClientConfig {
            ssl_context: ctx_builder.build().into_context(),
            handshake_timeout: self.handshake_timeout,
        })
    }
}
