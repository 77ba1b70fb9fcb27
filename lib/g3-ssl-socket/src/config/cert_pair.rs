/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::anyhow;
use openssl::pkey::{PKey, Private};
use openssl::ssl::SslContextBuilder;
use openssl::x509::X509;

/// A certificate chain and its private key, kept in DER form.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SslCertificatePair {
    certs: Vec<Vec<u8>>,
    key: Vec<u8>,
}

impl SslCertificatePair {
    pub fn check(&self) -> anyhow::Result<()> {
        if self.certs.is_empty() {
            return Err(anyhow!("no certificate set"));
        }
        if self.key.is_empty() {
            return Err(anyhow!("no private key set"));
        }
        Ok(())
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        !self.certs.is_empty()
    }

    pub fn set_certificates(&mut self, certs: Vec<X509>) -> anyhow::Result<()> {
        let mut all_der = Vec::with_capacity(certs.len());
        for (i, cert) in certs.into_iter().enumerate() {
            let bytes = cert
                .to_der()
                .map_err(|e| anyhow!("failed to encode certificate #{i}: {e}"))?;
            all_der.push(bytes);
        }
        self.certs = all_der;
        Ok(())
    }

    pub fn set_private_key(&mut self, key: PKey<Private>) -> anyhow::Result<()> {
        self.key = key
            .private_key_to_der()
            .map_err(|e| anyhow!("failed to encode private key: {e}"))?;
        Ok(())
    }

    fn load(&self) -> anyhow::Result<(X509, Vec<X509>, PKey<Private>)> {
        self.check()?;
        let mut certs = Vec::with_capacity(self.certs.len());
        for (i, der) in self.certs.iter().enumerate() {
            let cert = X509::from_der(der).map_err(|e| anyhow!("invalid certificate #{i}: {e}"))?;
            certs.push(cert);
        }
        let leaf = certs.remove(0);
        let key = PKey::private_key_from_der(&self.key)
            .map_err(|e| anyhow!("invalid private key: {e}"))?;
        Ok((leaf, certs, key))
    }

    fn add_to_ssl_context(&self, builder: &mut SslContextBuilder) -> anyhow::Result<()> {
        let (leaf, chain, key) = self.load()?;
        builder
            .set_certificate(&leaf)
            .map_err(|e| anyhow!("failed to set certificate: {e}"))?;
        for (i, cert) in chain.into_iter().enumerate() {
            builder
                .add_extra_chain_cert(cert)
                .map_err(|e| anyhow!("failed to add chain certificate #{i}: {e}"))?;
        }
        builder
            .set_private_key(&key)
            .map_err(|e| anyhow!("failed to set private key: {e}"))?;
        builder
            .check_private_key()
            .map_err(|e| anyhow!("private key does not match the certificate: {e}"))
    }

    pub fn add_to_server_ssl_context(
        &self,
        builder: &mut SslContextBuilder,
    ) -> anyhow::Result<()> {
        self.add_to_ssl_context(builder)
    }

    pub fn add_to_client_ssl_context(
        &self,
        builder: &mut SslContextBuilder,
    ) -> anyhow::Result<()> {
        self.add_to_ssl_context(builder)
            .map_err(|e| anyhow!("failed to set client certificate: {e}"))
    }
}
