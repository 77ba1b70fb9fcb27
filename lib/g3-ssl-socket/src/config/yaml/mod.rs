/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Build ssl configs from yaml values.
//!
//! Certificates and keys may be given inline as PEM strings, or as file
//! paths relative to the lookup dir.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use yaml_rust::Yaml;

use super::{SslCertificatePair, SslClientConfigBuilder, SslProtocol, SslServerConfigBuilder};

mod value;
use value::foreach_kv;

fn as_certificates_from_single_element(
    value: &Yaml,
    lookup_dir: Option<&Path>,
) -> anyhow::Result<Vec<X509>> {
    const MAX_FILE_SIZE: usize = 4_000_000; // 4MB

    if let Yaml::String(s) = value
        && s.trim_start().starts_with("--")
    {
        let certs = X509::stack_from_pem(s.as_bytes())
            .map_err(|e| anyhow!("invalid certificate string: {e}"))?;
        return if certs.is_empty() {
            Err(anyhow!("no valid certificate found"))
        } else {
            Ok(certs)
        };
    }

    let (file, path) = value::as_file(value, lookup_dir).context("invalid file")?;
    let mut contents = String::with_capacity(4096);
    file.take(MAX_FILE_SIZE as u64)
        .read_to_string(&mut contents)
        .map_err(|e| anyhow!("failed to read contents of file {}: {e}", path.display()))?;
    let certs = X509::stack_from_pem(contents.as_bytes())
        .map_err(|e| anyhow!("invalid certificate file({}): {e}", path.display()))?;
    if certs.is_empty() {
        Err(anyhow!(
            "no valid certificate found in file {}",
            path.display()
        ))
    } else {
        Ok(certs)
    }
}

pub fn as_ssl_certificates(value: &Yaml, lookup_dir: Option<&Path>) -> anyhow::Result<Vec<X509>> {
    if let Yaml::Array(seq) = value {
        let mut certs = Vec::new();
        for (i, v) in seq.iter().enumerate() {
            let this_certs = as_certificates_from_single_element(v, lookup_dir)
                .context(format!("invalid certificates value for element #{i}"))?;
            certs.extend(this_certs);
        }
        Ok(certs)
    } else {
        as_certificates_from_single_element(value, lookup_dir)
    }
}

pub fn as_ssl_private_key(
    value: &Yaml,
    lookup_dir: Option<&Path>,
) -> anyhow::Result<PKey<Private>> {
    const MAX_FILE_SIZE: usize = 256_000; // 256KB

    if let Yaml::String(s) = value
        && s.trim_start().starts_with("--")
    {
        return PKey::private_key_from_pem(s.as_bytes())
            .map_err(|e| anyhow!("invalid private key string: {e}"));
    }

    let (file, path) = value::as_file(value, lookup_dir).context("invalid file")?;
    let mut contents = String::with_capacity(4096);
    file.take(MAX_FILE_SIZE as u64)
        .read_to_string(&mut contents)
        .map_err(|e| anyhow!("failed to read contents of file {}: {e}", path.display()))?;
    PKey::private_key_from_pem(contents.as_bytes())
        .map_err(|e| anyhow!("invalid private key file({}): {e}", path.display()))
}

pub fn as_ssl_certificate_pair(
    value: &Yaml,
    lookup_dir: Option<&Path>,
) -> anyhow::Result<SslCertificatePair> {
    if let Yaml::Hash(map) = value {
        let mut pair = SslCertificatePair::default();

        foreach_kv(map, |k, v| match value::normalize(k).as_str() {
            "certificate" | "cert" => {
                let cert = as_ssl_certificates(v, lookup_dir)
                    .context(format!("invalid certificates value for key {k}"))?;
                pair.set_certificates(cert)
                    .context("failed to set certificate")?;
                Ok(())
            }
            "private_key" | "key" => {
                let key = as_ssl_private_key(v, lookup_dir)
                    .context(format!("invalid private key value for key {k}"))?;
                pair.set_private_key(key)
                    .context("failed to set private key")?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        })?;

        pair.check()?;
        Ok(pair)
    } else {
        Err(anyhow!(
            "yaml value type for ssl certificate pair should be 'map'"
        ))
    }
}

fn as_ssl_protocol(value: &Yaml) -> anyhow::Result<SslProtocol> {
    if let Yaml::String(s) = value {
        SslProtocol::from_str(s)
    } else {
        Err(anyhow!("yaml value type for ssl protocol should be 'string'"))
    }
}

pub fn as_ssl_client_config_builder(
    value: &Yaml,
    lookup_dir: Option<&Path>,
) -> anyhow::Result<SslClientConfigBuilder> {
    let Yaml::Hash(map) = value else {
        return Err(anyhow!(
            "yaml value type for 'ssl client config builder' should be 'map'"
        ));
    };

    let mut builder = SslClientConfigBuilder::default();
    let mut cert_pair = SslCertificatePair::default();
    let mut key_set = false;

    foreach_kv(map, |k, v| match value::normalize(k).as_str() {
        "min_tls_version" | "tls_version_min" | "min_protocol" => {
            let protocol = as_ssl_protocol(v)
                .context(format!("invalid ssl protocol value for key {k}"))?;
            builder.set_min_protocol(protocol);
            Ok(())
        }
        "max_tls_version" | "tls_version_max" | "max_protocol" => {
            let protocol = as_ssl_protocol(v)
                .context(format!("invalid ssl protocol value for key {k}"))?;
            builder.set_max_protocol(protocol);
            Ok(())
        }
        "protocol" => {
            let protocol = as_ssl_protocol(v)
                .context(format!("invalid ssl protocol value for key {k}"))?;
            builder.set_min_protocol(protocol);
            builder.set_max_protocol(protocol);
            Ok(())
        }
        "ciphers" => {
            let ciphers = value::as_string_list(v, Some(':'))
                .context(format!("invalid ssl ciphers value for key {k}"))?;
            builder.set_ciphers(ciphers);
            Ok(())
        }
        "ciphersuites" => {
            let ciphersuites = value::as_string_list(v, Some(':'))
                .context(format!("invalid ssl ciphersuites value for key {k}"))?;
            builder.set_ciphersuites(ciphersuites);
            Ok(())
        }
        "certificate" | "cert" => {
            let cert = as_ssl_certificates(v, lookup_dir)
                .context(format!("invalid certificates value for key {k}"))?;
            cert_pair
                .set_certificates(cert)
                .context("failed to set certificate")?;
            Ok(())
        }
        "private_key" | "key" => {
            let key = as_ssl_private_key(v, lookup_dir)
                .context(format!("invalid private key value for key {k}"))?;
            cert_pair
                .set_private_key(key)
                .context("failed to set private key")?;
            key_set = true;
            Ok(())
        }
        "cert_pair" => {
            let pair = as_ssl_certificate_pair(v, lookup_dir)
                .context(format!("invalid cert pair value for key {k}"))?;
            builder.set_cert_pair(pair);
            Ok(())
        }
        "ca_certificate" | "ca_cert" | "server_auth_certificate" | "server_auth_cert" => {
            let certs = as_ssl_certificates(v, lookup_dir)
                .context(format!("invalid certificates value for key {k}"))?;
            builder
                .set_ca_certificates(certs)
                .context("failed to set ca certificate")?;
            Ok(())
        }
        "no_default_ca_certificate" | "no_default_ca_cert" => {
            let no_default =
                value::as_bool(v).context(format!("invalid bool value for key {k}"))?;
            if no_default {
                builder.set_no_default_ca_certificates();
            }
            Ok(())
        }
        "insecure" => {
            let enable = value::as_bool(v).context(format!("invalid bool value for key {k}"))?;
            builder.set_insecure(enable);
            Ok(())
        }
        "alpn_protocol" | "alpn_protocols" | "alpn" => {
            let protocols = value::as_string_list(v, None)
                .context(format!("invalid alpn protocols value for key {k}"))?;
            builder.set_alpn_protocols(protocols);
            Ok(())
        }
        "handshake_timeout" | "negotiation_timeout" => {
            let timeout = value::as_duration(v)
                .context(format!("invalid humanize duration value for key {k}"))?;
            builder.set_handshake_timeout(timeout);
            Ok(())
        }
        _ => Err(anyhow!("invalid key {k}")),
    })?;

    if cert_pair.is_set() || key_set {
        cert_pair.check().context("invalid client certificate config")?;
        if builder.set_cert_pair(cert_pair).is_some() {
            return Err(anyhow!("found duplicate client certificate config"));
        }
    }

    builder.check()?;
    Ok(builder)
}

pub fn as_ssl_server_config_builder(
    value: &Yaml,
    lookup_dir: Option<&Path>,
) -> anyhow::Result<SslServerConfigBuilder> {
    let Yaml::Hash(map) = value else {
        return Err(anyhow!(
            "yaml value type for 'ssl server config builder' should be 'map'"
        ));
    };

    let mut builder = SslServerConfigBuilder::empty();
    let mut cert_pair = SslCertificatePair::default();
    let mut key_set = false;

    foreach_kv(map, |k, v| match value::normalize(k).as_str() {
        "cert_pairs" => {
            if let Yaml::Array(seq) = v {
                for (i, v) in seq.iter().enumerate() {
                    let pair = as_ssl_certificate_pair(v, lookup_dir)
                        .context(format!("invalid cert pair value for {k}#{i}"))?;
                    builder.push_cert_pair(pair)?;
                }
            } else {
                let pair = as_ssl_certificate_pair(v, lookup_dir)
                    .context(format!("invalid cert pair value for key {k}"))?;
                builder.push_cert_pair(pair)?;
            }
            Ok(())
        }
        "certificate" | "cert" => {
            let cert = as_ssl_certificates(v, lookup_dir)
                .context(format!("invalid certificates value for key {k}"))?;
            cert_pair
                .set_certificates(cert)
                .context("failed to set certificate")?;
            Ok(())
        }
        "private_key" | "key" => {
            let key = as_ssl_private_key(v, lookup_dir)
                .context(format!("invalid private key value for key {k}"))?;
            cert_pair
                .set_private_key(key)
                .context("failed to set private key")?;
            key_set = true;
            Ok(())
        }
        "enable_client_auth" => {
            let enable = value::as_bool(v).context(format!("invalid bool value for key {k}"))?;
            if enable {
                builder.enable_client_auth();
            }
            Ok(())
        }
        "ca_certificate" | "ca_cert" | "client_auth_certificate" | "client_auth_cert" => {
            let certs = as_ssl_certificates(v, lookup_dir)
                .context(format!("invalid certificates value for key {k}"))?;
            builder
                .set_client_auth_certificates(certs)
                .context("failed to set client auth certificates")?;
            Ok(())
        }
        "session_id_context" => {
            let context =
                value::as_string(v).context(format!("invalid string value for key {k}"))?;
            builder.set_session_id_context(context);
            Ok(())
        }
        "alpn_protocol" | "alpn_protocols" | "alpn" => {
            let protocols = value::as_string_list(v, None)
                .context(format!("invalid alpn protocols value for key {k}"))?;
            builder.set_alpn_protocols(protocols);
            Ok(())
        }
        "min_tls_version" | "tls_version_min" | "min_protocol" => {
            let protocol = as_ssl_protocol(v)
                .context(format!("invalid ssl protocol value for key {k}"))?;
            builder.set_min_protocol(protocol);
            Ok(())
        }
        "max_tls_version" | "tls_version_max" | "max_protocol" => {
            let protocol = as_ssl_protocol(v)
                .context(format!("invalid ssl protocol value for key {k}"))?;
            builder.set_max_protocol(protocol);
            Ok(())
        }
        "accept_timeout" | "handshake_timeout" | "negotiation_timeout" => {
            let timeout = value::as_duration(v)
                .context(format!("invalid humanize duration value for key {k}"))?;
            builder.set_accept_timeout(timeout);
            Ok(())
        }
        _ => Err(anyhow!("invalid key {k}")),
    })?;

    if cert_pair.is_set() || key_set {
        builder
            .push_cert_pair(cert_pair)
            .context("invalid server certificate config")?;
    }

    builder.check()?;
    Ok(builder)
}
