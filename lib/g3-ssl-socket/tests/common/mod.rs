/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509, X509Builder, X509NameBuilder};

use g3_ssl_socket::DiagnosticSink;
use g3_ssl_socket::config::{
    SslCertificatePair, SslClientConfig, SslClientConfigBuilder, SslServerConfig,
    SslServerConfigBuilder,
};

const DAY: i64 = 86400;

pub struct TestCert {
    pub cert: X509,
    pub key: PKey<Private>,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Self signed certificate for `localhost` and `127.0.0.1`, usable as its own trust anchor.
fn generate(not_before: i64, not_after: i64) -> TestCert {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "localhost")
        .unwrap();
    let name = name.build();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(not_before).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(not_after).unwrap())
        .unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    let san = SubjectAlternativeName::new()
        .dns("localhost")
        .ip("127.0.0.1")
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(san).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    TestCert {
        cert: builder.build(),
        key,
    }
}

pub fn valid_cert() -> TestCert {
    let now = unix_now();
    generate(now - DAY, now + 30 * DAY)
}

pub fn expired_cert() -> TestCert {
    let now = unix_now();
    generate(now - 30 * DAY, now - DAY)
}

pub fn cert_pair(cert: &TestCert) -> SslCertificatePair {
    let mut pair = SslCertificatePair::default();
    pair.set_certificates(vec![cert.cert.clone()]).unwrap();
    pair.set_private_key(cert.key.clone()).unwrap();
    pair
}

pub fn server_config(cert: &TestCert, alpn: &[&str]) -> SslServerConfig {
    let mut builder = SslServerConfigBuilder::empty();
    builder.push_cert_pair(cert_pair(cert)).unwrap();
    builder.set_alpn_protocols(alpn.iter().map(|s| s.to_string()).collect());
    builder.check().unwrap();
    builder.build().unwrap()
}

pub fn client_config(trusted: &TestCert, alpn: &[&str]) -> SslClientConfig {
    let mut builder = SslClientConfigBuilder::default();
    builder.set_no_default_ca_certificates();
    builder
        .set_ca_certificates(vec![trusted.cert.clone()])
        .unwrap();
    builder.set_alpn_protocols(alpn.iter().map(|s| s.to_string()).collect());
    builder.set_handshake_timeout(Duration::from_secs(5));
    builder.check().unwrap();
    builder.build().unwrap()
}

#[derive(Default)]
pub struct CollectSink {
    errors: Mutex<Vec<String>>,
}

impl CollectSink {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    /// Wait until at least `n` errors have been reported.
    pub async fn wait_for(&self, n: usize) -> Vec<String> {
        for _ in 0..500 {
            let errors = self.errors();
            if errors.len() >= n {
                return errors;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} errors, got {:?}", self.errors());
    }
}

impl DiagnosticSink for CollectSink {
    fn log_error(&self, component: &str, error: &anyhow::Error) {
        self.errors
            .lock()
            .unwrap()
            .push(format!("{component}: {error:#}"));
    }
}
