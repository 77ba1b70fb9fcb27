/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use anyhow::anyhow;
use openssl::ssl::SslVersion;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum SslProtocol {
    Tls1,
    Tls11,
    Tls12,
    Tls13,
}

impl FromStr for SslProtocol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tls1" | "tls10" | "tls1.0" | "tls1_0" => Ok(SslProtocol::Tls1),
            "tls11" | "tls1.1" | "tls1_1" => Ok(SslProtocol::Tls11),
            "tls12" | "tls1.2" | "tls1_2" => Ok(SslProtocol::Tls12),
            "tls13" | "tls1.3" | "tls1_3" => Ok(SslProtocol::Tls13),
            _ => Err(anyhow!("unknown ssl protocol {s}")),
        }
    }
}

impl From<SslProtocol> for SslVersion {
    fn from(p: SslProtocol) -> Self {
        match p {
            SslProtocol::Tls1 => SslVersion::TLS1,
            SslProtocol::Tls11 => SslVersion::TLS1_1,
            SslProtocol::Tls12 => SslVersion::TLS1_2,
            SslProtocol::Tls13 => SslVersion::TLS1_3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        assert_eq!(SslProtocol::from_str("TLS1.2").unwrap(), SslProtocol::Tls12);
        assert_eq!(SslProtocol::from_str("tls1_3").unwrap(), SslProtocol::Tls13);
        assert_eq!(SslProtocol::from_str("tls10").unwrap(), SslProtocol::Tls1);
        assert!(SslProtocol::from_str("ssl3").is_err());
        assert!(SslProtocol::Tls1 < SslProtocol::Tls13);
    }
}
