/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::anyhow;

/// Encode protocol names as a length prefixed ALPN list.
pub fn encode_alpn_protocols<S: AsRef<str>>(protocols: &[S]) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(protocols.iter().map(|p| p.as_ref().len() + 1).sum());
    for p in protocols {
        let p = p.as_ref();
        let len = u8::try_from(p.len())
            .ok()
            .filter(|len| *len > 0)
            .ok_or_else(|| anyhow!("invalid alpn protocol name length for {p}"))?;
        buf.push(len);
        buf.extend_from_slice(p.as_bytes());
    }
    Ok(buf)
}

/// Pick the first server preferred protocol that is also offered by the client.
pub(crate) fn select_alpn<'a>(server: &[Vec<u8>], client: &'a [u8]) -> Option<&'a [u8]> {
    let offered = WireProtocols { buf: client };
    server
        .iter()
        .find_map(|p| offered.clone().find(|c| c == &p.as_slice()))
}

#[derive(Clone)]
struct WireProtocols<'a> {
    buf: &'a [u8],
}

impl<'a> Iterator for WireProtocols<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, left) = self.buf.split_first()?;
        let len = len as usize;
        if len == 0 || left.len() < len {
            self.buf = &[];
            return None;
        }
        let (p, left) = left.split_at(len);
        self.buf = left;
        Some(p)
    }
}
