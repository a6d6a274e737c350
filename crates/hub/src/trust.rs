// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use anyhow::Context;
use regex::Regex;

/// IP allow-list matched against a list of regular expressions.
///
/// Producers and control clients must come from a trusted address; everyone
/// else only gets the read side of the cache.
#[derive(Debug)]
pub struct TrustGate {
    patterns: Vec<Regex>,
}

impl TrustGate {
    /// Compile a semicolon-delimited list of regex patterns.
    ///
    /// Empty items are discarded; an empty resulting list is a startup error.
    pub fn new(spec: &str) -> anyhow::Result<Self> {
        let mut patterns = Vec::new();
        for item in spec.split(';') {
            if item.is_empty() {
                continue;
            }
            let re = Regex::new(item)
                .with_context(|| format!("invalid trusted-ip pattern {item:?}"))?;
            patterns.push(re);
        }
        if patterns.is_empty() {
            anyhow::bail!("trusted-ip list is empty");
        }
        Ok(Self { patterns })
    }

    /// Whether the remote address is trusted.
    ///
    /// The colon-port suffix is stripped before matching.
    pub fn is_trusted(&self, remote: &str) -> bool {
        let host = match remote.rfind(':') {
            Some(end) => &remote[..end],
            None => remote,
        };
        self.patterns.iter().any(|re| re.is_match(host))
    }
}

#[cfg(test)]
#[path = "trust_tests.rs"]
mod tests;
