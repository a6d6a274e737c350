// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn port_suffix_is_stripped() -> anyhow::Result<()> {
    let gate = TrustGate::new("127\\.0\\.0\\.1;")?;
    assert!(gate.is_trusted("127.0.0.1:54321"));
    assert!(gate.is_trusted("127.0.0.1"));
    assert!(!gate.is_trusted("10.0.0.1:54321"));
    Ok(())
}

#[test]
fn any_pattern_may_match() -> anyhow::Result<()> {
    let gate = TrustGate::new("10\\.1\\..*;192\\.168\\.0\\.7")?;
    assert!(gate.is_trusted("10.1.200.3:80"));
    assert!(gate.is_trusted("192.168.0.7:9999"));
    assert!(!gate.is_trusted("192.168.0.8:9999"));
    Ok(())
}

#[test]
fn empty_items_are_discarded() -> anyhow::Result<()> {
    let gate = TrustGate::new(";;127\\.0\\.0\\.1;;")?;
    assert!(gate.is_trusted("127.0.0.1:1"));
    Ok(())
}

#[test]
fn empty_list_is_an_error() {
    assert!(TrustGate::new("").is_err());
    assert!(TrustGate::new(";;;").is_err());
}

#[test]
fn bad_pattern_is_an_error() {
    assert!(TrustGate::new("127.0.0.1;[").is_err());
}
