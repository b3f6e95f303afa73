// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use capability_gateway_core::config::GatewayConfig;
use capability_gateway_core::infrastructure::auth::issuer::{IssuerSettings, LocalTokenIssuer};
use capability_gateway_core::infrastructure::auth::keys::SigningKeyPair;

/// Fixed 2048-bit key so tests never pay for RSA key generation.
pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

pub fn signing_key() -> SigningKeyPair {
    SigningKeyPair::from_pkcs1_pem(SIGNING_KEY_PEM).expect("fixture key is valid")
}

pub fn issuer_with(settings: IssuerSettings) -> LocalTokenIssuer {
    LocalTokenIssuer::with_keys(settings, signing_key())
}

pub fn local_config() -> GatewayConfig {
    GatewayConfig {
        catalog_path: fixture_path("catalog.yaml"),
        policy_path: fixture_path("policy.yaml"),
        ..GatewayConfig::default()
    }
}
