// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod exchange;
pub mod issuer;
pub mod keys;
pub mod revocation;
pub mod verifier;

pub use exchange::{CachingExchanger, ExchangeTokenCache, HttpTokenExchanger};
pub use issuer::{IssuerSettings, LocalTokenIssuer, MockUser, TokenLifetimes, TokenRequest};
pub use verifier::RemoteJwksVerifier;
