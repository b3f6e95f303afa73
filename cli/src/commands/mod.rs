// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the hr-gateway CLI

pub mod config;
pub mod evaluate;
pub mod issuer;
pub mod policy;

pub use self::config::ConfigCommand;
pub use self::evaluate::EvaluateArgs;
pub use self::issuer::IssuerCommand;
pub use self::policy::PolicyCommand;
