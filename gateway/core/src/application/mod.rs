// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod bootstrap;
pub mod capability_registry;
pub mod policy_engine;
pub mod policy_loader;
pub mod policy_verifier;
pub mod tool_gateway;
