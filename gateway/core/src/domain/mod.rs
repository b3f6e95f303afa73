// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: the gateway's types and pure rules. Nothing here performs
//! I/O; the traits in [`token`] and [`backend`] are implemented in
//! `infrastructure`.

pub mod access_policy;
pub mod backend;
pub mod capability;
pub mod evaluation;
pub mod principal;
pub mod token;
pub mod tool;
