// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Single-host orchestration of a registry stack: a datastore, a cache and
//! the registry application on one container network, supervised by the
//! host's init system.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, workflows and runtime adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
