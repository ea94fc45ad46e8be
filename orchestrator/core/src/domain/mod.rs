// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Types, invariants and collaborator contracts of the stack orchestrator.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Configuration, service descriptors, dependency graph, error taxonomy

pub mod errors;
pub mod graph;
pub mod init_system;
pub mod operator;
pub mod outcome;
pub mod runtime;
pub mod service;
pub mod stack_config;
