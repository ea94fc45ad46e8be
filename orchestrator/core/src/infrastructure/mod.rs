// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod runtime;
pub mod systemd;
pub mod template_engine;

pub use runtime::DockerRuntime;
pub use systemd::SystemdUser;
