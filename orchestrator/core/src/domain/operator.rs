// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Operator gates
//!
//! The human at the terminal is an external collaborator: the checkpoint
//! hands work to them and the destructive teardown step asks them for
//! permission. Both interactions block the workflow with no timeout.

use crate::domain::errors::StackError;

pub trait Operator: Send + Sync {
    /// Show text to the operator.
    fn present(&self, text: &str);

    /// Block until the operator signals they are done.
    fn acknowledge(&self, prompt: &str) -> Result<(), StackError>;

    /// Ask a yes/no question. Only an explicit yes returns `true`.
    fn confirm(&self, prompt: &str) -> Result<bool, StackError>;
}
