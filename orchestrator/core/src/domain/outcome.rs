// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-step results that are not fatal
//!
//! Steps that may legitimately find their work already done, or fail in a
//! way the workflow accepts, report it through [`StepOutcome`] rather than
//! discarding the error.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// Target state already held (resource present, service stopped)
    AlreadySatisfied(String),
    /// Step failed in a way the workflow accepts
    Tolerated(String),
    /// Operator declined a confirmation gate
    Declined(String),
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed)
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            StepOutcome::Completed => None,
            StepOutcome::AlreadySatisfied(n) | StepOutcome::Tolerated(n) | StepOutcome::Declined(n) => {
                Some(n.as_str())
            }
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Completed => f.write_str("done"),
            StepOutcome::AlreadySatisfied(n) => write!(f, "already satisfied ({})", n),
            StepOutcome::Tolerated(n) => write!(f, "tolerated ({})", n),
            StepOutcome::Declined(n) => write!(f, "declined ({})", n),
        }
    }
}

/// Labeled outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: String,
    pub outcome: StepOutcome,
}

impl StepRecord {
    pub fn new(step: impl Into<String>, outcome: StepOutcome) -> Self {
        Self {
            step: step.into(),
            outcome,
        }
    }
}
