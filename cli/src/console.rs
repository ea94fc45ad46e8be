// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Terminal operator
//!
//! Checkpoint instructions go to stdout and the acknowledgement is a plain
//! line on stdin. Deletion confirmation uses an interactive prompt that
//! defaults to "no"; if no terminal is attached the answer is "no".

use colored::Colorize;
use dialoguer::Confirm;
use std::io::{self, BufRead, Write};
use tracing::warn;

use stack_core::domain::errors::StackError;
use stack_core::domain::operator::Operator;

#[derive(Default)]
pub struct ConsoleOperator;

impl ConsoleOperator {
    pub fn new() -> Self {
        Self
    }
}

/// Block until a line arrives on `input`. End of input is an error, since
/// nobody is left to perform the checkpoint.
pub fn wait_for_line<R: BufRead>(input: &mut R) -> Result<(), StackError> {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => Err(StackError::Operator(
            "Input closed before the checkpoint was acknowledged".to_string(),
        )),
        Ok(_) => Ok(()),
        Err(e) => Err(StackError::Operator(format!("Failed to read acknowledgement: {}", e))),
    }
}

impl Operator for ConsoleOperator {
    fn present(&self, text: &str) {
        println!();
        println!("{}", text);
        println!();
    }

    fn acknowledge(&self, prompt: &str) -> Result<(), StackError> {
        print!("{} ", prompt.yellow().bold());
        io::stdout()
            .flush()
            .map_err(|e| StackError::Operator(e.to_string()))?;
        wait_for_line(&mut io::stdin().lock())
    }

    fn confirm(&self, prompt: &str) -> Result<bool, StackError> {
        match Confirm::new().with_prompt(prompt).default(false).interact() {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!(error = %e, "Confirmation prompt unavailable; treating as declined");
                Ok(false)
            }
        }
    }
}
