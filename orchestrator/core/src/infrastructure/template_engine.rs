// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Instruction Template Engine
//!
//! Renders operator-facing text with Handlebars.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Substitute live stack values into operator instructions
//!
//! Strict mode is enabled: a template that references a value the context
//! does not carry fails to render instead of printing an empty placeholder.
//! Output is plain text, so HTML escaping is disabled.

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;

/// Checkpoint instructions shown before the operator builds the config bundle.
pub const CHECKPOINT_TEMPLATE: &str = include_str!("../../templates/checkpoint-instructions.hbs");

pub struct InstructionTemplateEngine {
    handlebars: Handlebars<'static>,
}

impl InstructionTemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    pub fn render<T: Serialize>(&self, template: &str, context: &T) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .context("Failed to render instruction template")
    }
}

impl Default for InstructionTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_value_is_an_error() {
        let engine = InstructionTemplateEngine::new();
        let result = engine.render("Host: {{host}}", &json!({}));
        assert!(result.is_err());
    }

    #[test]
    fn test_no_html_escaping() {
        let engine = InstructionTemplateEngine::new();
        let out = engine.render("{{password}}", &json!({ "password": "a&b<c>" })).unwrap();
        assert_eq!(out, "a&b<c>");
    }

    #[test]
    fn test_bundled_template_compiles() {
        assert!(handlebars::template::Template::compile(CHECKPOINT_TEMPLATE).is_ok());
    }
}
