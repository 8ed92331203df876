//! Template rendering
//!
//! Cluster-spec and manifest templates are Tera templates rendered against
//! the flattened infra output plus the cluster name. A template set is
//! concatenated and rendered as one template, so `set` assignments in an
//! earlier file are visible in later ones.

use crate::error::{CoreError, Result};
use crate::output::InfraOutput;
use tera::{Context, Tera};
use tracing::debug;

const DOCUMENT_SEPARATOR: &str = "---";

pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    pub fn add_output(&mut self, output: &InfraOutput) {
        for (key, value) in output.values() {
            self.context.insert(key.as_str(), value);
        }
        debug!(count = output.values().len(), "Added infra output variables");
    }

    /// Render one template string. `name` only labels errors.
    pub fn render(&mut self, name: &str, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| render_error(name, &e))
    }

    /// Concatenate `(name, template)` sources in order, render them as one
    /// template and return a multi-document YAML stream without empty
    /// documents.
    pub fn render_documents<'a>(
        &mut self,
        templates: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<String> {
        let (names, sources): (Vec<&str>, Vec<&str>) = templates.into_iter().unzip();
        let combined = sources.join(&format!("\n{DOCUMENT_SEPARATOR}\n"));
        let rendered = self.render(&names.join(", "), &combined)?;
        Ok(split_documents(&rendered).join(&format!("\n{DOCUMENT_SEPARATOR}\n")) + "\n")
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-empty documents of a YAML stream, trimmed.
fn split_documents(stream: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();
    for line in stream.lines() {
        if line.trim_end() == DOCUMENT_SEPARATOR {
            documents.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    documents.push(current);

    documents
        .iter()
        .map(|document| document.trim())
        .filter(|document| !document.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tera keeps the useful part of its errors in the source chain.
fn render_error(name: &str, err: &tera::Error) -> CoreError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    CoreError::TemplateRender {
        name: name.to_string(),
        message,
    }
}
