use std::collections::BTreeMap;

use anyhow::{Context, Result};

use crate::core::DiagnosticReport;

/// Makes named formatters available.
pub trait SubsystemLoader {
    fn register_formatters(&mut self);
}

/// Turns a report into display text with a named formatter.
pub trait OutputRenderer {
    fn render(&self, formatter: &str, report: &DiagnosticReport) -> Result<String>;
}

/// Both halves of the output subsystem behind one object.
pub trait OutputSubsystem: SubsystemLoader + OutputRenderer {}

impl<T: SubsystemLoader + OutputRenderer> OutputSubsystem for T {}

pub type FormatFn = fn(&DiagnosticReport) -> Result<String>;

/// Name-keyed formatter table. Empty until [`SubsystemLoader::register_formatters`].
#[derive(Debug, Default, Clone)]
pub struct OutputRegistry {
    formatters: BTreeMap<&'static str, FormatFn>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, f: FormatFn) {
        self.formatters.insert(name, f);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.formatters.keys().copied().collect()
    }
}

impl SubsystemLoader for OutputRegistry {
    fn register_formatters(&mut self) {
        self.register("yaml", format_yaml);
        self.register("json", format_json);
        self.register("raw", format_raw);
    }
}

impl OutputRenderer for OutputRegistry {
    fn render(&self, formatter: &str, report: &DiagnosticReport) -> Result<String> {
        let Some(f) = self.formatters.get(formatter) else {
            let known = self.names();
            let known = if known.is_empty() {
                "none registered".to_string()
            } else {
                known.join("|")
            };
            return Err(crate::exit::invalid_args(format!(
                "unknown output formatter: {formatter} (available: {known})"
            )));
        };
        f(report)
    }
}

fn format_yaml(report: &DiagnosticReport) -> Result<String> {
    serde_yaml::to_string(report).context("failed to render report as YAML")
}

fn format_json(report: &DiagnosticReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to render report as JSON")
}

fn format_raw(report: &DiagnosticReport) -> Result<String> {
    serde_json::to_string(report).context("failed to render report")
}
