use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde_json::{Map, Value};

use crate::config::Environment;

pub const REDACTED: &str = "<redacted>";

/// Produces the display form of the resolved configuration.
pub trait ConfigTemplater {
    fn merge_for_display(&self, env: &Environment) -> Result<Map<String, Value>>;
}

/// Redacts secret-looking keys and optionally masks the home directory.
#[derive(Debug, Clone)]
pub struct DisplayTemplater {
    home_dir: Option<PathBuf>,
}

impl DisplayTemplater {
    pub fn new(home_dir: Option<PathBuf>) -> Self {
        Self { home_dir }
    }
}

impl ConfigTemplater for DisplayTemplater {
    fn merge_for_display(&self, env: &Environment) -> Result<Map<String, Value>> {
        let redact = build_redact_set(&env.redact_patterns()).map_err(crate::exit::invalid_args_err)?;
        let home = if env.mask_home() {
            self.home_dir.as_deref()
        } else {
            None
        };

        let mut out = env.as_map().clone();
        for (key, value) in out.iter_mut() {
            scrub(key, value, &redact, home);
        }
        Ok(out)
    }
}

fn build_redact_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(false)
            .build()
            .with_context(|| format!("invalid report.redact pattern: {pattern}"))?;
        builder.add(glob);
    }
    builder.build().context("failed to build report.redact patterns")
}

fn scrub(path: &str, value: &mut Value, redact: &GlobSet, home: Option<&Path>) {
    if redact.is_match(path) {
        *value = Value::from(REDACTED);
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                scrub(&format!("{path}.{key}"), child, redact, home);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                scrub(path, item, redact, home);
            }
        }
        Value::String(s) => {
            if let Some(home) = home {
                if let Some(masked) = mask_home(s, home) {
                    *s = masked;
                }
            }
        }
        _ => {}
    }
}

fn mask_home(s: &str, home: &Path) -> Option<String> {
    let home = home.to_str()?.trim_end_matches('/');
    if home.is_empty() {
        return None;
    }
    let rest = s.strip_prefix(home)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(format!("~{rest}"))
    } else {
        None
    }
}
