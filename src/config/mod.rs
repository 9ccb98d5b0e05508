use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde_json::{Map, Value};

pub const DEFAULT_OUTPUT: &str = "yaml";
pub const DEFAULT_INTERPRETER: &str = "python3";
pub const DEFAULT_REDACT: [&str; 3] = ["*password*", "*secret*", "*token*"];

/// Nested configuration mapping the report is built from.
///
/// Keys are addressed with dotted paths such as `rend.output`. Unknown keys
/// are carried through untouched so they show up in the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Environment {
    values: Map<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(anyhow!("configuration root must be a table, got: {other}")),
        }
    }

    /// Built-in defaults, the lowest configuration layer.
    pub fn defaults() -> Self {
        let mut env = Self::new();
        env.set("rend.output", Value::from(DEFAULT_OUTPUT));
        env.set("report.interpreter", Value::from(DEFAULT_INTERPRETER));
        env.set("report.site_packages", Value::Array(Vec::new()));
        env.set("report.mask_home", Value::Bool(true));
        env.set(
            "report.redact",
            Value::Array(DEFAULT_REDACT.iter().map(|p| Value::from(*p)).collect()),
        );
        env
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut cur = self.values.get(first)?;
        for part in parts {
            cur = cur.as_object()?.get(part)?;
        }
        Some(cur)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Sets `path`, replacing any non-table value found on the way.
    pub fn set(&mut self, path: &str, value: Value) {
        let mut parts: Vec<&str> = path.split('.').collect();
        let Some(last) = parts.pop() else {
            return;
        };
        let mut cur = &mut self.values;
        for part in parts {
            let slot = cur
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            cur = match slot {
                Value::Object(map) => map,
                _ => return,
            };
        }
        cur.insert(last.to_string(), value);
    }

    /// Deep-merges `other` over `self`; tables merge, everything else replaces.
    pub fn merge(&mut self, other: Map<String, Value>) {
        merge_maps(&mut self.values, other);
    }

    /// Formatter name from `rend.output`, `yaml` when absent or empty.
    pub fn output(&self) -> &str {
        match self.get_str("rend.output") {
            Some(s) if !s.trim().is_empty() => s.trim(),
            _ => DEFAULT_OUTPUT,
        }
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        match self.get_str("pop_config.log_file") {
            Some(s) if !s.is_empty() => Some(PathBuf::from(s)),
            _ => None,
        }
    }

    pub fn interpreter(&self) -> &str {
        match self.get_str("report.interpreter") {
            Some(s) if !s.trim().is_empty() => s.trim(),
            _ => DEFAULT_INTERPRETER,
        }
    }

    pub fn site_packages(&self) -> Vec<PathBuf> {
        string_list(self.get("report.site_packages"))
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }

    pub fn mask_home(&self) -> bool {
        self.get("report.mask_home")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn redact_patterns(&self) -> Vec<String> {
        match self.get("report.redact") {
            Some(v) => string_list(Some(v)),
            None => DEFAULT_REDACT.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.get("report.timeout_secs")
            .and_then(Value::as_u64)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn merge_maps(base: &mut Map<String, Value>, other: Map<String, Value>) {
    for (key, value) in other {
        if let Some(Value::Object(existing)) = base.get_mut(&key) {
            if let Value::Object(incoming) = value {
                merge_maps(existing, incoming);
                continue;
            }
        }
        base.insert(key, value);
    }
}

/// Values given on the command line, the highest configuration layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub output: Option<String>,
    pub log_file: Option<PathBuf>,
    pub interpreter: Option<String>,
    pub site_packages: Vec<PathBuf>,
    pub no_mask_home: bool,
    pub timeout_secs: Option<u64>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/versions-report/config.toml")
}

/// Builds the layered configuration. `home_dir` is only consulted when no
/// explicit config path is given.
pub fn load(
    config_path: Option<&Path>,
    home_dir: Option<&Path>,
    overrides: &Overrides,
) -> Result<Environment> {
    let mut env = Environment::defaults();

    let path = match (config_path, home_dir) {
        (Some(path), _) => path.to_owned(),
        (None, Some(home)) => default_config_path(home),
        (None, None) => {
            return Err(anyhow!(
                "HOME is not set; pass --config or set VERSIONS_REPORT_CONFIG"
            ));
        }
    };

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let raw: Value = toml::from_str(&s)
            .with_context(|| format!("failed to parse config file (TOML): {}", path.display()))?;
        let Value::Object(raw) = raw else {
            return Err(anyhow!("config file root must be a table: {}", path.display()));
        };
        env.merge(raw);
        env.set("config_path", Value::from(path.display().to_string()));
        tracing::debug!(path = %path.display(), "loaded config file");
    }

    apply_env_overrides(&mut env)?;
    apply_overrides(&mut env, overrides);

    Ok(env)
}

fn apply_env_overrides(env: &mut Environment) -> Result<()> {
    if let Ok(v) = std::env::var("VERSIONS_REPORT_OUTPUT") {
        let v = v.trim();
        if !v.is_empty() {
            env.set("rend.output", Value::from(v));
        }
    }
    if let Ok(v) = std::env::var("VERSIONS_REPORT_LOG_FILE") {
        if !v.trim().is_empty() {
            env.set("pop_config.log_file", Value::from(v));
        }
    }
    if let Ok(v) = std::env::var("VERSIONS_REPORT_INTERPRETER") {
        let v = v.trim();
        if !v.is_empty() {
            env.set("report.interpreter", Value::from(v));
        }
    }
    if let Ok(v) = std::env::var("VERSIONS_REPORT_SITE_PACKAGES") {
        let parts: Vec<Value> = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Value::from)
            .collect();
        if !parts.is_empty() {
            env.set("report.site_packages", Value::Array(parts));
        }
    }
    if let Ok(v) = std::env::var("VERSIONS_REPORT_MASK_HOME") {
        let mask = parse_bool(&v).with_context(|| "VERSIONS_REPORT_MASK_HOME")?;
        env.set("report.mask_home", Value::Bool(mask));
    }

    Ok(())
}

fn apply_overrides(env: &mut Environment, overrides: &Overrides) {
    if let Some(output) = &overrides.output {
        env.set("rend.output", Value::from(output.as_str()));
    }
    if let Some(log_file) = &overrides.log_file {
        env.set(
            "pop_config.log_file",
            Value::from(log_file.display().to_string()),
        );
    }
    if let Some(interpreter) = &overrides.interpreter {
        env.set("report.interpreter", Value::from(interpreter.as_str()));
    }
    if !overrides.site_packages.is_empty() {
        let dirs = overrides
            .site_packages
            .iter()
            .map(|p| Value::from(p.display().to_string()))
            .collect();
        env.set("report.site_packages", Value::Array(dirs));
    }
    if overrides.no_mask_home {
        env.set("report.mask_home", Value::Bool(false));
    }
    if let Some(secs) = overrides.timeout_secs {
        env.set("report.timeout_secs", Value::from(secs));
    }
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!(
            "invalid boolean: {s} (expected true|false|1|0|yes|no|on|off)"
        )),
    }
}
