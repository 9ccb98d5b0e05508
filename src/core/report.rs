use serde::{Deserialize, Serialize};

use crate::core::Locale;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: String,
    pub machine: String,
    pub system: String,
    pub release: String,
    pub version: String,
}

/// Snapshot of the environment a tool runs in.
///
/// Fields serialize in declaration order, which is the order formatters
/// print them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub name: String,
    pub version: String,
    pub invocation: String,
    #[serde(rename = "config")]
    pub resolved_config: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "python")]
    pub python_version: String,
    #[serde(rename = "dependencies")]
    pub dependency_freeze: Vec<String>,
    pub locale: Locale,
    pub platform: PlatformInfo,
    #[serde(rename = "logs")]
    pub log_tail: Vec<String>,
}
