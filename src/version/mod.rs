use std::time::Duration;

use anyhow::Result;

use crate::platform::run_command;

pub const SELF_NAME: &str = env!("CARGO_PKG_NAME");
pub const SELF_VERSION: &str = env!("CARGO_PKG_VERSION");

pub trait VersionLookup {
    fn version_of(&self, tool: &str) -> Result<String>;
}

/// Asks the tool itself via `<tool> --version`.
#[derive(Debug, Clone, Default)]
pub struct CommandVersionLookup {
    pub timeout: Option<Duration>,
}

impl CommandVersionLookup {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl VersionLookup for CommandVersionLookup {
    fn version_of(&self, tool: &str) -> Result<String> {
        if tool == SELF_NAME {
            return Ok(SELF_VERSION.to_string());
        }

        let output = run_command(tool, &["--version"], self.timeout)
            .map_err(crate::exit::external_cmd_err)?;
        if output.exit_code != 0 {
            return Err(crate::exit::external_cmd(format!(
                "version lookup failed (exit_code={}): {tool} --version",
                output.exit_code
            )));
        }
        first_line(&output.stdout)
            .or_else(|| first_line(&output.stderr))
            .ok_or_else(|| {
                crate::exit::external_cmd(format!("{tool} --version printed nothing"))
            })
    }
}

fn first_line(s: &str) -> Option<String> {
    s.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}
