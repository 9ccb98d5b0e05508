use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::config::Environment;
use crate::platform::run_command;

/// How the dependency listing is obtained.
///
/// Resolved once by [`FreezeStrategy::probe`] and handed to the report
/// builder, so tests can inject either variant directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreezeStrategy {
    /// Read package metadata straight from `*.dist-info` directories.
    InProcess { site_packages: Vec<PathBuf> },
    /// Run `<interpreter> -m pip freeze`.
    Subprocess {
        interpreter: String,
        timeout: Option<Duration>,
    },
}

impl FreezeStrategy {
    pub fn probe(env: &Environment) -> Self {
        let site_packages: Vec<PathBuf> = env
            .site_packages()
            .into_iter()
            .filter(|dir| dir.is_dir())
            .collect();
        let strategy = if site_packages.is_empty() {
            FreezeStrategy::Subprocess {
                interpreter: env.interpreter().to_string(),
                timeout: env.timeout(),
            }
        } else {
            FreezeStrategy::InProcess { site_packages }
        };
        tracing::debug!(?strategy, "resolved freeze strategy");
        strategy
    }

    pub fn freeze(&self) -> Result<Vec<String>> {
        match self {
            FreezeStrategy::InProcess { site_packages } => freeze_site_packages(site_packages),
            FreezeStrategy::Subprocess {
                interpreter,
                timeout,
            } => pip_freeze(interpreter, *timeout),
        }
    }
}

pub fn pip_freeze(interpreter: &str, timeout: Option<Duration>) -> Result<Vec<String>> {
    let cmdline = format!("{interpreter} -m pip freeze");
    let output = run_command(interpreter, &["-m", "pip", "freeze"], timeout)
        .map_err(crate::exit::external_cmd_err)?;
    if output.exit_code != 0 {
        let mut msg = format!(
            "external command failed (exit_code={}): {cmdline}",
            output.exit_code
        );
        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            msg.push_str(&format!("\n{stderr}"));
        }
        return Err(crate::exit::external_cmd(msg));
    }
    Ok(split_freeze_output(&output.stdout))
}

/// Trims trailing whitespace and splits on `\n`; empty output has no entries.
pub fn split_freeze_output(stdout: &str) -> Vec<String> {
    let trimmed = stdout.trim_end();
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('\n').map(str::to_string).collect()
}

/// `name==version` for every `*.dist-info` directory, ordered like `pip freeze`.
pub fn freeze_site_packages(site_packages: &[PathBuf]) -> Result<Vec<String>> {
    let mut packages: Vec<(String, String)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for dir in site_packages {
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry
                .with_context(|| format!("failed to list site-packages: {}", dir.display()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let is_dist_info = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.ends_with(".dist-info"));
            if !is_dist_info {
                continue;
            }
            let metadata = entry.path().join("METADATA");
            if !metadata.is_file() {
                continue;
            }
            // Earlier directories shadow later ones, as on the import path.
            if let Some(pkg) = read_metadata(&metadata)? {
                if seen.insert(pkg.0.to_ascii_lowercase()) {
                    packages.push(pkg);
                }
            }
        }
    }

    packages.sort_by_key(|(name, _)| name.to_ascii_lowercase());

    Ok(packages
        .into_iter()
        .map(|(name, version)| format!("{name}=={version}"))
        .collect())
}

fn read_metadata(path: &Path) -> Result<Option<(String, String)>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read package metadata: {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    let mut name = None;
    let mut version = None;
    for line in text.lines() {
        // Headers end at the first blank line; the description follows.
        if line.trim().is_empty() {
            break;
        }
        if let Some(v) = line.strip_prefix("Name:") {
            name = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("Version:") {
            version = Some(v.trim().to_string());
        }
    }

    match (name, version) {
        (Some(name), Some(version)) if !name.is_empty() && !version.is_empty() => {
            Ok(Some((name, version)))
        }
        _ => {
            tracing::debug!(path = %path.display(), "skipping metadata without name/version");
            Ok(None)
        }
    }
}
