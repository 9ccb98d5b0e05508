use std::path::Path;

use anyhow::{Context, Result};

/// Lines of `log_file`, each with trailing whitespace removed.
///
/// No path, or a path that does not exist, yields an empty tail. A file that
/// exists but cannot be read, or is not UTF-8, is an error. `\n`, `\r\n`
/// and a bare `\r` all end a line.
pub fn tail(log_file: Option<&Path>) -> Result<Vec<String>> {
    let Some(path) = log_file else {
        return Ok(Vec::new());
    };
    if !path.exists() {
        tracing::debug!(path = %path.display(), "log file does not exist");
        return Ok(Vec::new());
    }

    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read log file: {}", path.display()))?;
    let text = String::from_utf8(bytes)
        .with_context(|| format!("log file is not valid UTF-8: {}", path.display()))?;
    Ok(split_lines(&text)
        .map(|l| l.trim_end().to_string())
        .collect())
}

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let Some(end) = rest.find(['\n', '\r']) else {
            return Some(std::mem::take(&mut rest));
        };
        let line = &rest[..end];
        let sep = if rest[end..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[end + sep..];
        Some(line)
    })
}
