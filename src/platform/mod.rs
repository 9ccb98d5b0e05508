use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use wait_timeout::ChildExt;

use crate::core::{Locale, PlatformInfo};

/// Flag that triggers the report from a host tool's command line.
pub const VERSIONS_REPORT_FLAG: &str = "--versions-report";

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `cmd` with stdin closed and both output streams captured.
///
/// With `timeout == None` the wait is unbounded.
pub fn run_command(cmd: &str, args: &[&str], timeout: Option<Duration>) -> Result<CommandOutput> {
    tracing::debug!(cmd, ?args, ?timeout, "spawning");

    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start process: {cmd}"))?;

    let Some(timeout) = timeout else {
        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for process: {cmd}"))?;
        return Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8(output.stdout)
                .with_context(|| format!("stdout of {cmd} is not valid UTF-8"))?,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    };

    // Both pipes are drained while waiting; a child filling a pipe buffer
    // would otherwise never exit.
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let status = match child
        .wait_timeout(timeout)
        .with_context(|| format!("failed to wait for process: {cmd}"))?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(anyhow!("timed out after {timeout:?}: {cmd}"));
        }
    };

    let stdout = join_reader(stdout_reader)
        .with_context(|| format!("failed to read stdout of {cmd}"))?;
    let stderr = join_reader(stderr_reader).unwrap_or_default();

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: String::from_utf8(stdout)
            .with_context(|| format!("stdout of {cmd} is not valid UTF-8"))?,
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

type Reader = JoinHandle<std::io::Result<Vec<u8>>>;

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Reader {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join_reader(reader: Reader) -> Result<Vec<u8>> {
    reader
        .join()
        .map_err(|_| anyhow!("pipe reader thread panicked"))?
        .map_err(Into::into)
}

/// `$HOME`, or `None` when it is unset or empty.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// Joins `args` with single spaces, dropping every `--versions-report` token.
pub fn invocation<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for arg in args {
        let arg = arg.as_ref();
        if arg == VERSIONS_REPORT_FLAG {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(arg);
    }
    out
}

pub fn current_invocation() -> String {
    invocation(
        std::env::args_os()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>(),
    )
}

pub fn current_locale() -> Locale {
    for var in ["LC_ALL", "LC_CTYPE", "LANG"] {
        if let Ok(v) = std::env::var(var) {
            if !v.trim().is_empty() {
                return Locale::parse(&v);
            }
        }
    }
    Locale::default()
}

/// Version banner of `interpreter`, or `"unknown"` when it cannot be run.
pub fn interpreter_version(interpreter: &str, timeout: Option<Duration>) -> String {
    match run_command(interpreter, &["--version"], timeout) {
        Ok(output) if output.exit_code == 0 => {
            // Python 2 prints its banner on stderr.
            let banner = if output.stdout.trim().is_empty() {
                output.stderr.trim()
            } else {
                output.stdout.trim()
            };
            if banner.is_empty() {
                "unknown".to_string()
            } else {
                banner.to_string()
            }
        }
        Ok(output) => {
            tracing::debug!(interpreter, exit_code = output.exit_code, "version probe failed");
            "unknown".to_string()
        }
        Err(err) => {
            tracing::debug!(interpreter, error = %err, "version probe failed");
            "unknown".to_string()
        }
    }
}

#[cfg(unix)]
pub fn platform_info() -> PlatformInfo {
    use std::ffi::CStr;

    let field = |raw: &[libc::c_char]| -> String {
        // utsname fields are NUL terminated within their fixed-size buffers.
        unsafe { CStr::from_ptr(raw.as_ptr()) }
            .to_string_lossy()
            .trim()
            .to_string()
    };

    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::uname(&mut uts) };
    if rc != 0 {
        return fallback_platform_info();
    }

    let system = field(&uts.sysname);
    let release = field(&uts.release);
    let version = field(&uts.version);
    let machine = field(&uts.machine);
    PlatformInfo {
        os: format!("{system}-{release}-{machine}"),
        machine,
        system,
        release,
        version,
    }
}

#[cfg(not(unix))]
pub fn platform_info() -> PlatformInfo {
    fallback_platform_info()
}

fn fallback_platform_info() -> PlatformInfo {
    let system = std::env::consts::OS.to_string();
    let machine = std::env::consts::ARCH.to_string();
    PlatformInfo {
        os: format!("{system}-unknown-{machine}"),
        machine,
        system,
        release: "unknown".to_string(),
        version: "unknown".to_string(),
    }
}
