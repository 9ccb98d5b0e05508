use std::convert::Infallible;
use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::Environment;
use crate::core::{DiagnosticReport, Locale, PlatformInfo};
use crate::freeze::FreezeStrategy;
use crate::render::OutputSubsystem;
use crate::template::ConfigTemplater;
use crate::version::VersionLookup;

/// Facts about the running process and host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    pub invocation: String,
    pub python_version: String,
    pub locale: Locale,
    pub platform: PlatformInfo,
}

pub trait HostProbe {
    fn facts(&self, env: &Environment) -> HostFacts;
}

/// Reads argv, locale and `uname` of this process and asks the configured
/// interpreter for its version.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveHost;

impl HostProbe for LiveHost {
    fn facts(&self, env: &Environment) -> HostFacts {
        HostFacts {
            invocation: crate::platform::current_invocation(),
            python_version: crate::platform::interpreter_version(env.interpreter(), env.timeout()),
            locale: crate::platform::current_locale(),
            platform: crate::platform::platform_info(),
        }
    }
}

pub struct Collaborators<'a> {
    pub output: &'a mut dyn OutputSubsystem,
    pub templater: &'a dyn ConfigTemplater,
    pub versions: &'a dyn VersionLookup,
    pub host: &'a dyn HostProbe,
    pub freeze: FreezeStrategy,
}

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub show_progress: bool,
}

pub struct Engine<'a> {
    collab: Collaborators<'a>,
    opts: EngineOptions,
}

impl<'a> Engine<'a> {
    pub fn new(collab: Collaborators<'a>, opts: EngineOptions) -> Self {
        Self { collab, opts }
    }

    /// Collects every report field. Nothing is rendered or written.
    pub fn build_report(&self, env: &Environment, name: &str) -> Result<DiagnosticReport> {
        let dependency_freeze = self.freeze()?;
        let log_tail = crate::logs::tail(env.log_file().as_deref())?;

        let host = self.collab.host.facts(env);
        let resolved_config = self.collab.templater.merge_for_display(env)?;
        let version = self.collab.versions.version_of(name)?;

        Ok(DiagnosticReport {
            name: name.to_string(),
            version,
            invocation: host.invocation,
            resolved_config,
            python_version: host.python_version,
            dependency_freeze,
            locale: host.locale,
            platform: host.platform,
            log_tail,
        })
    }

    pub fn render(&self, env: &Environment, report: &DiagnosticReport) -> Result<String> {
        self.collab.output.render(env.output(), report)
    }

    /// Loads the formatters, builds and renders the report and writes it to `out`.
    pub fn emit(&mut self, env: &Environment, name: &str, out: &mut dyn Write) -> Result<()> {
        self.collab.output.register_formatters();
        let formatter = env.output();
        tracing::debug!(formatter, tool = name, "building versions report");

        let report = self.build_report(env, name)?;
        let mut text = self.render(env, &report)?;
        if !text.ends_with('\n') {
            text.push('\n');
        }

        // A closed pipe fails like any other short write.
        out.write_all(text.as_bytes())
            .and_then(|()| out.flush())
            .context("failed to write report")
    }

    /// Writes the report to stdout and exits the process with status 0.
    pub fn run(mut self, env: &Environment, name: &str) -> Result<Infallible> {
        {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            self.emit(env, name, &mut out)?;
        }
        tracing::info!(tool = name, "versions report written");
        std::process::exit(crate::exit::ExitCode::Success.as_i32())
    }

    fn freeze(&self) -> Result<Vec<String>> {
        use std::io::IsTerminal;
        let progress_enabled = self.opts.show_progress && std::io::stderr().is_terminal();
        let pb = if progress_enabled {
            let pb = indicatif::ProgressBar::new_spinner();
            pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            pb.set_message("collecting installed packages...");
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            None
        };

        let result = self
            .collab
            .freeze
            .freeze()
            .context("failed to collect installed packages");

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::OutputRegistry;
    use crate::template::DisplayTemplater;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FixedVersion(&'static str);

    impl VersionLookup for FixedVersion {
        fn version_of(&self, _tool: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingVersion;

    impl VersionLookup for FailingVersion {
        fn version_of(&self, tool: &str) -> Result<String> {
            Err(anyhow::anyhow!("no version for {tool}"))
        }
    }

    struct FixedHost(Vec<&'static str>);

    impl HostProbe for FixedHost {
        fn facts(&self, _env: &Environment) -> HostFacts {
            HostFacts {
                invocation: crate::platform::invocation(&self.0),
                python_version: "Python 3.11.4".to_string(),
                locale: Locale(Some("en_US".to_string()), Some("UTF-8".to_string())),
                platform: PlatformInfo {
                    os: "Linux-6.1.0-x86_64".to_string(),
                    machine: "x86_64".to_string(),
                    system: "Linux".to_string(),
                    release: "6.1.0".to_string(),
                    version: "#1 SMP".to_string(),
                },
            }
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "versions-report-engine-{tag}-{}-{seq}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn empty_site_packages() -> FreezeStrategy {
        FreezeStrategy::InProcess {
            site_packages: vec![temp_dir("site")],
        }
    }

    fn emit_with(env: &Environment, name: &str, versions: &dyn VersionLookup) -> Result<String> {
        let mut output = OutputRegistry::new();
        let templater = DisplayTemplater::new(None);
        let host = FixedHost(vec!["prog", "--versions-report", "--foo", "bar"]);
        let mut engine = Engine::new(
            Collaborators {
                output: &mut output,
                templater: &templater,
                versions,
                host: &host,
                freeze: empty_site_packages(),
            },
            EngineOptions::default(),
        );
        let mut buf = Vec::new();
        engine.emit(env, name, &mut buf)?;
        Ok(String::from_utf8(buf).expect("utf-8 output"))
    }

    #[test]
    fn empty_environment_prints_yaml() {
        let text = emit_with(&Environment::new(), "mytool", &FixedVersion("1.0.0")).unwrap();
        assert!(text.contains("name: mytool"), "{text}");
        assert!(text.contains("logs: []"), "{text}");
        assert!(text.contains("invocation: prog --foo bar"), "{text}");

        let v: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(v["version"], serde_yaml::Value::from("1.0.0"));
    }

    #[test]
    fn json_output_carries_the_same_fields() {
        let env = Environment::from_value(json!({"rend": {"output": "json"}})).unwrap();
        let text = emit_with(&env, "mytool", &FixedVersion("1.0.0")).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["name"], json!("mytool"));
        assert_eq!(v["logs"], json!([]));
        assert_eq!(v["invocation"], json!("prog --foo bar"));
        assert_eq!(v["config"], json!({"rend": {"output": "json"}}));
        assert_eq!(v["locale"], json!(["en_US", "UTF-8"]));
        for key in ["os", "machine", "system", "release", "version"] {
            assert!(v["platform"][key].is_string(), "platform.{key}");
        }
    }

    #[test]
    fn log_tail_is_right_trimmed() {
        let dir = temp_dir("logs");
        let log = dir.join("tool.log");
        std::fs::write(&log, "line1\nline2  \n").unwrap();
        let env = Environment::from_value(json!({
            "pop_config": {"log_file": log.display().to_string()},
        }))
        .unwrap();

        let mut output = OutputRegistry::new();
        let templater = DisplayTemplater::new(None);
        let host = FixedHost(vec!["prog"]);
        let versions = FixedVersion("1.0.0");
        let engine = Engine::new(
            Collaborators {
                output: &mut output,
                templater: &templater,
                versions: &versions,
                host: &host,
                freeze: empty_site_packages(),
            },
            EngineOptions::default(),
        );
        let report = engine.build_report(&env, "mytool").unwrap();
        assert_eq!(report.log_tail, vec!["line1", "line2"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_log_file_gives_empty_tail() {
        let env = Environment::from_value(json!({
            "pop_config": {"log_file": "/definitely/not/a/real/file.log"},
        }))
        .unwrap();
        let text = emit_with(&env, "mytool", &FixedVersion("1.0.0")).unwrap();
        assert!(text.contains("logs: []"), "{text}");
    }

    #[test]
    fn unknown_formatter_aborts_before_output() {
        let env = Environment::from_value(json!({"rend": {"output": "xml"}})).unwrap();
        let err = emit_with(&env, "mytool", &FixedVersion("1.0.0")).unwrap_err();
        assert_eq!(crate::exit::exit_code(&err), 2);
    }

    #[test]
    fn version_lookup_failure_propagates() {
        let err = emit_with(&Environment::new(), "mytool", &FailingVersion).unwrap_err();
        assert!(err.to_string().contains("no version for mytool"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn pip_fallback_failure_propagates() {
        let mut output = OutputRegistry::new();
        let templater = DisplayTemplater::new(None);
        let host = FixedHost(vec!["prog"]);
        let versions = FixedVersion("1.0.0");
        let mut engine = Engine::new(
            Collaborators {
                output: &mut output,
                templater: &templater,
                versions: &versions,
                host: &host,
                freeze: FreezeStrategy::Subprocess {
                    interpreter: "false".to_string(),
                    timeout: None,
                },
            },
            EngineOptions::default(),
        );
        let mut buf = Vec::new();
        let err = engine.emit(&Environment::new(), "mytool", &mut buf).unwrap_err();
        assert_eq!(crate::exit::exit_code(&err), 20);
        assert!(buf.is_empty());
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn closed_stdout_is_a_report_failure() {
        let mut output = OutputRegistry::new();
        let templater = DisplayTemplater::new(None);
        let host = FixedHost(vec!["prog"]);
        let versions = FixedVersion("1.0.0");
        let mut engine = Engine::new(
            Collaborators {
                output: &mut output,
                templater: &templater,
                versions: &versions,
                host: &host,
                freeze: empty_site_packages(),
            },
            EngineOptions::default(),
        );
        let err = engine
            .emit(&Environment::new(), "mytool", &mut ClosedPipe)
            .unwrap_err();
        assert!(err.to_string().contains("failed to write report"), "{err}");
        assert_eq!(crate::exit::exit_code(&err), 10);
    }

    #[test]
    fn in_process_freeze_fills_dependencies() {
        let site = temp_dir("deps");
        let info = site.join("click-8.1.7.dist-info");
        std::fs::create_dir_all(&info).unwrap();
        std::fs::write(info.join("METADATA"), "Name: click\nVersion: 8.1.7\n").unwrap();

        let mut output = OutputRegistry::new();
        let templater = DisplayTemplater::new(None);
        let host = FixedHost(vec!["prog"]);
        let versions = FixedVersion("1.0.0");
        let engine = Engine::new(
            Collaborators {
                output: &mut output,
                templater: &templater,
                versions: &versions,
                host: &host,
                freeze: FreezeStrategy::InProcess {
                    site_packages: vec![site.clone()],
                },
            },
            EngineOptions::default(),
        );
        let report = engine.build_report(&Environment::new(), "mytool").unwrap();
        assert_eq!(report.dependency_freeze, vec!["click==8.1.7"]);
        let _ = std::fs::remove_dir_all(&site);
    }
}
