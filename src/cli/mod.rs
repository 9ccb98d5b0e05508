use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Overrides;
use crate::engine::{Collaborators, Engine, EngineOptions, LiveHost};
use crate::freeze::FreezeStrategy;
use crate::render::OutputRegistry;
use crate::template::DisplayTemplater;
use crate::version::{CommandVersionLookup, SELF_NAME};

#[derive(Debug, Parser)]
#[command(
    name = "versions-report",
    version,
    about = "Print a diagnostic snapshot of a tool's environment: packages, platform, config and recent logs"
)]
pub struct Cli {
    /// Print the versions report and exit (same as the `report` command)
    #[arg(long = "versions-report", global = true)]
    pub versions_report: bool,
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Output formatter (yaml, json, raw)
    #[arg(long, global = true)]
    pub output: Option<String>,
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
    /// Python interpreter whose packages are listed
    #[arg(long, global = true)]
    pub interpreter: Option<String>,
    #[arg(long = "site-packages", global = true)]
    pub site_packages: Vec<PathBuf>,
    #[arg(long = "no-mask-home", global = true)]
    pub no_mask_home: bool,
    /// Seconds to wait for external commands (unbounded when omitted)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Report(ReportArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Tool to report on
    pub tool: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let home_dir = crate::platform::home_dir();

    let overrides = Overrides {
        output: cli.output.clone(),
        log_file: cli.log_file.clone(),
        interpreter: cli.interpreter.clone(),
        site_packages: cli.site_packages.clone(),
        no_mask_home: cli.no_mask_home,
        timeout_secs: cli.timeout,
    };
    let env_config_path = std::env::var_os("VERSIONS_REPORT_CONFIG").map(PathBuf::from);
    let env = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        home_dir.as_deref(),
        &overrides,
    )
    .map_err(crate::exit::invalid_args_err)?;

    let tool = match &cli.command {
        _ if cli.versions_report => Some(tool_name(&cli.command)),
        None | Some(Commands::Report(_)) => Some(tool_name(&cli.command)),
        Some(_) => None,
    };

    if let Some(tool) = tool {
        let freeze = FreezeStrategy::probe(&env);
        let mut output = OutputRegistry::new();
        let templater = DisplayTemplater::new(home_dir);
        let versions = CommandVersionLookup::new(env.timeout());
        let host = LiveHost;
        let engine = Engine::new(
            Collaborators {
                output: &mut output,
                templater: &templater,
                versions: &versions,
                host: &host,
                freeze,
            },
            EngineOptions {
                show_progress: !cli.quiet,
            },
        );
        match engine.run(&env, &tool)? {}
    }

    match cli.command {
        Some(Commands::Config(args)) => {
            if args.show {
                if cli.json {
                    let stdout = std::io::stdout();
                    serde_json::to_writer_pretty(stdout.lock(), &env)?;
                    println!();
                } else {
                    println!("{}", toml::to_string_pretty(&env)?);
                }
            } else if !cli.quiet {
                eprintln!("config: use `versions-report config --show`");
            }
        }
        Some(Commands::Completion(args)) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, SELF_NAME, &mut out);
        }
        None | Some(Commands::Report(_)) => {}
    }

    Ok(())
}

fn tool_name(command: &Option<Commands>) -> String {
    match command {
        Some(Commands::Report(ReportArgs { tool: Some(tool) })) if !tool.trim().is_empty() => {
            tool.trim().to_string()
        }
        _ => SELF_NAME.to_string(),
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("VERSIONS_REPORT_LOG").unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .try_init();
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "unsupported shell: {other} (expected bash|zsh|fish)"
        ))),
    }
}
