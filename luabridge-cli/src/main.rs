//! luabridge CLI - Command line interface
//!
//! Runs one Lua script through the host bridge. Options come from an
//! optional `luabridge.json` project file and the command line, the
//! command line winning.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::{debug, info};

mod config;
mod logging;
mod platform;

use crate::config::{to_level, LogConfig, ProjectFile};
use crate::logging::{init_with_file, LogFormat};
use crate::platform::print_error_with_source;
use luabridge_api::{
    check, init_config, run_source, BridgeError, LibraryName, LogLevel, MemorySource, RunConfig,
    DEFAULT_CHUNK_NAME,
};

/// Default project file looked up next to the working directory
const PROJECT_FILE: &str = "luabridge.json";

#[derive(Parser)]
#[command(
    name = "luabridge",
    about = "Run Lua scripts through the luabridge host bridge",
    version
)]
struct Cli {
    /// Script to run
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,

    /// Project file (default: ./luabridge.json when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Library group to open, repeatable (base, string, math, ..., all)
    #[arg(long = "lib", value_name = "NAME")]
    libs: Vec<String>,

    /// Abort the script after this many VM instructions
    #[arg(long, value_name = "N")]
    max_instructions: Option<u64>,

    /// Count executed lines
    #[arg(long)]
    trace_lines: bool,

    /// Compile only, do not run
    #[arg(long)]
    check: bool,

    /// Print the source with line numbers before running
    #[arg(long)]
    show_source: bool,

    /// Log level: silent, error, warn, info, debug, trace
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log format: pretty, compact, json
    #[arg(long, value_name = "FORMAT", default_value = "compact")]
    log_format: String,

    /// Also append logs to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Print errors as JSON reports on stdout
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    let project = match load_project(cli.config.as_deref()) {
        Ok(p) => p,
        Err(e) => fail(&e),
    };

    let log_config = match build_log_config(&cli, &project) {
        Ok(c) => c,
        Err(e) => fail(&e),
    };
    let Some(format) = LogFormat::parse(&cli.log_format) else {
        fail(&format!("未知的日志格式 '{}'", cli.log_format));
    };
    if let Err(e) = init_with_file(&log_config, format, cli.log_file.as_deref()) {
        fail(&format!("无法打开日志文件: {}", e));
    }

    let source = match std::fs::read_to_string(&cli.script) {
        Ok(s) => s,
        Err(e) => fail(&format!(
            "Cannot read script '{}': {}",
            cli.script.display(),
            e
        )),
    };

    let run_config = match build_run_config(&cli, &project) {
        Ok(c) => c,
        Err(e) => fail(&e),
    };
    debug!(target: "luabridge::cli", ?run_config, "configuration resolved");

    // Initialize API config (global singleton for convenience)
    init_config(run_config.clone());

    if cli.show_source {
        println!("[Source]");
        for (i, line) in source.lines().enumerate() {
            println!("{:3} | {}", i + 1, line);
        }
        println!("[Execution Result]");
    }

    if cli.check {
        match check(&source, &run_config) {
            Ok(()) => info!(target: "luabridge::cli", script = %cli.script.display(), "syntax ok"),
            Err(e) => report(&e, &source, cli.json),
        }
        return;
    }

    let script = MemorySource::with_name(source.as_str(), &run_config.engine.chunk_name);
    match run_source(&script, &run_config) {
        Ok(output) => {
            for value in &output.values {
                println!("{}", value);
            }
            if run_config.trace_lines {
                println!("[lines executed: {}]", output.lines_executed);
            }
        }
        Err(e) => report(&e, &source, cli.json),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

fn report(e: &BridgeError, source: &str, json: bool) -> ! {
    if json {
        println!("{}", e.to_report().to_json());
    } else {
        print_error_with_source(e, source);
    }
    process::exit(1);
}

/// Read the project file, an absent default file counting as empty
fn load_project(path: Option<&Path>) -> Result<ProjectFile, String> {
    match path {
        Some(path) => ProjectFile::load(path),
        None => {
            let default = Path::new(PROJECT_FILE);
            if default.exists() {
                ProjectFile::load(default)
            } else {
                Ok(ProjectFile::default())
            }
        }
    }
}

fn build_log_config(cli: &Cli, project: &ProjectFile) -> Result<LogConfig, String> {
    let mut log_config = project
        .log
        .as_ref()
        .map(LogConfig::from_section)
        .unwrap_or_default();
    if let Some(level) = &cli.log_level {
        let parsed: LogLevel =
            LogLevel::parse(level).ok_or_else(|| format!("未知的日志级别 '{}'", level))?;
        log_config.global = to_level(parsed);
    }
    Ok(log_config)
}

/// Merge project file and command line into one run configuration
fn build_run_config(cli: &Cli, project: &ProjectFile) -> Result<RunConfig, String> {
    let mut config = RunConfig {
        engine: project.engine.clone().unwrap_or_default(),
        trace_lines: project.trace_lines.unwrap_or(false),
    };

    if !cli.libs.is_empty() {
        config.engine.libraries = cli
            .libs
            .iter()
            .map(|name| {
                LibraryName::parse(name).ok_or_else(|| format!("未知的库 '{}'", name))
            })
            .collect::<Result<_, _>>()?;
    }
    if cli.max_instructions.is_some() {
        config.engine.limits.max_instructions = cli.max_instructions;
    }
    if cli.trace_lines {
        config.trace_lines = true;
    }
    if config.engine.chunk_name == DEFAULT_CHUNK_NAME {
        if let Some(name) = cli.script.file_name() {
            config.engine.chunk_name = name.to_string_lossy().into_owned();
        }
    }
    Ok(config)
}
