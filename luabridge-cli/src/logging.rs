//! CLI 日志系统初始化
//!
//! 基于 `tracing-subscriber` 实现分组件日志控制。

use std::io;
use std::path::Path;

use luabridge_config::Component;
use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

use crate::config::LogConfig;

/// 日志输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// 彩色格式化（开发使用）
    Pretty,
    /// 紧凑格式
    Compact,
    /// JSON 格式（工具集成）
    Json,
}

impl LogFormat {
    /// Parse a format name as written on the command line
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Filter with one target per bridge component
pub fn build_targets(log_config: &LogConfig) -> Targets {
    Component::ALL
        .into_iter()
        .fold(Targets::new().with_default(log_config.global), |targets, component| {
            targets.with_target(component.target(), log_config.level_for(component))
        })
}

/// 使用指定格式和日志配置初始化日志系统
///
/// Logs go to stderr so that script results on stdout stay clean.
pub fn init_with_file(
    log_config: &LogConfig,
    format: LogFormat,
    file: Option<&Path>,
) -> io::Result<()> {
    let targets = build_targets(log_config);

    // If file specified, output to both console and file
    if let Some(path) = file {
        let file_handle = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let console_layer = create_format_layer(format, io::stderr).with_filter(targets.clone());

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || {
                file_handle
                    .try_clone()
                    .map(FileWriter::File)
                    .unwrap_or(FileWriter::Sink)
            })
            .with_filter(targets);

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .init();
    } else {
        // Console only
        let console_layer = create_format_layer(format, io::stderr).with_filter(targets);
        tracing_subscriber::registry().with(console_layer).init();
    }
    Ok(())
}

/// Log file writer, dropping output when the handle cannot be cloned
enum FileWriter {
    File(std::fs::File),
    Sink,
}

impl io::Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileWriter::File(file) => file.write(buf),
            FileWriter::Sink => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileWriter::File(file) => file.flush(),
            FileWriter::Sink => Ok(()),
        }
    }
}

/// Create formatter layer based on format
fn create_format_layer<W, F>(format: LogFormat, make_writer: F) -> Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>
where
    W: io::Write + Send + Sync + 'static,
    F: Fn() -> W + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
    }
}
