//! API 错误类型
//!
//! 提供统一的错误类型和结构化错误报告。

use luabridge_core::ErrorCode;
use serde::Serialize;
use thiserror::Error;

/// 脚本执行错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// 编译错误
    #[error("Syntax error: {message}")]
    Syntax { message: String, line: Option<usize> },

    /// 运行时错误
    #[error("Runtime error: {message}")]
    Runtime { message: String, line: Option<usize> },

    /// 内存分配失败
    #[error("Memory error: {0}")]
    Memory(String),

    /// 错误处理函数本身出错
    #[error("Error handler failed: {0}")]
    Handler(String),

    /// 超出指令数限制
    #[error("Instruction limit of {limit} exceeded")]
    Limit { limit: u64 },

    /// 值桥接层错误
    #[error(transparent)]
    Core(#[from] luabridge_core::Error),
}

impl BridgeError {
    /// 由引擎状态码和错误消息构造
    pub fn from_status(code: ErrorCode, message: String) -> Self {
        let line = line_of(&message);
        match code {
            ErrorCode::SyntaxError => BridgeError::Syntax { message, line },
            ErrorCode::MemoryError => BridgeError::Memory(message),
            ErrorCode::ErrorError => BridgeError::Handler(message),
            _ => BridgeError::Runtime { message, line },
        }
    }

    /// 获取错误行号（如果有）
    pub fn line(&self) -> Option<usize> {
        match self {
            BridgeError::Syntax { line, .. } | BridgeError::Runtime { line, .. } => *line,
            _ => None,
        }
    }

    /// 获取错误阶段名称
    pub fn phase(&self) -> &'static str {
        match self {
            BridgeError::Syntax { .. } => "syntax",
            BridgeError::Runtime { .. } => "runtime",
            BridgeError::Memory(_) => "memory",
            BridgeError::Handler(_) => "handler",
            BridgeError::Limit { .. } => "limit",
            BridgeError::Core(_) => "bridge",
        }
    }

    /// 转换为结构化错误报告
    ///
    /// CLI 可以直接打印，上层应用可以序列化为 JSON。
    pub fn to_report(&self) -> ErrorReport {
        let (error_kind, message) = match self {
            BridgeError::Syntax { message, .. } => ("SyntaxError", message.clone()),
            BridgeError::Runtime { message, .. } => ("RuntimeError", message.clone()),
            BridgeError::Memory(message) => ("MemoryError", message.clone()),
            BridgeError::Handler(message) => ("ErrorError", message.clone()),
            BridgeError::Limit { .. } => ("LimitExceeded", self.to_string()),
            BridgeError::Core(err) => ("BridgeError", err.to_string()),
        };
        ErrorReport {
            phase: self.phase(),
            line: self.line(),
            error_kind: error_kind.to_string(),
            message,
        }
    }
}

/// Line number from an engine message of the form `chunk:LINE: text`
fn line_of(message: &str) -> Option<usize> {
    let mut parts = message.splitn(3, ':');
    let _chunk = parts.next()?;
    let line = parts.next()?;
    parts.next()?;
    line.parse().ok()
}

/// 结构化错误报告
///
/// 上层应用（CLI、Web）可以根据自己的需求格式化。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    /// 错误阶段: syntax, runtime, memory, handler, limit, bridge
    pub phase: &'static str,
    /// 错误行号（1-based，如果有）
    pub line: Option<usize>,
    /// 错误类型（可用于程序化处理）
    pub error_kind: String,
    /// 人类可读的错误消息
    pub message: String,
}

impl std::fmt::Display for ErrorReport {
    /// 默认的 CLI 友好格式
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "[{}] {} error: {}", line, self.phase, self.message),
            None => write!(f, "[{}] {} error: {}", self.phase, self.phase, self.message),
        }
    }
}

impl ErrorReport {
    /// 转换为 JSON 格式（Web API 使用）
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// 简洁格式（适合终端）
    pub fn to_short(&self) -> String {
        format!("{}: {}", self.phase, self.message)
    }
}
