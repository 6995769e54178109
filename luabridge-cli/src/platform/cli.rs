//! CLI 格式化输出
//!
//! 提供命令行友好的错误显示和源码上下文打印。

use luabridge_api::BridgeError;

/// 打印错误并显示源代码上下文
pub fn print_error_with_source(e: &BridgeError, source: &str) {
    eprintln!("error: {}", e);

    if let Some(error_line) = e.line() {
        print_source_context(source, error_line);
    }
}

/// 打印源代码上下文（显示错误行前后几行）
pub fn print_source_context(source: &str, error_line: usize) {
    const CONTEXT_LINES: usize = 3; // 错误行前后显示的上下文行数

    let lines: Vec<&str> = source.lines().collect();
    let total_lines = lines.len();

    if error_line == 0 || error_line > total_lines {
        return;
    }

    let start_line = error_line.saturating_sub(CONTEXT_LINES).max(1);
    let end_line = (error_line + CONTEXT_LINES).min(total_lines);

    // 行号的最大宽度用于对齐
    let width = end_line.to_string().len();
    let separator = "-".repeat(width + 1);
    eprintln!("{}|--", separator);

    for line_idx in start_line..=end_line {
        let marker = if line_idx == error_line { '>' } else { ' ' };
        eprintln!("{}{:>width$} | {}", marker, line_idx, lines[line_idx - 1], width = width);
    }

    eprintln!("{}|--", separator);
}
