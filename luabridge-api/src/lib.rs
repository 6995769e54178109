//! luabridge API - Execution orchestration layer
//!
//! Provides unified execution interface, including:
//! - Execution flow orchestration (engine setup, limits, line tracing)
//! - Configuration abstraction (RunConfig)
//! - Unified error handling (BridgeError)
//!
//! For CLI convenience, this crate provides a global singleton API.
//! For library use, prefer the explicit `run(source, &config)` API.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use luabridge_core::{ffi, HookEvent, HookMask, State};
use tracing::{debug, info, trace};

// Re-export config
pub mod config;
pub use config::{config as get_config, init as init_config, is_initialized, RunConfig};

// Re-export config types from luabridge_config
pub use luabridge_config::{
    Component, EngineConfig, LibraryName, LimitConfig, LogLevel, DEFAULT_CHUNK_NAME,
};

// Re-export error, source and types
pub mod error;
pub mod source;
pub mod types;
pub use error::{BridgeError, ErrorReport};
pub use source::{MemorySource, ScriptSource};
pub use types::ExecuteOutput;

// Re-export core types
pub use luabridge_config;
pub use luabridge_core::{ErrorCode, Generic, Type};

/// Message raised inside the engine when the instruction budget runs out
pub const LIMIT_MESSAGE: &str = "instruction limit exceeded";

/// Execute with explicit configuration
///
/// This is the recommended API for library users.
pub fn run(source: &str, config: &RunConfig) -> Result<ExecuteOutput, BridgeError> {
    execute_chunk(&config.engine.chunk_name, source, config)
}

/// Execute a script source with explicit configuration
pub fn run_source(source: &dyn ScriptSource, config: &RunConfig) -> Result<ExecuteOutput, BridgeError> {
    execute_chunk(source.name(), source.data(), config)
}

/// Compile without running, reporting syntax errors
pub fn check(source: &str, config: &RunConfig) -> Result<(), BridgeError> {
    let state = State::with_config(&config.engine)?;
    let code = state.load_chunk(&config.engine.chunk_name, source);
    if !code.is_ok() {
        return Err(BridgeError::from_status(code, state.last_error().unwrap_or_default()));
    }
    state.pop(1);
    Ok(())
}

/// Counters shared with the debug hook of one run
#[derive(Default)]
struct RunCounters {
    instructions: AtomicU64,
    lines: AtomicUsize,
    limit_hit: AtomicBool,
}

fn execute_chunk(name: &str, source: &str, config: &RunConfig) -> Result<ExecuteOutput, BridgeError> {
    info!(target: "luabridge::api", chunk = name, "Starting execution");

    let state = State::with_config(&config.engine)?;
    let counters = Arc::new(RunCounters::default());
    install_hook(&state, config, &counters);

    let base = state.stack_size();
    let code = state.load_chunk(name, source);
    if !code.is_ok() {
        return Err(BridgeError::from_status(code, state.last_error().unwrap_or_default()));
    }

    let code = state.call(0, ffi::LUA_MULTRET);
    // 协程内触发的限制可能被 coroutine.resume 吞掉，这里仍按超限报告
    if counters.limit_hit.load(Ordering::Relaxed) {
        let limit = config.limits().max_instructions.unwrap_or_default();
        return Err(BridgeError::Limit { limit });
    }
    if !code.is_ok() {
        return Err(BridgeError::from_status(code, state.last_error().unwrap_or_default()));
    }

    let values: Vec<_> = state.stack().into_iter().skip(base.max(0) as usize).collect();
    state.pop(state.stack_size() - base);
    let lines_executed = counters.lines.load(Ordering::Relaxed);
    debug!(
        target: "luabridge::api",
        results = values.len(),
        lines = lines_executed,
        instructions = counters.instructions.load(Ordering::Relaxed),
        "chunk returned"
    );

    info!(target: "luabridge::api", "Execution completed");
    Ok(ExecuteOutput {
        values,
        lines_executed,
    })
}

/// One hook serves both the instruction budget and line tracing
fn install_hook(state: &State, config: &RunConfig, counters: &Arc<RunCounters>) {
    let limit = config.limits().max_instructions;
    let interval = config.limits().check_interval.clamp(1, i32::MAX as u32);
    let mut mask = HookMask::NONE;
    if limit.is_some() {
        mask = mask | HookMask::COUNT;
    }
    if config.trace_lines {
        mask = mask | HookMask::LINE;
    }
    if mask == HookMask::NONE {
        return;
    }

    let counters = Arc::clone(counters);
    state.register_debug_hook(
        move |state, info| match info.event {
            HookEvent::Count => {
                let used = counters
                    .instructions
                    .fetch_add(u64::from(interval), Ordering::Relaxed)
                    + u64::from(interval);
                if limit.is_some_and(|max| used > max) {
                    counters.limit_hit.store(true, Ordering::Relaxed);
                    state.raise(LIMIT_MESSAGE);
                }
            }
            HookEvent::Line => {
                counters.lines.fetch_add(1, Ordering::Relaxed);
                trace!(target: "luabridge::api", line = info.current_line, "line executed");
            }
            _ => {}
        },
        mask,
        i32::try_from(interval).unwrap_or(i32::MAX),
    );
}

// ==================== Global config API ====================

/// Compile and run (uses global config)
///
/// # Panics
/// If global config is not initialized
pub fn compile_and_run(source: &str) -> Result<ExecuteOutput, BridgeError> {
    let config = get_config();
    run(source, config)
}

/// Quick run with default config (auto-initializes if needed)
pub fn quick_run(source: &str) -> Result<ExecuteOutput, BridgeError> {
    if !is_initialized() {
        init_config(RunConfig::default());
    }
    compile_and_run(source)
}
