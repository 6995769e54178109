//! luabridge - Host-side bridge for embedding a Lua 5.4 engine
//!
//! # Architecture
//!
//! ```text
//! luabridge-config/  - Pure configuration data (no logic)
//! luabridge-core/    - Engine handle, value marshalling, tables, callables, hooks
//! luabridge-api/     - Execution orchestration (limits, line tracing, error reports)
//! luabridge-cli/     - Command line runner
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use luabridge::{State, Library, ErrorCode};
//!
//! let state = State::new(Library::ALL)?;
//! state.register_method("double", |s| {
//!     let n = s.argument::<i64>(1).unwrap_or(0);
//!     s.push(n * 2);
//!     1
//! })?;
//! assert_eq!(state.execute("x = double(21)"), ErrorCode::Ok);
//! assert_eq!(state.read_variable::<i64>("x"), Ok(42));
//! ```

// 重导出各层
pub use luabridge_api as api;
pub use luabridge_config as config;
pub use luabridge_core as core;

// 常用类型
pub use luabridge_api::{
    check, compile_and_run, init_config, quick_run, run, run_source, BridgeError, ErrorReport,
    ExecuteOutput, MemorySource, RunConfig, ScriptSource,
};
pub use luabridge_config::{Component, EngineConfig, LibraryName, LimitConfig, LogLevel};
pub use luabridge_core::{
    ffi, metamethod, metatable_name, CallableRegistry, DebugInfo, Error, ErrorCode, FromGeneric,
    Generic, HookEvent, HookMask, Library, NativeFunction, Ownership, Push, PushArgs, Read,
    Registry, Result, Role, StackGuard, State, Table, Type, TypeMismatch, Typed,
};
