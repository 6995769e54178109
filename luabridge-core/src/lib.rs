//! luabridge core - host-side value bridge for an embedded Lua 5.4 engine
//!
//! Moves host values across the engine's value stack, proxies tables,
//! exposes host closures and debug hooks to scripts, and keeps persistent
//! host data in the engine registry.
//!
//! Everything here is single-threaded per engine instance; handles are not
//! `Send`.

pub mod callable;
pub mod debug;
pub mod error;
pub mod generic;
pub mod marshal;
pub mod registry;
pub mod stack;
pub mod state;
pub mod table;
pub mod types;
mod userdata;

// Re-export common types
pub use callable::{CallableRegistry, Method};
pub use debug::{DebugHook, DebugInfo, HookEvent};
pub use error::{Error, ErrorCode, Result, Role, TypeMismatch};
pub use generic::{FromGeneric, Generic};
pub use marshal::{NativeFunction, Push, PushArgs, Read, Typed};
pub use registry::Registry;
pub use stack::StackGuard;
pub use state::{Ownership, State};
pub use table::Table;
pub use types::{metamethod, HookMask, Library, Type};
pub use userdata::metatable_name;

// Re-export config types from luabridge-config
pub use luabridge_config::{EngineConfig, LibraryName, LimitConfig, DEFAULT_CHUNK_NAME};

/// Raw engine bindings, for native functions registered by the host
pub use mlua_sys as ffi;
