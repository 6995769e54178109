//! Error types (core layer)
//!
//! Three classes: engine status codes, soft mismatches (plain `Option`
//! returns at the call site) and hard mismatches ([`TypeMismatch`]).

use std::ffi::c_int;
use std::fmt;

use mlua_sys as ffi;
use thiserror::Error;

use crate::types::Type;

/// Status code reported by the engine for load / call operations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok = 0,
    Yield = 1,
    RuntimeError = 2,
    SyntaxError = 3,
    MemoryError = 4,
    ErrorError = 5,
}

impl ErrorCode {
    /// Convert an engine status integer
    pub fn from_raw(status: c_int) -> Self {
        match status {
            ffi::LUA_OK => ErrorCode::Ok,
            ffi::LUA_YIELD => ErrorCode::Yield,
            ffi::LUA_ERRRUN => ErrorCode::RuntimeError,
            ffi::LUA_ERRSYNTAX => ErrorCode::SyntaxError,
            ffi::LUA_ERRMEM => ErrorCode::MemoryError,
            _ => ErrorCode::ErrorError,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == ErrorCode::Ok
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Ok => "ok",
            ErrorCode::Yield => "yield",
            ErrorCode::RuntimeError => "runtime error",
            ErrorCode::SyntaxError => "syntax error",
            ErrorCode::MemoryError => "memory error",
            ErrorCode::ErrorError => "error in error handling",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of a key/value pair failed a type check
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Key,
    Value,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Key => "Key",
            Role::Value => "Value",
        }
    }
}

/// Hard type mismatch: the engine held `actual` where `expected` was required
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub struct TypeMismatch {
    pub expected: Type,
    pub actual: Type,
    pub role: Option<Role>,
}

impl TypeMismatch {
    pub fn new(expected: Type, actual: Type) -> Self {
        Self {
            expected,
            actual,
            role: None,
        }
    }

    pub fn with_role(expected: Type, actual: Type, role: Role) -> Self {
        Self {
            expected,
            actual,
            role: Some(role),
        }
    }
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(role) = self.role {
            write!(f, "{}: ", role.as_str())?;
        }
        write!(
            f,
            "Expected type: {}, but got: {}",
            self.expected, self.actual
        )
    }
}

/// Unified error type of the bridge
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),

    /// A table proxy was requested over a slot that holds something else
    #[error("stack slot {index} holds a {actual}, not a table")]
    NotATable { index: c_int, actual: Type },

    /// A name passed to the engine contained an interior NUL byte
    #[error("invalid name {0:?}: contains a NUL byte")]
    InvalidName(String),

    /// nil, NaN and non-primitive values cannot be used as table keys
    #[error("a {0} value cannot be used as a table key")]
    InvalidKey(Type),

    /// The engine reported a non-ok status
    #[error("{code}: {message}")]
    Status { code: ErrorCode, message: String },

    /// A native closure can carry at most 255 upvalues
    #[error("{0} upvalues exceed the limit of 255")]
    TooManyUpvalues(usize),

    /// The engine instance could not be allocated
    #[error("failed to allocate a new engine instance")]
    Allocation,
}

impl Error {
    /// The engine status carried by this error, if any
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
