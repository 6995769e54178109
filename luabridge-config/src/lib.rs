//! luabridge Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all luabridge crates.

use serde::Deserialize;

/// Default chunk name used when a script has no name of its own
pub const DEFAULT_CHUNK_NAME: &str = "LUA_Script";

/// One optional standard library group of the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryName {
    Base,
    Package,
    Coroutine,
    Table,
    Io,
    Os,
    String,
    Math,
    Utf8,
    Debug,
    /// Every library group at once
    All,
}

impl LibraryName {
    /// Parse a library name as written on the command line
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "base" => Some(LibraryName::Base),
            "package" => Some(LibraryName::Package),
            "coroutine" => Some(LibraryName::Coroutine),
            "table" => Some(LibraryName::Table),
            "io" => Some(LibraryName::Io),
            "os" => Some(LibraryName::Os),
            "string" => Some(LibraryName::String),
            "math" => Some(LibraryName::Math),
            "utf8" => Some(LibraryName::Utf8),
            "debug" => Some(LibraryName::Debug),
            "all" => Some(LibraryName::All),
            _ => None,
        }
    }

    /// Get the string name of the library group
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryName::Base => "base",
            LibraryName::Package => "package",
            LibraryName::Coroutine => "coroutine",
            LibraryName::Table => "table",
            LibraryName::Io => "io",
            LibraryName::Os => "os",
            LibraryName::String => "string",
            LibraryName::Math => "math",
            LibraryName::Utf8 => "utf8",
            LibraryName::Debug => "debug",
            LibraryName::All => "all",
        }
    }
}

/// Configuration for execution limits
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Abort the script after this many VM instructions (None = unlimited)
    pub max_instructions: Option<u64>,
    /// Instruction interval between two limit checks
    pub check_interval: u32,
}

/// Configuration for one engine instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Library groups opened right after the instance is created
    pub libraries: Vec<LibraryName>,
    /// Chunk name reported in error messages and debug info
    pub chunk_name: String,
    /// Execution limits
    pub limits: LimitConfig,
}

/// Bridge component, used as structured log target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    State,
    Table,
    Callable,
    Debug,
    Registry,
    Api,
    Cli,
}

impl Component {
    /// All components, in log-filter order
    pub const ALL: [Component; 7] = [
        Component::State,
        Component::Table,
        Component::Callable,
        Component::Debug,
        Component::Registry,
        Component::Api,
        Component::Cli,
    ];

    /// Get the string name of the component
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::State => "state",
            Component::Table => "table",
            Component::Callable => "callable",
            Component::Debug => "debug",
            Component::Registry => "registry",
            Component::Api => "api",
            Component::Cli => "cli",
        }
    }

    /// Get the log target name for this component
    pub fn target(&self) -> String {
        format!("luabridge::{}", self.as_str())
    }
}

/// Log level as written in configuration files
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a log level string ("silent" maps to errors only)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "silent" | "error" => Some(LogLevel::Error),
            "warn" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_instructions: None,
            check_interval: 1000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            libraries: vec![LibraryName::All],
            chunk_name: DEFAULT_CHUNK_NAME.to_string(),
            limits: LimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit_config() {
        let cfg = LimitConfig::default();
        assert_eq!(cfg.max_instructions, None);
        assert_eq!(cfg.check_interval, 1000);
    }

    #[test]
    fn test_default_engine_config() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.libraries, vec![LibraryName::All]);
        assert_eq!(cfg.chunk_name, "LUA_Script");
    }

    #[test]
    fn test_component_target() {
        assert_eq!(Component::State.as_str(), "state");
        assert_eq!(Component::Debug.target(), "luabridge::debug");
    }

    #[test]
    fn test_library_name_parse() {
        assert_eq!(LibraryName::parse("Math"), Some(LibraryName::Math));
        assert_eq!(LibraryName::parse("utf8"), Some(LibraryName::Utf8));
        assert_eq!(LibraryName::parse("socket"), None);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("silent"), Some(LogLevel::Error));
        assert_eq!(LogLevel::parse("TRACE"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_engine_config_from_json() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{ "libraries": ["base", "math"], "limits": { "max_instructions": 5000 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.libraries, vec![LibraryName::Base, LibraryName::Math]);
        assert_eq!(cfg.chunk_name, DEFAULT_CHUNK_NAME);
        assert_eq!(cfg.limits.max_instructions, Some(5000));
        assert_eq!(cfg.limits.check_interval, 1000);
    }
}
