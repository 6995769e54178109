//! API 层配置
//!
//! 包含执行配置 RunConfig 和全局单例（供 CLI 使用）

use luabridge_config::{EngineConfig, LimitConfig};
use once_cell::sync::OnceCell;

/// Execution configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    /// Engine instance configuration (libraries, chunk name, limits)
    pub engine: EngineConfig,
    /// Count executed lines through a line hook
    pub trace_lines: bool,
}

impl RunConfig {
    /// Execution limits of the engine
    pub fn limits(&self) -> &LimitConfig {
        &self.engine.limits
    }
}

// Global config singleton for CLI convenience
static GLOBAL_CONFIG: OnceCell<RunConfig> = OnceCell::new();

/// Initialize global configuration (must be called once before any operation)
///
/// # Panics
/// If config is already initialized
pub fn init(config: RunConfig) {
    GLOBAL_CONFIG
        .set(config)
        .expect("Config already initialized");
}

/// Get global config reference
///
/// # Panics
/// If config is not initialized
pub fn config() -> &'static RunConfig {
    GLOBAL_CONFIG.get().expect("Config not initialized")
}

/// Check if config is initialized
pub fn is_initialized() -> bool {
    GLOBAL_CONFIG.get().is_some()
}
