//! CLI 配置
//!
//! 项目文件 luabridge.json 的结构，以及日志配置

use std::collections::HashMap;
use std::path::Path;

use luabridge_config::{Component, EngineConfig, LogLevel};
use serde::Deserialize;
use tracing::Level;

/// luabridge.json 结构（所有字段可选）
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectFile {
    /// 引擎配置
    pub engine: Option<EngineConfig>,
    /// 是否统计执行行数
    pub trace_lines: Option<bool>,
    /// 日志配置
    pub log: Option<LogSection>,
}

/// 项目文件中的日志配置
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// 全局日志级别
    pub level: Option<LogLevel>,
    /// 组件级别覆盖，键为组件名（state, table, ...）
    pub components: HashMap<String, LogLevel>,
}

impl ProjectFile {
    /// Read and parse a project file
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("无法读取 '{}': {}", path.display(), e))?;
        serde_json::from_str(&content).map_err(|e| format!("解析 '{}' 失败: {}", path.display(), e))
    }
}

/// CLI 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub global: Level,
    pub components: HashMap<Component, Level>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: Level::WARN,
            components: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// Build from the project file section
    pub fn from_section(section: &LogSection) -> Self {
        let mut config = Self::default();
        if let Some(level) = section.level {
            config.global = to_level(level);
        }
        for component in Component::ALL {
            if let Some(level) = section.components.get(component.as_str()) {
                config.components.insert(component, to_level(*level));
            }
        }
        config
    }

    /// Get log level for a specific component
    pub fn level_for(&self, component: Component) -> Level {
        self.components
            .get(&component)
            .copied()
            .unwrap_or(self.global)
    }
}

/// Convert a configuration level into a tracing level
pub fn to_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luabridge_config::LibraryName;

    #[test]
    fn test_parse_project_file() {
        let project: ProjectFile = serde_json::from_str(
            r#"{
                "engine": { "libraries": ["base", "string"], "limits": { "max_instructions": 5000 } },
                "trace_lines": true,
                "log": { "level": "info", "components": { "debug": "trace" } }
            }"#,
        )
        .unwrap();
        let engine = project.engine.unwrap();
        assert_eq!(engine.libraries, vec![LibraryName::Base, LibraryName::String]);
        assert_eq!(engine.limits.max_instructions, Some(5000));
        assert_eq!(engine.limits.check_interval, 1000);
        assert_eq!(project.trace_lines, Some(true));

        let log = LogConfig::from_section(&project.log.unwrap());
        assert_eq!(log.global, Level::INFO);
        assert_eq!(log.level_for(Component::Debug), Level::TRACE);
        assert_eq!(log.level_for(Component::State), Level::INFO);
    }

    #[test]
    fn test_empty_project_file() {
        let project: ProjectFile = serde_json::from_str("{}").unwrap();
        assert!(project.engine.is_none());
        assert!(project.log.is_none());
        assert_eq!(LogConfig::default().level_for(Component::Cli), Level::WARN);
    }
}
