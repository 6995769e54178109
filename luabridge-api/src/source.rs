//! 脚本来源
//!
//! 执行层只关心脚本文本和它在错误信息中使用的名字。

use luabridge_config::DEFAULT_CHUNK_NAME;

/// Provider of script text
pub trait ScriptSource {
    /// Script text
    fn data(&self) -> &str;

    /// Chunk name used in error messages and debug info
    fn name(&self) -> &str {
        DEFAULT_CHUNK_NAME
    }
}

/// Script held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySource {
    data: String,
    name: String,
}

impl MemorySource {
    pub fn new(data: impl Into<String>) -> Self {
        Self::with_name(data, DEFAULT_CHUNK_NAME)
    }

    pub fn with_name(data: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            name: name.into(),
        }
    }
}

impl ScriptSource for MemorySource {
    fn data(&self) -> &str {
        &self.data
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ScriptSource for String {
    fn data(&self) -> &str {
        self
    }
}
