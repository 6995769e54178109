//! API 类型定义
//!
//! 执行的输入输出类型。

use luabridge_core::Generic;

/// 执行输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteOutput {
    /// 主代码块的全部返回值（按顺序）
    pub values: Vec<Generic>,
    /// 行钩子统计的已执行行数（未启用时为 0）
    pub lines_executed: usize,
}

impl ExecuteOutput {
    /// 第一个返回值
    pub fn first(&self) -> Option<&Generic> {
        self.values.first()
    }
}
