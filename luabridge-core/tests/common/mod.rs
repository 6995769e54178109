//! 测试辅助工具
//!
//! 提供创建引擎实例和检查栈平衡的辅助函数

#![allow(dead_code)]

use luabridge_core::{ErrorCode, Library, State};

/// 打开全部标准库的新实例
pub fn new_state() -> State {
    State::new(Library::ALL).expect("engine instance")
}

/// 执行脚本并断言成功，失败时输出引擎错误信息
pub fn run(state: &State, code: &str) {
    let result = state.execute(code);
    assert_eq!(result, ErrorCode::Ok, "script failed: {:?}", state.errors());
}

/// 执行 `f` 并断言栈深度不变
pub fn balanced<R>(state: &State, f: impl FnOnce(&State) -> R) -> R {
    let before = state.stack_size();
    let result = f(state);
    assert_eq!(state.stack_size(), before, "stack is unbalanced");
    result
}
