//! 测试辅助工具
//!
//! 提供端到端测试的辅助函数

use luabridge::{ErrorCode, Library, State};

/// 创建打开全部标准库的引擎实例
pub fn new_state() -> State {
    State::new(Library::ALL).expect("engine instance")
}

/// 执行脚本，失败时带上引擎错误信息
pub fn run(state: &State, code: &str) {
    let code_result = state.execute(code);
    assert_eq!(
        code_result,
        ErrorCode::Ok,
        "script failed: {:?}",
        state.last_error()
    );
}
