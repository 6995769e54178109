//! Registry - host-private persistent storage inside the engine
//!
//! The engine registry is invisible to scripts, which makes it a good home
//! for precompiled chunks and host state that must survive between calls.

use std::ffi::c_int;

use mlua_sys as ffi;
use tracing::{debug, warn};

use crate::error::{ErrorCode, Result};
use crate::marshal::{self, Push, Read};
use crate::state::State;
use crate::table::Table;
use crate::types::Type;
use crate::Generic;

/// String keys starting with this prefix belong to the engine or its libraries
pub const RESERVED_PREFIX: &str = "_";

/// Integer slots the engine keeps for itself (main thread, globals, ref free list)
const RESERVED_INDICES: ffi::lua_Integer = 3;

/// Proxy over the registry of one engine instance
pub struct Registry<'s> {
    table: Table<'s>,
}

impl<'s> Registry<'s> {
    pub fn new(state: &'s State) -> Self {
        Self {
            table: Table::registry(state),
        }
    }

    fn raw(&self) -> *mut ffi::lua_State {
        self.table.state().as_ptr()
    }

    /// Underlying table proxy
    pub fn table(&mut self) -> &mut Table<'s> {
        &mut self.table
    }

    /// Store `value` under `key`
    pub fn set_entry<K: Push, V: Push>(&mut self, key: K, value: V) -> Result<()> {
        self.table.set(key, value)
    }

    /// Push the value stored under `key` and return its tag.
    ///
    /// The value stays on the stack for the caller to consume (nil when the
    /// key is absent).
    pub fn get_entry<K: Push>(&self, key: K) -> Type {
        let raw = self.raw();
        unsafe {
            key.push(raw);
            Type::from_raw(ffi::lua_rawget(raw, ffi::LUA_REGISTRYINDEX))
        }
    }

    /// Read the value under `key` if it has the tag of `V`. Stack balanced.
    pub fn read_entry<K: Push, V: Read>(&self, key: K) -> Option<V> {
        let raw = self.raw();
        self.get_entry(key);
        let value = unsafe { V::accepts(raw, -1).then(|| V::read(raw, -1)) };
        unsafe { marshal::pop(raw, 1) };
        value
    }

    /// Compile `source` and store the resulting function under `key`.
    ///
    /// On failure nothing is stored, the message is recorded on the handle
    /// and the stack is left unchanged.
    pub fn load_script<K: Push>(&mut self, key: K, source: &str) -> ErrorCode {
        if !key.is_valid_key() {
            return ErrorCode::ErrorError;
        }
        let raw = self.raw();
        let state = self.table.state();
        unsafe {
            key.push(raw);
            let code = state.load_chunk(luabridge_config::DEFAULT_CHUNK_NAME, source);
            if !code.is_ok() {
                marshal::pop(raw, 1);
                warn!(target: "luabridge::registry", %code, "script not stored");
                return code;
            }
            ffi::lua_rawset(raw, ffi::LUA_REGISTRYINDEX);
        }
        debug!(target: "luabridge::registry", "script stored");
        ErrorCode::Ok
    }

    /// Push the function stored under `key`.
    ///
    /// Anything other than a function is popped again and reported as
    /// [`ErrorCode::RuntimeError`].
    pub fn get_script<K: Push>(&self, key: K) -> ErrorCode {
        if !key.is_valid_key() {
            return ErrorCode::ErrorError;
        }
        let tag = self.get_entry(key);
        if tag != Type::Function {
            unsafe { marshal::pop(self.raw(), 1) };
            return ErrorCode::RuntimeError;
        }
        ErrorCode::Ok
    }

    /// Copy every user-defined primitive entry of `source` into this registry.
    ///
    /// Entries qualify when the key is a string outside [`RESERVED_PREFIX`] or
    /// a number outside the engine's own slots, and the value is a string,
    /// number or boolean. Returns false when both proxies name the same
    /// engine instance.
    pub fn copy_content(&mut self, source: &Registry<'_>) -> bool {
        let from = source.raw();
        let to = self.raw();
        if from == to {
            return false;
        }
        let mut copied = 0usize;
        unsafe {
            ffi::lua_pushnil(from);
            while ffi::lua_next(from, ffi::LUA_REGISTRYINDEX) != 0 {
                if is_user_entry(from) {
                    let key = Generic::from_stack(from, -2);
                    let value = Generic::from_stack(from, -1);
                    key.push(to);
                    value.push(to);
                    ffi::lua_rawset(to, ffi::LUA_REGISTRYINDEX);
                    copied += 1;
                }
                marshal::pop(from, 1);
            }
        }
        debug!(target: "luabridge::registry", copied, "registry content copied");
        true
    }
}

/// Key at -2, value at -1
unsafe fn is_user_entry(state: *mut ffi::lua_State) -> bool {
    let value_ok = matches!(
        marshal::get_type(state, -1),
        Type::String | Type::Number | Type::Boolean
    );
    if !value_ok {
        return false;
    }
    match marshal::get_type(state, -2) {
        Type::String => !marshal::string_at(state, -2).starts_with(RESERVED_PREFIX),
        Type::Number => !is_reserved_index(state, -2),
        _ => false,
    }
}

unsafe fn is_reserved_index(state: *mut ffi::lua_State, index: c_int) -> bool {
    marshal::is_integer(state, index)
        && (1..=RESERVED_INDICES).contains(&ffi::lua_tointegerx(state, index, std::ptr::null_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Library;

    fn state() -> State {
        State::new(Library::ALL).unwrap()
    }

    #[test]
    fn test_set_and_get_entry() {
        let state = state();
        let mut registry = state.registry();
        registry.set_entry(42, "test").unwrap();
        assert_eq!(registry.get_entry(42), Type::String);
        assert_eq!(state.stack_value::<String>(-1), "test");
        state.pop(1);

        assert_eq!(registry.get_entry("absent"), Type::Nil);
        state.pop(1);
        assert_eq!(state.stack_size(), 0);
    }

    #[test]
    fn test_read_entry_balanced() {
        let state = state();
        let mut registry = state.registry();
        registry.set_entry("answer", 42).unwrap();
        assert_eq!(registry.read_entry::<_, i32>("answer"), Some(42));
        assert_eq!(registry.read_entry::<_, String>("answer"), None);
        assert_eq!(state.stack_size(), 0);
    }

    #[test]
    fn test_invalid_key_codes() {
        let state = state();
        let mut registry = state.registry();
        assert_eq!(registry.load_script(Generic::nil(), "return 1"), ErrorCode::ErrorError);
        assert_eq!(registry.get_script(Generic::nil()), ErrorCode::ErrorError);
        assert_eq!(state.stack_size(), 0);
    }

    #[test]
    fn test_load_and_get_script() {
        let state = state();
        let mut registry = state.registry();
        assert_eq!(registry.load_script("script", "return 10"), ErrorCode::Ok);
        assert_eq!(state.stack_size(), 0);

        assert_eq!(registry.get_script("script"), ErrorCode::Ok);
        assert_eq!(state.get_type(-1), Type::Function);
        state.pop(1);
        assert_eq!(state.stack_size(), 0);
    }

    #[test]
    fn test_failed_load_keeps_previous_entry() {
        let state = state();
        let mut registry = state.registry();
        assert_eq!(registry.load_script("script", "x = 1"), ErrorCode::Ok);
        assert_eq!(registry.load_script("script", "x = = 1"), ErrorCode::SyntaxError);
        assert_eq!(state.stack_size(), 0);
        assert_eq!(state.errors().len(), 1);

        assert_eq!(registry.get_script("script"), ErrorCode::Ok);
        state.pop(1);
    }

    #[test]
    fn test_get_script_non_function() {
        let state = state();
        let mut registry = state.registry();
        registry.set_entry("value", 3).unwrap();
        assert_eq!(registry.get_script("value"), ErrorCode::RuntimeError);
        assert_eq!(registry.get_script("missing"), ErrorCode::RuntimeError);
        assert_eq!(state.stack_size(), 0);
    }

    #[test]
    fn test_copy_content_to_self() {
        let state = state();
        let mut first = state.registry();
        let second = state.registry();
        assert!(!first.copy_content(&second));
    }
}
