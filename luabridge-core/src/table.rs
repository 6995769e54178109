//! Table - scoped proxy over a table living on the engine stack
//!
//! The proxy stores an absolute stack index, so pushing values while it is
//! alive never shifts its target. Every operation leaves the stack exactly
//! as it found it.

use std::collections::BTreeMap;
use std::ffi::{c_int, CString};

use mlua_sys as ffi;
use tracing::{debug, trace};

use crate::error::{Error, ErrorCode, Result, Role, TypeMismatch};
use crate::marshal::{self, Push, Read};
use crate::stack::{self, StackGuard};
use crate::state::State;
use crate::types::Type;
use crate::Generic;

/// Proxy over one table on the stack of `state`
pub struct Table<'s> {
    state: &'s State,
    index: c_int,
    trigger_metamethods: bool,
}

impl<'s> Table<'s> {
    /// Bind to the table at `index`. With `trigger_metamethods` set, writes go
    /// through `__newindex` instead of raw assignment.
    pub fn new(state: &'s State, index: c_int, trigger_metamethods: bool) -> Result<Self> {
        let raw = state.as_ptr();
        let actual = unsafe { marshal::get_type(raw, index) };
        if actual != Type::Table {
            return Err(Error::NotATable { index, actual });
        }
        let index = unsafe { ffi::lua_absindex(raw, index) };
        Ok(Self {
            state,
            index,
            trigger_metamethods,
        })
    }

    /// Proxy over the engine registry (pseudo-index, raw access only)
    pub(crate) fn registry(state: &'s State) -> Self {
        Self {
            state,
            index: ffi::LUA_REGISTRYINDEX,
            trigger_metamethods: false,
        }
    }

    /// Absolute stack index of the proxied table
    pub fn index(&self) -> c_int {
        self.index
    }

    pub fn triggers_metamethods(&self) -> bool {
        self.trigger_metamethods
    }

    pub fn state(&self) -> &'s State {
        self.state
    }

    fn raw(&self) -> *mut ffi::lua_State {
        self.state.as_ptr()
    }

    /// Store `value` under `key`
    pub fn set<K: Push, V: Push>(&mut self, key: K, value: V) -> Result<()> {
        if !key.is_valid_key() {
            return Err(Error::InvalidKey(key.tag()));
        }
        let raw = self.raw();
        unsafe {
            if !self.trigger_metamethods {
                key.push(raw);
                value.push(raw);
                ffi::lua_rawset(raw, self.index);
                return Ok(());
            }
            ffi::lua_pushcclosure(raw, stack::settable_thunk, 0);
            ffi::lua_pushvalue(raw, self.index);
            key.push(raw);
            value.push(raw);
            stack::protected_call(raw, 3, 0).map_err(|(code, message)| self.fail(code, message))
        }
    }

    /// Raw `#t`
    pub fn len(&self) -> usize {
        unsafe { ffi::lua_rawlen(self.raw(), self.index) as usize }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the value under `key` if it has the tag of `T`.
    ///
    /// The lookup honours `__index`; a lookup that raises yields `None`.
    pub fn read_value<T: Read, K: Push>(&self, key: K) -> Option<T> {
        let raw = self.raw();
        let _guard = unsafe { StackGuard::new(raw) };
        self.push_field(&key).ok()?;
        unsafe { T::accepts(raw, -1).then(|| T::read(raw, -1)) }
    }

    /// Collect every entry, failing on the first key or value of the wrong tag
    pub fn read_all<K, V>(&self) -> std::result::Result<BTreeMap<K, V>, TypeMismatch>
    where
        K: Read + Ord,
        V: Read,
    {
        let mut entries = BTreeMap::new();
        let mut mismatch = None;
        self.for_each_slot(|raw| {
            let key_tag = unsafe { marshal::get_type(raw, -2) };
            if !unsafe { K::accepts(raw, -2) } {
                mismatch = Some(TypeMismatch::with_role(K::TYPE, key_tag, Role::Key));
                return false;
            }
            let value_tag = unsafe { marshal::get_type(raw, -1) };
            if !unsafe { V::accepts(raw, -1) } {
                mismatch = Some(TypeMismatch::with_role(V::TYPE, value_tag, Role::Value));
                return false;
            }
            unsafe { entries.insert(K::read(raw, -2), V::read(raw, -1)) };
            true
        });
        match mismatch {
            Some(err) => Err(err),
            None => Ok(entries),
        }
    }

    /// Collect the entries whose key and value both have the requested tags
    pub fn read_matching<K, V>(&self) -> BTreeMap<K, V>
    where
        K: Read + Ord,
        V: Read,
    {
        let mut entries = BTreeMap::new();
        self.for_each_slot(|raw| {
            if unsafe { K::accepts(raw, -2) && V::accepts(raw, -1) } {
                unsafe { entries.insert(K::read(raw, -2), V::read(raw, -1)) };
            }
            true
        });
        entries
    }

    /// Snapshot every entry as generic values
    pub fn read_generic(&self) -> BTreeMap<Generic, Generic> {
        self.read_matching()
    }

    /// Store every entry of `entries`, stopping at the first failure
    pub fn write_all<K, V, I>(&mut self, entries: I) -> Result<()>
    where
        K: Push,
        V: Push,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Run `f` over the table stored under `key`.
    ///
    /// Returns whether the field held a table. The nested proxy inherits this
    /// proxy's metamethod policy.
    pub fn with_nested_table_do<K, F>(&mut self, key: K, f: F) -> bool
    where
        K: Push,
        F: FnOnce(&mut Table<'s>),
    {
        let raw = self.raw();
        let _guard = unsafe { StackGuard::new(raw) };
        let Ok(tag) = self.push_field(&key) else {
            return false;
        };
        if tag != Type::Table {
            return false;
        }
        let mut nested = Table {
            state: self.state,
            index: unsafe { ffi::lua_absindex(raw, -1) },
            trigger_metamethods: self.trigger_metamethods,
        };
        f(&mut nested);
        true
    }

    /// Attach the registered metatable `name` to this table
    pub fn assign_metatable(&mut self, name: &str) -> bool {
        let Ok(name) = CString::new(name) else {
            return false;
        };
        let raw = self.raw();
        unsafe {
            if ffi::lua_getfield(raw, ffi::LUA_REGISTRYINDEX, name.as_ptr()) != ffi::LUA_TTABLE {
                marshal::pop(raw, 1);
                return false;
            }
            ffi::lua_setmetatable(raw, self.index);
        }
        trace!(target: "luabridge::table", metatable = ?name, "metatable assigned");
        true
    }

    // ===== 内部 =====

    /// Push `t[key]` honouring `__index` and return its tag. On failure
    /// nothing is left on the stack.
    fn push_field<K: Push>(&self, key: &K) -> Result<Type> {
        let raw = self.raw();
        unsafe {
            if ffi::lua_getmetatable(raw, self.index) == 0 {
                key.push(raw);
                return Ok(Type::from_raw(ffi::lua_rawget(raw, self.index)));
            }
            marshal::pop(raw, 1);
            ffi::lua_pushcclosure(raw, stack::gettable_thunk, 0);
            ffi::lua_pushvalue(raw, self.index);
            key.push(raw);
            match stack::protected_call(raw, 2, 1) {
                Ok(()) => Ok(marshal::get_type(raw, -1)),
                Err((code, message)) => Err(self.fail(code, message)),
            }
        }
    }

    /// Walk the table with the engine iterator. `f` sees the key at -2 and
    /// the value at -1 and returns whether to continue.
    fn for_each_slot<F>(&self, mut f: F)
    where
        F: FnMut(*mut ffi::lua_State) -> bool,
    {
        let raw = self.raw();
        let _guard = unsafe { StackGuard::new(raw) };
        unsafe {
            ffi::lua_pushnil(raw);
            while ffi::lua_next(raw, self.index) != 0 {
                if !f(raw) {
                    return;
                }
                marshal::pop(raw, 1);
            }
        }
    }

    fn fail(&self, code: ErrorCode, message: String) -> Error {
        debug!(target: "luabridge::table", %code, %message, "metamethod raised");
        self.state.record_error(message.clone());
        Error::Status { code, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Library;

    fn state() -> State {
        State::new(Library::ALL).unwrap()
    }

    #[test]
    fn test_new_requires_table() {
        let state = state();
        state.push(5);
        let err = Table::new(&state, -1, false).err().unwrap();
        assert_eq!(
            err,
            Error::NotATable {
                index: -1,
                actual: Type::Number
            }
        );
        state.pop(1);
        assert_eq!(state.stack_size(), 0);
    }

    #[test]
    fn test_set_and_read_value() {
        let state = state();
        state
            .create_table(Some("t"), |table| {
                table.set("name", "lua").unwrap();
                table.set(1, 2.5).unwrap();
                table.set(true, 7).unwrap();
                assert_eq!(table.read_value::<String, _>("name"), Some("lua".to_string()));
                assert_eq!(table.read_value::<f64, _>(1), Some(2.5));
                assert_eq!(table.read_value::<i32, _>(true), Some(7));
                assert_eq!(table.read_value::<i32, _>("name"), None);
                assert_eq!(table.read_value::<i32, _>("missing"), None);
            })
            .unwrap();
        assert_eq!(state.stack_size(), 0);
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let state = state();
        state
            .create_table(None, |table| {
                assert_eq!(table.set((), 1), Err(Error::InvalidKey(Type::Nil)));
                assert_eq!(table.set(f64::NAN, 1), Err(Error::InvalidKey(Type::Number)));
                assert!(table.is_empty());
            })
            .unwrap();
        assert_eq!(state.stack_size(), 1);
        state.pop(1);
    }

    #[test]
    fn test_read_all_strict() {
        let state = state();
        assert_eq!(state.execute("t = { a = 1, b = 2, [3] = 4 }"), ErrorCode::Ok);
        let result = state.read_table::<String, i32>("t");
        let err = result.unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch(TypeMismatch::with_role(Type::String, Type::Number, Role::Key))
        );
        assert_eq!(state.stack_size(), 0);
    }

    #[test]
    fn test_read_all_rejects_fractional_integers() {
        let state = state();
        assert_eq!(state.execute("t = { a = 1.5 } u = { a = 2.0 }"), ErrorCode::Ok);
        let err = state.read_table::<String, i32>("t").unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch(TypeMismatch::with_role(Type::Number, Type::Number, Role::Value))
        );
        assert!(state.read_table_matching::<String, i32>("t").unwrap().is_empty());
        assert_eq!(state.read_table::<String, i32>("u").unwrap()["a"], 2);
        assert_eq!(state.stack_size(), 0);
    }

    #[test]
    fn test_read_matching_lenient() {
        let state = state();
        assert_eq!(
            state.execute("t = { a = 1, b = 'x', c = 3, [4] = 4 }"),
            ErrorCode::Ok
        );
        let map = state.read_table_matching::<String, i32>("t").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], 1);
        assert_eq!(map["c"], 3);
        assert_eq!(state.stack_size(), 0);
    }

    #[test]
    fn test_read_generic() {
        let state = state();
        assert_eq!(state.execute("t = { 10, x = true }"), ErrorCode::Ok);
        let map = state.read_table_generic("t").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&Generic::from(1)], Generic::from(10));
        assert_eq!(map[&Generic::from("x")], Generic::from(true));
    }

    #[test]
    fn test_nested_table() {
        let state = state();
        assert_eq!(
            state.execute("outer = { inner = { value = 42 }, flat = 1 }"),
            ErrorCode::Ok
        );
        let found = state
            .with_table_do("outer", false, |table| {
                let mut seen = None;
                assert!(table.with_nested_table_do("inner", |inner| {
                    seen = inner.read_value::<i32, _>("value");
                }));
                assert!(!table.with_nested_table_do("flat", |_| panic!("not a table")));
                assert!(!table.with_nested_table_do("missing", |_| panic!("not a table")));
                seen
            })
            .unwrap();
        assert_eq!(found, Some(Some(42)));
        assert_eq!(state.stack_size(), 0);
    }

    #[test]
    fn test_metamethod_write() {
        let state = state();
        let code = state.execute(
            "log = {}\n\
             proxy = setmetatable({}, { __newindex = function(t, k, v) rawset(log, k, v * 2) end })",
        );
        assert_eq!(code, ErrorCode::Ok);

        state.push_global("proxy").unwrap();
        let mut table = Table::new(&state, -1, true).unwrap();
        table.set("x", 21).unwrap();
        let mut raw_table = Table::new(&state, -1, false).unwrap();
        raw_table.set("y", 1).unwrap();
        state.pop(1);

        assert_eq!(state.read_variable::<i32>("x").ok(), None);
        let log = state.read_table::<String, i32>("log").unwrap();
        assert_eq!(log.get("x"), Some(&42));
        assert_eq!(log.get("y"), None);
        assert_eq!(state.stack_size(), 0);
    }

    #[test]
    fn test_metamethod_error_is_contained() {
        let state = state();
        let code = state.execute(
            "guarded = setmetatable({}, { __newindex = function() error('read only') end, \
             __index = function() error('no fields') end })",
        );
        assert_eq!(code, ErrorCode::Ok);

        state.push_global("guarded").unwrap();
        let mut table = Table::new(&state, -1, true).unwrap();
        let err = table.set("k", 1).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::RuntimeError));
        assert!(err.to_string().contains("read only"));
        assert_eq!(table.read_value::<i32, _>("k"), None);
        assert_eq!(state.stack_size(), 1);
        state.pop(1);
    }

    #[test]
    fn test_assign_metatable() {
        let state = state();
        state
            .create_metatable("Point", |meta| {
                meta.set("__index", "unused").unwrap();
            })
            .unwrap();
        state
            .create_table(Some("p"), |table| {
                assert!(table.assign_metatable("Point"));
                assert!(!table.assign_metatable("Unknown"));
            })
            .unwrap();
        assert_eq!(state.stack_size(), 0);
        assert_eq!(
            state.execute("assert(getmetatable(p) ~= nil)"),
            ErrorCode::Ok
        );
    }
}
