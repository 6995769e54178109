//! State - handle to one engine instance
//!
//! A handle either owns its instance (created by [`State::new`], closed on
//! drop) or borrows one (created with [`State::from_raw`] or handed to a
//! host closure or hook). Every operation works through the instance's
//! value stack and leaves it balanced unless documented otherwise.

use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::ffi::{c_int, CStr, CString};
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;

use luabridge_config::{EngineConfig, DEFAULT_CHUNK_NAME};
use mlua_sys as ffi;
use tracing::{debug, trace, warn};

use crate::callable::{self, CallableRegistry};
use crate::debug::{self, DebugInfo};
use crate::error::{Error, ErrorCode, Result, TypeMismatch};
use crate::generic::Generic;
use crate::marshal::{self, NativeFunction, Push, PushArgs, Read};
use crate::registry::Registry;
use crate::stack::StackGuard;
use crate::table::Table;
use crate::types::{HookMask, Library, Type};
use crate::userdata;

/// Whether a handle closes its instance on drop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Borrowed,
}

const LIBRARIES: [(Library, &CStr, NativeFunction); Library::COUNT] = [
    (Library::BASE, c"_G", ffi::luaopen_base),
    (Library::PACKAGE, c"package", ffi::luaopen_package),
    (Library::COROUTINE, c"coroutine", ffi::luaopen_coroutine),
    (Library::TABLE, c"table", ffi::luaopen_table),
    (Library::IO, c"io", ffi::luaopen_io),
    (Library::OS, c"os", ffi::luaopen_os),
    (Library::STRING, c"string", ffi::luaopen_string),
    (Library::MATH, c"math", ffi::luaopen_math),
    (Library::UTF8, c"utf8", ffi::luaopen_utf8),
    (Library::DEBUG, c"debug", ffi::luaopen_debug),
];

/// Upvalues a native closure can carry
const MAX_UPVALUES: usize = 255;

/// Handle to one engine instance
pub struct State {
    raw: NonNull<ffi::lua_State>,
    ownership: Ownership,
    callables: Rc<CallableRegistry>,
    errors: RefCell<Vec<String>>,
    pending_error: RefCell<Option<String>>,
}

impl State {
    // ===== 构造 =====

    /// Create a fresh instance with the given standard libraries opened
    pub fn new(libraries: Library) -> Result<Self> {
        let raw = NonNull::new(unsafe { ffi::luaL_newstate() }).ok_or(Error::Allocation)?;
        let state = Self::with_ownership(raw, Ownership::Owned, Rc::default());
        state.open_library(libraries);
        debug!(target: "luabridge::state", libraries = libraries.bits(), "engine instance created");
        Ok(state)
    }

    /// Create a fresh instance as described by `config`
    pub fn with_config(config: &EngineConfig) -> Result<Self> {
        Self::new(config.libraries.iter().copied().collect())
    }

    /// Borrow an instance created elsewhere. Returns `None` for null.
    ///
    /// # Safety
    /// `raw` must point to a live engine instance that outlives the handle.
    pub unsafe fn from_raw(raw: *mut ffi::lua_State) -> Option<Self> {
        NonNull::new(raw).map(Self::borrowed)
    }

    pub(crate) fn borrowed(raw: NonNull<ffi::lua_State>) -> Self {
        Self::with_ownership(raw, Ownership::Borrowed, Rc::default())
    }

    /// Borrowed view handed to host methods; shares the owner's method list
    pub(crate) fn reentered(raw: NonNull<ffi::lua_State>, callables: Rc<CallableRegistry>) -> Self {
        Self::with_ownership(raw, Ownership::Borrowed, callables)
    }

    fn with_ownership(
        raw: NonNull<ffi::lua_State>,
        ownership: Ownership,
        callables: Rc<CallableRegistry>,
    ) -> Self {
        Self {
            raw,
            ownership,
            callables,
            errors: RefCell::default(),
            pending_error: RefCell::default(),
        }
    }

    pub fn as_ptr(&self) -> *mut ffi::lua_State {
        self.raw.as_ptr()
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Open additional standard libraries
    pub fn open_library(&self, libraries: Library) {
        let raw = self.as_ptr();
        if libraries == Library::ALL {
            unsafe { ffi::luaL_openlibs(raw) };
            return;
        }
        for (library, name, open) in LIBRARIES {
            if libraries.contains(library) {
                unsafe {
                    ffi::luaL_requiref(raw, name.as_ptr(), open, 1);
                    marshal::pop(raw, 1);
                }
            }
        }
    }

    // ===== 错误记录 =====

    /// Messages collected from failed loads and calls, oldest first
    pub fn errors(&self) -> Ref<'_, [String]> {
        Ref::map(self.errors.borrow(), Vec::as_slice)
    }

    pub fn clear_errors(&self) {
        self.errors.borrow_mut().clear();
    }

    /// Most recent recorded message
    pub fn last_error(&self) -> Option<String> {
        self.errors.borrow().last().cloned()
    }

    pub(crate) fn record_error(&self, message: String) {
        self.errors.borrow_mut().push(message);
    }

    /// Pop the error object left by a failed load or call into the log
    fn drain_error(&self, code: ErrorCode) -> ErrorCode {
        let raw = self.as_ptr();
        let message = unsafe {
            let message = crate::stack::message_at(raw, -1);
            marshal::pop(raw, 1);
            message
        };
        warn!(target: "luabridge::state", %code, %message, "engine reported an error");
        self.record_error(message);
        code
    }

    /// Ask the engine to raise `message` once the running host method or
    /// hook returns. Only meaningful inside such a callback.
    pub fn raise(&self, message: impl Into<String>) {
        *self.pending_error.borrow_mut() = Some(message.into());
    }

    pub(crate) fn take_pending_error(&self) -> Option<String> {
        self.pending_error.borrow_mut().take()
    }

    // ===== 脚本执行 =====

    /// Compile `code` under chunk name `name` and push the resulting function
    pub fn load_chunk(&self, name: &str, code: &str) -> ErrorCode {
        let raw = self.as_ptr();
        let chunk_name =
            CString::new(format!("={name}")).unwrap_or_else(|_| CString::from(c"=?"));
        let status = unsafe {
            ffi::luaL_loadbufferx(
                raw,
                code.as_ptr().cast(),
                code.len(),
                chunk_name.as_ptr(),
                c"t".as_ptr(),
            )
        };
        let code = ErrorCode::from_raw(status);
        if code.is_ok() {
            code
        } else {
            self.drain_error(code)
        }
    }

    /// Call the function below `nargs` arguments in protected mode
    pub fn call(&self, nargs: c_int, nresults: c_int) -> ErrorCode {
        let status = unsafe { ffi::lua_pcall(self.as_ptr(), nargs, nresults, 0) };
        let code = ErrorCode::from_raw(status);
        if code.is_ok() {
            code
        } else {
            self.drain_error(code)
        }
    }

    /// Compile and run `code`, discarding its results
    pub fn execute(&self, code: &str) -> ErrorCode {
        self.execute_named(DEFAULT_CHUNK_NAME, code)
    }

    /// [`execute`](Self::execute) with an explicit chunk name for messages
    pub fn execute_named(&self, name: &str, code: &str) -> ErrorCode {
        trace!(target: "luabridge::state", chunk = name, "executing chunk");
        match self.load_chunk(name, code) {
            ErrorCode::Ok => self.call(0, 0),
            failed => failed,
        }
    }

    /// Compile `code` and store the function in global `name` without running it
    pub fn load_script_into_global(&self, name: &str, code: &str) -> ErrorCode {
        let Some(global) = self.checked_name(name) else {
            return ErrorCode::RuntimeError;
        };
        let code = self.load_chunk(name, code);
        if code.is_ok() {
            unsafe { ffi::lua_setglobal(self.as_ptr(), global.as_ptr()) };
        }
        code
    }

    /// Compile `code` into the registry under `key`
    pub fn load_script<K: Push>(&self, key: K, code: &str) -> ErrorCode {
        self.registry().load_script(key, code)
    }

    /// Run the chunk stored in the registry under `key`
    pub fn execute_script<K: Push>(&self, key: K) -> ErrorCode {
        match self.registry().get_script(key) {
            ErrorCode::Ok => self.call(0, 0),
            failed => failed,
        }
    }

    /// Call global function `name` with `args`, leaving `nresults` results
    /// on the stack on success
    pub fn execute_function<A: PushArgs>(&self, name: &str, args: A, nresults: c_int) -> ErrorCode {
        let Some(global) = self.checked_name(name) else {
            return ErrorCode::RuntimeError;
        };
        let raw = self.as_ptr();
        let tag = Type::from_raw(unsafe { ffi::lua_getglobal(raw, global.as_ptr()) });
        if tag != Type::Function {
            unsafe { marshal::pop(raw, 1) };
            let message = format!("attempt to call a {tag} value (global '{name}')");
            warn!(target: "luabridge::state", %message, "function not found");
            self.record_error(message);
            return ErrorCode::RuntimeError;
        }
        let nargs = unsafe { args.push_args(raw) };
        self.call(nargs, nresults)
    }

    /// Call global function `name` and decode its single result as `R`
    pub fn call_function<R: Read, A: PushArgs>(&self, name: &str, args: A) -> Result<R> {
        let code = self.execute_function(name, args, 1);
        if !code.is_ok() {
            return Err(Error::Status {
                code,
                message: self.last_error().unwrap_or_default(),
            });
        }
        let result = self.top_value::<R>();
        self.pop(1);
        result
    }

    // ===== 全局变量 =====

    /// Read global `name` as `T`
    pub fn read_variable<T: Read>(&self, name: &str) -> Result<T> {
        let _guard = unsafe { StackGuard::new(self.as_ptr()) };
        self.push_global(name)?;
        self.top_value()
    }

    pub fn write_variable<T: Push>(&self, name: &str, value: T) -> Result<()> {
        let global = self.c_name(name)?;
        let raw = self.as_ptr();
        unsafe {
            value.push(raw);
            ffi::lua_setglobal(raw, global.as_ptr());
        }
        Ok(())
    }

    /// Push global `name` and return its tag
    pub fn push_global(&self, name: &str) -> Result<Type> {
        let global = self.c_name(name)?;
        Ok(Type::from_raw(unsafe {
            ffi::lua_getglobal(self.as_ptr(), global.as_ptr())
        }))
    }

    /// Pop the top slot into global `name`
    pub fn set_global_from_stack(&self, name: &str) -> Result<()> {
        let global = self.c_name(name)?;
        unsafe { ffi::lua_setglobal(self.as_ptr(), global.as_ptr()) };
        Ok(())
    }

    // ===== 栈操作 =====

    pub fn stack_size(&self) -> c_int {
        unsafe { ffi::lua_gettop(self.as_ptr()) }
    }

    pub fn pop(&self, count: c_int) {
        unsafe { marshal::pop(self.as_ptr(), count) };
    }

    pub fn push<T: Push>(&self, value: T) {
        unsafe { value.push(self.as_ptr()) };
    }

    /// Push every value of `values`, returning the count for use as the
    /// result of a host method
    pub fn set_return_values<A: PushArgs>(&self, values: A) -> c_int {
        unsafe { values.push_args(self.as_ptr()) }
    }

    /// Decode the slot at `index` as `T` without checking its tag
    pub fn stack_value<T: Read>(&self, index: c_int) -> T {
        unsafe { T::read(self.as_ptr(), index) }
    }

    /// Argument `index` (1-based) of the running host method, if it has the
    /// tag of `T`
    pub fn argument<T: Read>(&self, index: c_int) -> Option<T> {
        unsafe { T::accepts(self.as_ptr(), index) }.then(|| self.stack_value(index))
    }

    /// Upvalue `index` (1-based) of the running native closure, unchecked
    pub fn upvalue<T: Read>(&self, index: c_int) -> T {
        self.stack_value(marshal::upvalue_index(index))
    }

    pub fn get_type(&self, index: c_int) -> Type {
        unsafe { marshal::get_type(self.as_ptr(), index) }
    }

    /// Probe with the engine's native predicate (numbers count as strings)
    pub fn is_of_type(&self, tag: Type, index: c_int) -> bool {
        unsafe { marshal::is_of_type(self.as_ptr(), tag, index) }
    }

    /// Snapshot of the whole stack, bottom first
    pub fn stack(&self) -> Vec<Generic> {
        let raw = self.as_ptr();
        (1..=self.stack_size())
            .map(|index| unsafe { Generic::from_stack(raw, index) })
            .collect()
    }

    fn top_value<T: Read>(&self) -> Result<T> {
        let tag = self.get_type(-1);
        if unsafe { T::accepts(self.as_ptr(), -1) } {
            Ok(self.stack_value(-1))
        } else {
            Err(TypeMismatch::new(T::TYPE, tag).into())
        }
    }

    // ===== 表 =====

    /// Strictly read global table `name`. A missing or non-table global
    /// reads as empty.
    pub fn read_table<K, V>(&self, name: &str) -> Result<BTreeMap<K, V>>
    where
        K: Read + Ord,
        V: Read,
    {
        let _guard = unsafe { StackGuard::new(self.as_ptr()) };
        if self.push_global(name)? != Type::Table {
            return Ok(BTreeMap::new());
        }
        Ok(Table::new(self, -1, false)?.read_all()?)
    }

    /// Read the entries of global table `name` that have the requested tags
    pub fn read_table_matching<K, V>(&self, name: &str) -> Result<BTreeMap<K, V>>
    where
        K: Read + Ord,
        V: Read,
    {
        let _guard = unsafe { StackGuard::new(self.as_ptr()) };
        if self.push_global(name)? != Type::Table {
            return Ok(BTreeMap::new());
        }
        Ok(Table::new(self, -1, false)?.read_matching())
    }

    pub fn read_table_generic(&self, name: &str) -> Result<BTreeMap<Generic, Generic>> {
        self.read_table_matching(name)
    }

    /// Write every entry of `entries` into global table `name`, creating it
    /// when missing
    pub fn write_table<K, V, I>(&self, name: &str, entries: I) -> Result<()>
    where
        K: Push,
        V: Push,
        I: IntoIterator<Item = (K, V)>,
    {
        self.with_table_do(name, true, |table| table.write_all(entries))?
            .unwrap_or(Ok(()))
    }

    /// Run `f` over global table `name`.
    ///
    /// Returns `None` without calling `f` when the global is not a table and
    /// `create_if_missing` is false; otherwise a new table replaces it.
    pub fn with_table_do<R, F>(&self, name: &str, create_if_missing: bool, f: F) -> Result<Option<R>>
    where
        F: FnOnce(&mut Table<'_>) -> R,
    {
        let global = self.c_name(name)?;
        let raw = self.as_ptr();
        let _guard = unsafe { StackGuard::new(raw) };
        if self.push_global(name)? != Type::Table {
            if !create_if_missing {
                return Ok(None);
            }
            unsafe {
                marshal::pop(raw, 1);
                ffi::lua_createtable(raw, 0, 0);
                ffi::lua_pushvalue(raw, -1);
                ffi::lua_setglobal(raw, global.as_ptr());
            }
        }
        let mut table = Table::new(self, -1, false)?;
        Ok(Some(f(&mut table)))
    }

    /// Run `f` over the table at stack `index`
    pub fn with_table_at<R, F>(&self, index: c_int, f: F) -> Option<R>
    where
        F: FnOnce(&mut Table<'_>) -> R,
    {
        let mut table = Table::new(self, index, false).ok()?;
        Some(f(&mut table))
    }

    /// Create a table, fill it with `f`, then store it in global `name` or,
    /// without a name, leave it on the stack
    pub fn create_table<R, F>(&self, name: Option<&str>, f: F) -> Result<R>
    where
        F: FnOnce(&mut Table<'_>) -> R,
    {
        let global = name.map(|name| self.c_name(name)).transpose()?;
        let raw = self.as_ptr();
        unsafe { ffi::lua_createtable(raw, 0, 0) };
        let result = {
            let mut table = Table::new(self, -1, false)?;
            f(&mut table)
        };
        if let Some(global) = global {
            unsafe { ffi::lua_setglobal(raw, global.as_ptr()) };
        }
        Ok(result)
    }

    /// Create (or reopen) the registered metatable `name` and fill it with
    /// `f`. Writes through this proxy honour metamethods.
    pub fn create_metatable<R, F>(&self, name: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Table<'_>) -> R,
    {
        let meta = self.c_name(name)?;
        let raw = self.as_ptr();
        let _guard = unsafe { StackGuard::new(raw) };
        unsafe { ffi::luaL_newmetatable(raw, meta.as_ptr()) };
        let mut table = Table::new(self, -1, true)?;
        Ok(f(&mut table))
    }

    /// Attach registered metatable `name` to the value on top of the stack
    pub fn assign_metatable(&self, name: &str) -> bool {
        let Ok(meta) = CString::new(name) else {
            return false;
        };
        let raw = self.as_ptr();
        unsafe {
            if ffi::lua_getfield(raw, ffi::LUA_REGISTRYINDEX, meta.as_ptr()) != ffi::LUA_TTABLE {
                marshal::pop(raw, 1);
                return false;
            }
            ffi::lua_setmetatable(raw, -2);
        }
        true
    }

    // ===== 函数注册 =====

    /// Expose a native function as global `name`
    pub fn register_native_function(&self, name: &str, function: NativeFunction) -> Result<()> {
        self.register_native_function_with_upvalues(name, function, &[])
    }

    /// Expose a native closure as global `name`, capturing `upvalues`
    pub fn register_native_function_with_upvalues(
        &self,
        name: &str,
        function: NativeFunction,
        upvalues: &[Generic],
    ) -> Result<()> {
        let global = self.c_name(name)?;
        if upvalues.len() > MAX_UPVALUES {
            return Err(Error::TooManyUpvalues(upvalues.len()));
        }
        let raw = self.as_ptr();
        unsafe {
            let count = upvalues.push_args(raw);
            ffi::lua_pushcclosure(raw, function, count);
            ffi::lua_setglobal(raw, global.as_ptr());
        }
        trace!(target: "luabridge::state", name, upvalues = upvalues.len(), "native function registered");
        Ok(())
    }

    /// Replace field `name` of the global table with `function`
    pub fn override_function(&self, name: &str, function: NativeFunction) -> Result<()> {
        let field = self.c_name(name)?;
        let raw = self.as_ptr();
        unsafe {
            ffi::lua_rawgeti(raw, ffi::LUA_REGISTRYINDEX, ffi::LUA_RIDX_GLOBALS);
            ffi::lua_pushcclosure(raw, function, 0);
            ffi::lua_setfield(raw, -2, field.as_ptr());
            marshal::pop(raw, 1);
        }
        debug!(target: "luabridge::state", name, "global function overridden");
        Ok(())
    }

    /// Expose a host closure as global `name`. Returns its method index.
    pub fn register_method<F>(&self, name: &str, method: F) -> Result<usize>
    where
        F: Fn(&State) -> c_int + 'static,
    {
        let global = self.c_name(name)?;
        let index = self.callables.insert(Rc::new(method));
        let raw = self.as_ptr();
        unsafe {
            callable::push_trampoline(raw, &self.callables, index);
            ffi::lua_setglobal(raw, global.as_ptr());
        }
        debug!(target: "luabridge::callable", name, index, "host method registered");
        Ok(index)
    }

    /// Number of host closures registered through this handle's method list
    pub fn method_count(&self) -> usize {
        self.callables.len()
    }

    // ===== 调试钩子 =====

    /// Install `hook` for the events in `mask`. `count` is the instruction
    /// interval for [`HookMask::COUNT`].
    pub fn register_debug_hook<F>(&self, hook: F, mask: HookMask, count: c_int)
    where
        F: Fn(&State, &DebugInfo) + Send + Sync + 'static,
    {
        unsafe { debug::install(self.as_ptr(), Arc::new(hook), mask, count) };
    }

    pub fn remove_debug_hook(&self) {
        unsafe { debug::uninstall(self.as_ptr()) };
    }

    // ===== 用户数据 =====

    /// Move `value` into engine-owned memory and push it. Its destructor runs
    /// when the engine collects it.
    pub fn create_userdata<T: 'static>(&self, value: T) -> NonNull<T> {
        unsafe { userdata::push(self.as_ptr(), value) }
    }

    /// Borrow the `T` stored in the userdata at `index`
    pub fn with_userdata<T: 'static, R>(&self, index: c_int, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut value = unsafe { userdata::get::<T>(self.as_ptr(), index) }?;
        Some(f(unsafe { value.as_mut() }))
    }

    /// Fill the metatable shared by every userdata of type `T`
    pub fn userdata_metatable<T: 'static, R>(&self, f: impl FnOnce(&mut Table<'_>) -> R) -> Result<R> {
        let raw = self.as_ptr();
        let _guard = unsafe { StackGuard::new(raw) };
        unsafe { userdata::push_metatable::<T>(raw) };
        let mut table = Table::new(self, -1, true)?;
        Ok(f(&mut table))
    }

    // ===== 其他 =====

    /// Run a full garbage-collection cycle
    pub fn collect_garbage(&self) {
        unsafe { ffi::lua_gc(self.as_ptr(), ffi::LUA_GCCOLLECT) };
    }

    /// Proxy over this instance's registry
    pub fn registry(&self) -> Registry<'_> {
        Registry::new(self)
    }

    fn c_name(&self, name: &str) -> Result<CString> {
        CString::new(name).map_err(|_| Error::InvalidName(name.to_string()))
    }

    fn checked_name(&self, name: &str) -> Option<CString> {
        match self.c_name(name) {
            Ok(name) => Some(name),
            Err(err) => {
                self.record_error(err.to_string());
                None
            }
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("raw", &self.raw)
            .field("ownership", &self.ownership)
            .field("methods", &self.callables.len())
            .finish()
    }
}

impl Drop for State {
    fn drop(&mut self) {
        match self.ownership {
            Ownership::Owned => {
                let address = self.as_ptr() as usize;
                unsafe { ffi::lua_close(self.as_ptr()) };
                debug::forget(address);
                debug!(target: "luabridge::state", "engine instance closed");
            }
            // The engine may still call methods registered through a handle
            // nobody else holds; their list must outlive it.
            Ownership::Borrowed => {
                if !self.callables.is_empty() && Rc::strong_count(&self.callables) == 1 {
                    std::mem::forget(Rc::clone(&self.callables));
                }
            }
        }
    }
}
