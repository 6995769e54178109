//! Stack discipline helpers shared by the proxies and the trampolines

use std::any::Any;
use std::ffi::c_int;

use mlua_sys as ffi;

use crate::error::ErrorCode;
use crate::marshal;
use crate::types::Type;

/// Restores the stack top recorded at construction when dropped
pub struct StackGuard {
    state: *mut ffi::lua_State,
    top: c_int,
}

impl StackGuard {
    /// # Safety
    /// `state` must outlive the guard.
    pub unsafe fn new(state: *mut ffi::lua_State) -> Self {
        Self {
            state,
            top: ffi::lua_gettop(state),
        }
    }

    /// Recorded stack top
    pub fn top(&self) -> c_int {
        self.top
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        unsafe { ffi::lua_settop(self.state, self.top) };
    }
}

/// Message of the error object at `index`.
///
/// # Safety
/// `state` must be a live engine instance.
pub(crate) unsafe fn message_at(state: *mut ffi::lua_State, index: c_int) -> String {
    match marshal::get_type(state, index) {
        Type::String | Type::Number => marshal::string_at(state, index),
        other => format!("(error object is a {other} value)"),
    }
}

/// Call the function sitting below `nargs` arguments in protected mode.
///
/// On failure the error object is popped and returned as text; the stack is
/// left as it was minus the function and its arguments.
///
/// # Safety
/// `state` must be a live engine instance holding the function and arguments.
pub(crate) unsafe fn protected_call(
    state: *mut ffi::lua_State,
    nargs: c_int,
    nresults: c_int,
) -> Result<(), (ErrorCode, String)> {
    let status = ffi::lua_pcall(state, nargs, nresults, 0);
    if status == ffi::LUA_OK {
        return Ok(());
    }
    let message = message_at(state, -1);
    marshal::pop(state, 1);
    Err((ErrorCode::from_raw(status), message))
}

/// `t[k] = v` with metamethods, for use under [`protected_call`]
pub(crate) unsafe extern "C-unwind" fn settable_thunk(state: *mut ffi::lua_State) -> c_int {
    ffi::lua_settable(state, 1);
    0
}

/// `t[k]` with metamethods, for use under [`protected_call`]
pub(crate) unsafe extern "C-unwind" fn gettable_thunk(state: *mut ffi::lua_State) -> c_int {
    ffi::lua_gettable(state, 1);
    1
}

/// Raise `message` as an engine error. Never returns.
///
/// The message is copied onto the stack and dropped before unwinding so that
/// no host value is skipped by the engine's non-local exit.
///
/// # Safety
/// Must be called from a native function or hook running inside the engine,
/// with no live host values that need dropping in the current frame.
pub(crate) unsafe fn raise_error(state: *mut ffi::lua_State, message: String) -> c_int {
    marshal::push(state, message.as_str());
    drop(message);
    ffi::lua_error(state)
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("host callback panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("host callback panicked: {message}")
    } else {
        "host callback panicked".to_string()
    }
}
