//! Debug hooks
//!
//! The engine only accepts a plain function pointer as hook, so host
//! closures are kept in a process-wide table keyed by the engine's main
//! thread. Coroutines inherit the hook, so the trampoline resolves the
//! main thread of whichever thread fired, releases the lock, and then runs
//! the closure with a decoded [`DebugInfo`].

use std::collections::HashMap;
use std::ffi::{c_int, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mlua_sys as ffi;
use once_cell::sync::Lazy;
use tracing::{debug, error};

use crate::stack;
use crate::state::State;
use crate::types::HookMask;

/// Host hook invoked for every event selected by the mask
pub type DebugHook = dyn Fn(&State, &DebugInfo) + Send + Sync;

static HOOKS: Lazy<Mutex<HashMap<usize, Arc<DebugHook>>>> = Lazy::new(Default::default);

fn hooks() -> MutexGuard<'static, HashMap<usize, Arc<DebugHook>>> {
    HOOKS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Event that triggered a hook invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookEvent {
    Call,
    Return,
    Line,
    Count,
    TailCall,
}

impl HookEvent {
    fn from_raw(event: c_int) -> Self {
        match event {
            ffi::LUA_HOOKCALL => HookEvent::Call,
            ffi::LUA_HOOKRET => HookEvent::Return,
            ffi::LUA_HOOKLINE => HookEvent::Line,
            ffi::LUA_HOOKTAILCALL => HookEvent::TailCall,
            _ => HookEvent::Count,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::Call => "call",
            HookEvent::Return => "return",
            HookEvent::Line => "line",
            HookEvent::Count => "count",
            HookEvent::TailCall => "tail call",
        }
    }
}

/// Owned snapshot of the engine's activation record for one hook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugInfo {
    pub event: HookEvent,
    /// Reasonable name of the running function, when the engine can tell
    pub name: Option<String>,
    /// "global", "local", "method", "field", "upvalue" or empty
    pub name_what: String,
    /// "Lua", "C", "main"
    pub what: String,
    pub source: String,
    pub short_src: String,
    /// -1 when no line information is available
    pub current_line: c_int,
    pub line_defined: c_int,
    pub last_line_defined: c_int,
    pub upvalue_count: u8,
    pub param_count: u8,
    pub is_vararg: bool,
    pub is_tail_call: bool,
    /// Index of the first value transferred by a call or return
    pub first_transfer: u16,
    pub transfer_count: u16,
}

impl DebugInfo {
    unsafe fn from_raw(ar: &ffi::lua_Debug) -> Self {
        Self {
            event: HookEvent::from_raw(ar.event),
            name: optional_text(ar.name),
            name_what: optional_text(ar.namewhat).unwrap_or_default(),
            what: optional_text(ar.what).unwrap_or_default(),
            source: if ar.source.is_null() {
                String::new()
            } else {
                let bytes = std::slice::from_raw_parts(ar.source.cast::<u8>(), ar.srclen);
                String::from_utf8_lossy(bytes).into_owned()
            },
            short_src: CStr::from_ptr(ar.short_src.as_ptr())
                .to_string_lossy()
                .into_owned(),
            current_line: ar.currentline,
            line_defined: ar.linedefined,
            last_line_defined: ar.lastlinedefined,
            upvalue_count: ar.nups,
            param_count: ar.nparams,
            is_vararg: ar.isvararg != 0,
            is_tail_call: ar.istailcall != 0,
            first_transfer: ar.ftransfer,
            transfer_count: ar.ntransfer,
        }
    }
}

unsafe fn optional_text(ptr: *const std::ffi::c_char) -> Option<String> {
    (!ptr.is_null()).then(|| CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// Install `hook` for `state`, replacing any previous one
///
/// # Safety
/// `state` must be a live engine instance.
pub(crate) unsafe fn install(
    state: *mut ffi::lua_State,
    hook: Arc<DebugHook>,
    mask: HookMask,
    count: c_int,
) {
    hooks().insert(main_thread(state) as usize, hook);
    ffi::lua_sethook(state, Some(dispatch_hook), mask.bits(), count);
    debug!(target: "luabridge::debug", mask = mask.bits(), count, "debug hook installed");
}

/// Detach the hook of `state` from the engine and forget its closure
///
/// # Safety
/// `state` must be a live engine instance.
pub(crate) unsafe fn uninstall(state: *mut ffi::lua_State) {
    ffi::lua_sethook(state, None, 0, 0);
    forget(main_thread(state) as usize);
}

/// Main thread of the instance `state` belongs to. Coroutines inherit the
/// hook but fire it with their own thread, so closures are keyed by this.
///
/// # Safety
/// `state` must be a live engine thread with room for one slot.
unsafe fn main_thread(state: *mut ffi::lua_State) -> *mut ffi::lua_State {
    ffi::lua_rawgeti(state, ffi::LUA_REGISTRYINDEX, ffi::LUA_RIDX_MAINTHREAD);
    let main = ffi::lua_tothread(state, -1);
    ffi::lua_settop(state, -2);
    if main.is_null() {
        state
    } else {
        main
    }
}

/// Forget the closure registered for the instance at `address`
pub(crate) fn forget(address: usize) {
    if hooks().remove(&address).is_some() {
        debug!(target: "luabridge::debug", "debug hook removed");
    }
}

/// Whether a hook closure is registered for `state`
pub fn is_installed(state: *mut ffi::lua_State) -> bool {
    hooks().contains_key(&(state as usize))
}

unsafe extern "C-unwind" fn dispatch_hook(state: *mut ffi::lua_State, ar: *mut ffi::lua_Debug) {
    if let Err(message) = invoke(state, ar) {
        stack::raise_error(state, message);
    }
}

unsafe fn invoke(state: *mut ffi::lua_State, ar: *mut ffi::lua_Debug) -> Result<(), String> {
    let Some(hook) = hooks().get(&(main_thread(state) as usize)).cloned() else {
        return Ok(());
    };
    let (Some(raw), false) = (NonNull::new(state), ar.is_null()) else {
        return Ok(());
    };
    ffi::lua_getinfo(state, c"nSltur".as_ptr(), ar);
    let info = DebugInfo::from_raw(&*ar);

    let view = State::borrowed(raw);
    match catch_unwind(AssertUnwindSafe(|| hook(&view, &info))) {
        Ok(()) => match view.take_pending_error() {
            Some(message) => Err(message),
            None => Ok(()),
        },
        Err(payload) => {
            let message = stack::panic_message(payload);
            error!(target: "luabridge::debug", %message, "debug hook panicked");
            Err(message)
        }
    }
}
