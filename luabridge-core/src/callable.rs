//! Host closures callable from scripts
//!
//! Each registered closure is stored in an append-only list owned by the
//! handle. The engine sees a native trampoline whose first upvalue is the
//! closure's index and whose second upvalue is a light pointer to the list.
//! The list lives behind an `Rc`, so its address survives moves of the
//! handle.

use std::cell::RefCell;
use std::ffi::{c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use mlua_sys as ffi;
use tracing::{error, trace};

use crate::marshal;
use crate::stack;
use crate::state::State;

/// Host closure invoked with a borrowed view of the calling engine.
/// Returns the number of results it left on the stack.
pub type Method = dyn Fn(&State) -> c_int;

/// Append-only list of registered closures
#[derive(Default)]
pub struct CallableRegistry {
    methods: RefCell<Vec<Rc<Method>>>,
}

impl CallableRegistry {
    pub(crate) fn insert(&self, method: Rc<Method>) -> usize {
        let mut methods = self.methods.borrow_mut();
        methods.push(method);
        methods.len() - 1
    }

    pub(crate) fn get(&self, index: usize) -> Option<Rc<Method>> {
        self.methods.borrow().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.methods.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.borrow().is_empty()
    }
}

impl std::fmt::Debug for CallableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableRegistry")
            .field("len", &self.len())
            .finish()
    }
}

/// Push the trampoline closure for method `index` of `registry`
///
/// # Safety
/// `state` must be a live engine instance and `registry` must stay alive for
/// as long as the engine can call the closure.
pub(crate) unsafe fn push_trampoline(
    state: *mut ffi::lua_State,
    registry: &Rc<CallableRegistry>,
    index: usize,
) {
    ffi::lua_pushinteger(state, index as ffi::lua_Integer);
    ffi::lua_pushlightuserdata(state, Rc::as_ptr(registry).cast_mut().cast::<c_void>());
    ffi::lua_pushcclosure(state, dispatch_method, 2);
}

unsafe extern "C-unwind" fn dispatch_method(state: *mut ffi::lua_State) -> c_int {
    let outcome = invoke(state);
    match outcome {
        Ok(count) => count,
        Err(message) => stack::raise_error(state, message),
    }
}

/// Everything that owns host memory lives in here, so it is dropped before
/// any engine error unwinds past the trampoline.
unsafe fn invoke(state: *mut ffi::lua_State) -> Result<c_int, String> {
    let index = ffi::lua_tointegerx(state, marshal::upvalue_index(1), std::ptr::null_mut());
    let pointer = ffi::lua_touserdata(state, marshal::upvalue_index(2))
        .cast::<CallableRegistry>()
        .cast_const();
    if pointer.is_null() {
        return Err("host method called without its registry".to_string());
    }
    Rc::increment_strong_count(pointer);
    let registry = Rc::from_raw(pointer);

    let Some(method) = usize::try_from(index).ok().and_then(|i| registry.get(i)) else {
        error!(
            target: "luabridge::callable",
            index,
            registered = registry.len(),
            "trampoline refers to an unknown method"
        );
        std::process::abort();
    };
    trace!(target: "luabridge::callable", index, "dispatching host method");

    let Some(raw) = std::ptr::NonNull::new(state) else {
        return Err("host method called without an engine".to_string());
    };
    let view = State::reentered(raw, registry);
    match catch_unwind(AssertUnwindSafe(|| method(&view))) {
        Ok(count) => match view.take_pending_error() {
            Some(message) => Err(message),
            None => Ok(count),
        },
        Err(payload) => {
            let message = stack::panic_message(payload);
            error!(target: "luabridge::callable", index, %message, "host method panicked");
            Err(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_append_only() {
        let registry = CallableRegistry::default();
        assert!(registry.is_empty());
        let first = registry.insert(Rc::new(|_: &State| 0));
        let second = registry.insert(Rc::new(|_: &State| 1));
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(1).is_some());
        assert!(registry.get(2).is_none());
    }
}
