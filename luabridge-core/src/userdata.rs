//! Host values owned by the engine as full userdata
//!
//! Each host type gets one metatable, registered under a name derived from
//! the type, whose `__gc` runs the value's destructor exactly once.

use std::any::type_name;
use std::ffi::{c_int, c_void, CString};
use std::mem::{align_of, size_of, ManuallyDrop};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::{self, NonNull};

use mlua_sys as ffi;
use tracing::{error, trace};

struct Slot<T> {
    value: ManuallyDrop<T>,
    alive: bool,
}

/// Registry name of the metatable for `T`
pub fn metatable_name<T: 'static>() -> String {
    format!("luabridge.userdata:{}", type_name::<T>())
}

fn metatable_cname<T: 'static>() -> CString {
    CString::new(metatable_name::<T>()).unwrap_or_default()
}

fn block_size<T>() -> usize {
    size_of::<Slot<T>>() + align_of::<Slot<T>>() - 1
}

fn slot_in<T>(block: *mut c_void) -> *mut Slot<T> {
    let offset = block.cast::<u8>().align_offset(align_of::<Slot<T>>());
    block.cast::<u8>().wrapping_add(offset).cast::<Slot<T>>()
}

/// Push the metatable of `T`, creating it on first use
///
/// # Safety
/// `state` must be a live engine instance.
pub(crate) unsafe fn push_metatable<T: 'static>(state: *mut ffi::lua_State) {
    let name = metatable_cname::<T>();
    if ffi::luaL_newmetatable(state, name.as_ptr()) == 0 {
        return;
    }
    ffi::lua_pushcclosure(state, finalize::<T>, 0);
    ffi::lua_setfield(state, -2, c"__gc".as_ptr());
    trace!(target: "luabridge::state", name = %metatable_name::<T>(), "userdata metatable created");
}

/// Move `value` into a new userdata and push it
///
/// # Safety
/// `state` must be a live engine instance.
pub(crate) unsafe fn push<T: 'static>(state: *mut ffi::lua_State, value: T) -> NonNull<T> {
    let block = ffi::lua_newuserdatauv(state, block_size::<T>(), 0);
    let slot = slot_in::<T>(block);
    slot.write(Slot {
        value: ManuallyDrop::new(value),
        alive: true,
    });
    push_metatable::<T>(state);
    ffi::lua_setmetatable(state, -2);
    NonNull::from(&mut *(*slot).value)
}

/// Pointer to the live `T` at `index`, if the slot holds one
///
/// # Safety
/// `state` must be a live engine instance.
pub(crate) unsafe fn get<T: 'static>(state: *mut ffi::lua_State, index: c_int) -> Option<NonNull<T>> {
    let name = metatable_cname::<T>();
    let block = ffi::luaL_testudata(state, index, name.as_ptr());
    if block.is_null() {
        return None;
    }
    let slot = slot_in::<T>(block);
    if !(*slot).alive {
        return None;
    }
    Some(NonNull::from(&mut *(*slot).value))
}

unsafe extern "C-unwind" fn finalize<T: 'static>(state: *mut ffi::lua_State) -> c_int {
    let block = ffi::lua_touserdata(state, 1);
    if block.is_null() {
        return 0;
    }
    let slot = slot_in::<T>(block);
    if !(*slot).alive {
        return 0;
    }
    (*slot).alive = false;
    let value = ptr::addr_of_mut!((*slot).value);
    if catch_unwind(AssertUnwindSafe(|| ManuallyDrop::drop(&mut *value))).is_err() {
        error!(target: "luabridge::state", ty = type_name::<T>(), "userdata destructor panicked");
    }
    0
}
