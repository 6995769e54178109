//! Static-dispatch marshalling between host types and engine stack slots
//!
//! Every supported host type names exactly one [`Type`] tag through
//! [`Typed::TYPE`]. `push` places exactly one slot on the stack; `read`
//! decodes a slot without popping it and trusts the caller to have checked
//! the slot with [`Read::accepts`] first. Integer types only accept
//! integral numbers that fit their width; a mismatched read yields the
//! engine's conversion result, never undefined memory access.

use std::ffi::{c_int, c_void};

use mlua_sys as ffi;

use crate::types::Type;

/// Engine-callable native function (C ABI)
pub type NativeFunction = ffi::lua_CFunction;

/// Host type with a fixed engine type tag
pub trait Typed {
    /// Tag this host type is encoded as
    const TYPE: Type;

    /// Whether a slot of tag `tag` can be decoded as this type
    fn matches(tag: Type) -> bool {
        tag == Self::TYPE
    }
}

/// Host value that can be pushed onto the engine stack
pub trait Push: Typed {
    /// Push exactly one slot encoding `self`.
    ///
    /// # Safety
    /// `state` must be a live engine instance with room for one more slot.
    unsafe fn push(&self, state: *mut ffi::lua_State);

    /// Tag of this particular value (differs from `TYPE` only for dynamic values)
    fn tag(&self) -> Type {
        Self::TYPE
    }

    /// Whether the value may be used as a table key (nil and NaN may not)
    fn is_valid_key(&self) -> bool {
        true
    }
}

/// Host value that can be decoded from an engine stack slot
pub trait Read: Typed + Sized {
    /// Decode the slot at `index` without popping it.
    ///
    /// # Safety
    /// `state` must be a live engine instance and `index` a valid index.
    unsafe fn read(state: *mut ffi::lua_State, index: c_int) -> Self;

    /// Whether the slot at `index` decodes as `Self` without loss. Checked
    /// reads go through this rather than the bare tag.
    ///
    /// # Safety
    /// `state` must be a live engine instance.
    unsafe fn accepts(state: *mut ffi::lua_State, index: c_int) -> bool {
        Self::matches(get_type(state, index))
    }
}

/// Static tag for a host type
pub const fn type_for<T: Typed + ?Sized>() -> Type {
    T::TYPE
}

/// Whether values of tag `tag` decode as `T`
pub fn type_matches<T: Typed + ?Sized>(tag: Type) -> bool {
    T::matches(tag)
}

/// Tag of the slot at `index`
///
/// # Safety
/// `state` must be a live engine instance.
pub unsafe fn get_type(state: *mut ffi::lua_State, index: c_int) -> Type {
    Type::from_raw(ffi::lua_type(state, index))
}

/// Probe a slot with the engine's native per-type predicate.
///
/// Numbers satisfy the string predicate and numeric strings satisfy the
/// number predicate, exactly as the engine defines them.
///
/// # Safety
/// `state` must be a live engine instance.
pub unsafe fn is_of_type(state: *mut ffi::lua_State, tag: Type, index: c_int) -> bool {
    match tag {
        Type::None => ffi::lua_type(state, index) == ffi::LUA_TNONE,
        Type::Nil => ffi::lua_type(state, index) == ffi::LUA_TNIL,
        Type::Boolean => ffi::lua_type(state, index) == ffi::LUA_TBOOLEAN,
        Type::LightUserData => ffi::lua_type(state, index) == ffi::LUA_TLIGHTUSERDATA,
        Type::Number => ffi::lua_isnumber(state, index) != 0,
        Type::String => ffi::lua_isstring(state, index) != 0,
        Type::Table => ffi::lua_type(state, index) == ffi::LUA_TTABLE,
        Type::Function => ffi::lua_type(state, index) == ffi::LUA_TFUNCTION,
        Type::UserData => ffi::lua_isuserdata(state, index) != 0,
        Type::Thread => ffi::lua_type(state, index) == ffi::LUA_TTHREAD,
    }
}

/// Whether the number at `index` has the integer subtype
///
/// # Safety
/// `state` must be a live engine instance.
pub unsafe fn is_integer(state: *mut ffi::lua_State, index: c_int) -> bool {
    ffi::lua_isinteger(state, index) != 0
}

/// # Safety
/// `state` must be a live engine instance with room for one more slot.
pub unsafe fn push<T: Push + ?Sized>(state: *mut ffi::lua_State, value: &T) {
    value.push(state);
}

/// # Safety
/// `state` must be a live engine instance and `index` a valid index.
pub unsafe fn read<T: Read>(state: *mut ffi::lua_State, index: c_int) -> T {
    T::read(state, index)
}

/// # Safety
/// `state` must hold at least `count` slots.
pub unsafe fn pop(state: *mut ffi::lua_State, count: c_int) {
    ffi::lua_settop(state, -count - 1);
}

/// Pseudo-index of upvalue `index` (1-based) of the running native function
pub fn upvalue_index(index: c_int) -> c_int {
    ffi::lua_upvalueindex(index)
}

/// Bytes of the string slot at `index`, lossily decoded.
///
/// # Safety
/// `state` must be a live engine instance; the slot must not be a table key
/// under iteration unless it already holds a string.
pub(crate) unsafe fn string_at(state: *mut ffi::lua_State, index: c_int) -> String {
    let mut len = 0usize;
    let ptr = ffi::lua_tolstring(state, index, &mut len);
    if ptr.is_null() {
        return String::new();
    }
    let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len);
    String::from_utf8_lossy(bytes).into_owned()
}

// ==================== Nil ====================

impl Typed for () {
    const TYPE: Type = Type::Nil;
}

impl Push for () {
    unsafe fn push(&self, state: *mut ffi::lua_State) {
        ffi::lua_pushnil(state);
    }

    fn is_valid_key(&self) -> bool {
        false
    }
}

impl Read for () {
    unsafe fn read(_state: *mut ffi::lua_State, _index: c_int) -> Self {}
}

// ==================== Boolean ====================

impl Typed for bool {
    const TYPE: Type = Type::Boolean;
}

impl Push for bool {
    unsafe fn push(&self, state: *mut ffi::lua_State) {
        ffi::lua_pushboolean(state, c_int::from(*self));
    }
}

impl Read for bool {
    unsafe fn read(state: *mut ffi::lua_State, index: c_int) -> Self {
        ffi::lua_toboolean(state, index) != 0
    }
}

// ==================== Numbers ====================

macro_rules! impl_integer {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Typed for $ty {
                const TYPE: Type = Type::Number;
            }

            /// Unsigned values above `i64::MAX` wrap to negative engine integers
            impl Push for $ty {
                unsafe fn push(&self, state: *mut ffi::lua_State) {
                    ffi::lua_pushinteger(state, *self as ffi::lua_Integer);
                }
            }

            impl Read for $ty {
                unsafe fn read(state: *mut ffi::lua_State, index: c_int) -> Self {
                    ffi::lua_tointegerx(state, index, std::ptr::null_mut()) as $ty
                }

                /// Integral numbers only, and only when they fit the width
                unsafe fn accepts(state: *mut ffi::lua_State, index: c_int) -> bool {
                    if get_type(state, index) != Type::Number {
                        return false;
                    }
                    let mut isnum = 0;
                    let value = ffi::lua_tointegerx(state, index, &mut isnum);
                    isnum != 0 && <$ty>::try_from(value).is_ok()
                }
            }
        )+
    };
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_float {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Typed for $ty {
                const TYPE: Type = Type::Number;
            }

            impl Push for $ty {
                unsafe fn push(&self, state: *mut ffi::lua_State) {
                    ffi::lua_pushnumber(state, *self as ffi::lua_Number);
                }

                fn is_valid_key(&self) -> bool {
                    !self.is_nan()
                }
            }

            impl Read for $ty {
                unsafe fn read(state: *mut ffi::lua_State, index: c_int) -> Self {
                    ffi::lua_tonumberx(state, index, std::ptr::null_mut()) as $ty
                }
            }
        )+
    };
}

impl_float!(f32, f64);

// ==================== Strings ====================

impl Typed for str {
    const TYPE: Type = Type::String;
}

impl Push for str {
    unsafe fn push(&self, state: *mut ffi::lua_State) {
        ffi::lua_pushlstring(state, self.as_ptr().cast(), self.len());
    }
}

impl Typed for String {
    const TYPE: Type = Type::String;
}

impl Push for String {
    unsafe fn push(&self, state: *mut ffi::lua_State) {
        self.as_str().push(state);
    }
}

impl Read for String {
    unsafe fn read(state: *mut ffi::lua_State, index: c_int) -> Self {
        string_at(state, index)
    }
}

// ==================== Light userdata ====================

impl Typed for *mut c_void {
    const TYPE: Type = Type::LightUserData;
}

impl Push for *mut c_void {
    unsafe fn push(&self, state: *mut ffi::lua_State) {
        ffi::lua_pushlightuserdata(state, *self);
    }
}

impl Read for *mut c_void {
    unsafe fn read(state: *mut ffi::lua_State, index: c_int) -> Self {
        ffi::lua_touserdata(state, index)
    }
}

// ==================== Native functions ====================

impl Typed for NativeFunction {
    const TYPE: Type = Type::Function;
}

impl Push for NativeFunction {
    unsafe fn push(&self, state: *mut ffi::lua_State) {
        ffi::lua_pushcclosure(state, *self, 0);
    }
}

// ==================== Wrappers ====================

impl<T: Typed + ?Sized> Typed for &T {
    const TYPE: Type = T::TYPE;

    fn matches(tag: Type) -> bool {
        T::matches(tag)
    }
}

impl<T: Push + ?Sized> Push for &T {
    unsafe fn push(&self, state: *mut ffi::lua_State) {
        (**self).push(state);
    }

    fn tag(&self) -> Type {
        (**self).tag()
    }

    fn is_valid_key(&self) -> bool {
        (**self).is_valid_key()
    }
}

/// `None` travels as nil
impl<T: Typed> Typed for Option<T> {
    const TYPE: Type = T::TYPE;

    fn matches(tag: Type) -> bool {
        tag == Type::Nil || T::matches(tag)
    }
}

impl<T: Push> Push for Option<T> {
    unsafe fn push(&self, state: *mut ffi::lua_State) {
        match self {
            Some(value) => value.push(state),
            None => ffi::lua_pushnil(state),
        }
    }

    fn tag(&self) -> Type {
        self.as_ref().map_or(Type::Nil, Push::tag)
    }

    fn is_valid_key(&self) -> bool {
        self.as_ref().is_some_and(Push::is_valid_key)
    }
}

impl<T: Read> Read for Option<T> {
    unsafe fn read(state: *mut ffi::lua_State, index: c_int) -> Self {
        match get_type(state, index) {
            Type::Nil | Type::None => None,
            _ => Some(T::read(state, index)),
        }
    }

    unsafe fn accepts(state: *mut ffi::lua_State, index: c_int) -> bool {
        matches!(get_type(state, index), Type::Nil | Type::None) || T::accepts(state, index)
    }
}

// ==================== Argument packs ====================

/// A group of values pushed as call arguments or return values
pub trait PushArgs {
    /// Push every value in order and return how many slots were pushed.
    ///
    /// # Safety
    /// `state` must be a live engine instance with room for the values.
    unsafe fn push_args(&self, state: *mut ffi::lua_State) -> c_int;
}

impl PushArgs for () {
    unsafe fn push_args(&self, _state: *mut ffi::lua_State) -> c_int {
        0
    }
}

macro_rules! impl_push_args {
    ($($name:ident),+) => {
        impl<$($name: Push),+> PushArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            unsafe fn push_args(&self, state: *mut ffi::lua_State) -> c_int {
                let ($($name,)+) = self;
                let mut count = 0;
                $(
                    $name.push(state);
                    count += 1;
                )+
                count
            }
        }
    };
}

impl_push_args!(A);
impl_push_args!(A, B);
impl_push_args!(A, B, C);
impl_push_args!(A, B, C, D);
impl_push_args!(A, B, C, D, E);
impl_push_args!(A, B, C, D, E, F);

impl<T: Push> PushArgs for [T] {
    unsafe fn push_args(&self, state: *mut ffi::lua_State) -> c_int {
        for value in self {
            value.push(state);
        }
        c_int::try_from(self.len()).unwrap_or(c_int::MAX)
    }
}

impl<T: Push> PushArgs for Vec<T> {
    unsafe fn push_args(&self, state: *mut ffi::lua_State) -> c_int {
        self.as_slice().push_args(state)
    }
}

impl<T: PushArgs + ?Sized> PushArgs for &T {
    unsafe fn push_args(&self, state: *mut ffi::lua_State) -> c_int {
        (**self).push_args(state)
    }
}
