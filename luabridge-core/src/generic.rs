//! Generic - a type-erased primitive engine value
//!
//! Holds one of nil / boolean / number (integer or float subtype) / string /
//! light userdata. Any other tag is recorded without a payload so that
//! tables and functions can still be reported by type.

use std::cmp::Ordering;
use std::ffi::{c_int, c_void};
use std::fmt;
use std::hash::{Hash, Hasher};

use mlua_sys as ffi;

use crate::error::TypeMismatch;
use crate::marshal::{self, Push, Read, Typed};
use crate::types::Type;

#[derive(Clone, Debug, Default)]
enum Payload {
    #[default]
    Absent,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Pointer(*mut c_void),
}

impl Payload {
    fn rank(&self) -> u8 {
        match self {
            Payload::Absent => 0,
            Payload::Boolean(_) => 1,
            Payload::Integer(_) | Payload::Number(_) => 2,
            Payload::String(_) => 3,
            Payload::Pointer(_) => 4,
        }
    }

    fn compare(&self, other: &Payload) -> Ordering {
        match (self, other) {
            (Payload::Absent, Payload::Absent) => Ordering::Equal,
            (Payload::Boolean(a), Payload::Boolean(b)) => a.cmp(b),
            (Payload::Integer(a), Payload::Integer(b)) => a.cmp(b),
            (Payload::Number(a), Payload::Number(b)) => a.total_cmp(b),
            (Payload::Integer(a), Payload::Number(b)) => compare_mixed(*a, *b),
            (Payload::Number(a), Payload::Integer(b)) => compare_mixed(*b, *a).reverse(),
            (Payload::String(a), Payload::String(b)) => a.cmp(b),
            (Payload::Pointer(a), Payload::Pointer(b)) => (*a as usize).cmp(&(*b as usize)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// 2^63, the first float above every `i64`
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Integer vs float by exact numeric value; an exact tie sorts the integer
/// first. NaN sits where `total_cmp` puts it: negative NaN below every
/// integer, positive NaN above.
fn compare_mixed(integer: i64, number: f64) -> Ordering {
    if number.is_nan() {
        return if number.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if number >= I64_BOUND {
        return Ordering::Less;
    }
    if number < -I64_BOUND {
        return Ordering::Greater;
    }
    // floor(number) fits an i64 here; integer > floor means integer > number
    match integer.cmp(&(number.floor() as i64)) {
        Ordering::Greater => Ordering::Greater,
        _ => Ordering::Less,
    }
}

/// Type-erased primitive value
#[derive(Clone, Debug)]
pub struct Generic {
    tag: Type,
    payload: Payload,
}

impl Generic {
    /// The nil value
    pub fn nil() -> Self {
        Self::default()
    }

    /// A payload-less value of tag `tag` (table, function, userdata, ...)
    fn opaque(tag: Type) -> Self {
        Self {
            tag,
            payload: Payload::Absent,
        }
    }

    /// Snapshot the stack slot at `index` without popping it
    ///
    /// # Safety
    /// `state` must be a live engine instance and `index` a valid index.
    pub unsafe fn from_stack(state: *mut ffi::lua_State, index: c_int) -> Self {
        let tag = marshal::get_type(state, index);
        let payload = match tag {
            Type::Boolean => Payload::Boolean(bool::read(state, index)),
            Type::Number if marshal::is_integer(state, index) => {
                Payload::Integer(i64::read(state, index))
            }
            Type::Number => Payload::Number(f64::read(state, index)),
            Type::String => Payload::String(String::read(state, index)),
            Type::LightUserData => Payload::Pointer(<*mut c_void as Read>::read(state, index)),
            _ => return Self::opaque(tag),
        };
        Self { tag, payload }
    }

    pub fn tag(&self) -> Type {
        self.tag
    }

    pub fn is_nil(&self) -> bool {
        self.tag == Type::Nil
    }

    /// Whether a number value has the integer subtype
    pub fn is_integer(&self) -> bool {
        matches!(self.payload, Payload::Integer(_))
    }

    /// Extract the payload as `T`, failing when the stored tag differs
    pub fn get<T: FromGeneric>(&self) -> Result<T, TypeMismatch> {
        T::from_generic(self).ok_or(TypeMismatch::new(T::TYPE, self.tag))
    }

    /// Borrow a string payload
    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(value) => Some(value),
            _ => None,
        }
    }
}

impl Default for Generic {
    fn default() -> Self {
        Self {
            tag: Type::Nil,
            payload: Payload::Absent,
        }
    }
}

// ===== 构造 =====

impl From<()> for Generic {
    fn from(_: ()) -> Self {
        Self::nil()
    }
}

impl From<bool> for Generic {
    fn from(value: bool) -> Self {
        Self {
            tag: Type::Boolean,
            payload: Payload::Boolean(value),
        }
    }
}

macro_rules! from_integer {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Generic {
                fn from(value: $ty) -> Self {
                    Self {
                        tag: Type::Number,
                        payload: Payload::Integer(i64::from(value)),
                    }
                }
            }
        )+
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Generic {
    fn from(value: f64) -> Self {
        Self {
            tag: Type::Number,
            payload: Payload::Number(value),
        }
    }
}

impl From<f32> for Generic {
    fn from(value: f32) -> Self {
        Self::from(f64::from(value))
    }
}

impl From<&str> for Generic {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<String> for Generic {
    fn from(value: String) -> Self {
        Self {
            tag: Type::String,
            payload: Payload::String(value),
        }
    }
}

impl From<*mut c_void> for Generic {
    fn from(value: *mut c_void) -> Self {
        Self {
            tag: Type::LightUserData,
            payload: Payload::Pointer(value),
        }
    }
}

// ===== 提取 =====

/// Host types a [`Generic`] payload can be extracted as
pub trait FromGeneric: Typed + Sized {
    fn from_generic(value: &Generic) -> Option<Self>;
}

impl FromGeneric for () {
    fn from_generic(value: &Generic) -> Option<Self> {
        value.is_nil().then_some(())
    }
}

impl FromGeneric for bool {
    fn from_generic(value: &Generic) -> Option<Self> {
        match value.payload {
            Payload::Boolean(b) => Some(b),
            _ => None,
        }
    }
}

impl FromGeneric for i64 {
    fn from_generic(value: &Generic) -> Option<Self> {
        match value.payload {
            Payload::Integer(i) => Some(i),
            _ => None,
        }
    }
}

impl FromGeneric for i32 {
    fn from_generic(value: &Generic) -> Option<Self> {
        i64::from_generic(value).and_then(|i| i32::try_from(i).ok())
    }
}

impl FromGeneric for f64 {
    fn from_generic(value: &Generic) -> Option<Self> {
        match value.payload {
            Payload::Number(n) => Some(n),
            _ => None,
        }
    }
}

impl FromGeneric for String {
    fn from_generic(value: &Generic) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromGeneric for *mut c_void {
    fn from_generic(value: &Generic) -> Option<Self> {
        match value.payload {
            Payload::Pointer(p) => Some(p),
            _ => None,
        }
    }
}

// ===== 比较 =====

impl PartialEq for Generic {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Generic {}

impl PartialOrd for Generic {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Tag first, then payload
impl Ord for Generic {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag
            .cmp(&other.tag)
            .then_with(|| self.payload.compare(&other.payload))
    }
}

impl Hash for Generic {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag.hash(state);
        match &self.payload {
            Payload::Absent => {}
            Payload::Boolean(b) => b.hash(state),
            Payload::Integer(i) => i.hash(state),
            Payload::Number(n) => n.to_bits().hash(state),
            Payload::String(s) => s.hash(state),
            Payload::Pointer(p) => (*p as usize).hash(state),
        }
    }
}

impl fmt::Display for Generic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Boolean(b) => write!(f, "{b}"),
            Payload::Integer(i) => write!(f, "{i}"),
            Payload::Number(n) => write!(f, "{n:?}"),
            Payload::String(s) => f.write_str(s),
            _ => f.write_str(self.tag.as_str()),
        }
    }
}

// ===== 栈编解码 =====

impl Typed for Generic {
    const TYPE: Type = Type::None;

    fn matches(_tag: Type) -> bool {
        true
    }
}

impl Push for Generic {
    unsafe fn push(&self, state: *mut ffi::lua_State) {
        match &self.payload {
            Payload::Absent => ffi::lua_pushnil(state),
            Payload::Boolean(b) => b.push(state),
            Payload::Integer(i) => i.push(state),
            Payload::Number(n) => n.push(state),
            Payload::String(s) => s.push(state),
            Payload::Pointer(p) => p.push(state),
        }
    }

    fn tag(&self) -> Type {
        self.tag
    }

    fn is_valid_key(&self) -> bool {
        match &self.payload {
            Payload::Absent => false,
            Payload::Number(n) => !n.is_nan(),
            _ => true,
        }
    }
}

impl Read for Generic {
    unsafe fn read(state: *mut ffi::lua_State, index: c_int) -> Self {
        Generic::from_stack(state, index)
    }
}
