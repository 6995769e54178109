//! Dynamic type tags and library / hook bit sets

use std::ffi::c_int;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use mlua_sys as ffi;

/// Dynamic type tag of a value on the stack or inside a table.
///
/// Declaration order is the total order used to compare
/// [`Generic`](crate::Generic) values of different tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Type {
    None = -1,
    Nil = 0,
    Boolean = 1,
    LightUserData = 2,
    Number = 3,
    String = 4,
    Table = 5,
    Function = 6,
    UserData = 7,
    Thread = 8,
}

impl Type {
    /// Convert an engine type code (`LUA_T*`).
    pub fn from_raw(code: c_int) -> Self {
        match code {
            ffi::LUA_TNIL => Type::Nil,
            ffi::LUA_TBOOLEAN => Type::Boolean,
            ffi::LUA_TLIGHTUSERDATA => Type::LightUserData,
            ffi::LUA_TNUMBER => Type::Number,
            ffi::LUA_TSTRING => Type::String,
            ffi::LUA_TTABLE => Type::Table,
            ffi::LUA_TFUNCTION => Type::Function,
            ffi::LUA_TUSERDATA => Type::UserData,
            ffi::LUA_TTHREAD => Type::Thread,
            _ => Type::None,
        }
    }

    /// Canonical name of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Type::None => "none",
            Type::Nil => "nil",
            Type::Boolean => "boolean",
            Type::LightUserData => "lightuserdata",
            Type::Number => "number",
            Type::String => "string",
            Type::Table => "table",
            Type::Function => "function",
            Type::UserData => "userdata",
            Type::Thread => "thread",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of standard library groups to open in a fresh engine instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Library(u32);

impl Library {
    pub const NONE: Library = Library(0);
    pub const BASE: Library = Library(1 << 0);
    pub const PACKAGE: Library = Library(1 << 1);
    pub const COROUTINE: Library = Library(1 << 2);
    pub const TABLE: Library = Library(1 << 3);
    pub const IO: Library = Library(1 << 4);
    pub const OS: Library = Library(1 << 5);
    pub const STRING: Library = Library(1 << 6);
    pub const MATH: Library = Library(1 << 7);
    pub const UTF8: Library = Library(1 << 8);
    pub const DEBUG: Library = Library(1 << 9);
    pub const ALL: Library = Library(u32::MAX);

    /// Number of individual library groups
    pub const COUNT: usize = 10;

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Library(bits)
    }

    pub const fn contains(self, other: Library) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Library) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Library {
    type Output = Library;

    fn bitor(self, rhs: Library) -> Library {
        Library(self.0 | rhs.0)
    }
}

impl BitOrAssign for Library {
    fn bitor_assign(&mut self, rhs: Library) {
        self.0 |= rhs.0;
    }
}

impl From<luabridge_config::LibraryName> for Library {
    fn from(name: luabridge_config::LibraryName) -> Self {
        use luabridge_config::LibraryName;
        match name {
            LibraryName::Base => Library::BASE,
            LibraryName::Package => Library::PACKAGE,
            LibraryName::Coroutine => Library::COROUTINE,
            LibraryName::Table => Library::TABLE,
            LibraryName::Io => Library::IO,
            LibraryName::Os => Library::OS,
            LibraryName::String => Library::STRING,
            LibraryName::Math => Library::MATH,
            LibraryName::Utf8 => Library::UTF8,
            LibraryName::Debug => Library::DEBUG,
            LibraryName::All => Library::ALL,
        }
    }
}

impl FromIterator<luabridge_config::LibraryName> for Library {
    fn from_iter<I: IntoIterator<Item = luabridge_config::LibraryName>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Library::NONE, |set, name| set | Library::from(name))
    }
}

/// Events a debug hook is interested in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct HookMask(c_int);

impl HookMask {
    pub const NONE: HookMask = HookMask(0);
    pub const CALL: HookMask = HookMask(ffi::LUA_MASKCALL);
    pub const RETURN: HookMask = HookMask(ffi::LUA_MASKRET);
    pub const LINE: HookMask = HookMask(ffi::LUA_MASKLINE);
    pub const COUNT: HookMask = HookMask(ffi::LUA_MASKCOUNT);

    pub const fn bits(self) -> c_int {
        self.0
    }

    pub const fn contains(self, other: HookMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for HookMask {
    type Output = HookMask;

    fn bitor(self, rhs: HookMask) -> HookMask {
        HookMask(self.0 | rhs.0)
    }
}

/// Fixed metatable key names understood by the engine
pub mod metamethod {
    /// addition operator (+)
    pub const ADD: &str = "__add";
    /// subtraction operator (-)
    pub const SUB: &str = "__sub";
    /// multiplication operator (*)
    pub const MUL: &str = "__mul";
    /// division operator (/)
    pub const DIV: &str = "__div";
    /// modulo operator (%)
    pub const MOD: &str = "__mod";
    /// power operator (^)
    pub const POW: &str = "__pow";
    /// unary minus operator (-)
    pub const UNM: &str = "__unm";
    /// floor division operator (//)
    pub const IDIV: &str = "__idiv";
    pub const BAND: &str = "__band";
    pub const BOR: &str = "__bor";
    pub const BXOR: &str = "__bxor";
    pub const BNOT: &str = "__bnot";
    pub const SHL: &str = "__shl";
    pub const SHR: &str = "__shr";
    /// concatenation operator (..)
    pub const CONCAT: &str = "__concat";
    /// length operator (#)
    pub const LEN: &str = "__len";
    pub const EQ: &str = "__eq";
    pub const LT: &str = "__lt";
    pub const LE: &str = "__le";
    pub const INDEX: &str = "__index";
    pub const NEWINDEX: &str = "__newindex";
    pub const CALL: &str = "__call";

    /// weak table mode marker
    pub const MODE: &str = "__mode";
    /// finalizer, run by the collector
    pub const GC: &str = "__gc";
    pub const TOSTRING: &str = "__tostring";
    /// display name of the metatable
    pub const NAME: &str = "__name";
    pub const CLOSE: &str = "__close";
}
