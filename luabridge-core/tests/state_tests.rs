//! 引擎句柄测试
//!
//! 脚本执行、全局变量、函数调用与标准库加载

mod common;

use std::collections::BTreeMap;
use std::ffi::c_int;

use common::{balanced, new_state, run};
use luabridge_core::{
    ffi, EngineConfig, Error, ErrorCode, Generic, Library, LibraryName, NativeFunction, Ownership,
    State, Type, TypeMismatch,
};

// ===== 脚本执行 =====

#[test]
fn test_execute_ok() {
    let state = new_state();
    balanced(&state, |s| assert_eq!(s.execute("x = 1 + 2"), ErrorCode::Ok));
    assert_eq!(state.read_variable::<i32>("x"), Ok(3));
    assert!(state.errors().is_empty());
}

#[test]
fn test_execute_syntax_error() {
    let state = new_state();
    let code = balanced(&state, |s| s.execute("x = = 1"));
    assert_eq!(code, ErrorCode::SyntaxError);
    assert_eq!(state.errors().len(), 1);
    assert!(state.errors()[0].starts_with("LUA_Script:1:"));
}

#[test]
fn test_execute_runtime_error() {
    let state = new_state();
    let code = balanced(&state, |s| s.execute("error('boom')"));
    assert_eq!(code, ErrorCode::RuntimeError);
    assert!(state.last_error().unwrap().contains("boom"));

    state.clear_errors();
    assert!(state.errors().is_empty());
}

#[test]
fn test_execute_named_chunk() {
    let state = new_state();
    assert_eq!(state.execute_named("config", "error('bad')"), ErrorCode::RuntimeError);
    assert!(state.last_error().unwrap().starts_with("config:1:"));
}

#[test]
fn test_non_string_error_object() {
    let state = new_state();
    assert_eq!(state.execute("error({})"), ErrorCode::RuntimeError);
    assert_eq!(
        state.last_error().as_deref(),
        Some("(error object is a table value)")
    );
    assert_eq!(state.stack_size(), 0);
}

#[test]
fn test_load_script_into_global() {
    let state = new_state();
    balanced(&state, |s| {
        assert_eq!(s.load_script_into_global("bump", "n = (n or 0) + 1"), ErrorCode::Ok)
    });
    assert_eq!(state.read_variable::<i32>("n").ok(), None);
    run(&state, "bump() bump()");
    assert_eq!(state.read_variable::<i32>("n"), Ok(2));
}

#[test]
fn test_execute_script_from_registry() {
    let state = new_state();
    assert_eq!(state.load_script("counter", "hits = (hits or 0) + 1"), ErrorCode::Ok);
    balanced(&state, |s| {
        assert_eq!(s.execute_script("counter"), ErrorCode::Ok);
        assert_eq!(s.execute_script("counter"), ErrorCode::Ok);
    });
    assert_eq!(state.read_variable::<i32>("hits"), Ok(2));
    assert_eq!(state.execute_script("unknown"), ErrorCode::RuntimeError);
    assert_eq!(state.stack_size(), 0);
}

// ===== 全局变量 =====

#[test]
fn test_read_variable_types() {
    let state = new_state();
    run(&state, "b = true; i = 42; f = 2.5; s = 'text'; t = {}");
    balanced(&state, |s| {
        assert_eq!(s.read_variable::<bool>("b"), Ok(true));
        assert_eq!(s.read_variable::<i64>("i"), Ok(42));
        assert_eq!(s.read_variable::<f64>("f"), Ok(2.5));
        assert_eq!(s.read_variable::<String>("s"), Ok("text".to_string()));
        assert_eq!(s.read_variable::<Generic>("t").map(|g| g.tag()), Ok(Type::Table));
    });
}

#[test]
fn test_read_variable_mismatch() {
    let state = new_state();
    run(&state, "s = 'text'");
    let err = balanced(&state, |s| s.read_variable::<i32>("s")).unwrap_err();
    assert_eq!(err, Error::TypeMismatch(TypeMismatch::new(Type::Number, Type::String)));
    let err = balanced(&state, |s| s.read_variable::<bool>("missing")).unwrap_err();
    assert_eq!(err, Error::TypeMismatch(TypeMismatch::new(Type::Boolean, Type::Nil)));
}

#[test]
fn test_integer_reads_are_exact() {
    let state = new_state();
    run(&state, "whole = 3.0; frac = 2.5; big = 2^40; huge = 1 << 40");
    balanced(&state, |s| {
        assert_eq!(s.read_variable::<i32>("whole"), Ok(3));
        assert_eq!(
            s.read_variable::<i32>("frac"),
            Err(Error::TypeMismatch(TypeMismatch::new(Type::Number, Type::Number)))
        );
        assert!(s.read_variable::<i32>("big").is_err());
        assert_eq!(s.read_variable::<i64>("big"), Ok(1 << 40));
        assert!(s.read_variable::<u16>("huge").is_err());
        assert_eq!(s.read_variable::<u64>("huge"), Ok(1 << 40));
        assert_eq!(s.read_variable::<f64>("frac"), Ok(2.5));
    });
}

#[test]
fn test_unsigned_above_i64_max_wraps() {
    let state = new_state();
    state.write_variable("u", u64::MAX).unwrap();
    run(&state, "negative = u < 0; same = u == -1");
    assert_eq!(state.read_variable::<bool>("negative"), Ok(true));
    assert_eq!(state.read_variable::<bool>("same"), Ok(true));
    assert_eq!(state.read_variable::<i64>("u"), Ok(-1));
    assert!(state.read_variable::<u64>("u").is_err());
    assert_eq!(state.read_variable::<Option<u64>>("unset"), Ok(None));
    assert_eq!(state.stack_size(), 0);
}

#[test]
fn test_write_variable() {
    let state = new_state();
    balanced(&state, |s| {
        s.write_variable("name", "lua").unwrap();
        s.write_variable("count", 7u32).unwrap();
        s.write_variable("ratio", 0.25).unwrap();
        s.write_variable("enabled", false).unwrap();
    });
    run(
        &state,
        "assert(name == 'lua' and count == 7 and ratio == 0.25 and enabled == false)",
    );
}

#[test]
fn test_invalid_global_name() {
    let state = new_state();
    assert_eq!(
        state.write_variable("bad\0name", 1),
        Err(Error::InvalidName("bad\0name".to_string()))
    );
    assert_eq!(state.execute_function("bad\0name", (), 0), ErrorCode::RuntimeError);
    assert_eq!(state.stack_size(), 0);
}

#[test]
fn test_push_and_set_global() {
    let state = new_state();
    run(&state, "source = 'value'");
    assert_eq!(state.push_global("source"), Ok(Type::String));
    state.set_global_from_stack("copy").unwrap();
    assert_eq!(state.stack_size(), 0);
    assert_eq!(state.read_variable::<String>("copy"), Ok("value".to_string()));
}

// ===== 栈 =====

#[test]
fn test_stack_snapshot() {
    let state = new_state();
    state.push(1);
    state.push(2.5);
    state.push("three");
    state.push(());
    let stack = state.stack();
    assert_eq!(
        stack,
        vec![
            Generic::from(1),
            Generic::from(2.5),
            Generic::from("three"),
            Generic::nil()
        ]
    );
    assert!(stack[0].is_integer());
    assert_eq!(state.stack_size(), 4);
    state.pop(4);
}

#[test]
fn test_light_pointer_snapshot() {
    let state = new_state();
    let mut target = 7_u32;
    let pointer = std::ptr::addr_of_mut!(target).cast::<std::ffi::c_void>();
    state.push(pointer);
    let snapshot = unsafe { Generic::from_stack(state.as_ptr(), -1) };
    assert_eq!(snapshot.tag(), Type::LightUserData);
    assert_eq!(snapshot.get::<*mut std::ffi::c_void>(), Ok(pointer));
    assert_eq!(snapshot, Generic::from(pointer));
    state.pop(1);
}

#[test]
fn test_native_type_predicates() {
    let state = new_state();
    state.push(10);
    state.push("12");
    assert!(state.is_of_type(Type::String, 1));
    assert!(state.is_of_type(Type::Number, 2));
    assert_eq!(state.get_type(1), Type::Number);
    assert_eq!(state.get_type(2), Type::String);
    assert_eq!(state.get_type(3), Type::None);
    state.pop(2);
}

// ===== 函数调用 =====

#[test]
fn test_execute_function_with_tuple() {
    let state = new_state();
    run(&state, "function add(a, b) return a + b end");
    assert_eq!(state.execute_function("add", (2, 3), 1), ErrorCode::Ok);
    assert_eq!(state.stack_size(), 1);
    assert_eq!(state.stack_value::<i32>(-1), 5);
    state.pop(1);
}

#[test]
fn test_execute_function_with_generic_slice() {
    let state = new_state();
    run(&state, "function join(...) return table.concat({...}, ',') end");
    let args = vec![Generic::from(1), Generic::from("b"), Generic::from(2.5)];
    assert_eq!(state.execute_function("join", &args, 1), ErrorCode::Ok);
    assert_eq!(state.stack_value::<String>(-1), "1,b,2.5");
    state.pop(1);
}

#[test]
fn test_execute_missing_function() {
    let state = new_state();
    let code = balanced(&state, |s| s.execute_function("nothing", (), 0));
    assert_eq!(code, ErrorCode::RuntimeError);
    assert!(state.last_error().unwrap().contains("nothing"));
}

#[test]
fn test_execute_function_error() {
    let state = new_state();
    run(&state, "function fail() error('nope') end");
    let code = balanced(&state, |s| s.execute_function("fail", (), 0));
    assert_eq!(code, ErrorCode::RuntimeError);
    assert!(state.last_error().unwrap().contains("nope"));
}

#[test]
fn test_call_function_typed_result() {
    let state = new_state();
    run(&state, "function greet(name) return 'hi ' .. name end");
    let greeting = balanced(&state, |s| s.call_function::<String, _>("greet", ("lua",)));
    assert_eq!(greeting, Ok("hi lua".to_string()));

    let err = balanced(&state, |s| s.call_function::<bool, _>("greet", ("lua",))).unwrap_err();
    assert_eq!(err, Error::TypeMismatch(TypeMismatch::new(Type::Boolean, Type::String)));

    let err = balanced(&state, |s| s.call_function::<i32, _>("missing", ())).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::RuntimeError));
}

// ===== 原生函数 =====

unsafe extern "C-unwind" fn native_add(l: *mut ffi::lua_State) -> c_int {
    let a = ffi::lua_tointegerx(l, 1, std::ptr::null_mut());
    let b = ffi::lua_tointegerx(l, 2, std::ptr::null_mut());
    ffi::lua_pushinteger(l, a + b);
    1
}

unsafe extern "C-unwind" fn scaled(l: *mut ffi::lua_State) -> c_int {
    let Some(state) = State::from_raw(l) else {
        return 0;
    };
    let factor: i64 = state.upvalue(1);
    let label: String = state.upvalue(2);
    let value = state.argument::<i64>(1).unwrap_or(0);
    state.set_return_values((value * factor, label))
}

unsafe extern "C-unwind" fn quiet_print(l: *mut ffi::lua_State) -> c_int {
    ffi::lua_pushboolean(l, 1);
    ffi::lua_setglobal(l, c"printed".as_ptr());
    0
}

#[test]
fn test_register_native_function() {
    let state = new_state();
    balanced(&state, |s| {
        s.register_native_function("add", native_add as NativeFunction)
            .unwrap()
    });
    run(&state, "result = add(40, 2)");
    assert_eq!(state.read_variable::<i32>("result"), Ok(42));
}

#[test]
fn test_native_function_with_upvalues() {
    let state = new_state();
    let upvalues = [Generic::from(3), Generic::from("tripled")];
    balanced(&state, |s| {
        s.register_native_function_with_upvalues("scale", scaled as NativeFunction, &upvalues)
            .unwrap()
    });
    run(&state, "value, label = scale(5)");
    assert_eq!(state.read_variable::<i32>("value"), Ok(15));
    assert_eq!(state.read_variable::<String>("label"), Ok("tripled".to_string()));
}

#[test]
fn test_too_many_upvalues() {
    let state = new_state();
    let upvalues = vec![Generic::from(0); 256];
    let err = state
        .register_native_function_with_upvalues("f", native_add as NativeFunction, &upvalues)
        .unwrap_err();
    assert_eq!(err, Error::TooManyUpvalues(256));
    assert_eq!(state.stack_size(), 0);
}

#[test]
fn test_override_function() {
    let state = new_state();
    balanced(&state, |s| {
        s.override_function("print", quiet_print as NativeFunction)
            .unwrap()
    });
    run(&state, "print('hidden')");
    assert_eq!(state.read_variable::<bool>("printed"), Ok(true));
}

// ===== 表 =====

#[test]
fn test_write_and_read_table() {
    let state = new_state();
    let mut scores = BTreeMap::new();
    scores.insert("alice".to_string(), 3);
    scores.insert("bob".to_string(), 5);
    balanced(&state, |s| s.write_table("scores", &scores).unwrap());
    run(&state, "assert(scores.alice == 3 and scores.bob == 5)");

    let read = balanced(&state, |s| s.read_table::<String, i32>("scores")).unwrap();
    assert_eq!(read, scores);
}

#[test]
fn test_read_missing_table_is_empty() {
    let state = new_state();
    let read = balanced(&state, |s| s.read_table::<String, i32>("nothing")).unwrap();
    assert!(read.is_empty());
}

#[test]
fn test_with_table_do_create() {
    let state = new_state();
    let missing = balanced(&state, |s| s.with_table_do("config", false, |_| ())).unwrap();
    assert_eq!(missing, None);

    balanced(&state, |s| {
        s.with_table_do("config", true, |table| table.set("depth", 3).unwrap())
            .unwrap()
    });
    run(&state, "assert(config.depth == 3)");
}

#[test]
fn test_with_table_at() {
    let state = new_state();
    run(&state, "function make() return { 1, 2, 3 } end");
    assert_eq!(state.execute_function("make", (), 1), ErrorCode::Ok);
    assert_eq!(state.with_table_at(-1, |table| table.len()), Some(3));
    state.push(1);
    assert_eq!(state.with_table_at(-1, |table| table.len()), None);
    state.pop(2);
}

#[test]
fn test_create_table_on_stack() {
    let state = new_state();
    state
        .create_table(None, |table| table.set("k", "v").unwrap())
        .unwrap();
    assert_eq!(state.stack_size(), 1);
    state.set_global_from_stack("made").unwrap();
    run(&state, "assert(made.k == 'v')");
}

#[test]
fn test_metatable_on_stack_value() {
    let state = new_state();
    state
        .create_metatable("Named", |meta| {
            meta.set("__name", "Named").unwrap();
        })
        .unwrap();
    state.create_table(None, |_| ()).unwrap();
    assert!(state.assign_metatable("Named"));
    assert!(!state.assign_metatable("Missing"));
    assert_eq!(state.stack_size(), 1);
    state.set_global_from_stack("obj").unwrap();
    run(&state, "assert(getmetatable(obj).__name == 'Named')");
}

// ===== 标准库 =====

#[test]
fn test_selective_libraries() {
    let state = State::new(Library::BASE).unwrap();
    run(&state, "has_string = string ~= nil");
    assert_eq!(state.read_variable::<bool>("has_string"), Ok(false));

    state.open_library(Library::STRING | Library::MATH);
    run(&state, "assert(string.upper('a') == 'A' and math.max(1, 2) == 2)");
    assert_eq!(state.stack_size(), 0);
}

#[test]
fn test_with_config() {
    let config = EngineConfig {
        libraries: vec![LibraryName::Base, LibraryName::Table],
        ..EngineConfig::default()
    };
    let state = State::with_config(&config).unwrap();
    run(&state, "assert(table.concat ~= nil and io == nil)");
}

// ===== 所有权 =====

#[test]
fn test_borrowed_handle_does_not_close() {
    let owner = new_state();
    {
        let borrowed = unsafe { State::from_raw(owner.as_ptr()) }.unwrap();
        assert_eq!(borrowed.ownership(), Ownership::Borrowed);
        borrowed.write_variable("shared", 9).unwrap();
    }
    assert_eq!(owner.ownership(), Ownership::Owned);
    assert_eq!(owner.read_variable::<i32>("shared"), Ok(9));
    assert!(unsafe { State::from_raw(std::ptr::null_mut()) }.is_none());
}
