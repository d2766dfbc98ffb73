//! End-to-end dispatch through the bridge context

use charon_bridge::{
    BackendHint, Bridge, CallDescriptor, DispatchError, HostError, NativeFunction, TypeDescriptor,
    Value,
};
use std::os::raw::c_int;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

// Sentinel values make backend selection observable: native returns 100,
// host returns 200
extern "C" fn native_sentinel(_a: c_int, _b: c_int) -> c_int {
    100
}

static NATIVE_CALLS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn counting_native(a: c_int, b: c_int) -> c_int {
    NATIVE_CALLS.fetch_add(1, Ordering::SeqCst);
    a + b
}

fn sentinel_descriptor(symbol: &str) -> CallDescriptor {
    CallDescriptor::new(
        "",
        symbol,
        TypeDescriptor::Int32,
        vec![TypeDescriptor::Int32, TypeDescriptor::Int32],
    )
}

#[test]
fn auto_dispatch_prefers_native_backend() {
    let bridge = Bridge::new();
    bridge.operations().register_native("add", unsafe {
        NativeFunction::from_raw(native_sentinel as *const (), sentinel_descriptor("add"))
    });
    bridge.register_host("add", |_args: &[Value]| Ok(Value::Int(200)));

    let result = bridge
        .dispatch("add", &[Value::Int(2), Value::Int(3)], BackendHint::Auto)
        .unwrap();
    assert_eq!(result, Value::Int(100));
}

#[test]
fn explicit_host_hint_uses_host_backend() {
    let bridge = Bridge::new();
    bridge.operations().register_native("add", unsafe {
        NativeFunction::from_raw(native_sentinel as *const (), sentinel_descriptor("add"))
    });
    bridge.register_host("add", |_args: &[Value]| Ok(Value::Int(200)));

    let result = bridge
        .dispatch("add", &[Value::Int(2), Value::Int(3)], BackendHint::Host)
        .unwrap();
    assert_eq!(result, Value::Int(200));
}

#[test]
fn explicit_hint_isolation() {
    let bridge = Bridge::new();
    bridge.operations().register_native("mul", unsafe {
        NativeFunction::from_raw(native_sentinel as *const (), sentinel_descriptor("mul"))
    });

    // Only a native registration exists; a Host hint must not silently
    // execute the native path
    let result = bridge.dispatch("mul", &[Value::Int(2), Value::Int(3)], BackendHint::Host);
    assert!(matches!(result, Err(DispatchError::NotFound { .. })));
}

#[test]
fn failed_conversion_never_reaches_native_code() {
    let bridge = Bridge::new();
    bridge.operations().register_native("sum", unsafe {
        NativeFunction::from_raw(counting_native as *const (), sentinel_descriptor("sum"))
    });

    let before = NATIVE_CALLS.load(Ordering::SeqCst);
    let result = bridge.dispatch(
        "sum",
        &[Value::Int(1), Value::string("not a number")],
        BackendHint::Native,
    );
    assert!(matches!(result, Err(DispatchError::Call(_))));
    assert_eq!(NATIVE_CALLS.load(Ordering::SeqCst), before);

    // The same operation still works with convertible arguments
    let result = bridge
        .dispatch("sum", &[Value::Int(1), Value::Int(2)], BackendHint::Native)
        .unwrap();
    assert_eq!(result, Value::Int(3));
    assert_eq!(NATIVE_CALLS.load(Ordering::SeqCst), before + 1);
}

#[test]
fn host_domain_errors_surface_unchanged() {
    let bridge = Bridge::new();
    bridge.register_host("div", |args: &[Value]| match (&args[0], &args[1]) {
        (Value::Int(_), Value::Int(0)) => Err(HostError::DivideByZero),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a / b)),
        _ => Err(HostError::Type("div expects ints".into())),
    });

    let ok = bridge
        .dispatch("div", &[Value::Int(10), Value::Int(2)], BackendHint::Auto)
        .unwrap();
    assert_eq!(ok, Value::Int(5));

    let err = bridge.dispatch("div", &[Value::Int(1), Value::Int(0)], BackendHint::Auto);
    assert!(matches!(
        err,
        Err(DispatchError::Host(HostError::DivideByZero))
    ));
}

#[test]
fn standard_host_operations_as_fallback_set() {
    // The embedder-facing arithmetic set, registered host-side the way
    // an interpreter would seed its fallbacks
    let bridge = Bridge::new();
    bridge.register_host("add", |args: &[Value]| binary_int(args, |a, b| a + b));
    bridge.register_host("sub", |args: &[Value]| binary_int(args, |a, b| a - b));
    bridge.register_host("mul", |args: &[Value]| binary_int(args, |a, b| a * b));

    for (op, expected) in [("add", 30), ("sub", -10), ("mul", 200)] {
        let result = bridge
            .dispatch(op, &[Value::Int(10), Value::Int(20)], BackendHint::Auto)
            .unwrap();
        assert_eq!(result, Value::Int(expected));
    }
}

fn binary_int(args: &[Value], f: impl Fn(i64, i64) -> i64) -> Result<Value, HostError> {
    match (args.first(), args.get(1)) {
        (Some(Value::Int(a)), Some(Value::Int(b))) => Ok(Value::Int(f(*a, *b))),
        _ => Err(HostError::Type("expected two ints".into())),
    }
}

fn find_system_math_library() -> Option<&'static str> {
    const CANDIDATES: &[&str] = &[
        "/lib/x86_64-linux-gnu/libm.so.6",
        "/usr/lib/x86_64-linux-gnu/libm.so.6",
        "/lib/aarch64-linux-gnu/libm.so.6",
        "/usr/lib/aarch64-linux-gnu/libm.so.6",
        "/usr/lib64/libm.so.6",
        "/usr/lib/libm.so.6",
        "/usr/lib/libSystem.B.dylib",
    ];
    CANDIDATES.iter().copied().find(|p| Path::new(p).exists())
}

#[test]
fn manifest_operation_dispatches_through_real_library() {
    let Some(lib) = find_system_math_library() else {
        eprintln!("no known system math library present, skipping test");
        return;
    };

    let bridge = Bridge::new();
    let manifest = format!(
        r#"[{{
            "opName": "cosine",
            "libraryPath": "{}",
            "symbolName": "cos",
            "returnType": "double",
            "argTypes": ["double"]
        }}]"#,
        lib
    );
    assert_eq!(bridge.register_manifest_json(&manifest).unwrap(), 1);
    assert!(bridge.has("cosine", BackendHint::Native));

    let result = bridge
        .dispatch("cosine", &[Value::Float(0.0)], BackendHint::Auto)
        .unwrap();
    let Value::Float(x) = result else {
        panic!("expected float result");
    };
    assert!((x - 1.0).abs() < 1e-12);
}

#[test]
fn bridge_from_settings_registers_configured_manifests() {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join("ops.json");
    std::fs::write(
        &manifest_path,
        r#"[{
            "opName": "square",
            "libraryPath": "libvecmath.so",
            "symbolName": "square",
            "returnType": "double",
            "argTypes": ["double"]
        }]"#,
    )
    .unwrap();

    let settings = charon_config::BridgeSettings {
        search_paths: vec![dir.path().to_path_buf()],
        manifest_paths: vec![manifest_path],
    };

    let bridge = Bridge::with_settings(&settings).unwrap();
    assert!(bridge.has("square", BackendHint::Native));
    assert!(!bridge.has("square", BackendHint::Host));
}

#[test]
fn dispatch_calls_are_independent() {
    let bridge = Bridge::new();
    bridge.register_host("echo", |args: &[Value]| {
        Ok(args.first().cloned().unwrap_or(Value::Null))
    });

    for i in 0..10 {
        let result = bridge
            .dispatch("echo", &[Value::Int(i)], BackendHint::Auto)
            .unwrap();
        assert_eq!(result, Value::Int(i));
    }
}
