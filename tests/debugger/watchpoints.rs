use crate::common::{addr, frame, routine, target, tid};
use taskstalker::debugger::breakpoint::BreakletKind;
use taskstalker::debugger::debugee::{Value, ValueKind};
use taskstalker::debugger::error::Error;
use taskstalker::debugger::watchpoint::WatchType;

fn scalar(address: usize, size: u64, type_name: &str) -> Value {
    Value {
        kind: ValueKind::Scalar,
        addr: address,
        synthetic: false,
        type_name: Some(type_name.to_string()),
        size: Some(size),
        unreadable: None,
    }
}

/// A debugee with one routine on thread 10 and the runtime stack mover
/// known to the debug info.
fn watch_env() -> (taskstalker::debugger::Target, crate::common::TestEnv) {
    let (target, env) = target();
    env.expl.set_routine(10, routine(1, 0x7000, 0x8000));
    env.expl
        .set_frames(10, vec![frame(Some("main.run"), Some(0x4040), 16)]);
    env.info.add_function("runtime.copystack", 0xc000);
    (target, env)
}

#[test]
fn test_watch_requires_access_bits() {
    let (mut target, _env) = watch_env();
    let err = target
        .set_watchpoint(1, tid(10), "global", WatchType::NONE, None)
        .unwrap_err();
    assert!(matches!(err, Error::WatchAccessRequired));
}

#[test]
fn test_watch_global_variable() {
    let (mut target, env) = watch_env();
    // the variable lives outside the routine stack
    env.expl.set_var("global", scalar(0x9000, 8, "uint64"));

    let wp = target
        .set_watchpoint(1, tid(10), "global", WatchType::WRITE, None)
        .unwrap();
    assert_eq!(wp, addr(0x9000));

    let brkpt = target.breakpoint_at(wp).unwrap();
    assert!(brkpt.watch_type.watching());
    assert!(brkpt.watch_type.write() && !brkpt.watch_type.read());
    assert_eq!(brkpt.watch_type.size(), 8);
    assert_eq!(brkpt.watch_expr.as_deref(), Some("global"));
    assert_eq!(brkpt.hw_index, 0);
    assert!(target.has_hw_breakpoints());
    assert_eq!(env.proc.0.borrow().hw_slots.get(&0), Some(&0x9000));

    // no stack watch: no sentinels, a single physical in the map
    assert_eq!(target.breakpoints().all().count(), 1);

    // reads of globals are allowed
    target.clear_breakpoint(wp).unwrap();
    env.expl.set_var("global", scalar(0x9000, 8, "uint64"));
    target
        .set_watchpoint(1, tid(10), "global", WatchType::READ_WRITE, None)
        .unwrap();
}

#[test]
fn test_watch_vetting_rules() {
    let (mut target, env) = watch_env();

    // no address
    env.expl.set_var("temp", Value {
        addr: 0,
        ..scalar(0, 8, "int")
    });
    let err = target
        .set_watchpoint(1, tid(10), "temp", WatchType::WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::WatchUnwatchable(_)));

    // synthetic address
    env.expl.set_var("reg", Value {
        synthetic: true,
        ..scalar(0x9000, 8, "int")
    });
    let err = target
        .set_watchpoint(1, tid(10), "reg", WatchType::WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::WatchUnwatchable(_)));

    // unknown type
    env.expl.set_var("untyped", Value {
        type_name: None,
        ..scalar(0x9000, 8, "int")
    });
    let err = target
        .set_watchpoint(1, tid(10), "untyped", WatchType::WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::WatchUnwatchable(_)));

    // unreadable value
    env.expl.set_var("dark", Value {
        unreadable: Some("page not mapped".to_string()),
        ..scalar(0x9000, 8, "int")
    });
    let err = target
        .set_watchpoint(1, tid(10), "dark", WatchType::WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::WatchUnreadable(_, _)));

    // pointer-alike kinds
    env.expl.set_var("raw", Value {
        kind: ValueKind::UnsafePointer,
        ..scalar(0x9000, 8, "unsafe pointer")
    });
    let err = target
        .set_watchpoint(1, tid(10), "raw", WatchType::WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::WatchUnsupportedType(_)));

    // size over the pointer size
    env.expl.set_var("big", scalar(0x9000, 16, "struct pair"));
    let err = target
        .set_watchpoint(1, tid(10), "big", WatchType::WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::WatchUnsupportedType(descr) if descr == "struct pair"));

    // nothing was committed by the failed attempts
    assert_eq!(target.breakpoints().all().count(), 0);
    assert!(env.proc.0.borrow().hw_slots.is_empty());
}

#[test]
fn test_watch_interface_retargets_to_data() {
    let (mut target, env) = watch_env();
    let data = scalar(0x9100, 8, "point");
    env.expl.set_var(
        "iface",
        Value {
            kind: ValueKind::Interface {
                data: Some(Box::new(data)),
            },
            ..scalar(0x9000, 16, "shape")
        },
    );

    let wp = target
        .set_watchpoint(1, tid(10), "iface", WatchType::WRITE, None)
        .unwrap();
    // the watchpoint lands on the interface data pointer
    assert_eq!(wp, addr(0x9100));
    let brkpt = target.breakpoint_at(wp).unwrap();
    assert_eq!(brkpt.watch_expr.as_deref(), Some("iface (interface data)"));

    // an interface without data is rejected
    env.expl.set_var(
        "empty",
        Value {
            kind: ValueKind::Interface { data: None },
            ..scalar(0x9000, 16, "shape")
        },
    );
    let err = target
        .set_watchpoint(2, tid(10), "empty", WatchType::WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInterface(_)));
}

#[test]
fn test_stack_watch_rejects_reads() {
    let (mut target, env) = watch_env();
    // 0x7800 lies inside the routine stack [0x7000, 0x8000)
    env.expl.set_var("local", scalar(0x7800, 8, "int"));

    let err = target
        .set_watchpoint(1, tid(10), "local", WatchType::READ_WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::WatchStackRead));
    let err = target
        .set_watchpoint(1, tid(10), "local", WatchType::READ, None)
        .unwrap_err();
    assert!(matches!(err, Error::WatchStackRead));

    // a routine parked on a system stack is not a stack watch
    env.expl
        .set_routine(10, taskstalker::debugger::debugee::Routine {
            system_stack: true,
            ..routine(1, 0x7000, 0x8000)
        });
    target
        .set_watchpoint(1, tid(10), "local", WatchType::READ_WRITE, None)
        .unwrap();
}

#[test]
fn test_stack_watch_lifecycle() {
    let (mut target, env) = watch_env();
    env.expl.set_var("local", scalar(0x7800, 8, "int"));

    let wp = target
        .set_watchpoint(1, tid(10), "local", WatchType::WRITE, None)
        .unwrap();
    assert_eq!(wp, addr(0x7800));

    // the watchpoint itself plus the out-of-scope and stack-resize
    // sentinels
    assert_eq!(target.breakpoints().all().count(), 3);
    let out_of_scope = target.guarded_watchpoints_at(addr(0x4040), BreakletKind::WatchOutOfScope);
    assert_eq!(out_of_scope, vec![wp]);
    let resize = target.guarded_watchpoints_at(addr(0xc000), BreakletKind::StackResize);
    assert_eq!(resize, vec![wp]);
    assert!(target.logical_breakpoint(1).is_some());
    assert_eq!(env.proc.0.borrow().hw_slots.len(), 1);

    // the routine returns past the watched frame: the sentinel fires
    let state = target.check_condition(tid(10), addr(0x4040));
    assert!(state.active);
    assert!(!state.stepping);

    // the coordinator retires every watchpoint guarded by that sentinel
    for wp in target.guarded_watchpoints_at(addr(0x4040), BreakletKind::WatchOutOfScope) {
        target.expire_watchpoint(wp);
    }

    assert_eq!(target.breakpoints().all().count(), 0);
    assert!(env.proc.0.borrow().hw_slots.is_empty());
    assert!(env.proc.0.borrow().patched.is_empty());
    // the watch-expression logical dies with its physical
    assert!(target.logical_breakpoint(1).is_none());

    let expired = target.drain_watch_out_of_scope();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].watch_expr.as_deref(), Some("local"));
    assert!(target.drain_watch_out_of_scope().is_empty());
}

#[test]
fn test_stack_watch_panic_sentinel() {
    let (mut target, env) = watch_env();
    env.info.add_function("runtime.gopanic", 0xb000);
    env.expl.set_var("local", scalar(0x7800, 8, "int"));

    let wp = target
        .set_watchpoint(1, tid(10), "local", WatchType::WRITE, None)
        .unwrap();
    // watchpoint + return sentinel + panic sentinel + resize sentinel
    assert_eq!(target.breakpoints().all().count(), 4);

    // outside a panic chain the panic-path sentinel stays quiet
    env.expl.set_frames(
        10,
        vec![
            frame(Some("main.cleanup"), None, 0),
            frame(Some("main.run"), None, 0),
        ],
    );
    assert!(!target.check_condition(tid(10), addr(0xb000)).active);

    // inside one it fires
    env.expl.set_frames(
        10,
        vec![
            frame(Some("main.cleanup"), None, 0),
            frame(Some("runtime.gopanic"), None, 0),
        ],
    );
    assert!(target.check_condition(tid(10), addr(0xb000)).active);
    assert_eq!(
        target.guarded_watchpoints_at(addr(0xb000), BreakletKind::WatchOutOfScope),
        vec![wp]
    );
}

#[test]
fn test_clear_stack_watch_removes_sentinels() {
    let (mut target, env) = watch_env();
    env.expl.set_var("local", scalar(0x7800, 8, "int"));
    let wp = target
        .set_watchpoint(1, tid(10), "local", WatchType::WRITE, None)
        .unwrap();
    assert_eq!(target.breakpoints().all().count(), 3);

    target.clear_breakpoint(wp).unwrap();
    assert_eq!(target.breakpoints().all().count(), 0);
    assert!(env.proc.0.borrow().hw_slots.is_empty());
    // a plain clear is not an out-of-scope event
    assert!(target.drain_watch_out_of_scope().is_empty());
}

#[test]
fn test_hw_slot_allocation() {
    let (mut target, env) = watch_env();
    for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
        env.expl
            .set_var(name, scalar(0x9000 + i * 8, 8, "uint64"));
        let wp = target
            .set_watchpoint(i as i32 + 1, tid(10), name, WatchType::WRITE, None)
            .unwrap();
        assert_eq!(target.breakpoint_at(wp).unwrap().hw_index, i as u8);
    }

    // the architecture offers four debug slots
    env.expl.set_var("e", scalar(0xa000, 8, "uint64"));
    let err = target
        .set_watchpoint(5, tid(10), "e", WatchType::WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::WatchpointLimitReached));

    // releasing a slot in the middle frees the lowest index first
    target.clear_breakpoint(addr(0x9008)).unwrap();
    let wp = target
        .set_watchpoint(5, tid(10), "e", WatchType::WRITE, None)
        .unwrap();
    assert_eq!(target.breakpoint_at(wp).unwrap().hw_index, 1);
}

#[test]
fn test_stack_resize_adjusts_watchpoint() {
    let (mut target, env) = watch_env();
    env.expl.set_var("local", scalar(0x7800, 8, "int"));
    let wp = target
        .set_watchpoint(1, tid(10), "local", WatchType::WRITE, None)
        .unwrap();

    // the runtime moved the stack: old top 0x8000, new top 0x18000
    let state = target.check_condition(tid(10), addr(0xc000));
    assert!(state.active);
    let moved = target.guarded_watchpoints_at(addr(0xc000), BreakletKind::StackResize);
    assert_eq!(moved, vec![wp]);

    let new_wp = target.adjust_stack_watchpoint(wp, 0x18000).unwrap();
    // the offset from the stack top is preserved
    assert_eq!(new_wp, addr(0x17800));
    assert!(target.breakpoint_at(wp).is_none());
    let brkpt = target.breakpoint_at(new_wp).unwrap();
    assert_eq!(brkpt.watch_expr.as_deref(), Some("local"));
    assert_eq!(env.proc.0.borrow().hw_slots.get(&0), Some(&0x17800));

    // the sentinels now guard the moved watchpoint
    assert_eq!(
        target.guarded_watchpoints_at(addr(0xc000), BreakletKind::StackResize),
        vec![new_wp]
    );
    assert_eq!(
        target.guarded_watchpoints_at(addr(0x4040), BreakletKind::WatchOutOfScope),
        vec![new_wp]
    );
}

#[test]
fn test_configured_slot_limit() {
    let env = crate::common::TestEnv {
        proc: crate::common::FakeProcess::default(),
        info: crate::common::FakeDebugInfo::default(),
        expl: crate::common::FakeExploration::default(),
    };
    let mut target = taskstalker::debugger::Target::with_config(
        Box::new(env.proc.clone()),
        Box::new(env.info.clone()),
        Box::new(env.expl.clone()),
        taskstalker::debugger::TargetConfig { hw_debug_slots: 1 },
    );
    env.expl.set_routine(10, routine(1, 0x7000, 0x8000));
    env.expl.set_var("a", scalar(0x9000, 8, "uint64"));
    env.expl.set_var("b", scalar(0x9008, 8, "uint64"));

    target
        .set_watchpoint(1, tid(10), "a", WatchType::WRITE, None)
        .unwrap();
    let err = target
        .set_watchpoint(2, tid(10), "b", WatchType::WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::WatchpointLimitReached));
}

#[test]
fn test_stack_watch_without_return_site() {
    let (mut target, env) = watch_env();
    // the unwinder sees no frames for the stopped thread
    env.expl.set_frames(10, vec![]);
    env.expl.set_var("local", scalar(0x7800, 8, "int"));

    let err = target
        .set_watchpoint(1, tid(10), "local", WatchType::WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::UnknownScope));
}

#[test]
fn test_breaklet_exposes_guarded_watchpoint() {
    let (mut target, env) = watch_env();
    env.expl.set_var("local", scalar(0x7800, 8, "int"));
    let wp = target
        .set_watchpoint(1, tid(10), "local", WatchType::WRITE, None)
        .unwrap();

    let sentinel = target.breakpoint_at(addr(0x4040)).unwrap();
    let guarded: Vec<_> = sentinel
        .breaklets()
        .filter_map(|breaklet| breaklet.guarded_watchpoint())
        .collect();
    assert_eq!(guarded, vec![wp]);
}

#[test]
fn test_hw_unsupported_backend() {
    let (mut target, env) = watch_env();
    env.proc.0.borrow_mut().hw_unsupported = true;
    env.expl.set_var("global", scalar(0x9000, 8, "uint64"));

    let err = target
        .set_watchpoint(1, tid(10), "global", WatchType::WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::HwBreakpointUnsupported));
    assert_eq!(target.breakpoints().all().count(), 0);
    assert!(target.logical_breakpoint(1).is_none());
}

#[test]
fn test_watch_missing_symbol() {
    let (mut target, _env) = watch_env();
    let err = target
        .set_watchpoint(1, tid(10), "nosuch", WatchType::WRITE, None)
        .unwrap_err();
    assert!(matches!(err, Error::Expression(_)));
}
