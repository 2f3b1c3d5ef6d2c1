use crate::common::{addr, frame, routine, target, tid};
use taskstalker::debugger::cond;
use taskstalker::debugger::debugee::{Value, Variable};
use taskstalker::debugger::ret::RETURN_VALUE_READ_ERROR;

fn return_locals() -> Vec<Variable> {
    vec![
        Variable {
            name: "result".to_string(),
            value: Value::int_val(42),
            return_argument: true,
        },
        Variable {
            name: "err".to_string(),
            value: Value::int_val(0),
            return_argument: true,
        },
        Variable {
            name: "scratch".to_string(),
            value: Value::int_val(7),
            return_argument: false,
        },
    ]
}

#[test]
fn test_collect_return_values() {
    let (mut target, env) = target();
    env.expl.set_routine(10, routine(1, 0x7000, 0x8000));
    env.expl.set_var("__ret_frame", Value::bool_val(true));
    env.expl.0.borrow_mut().entry_locals = return_locals();

    // "next" to a return point plants a breakpoint and attaches a capture
    // descriptor built from the returning frame
    target.set_next_breakpoint(addr(0x4040), None).unwrap();
    let topframe = frame(Some("main.compute"), Some(0x4040), 32);
    target
        .configure_return_breakpoint(addr(0x4040), &topframe, cond::parse("__ret_frame").unwrap())
        .unwrap();

    let captured = target.collect_return_values(tid(10), addr(0x4040));
    let names: Vec<&str> = captured.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["result", "err"]);
}

#[test]
fn test_collect_skips_foreign_stops() {
    let (mut target, env) = target();
    env.expl.set_routine(10, routine(1, 0x7000, 0x8000));
    // the breakpoint was hit, but not as a return breakpoint
    env.expl.set_var("__ret_frame", Value::bool_val(false));
    env.expl.0.borrow_mut().entry_locals = return_locals();

    target.set_next_breakpoint(addr(0x4040), None).unwrap();
    let topframe = frame(Some("main.compute"), Some(0x4040), 32);
    target
        .configure_return_breakpoint(addr(0x4040), &topframe, cond::parse("__ret_frame").unwrap())
        .unwrap();

    assert!(target.collect_return_values(tid(10), addr(0x4040)).is_empty());

    // an unevaluable return condition was already reported during the
    // normal condition check, collection swallows it
    env.expl.0.borrow_mut().vars.remove("__ret_frame");
    assert!(target.collect_return_values(tid(10), addr(0x4040)).is_empty());
}

#[test]
fn test_collect_without_descriptor() {
    let (mut target, _env) = target();
    target.set_next_breakpoint(addr(0x4040), None).unwrap();
    assert!(target.collect_return_values(tid(10), addr(0x4040)).is_empty());
}

#[test]
fn test_collect_entry_scope_failure() {
    let (mut target, env) = target();
    env.expl.set_routine(10, routine(1, 0x7000, 0x8000));
    env.expl.set_var("__ret_frame", Value::bool_val(true));
    env.expl.0.borrow_mut().fail_entry_scope = true;

    target.set_next_breakpoint(addr(0x4040), None).unwrap();
    let topframe = frame(Some("main.compute"), Some(0x4040), 32);
    target
        .configure_return_breakpoint(addr(0x4040), &topframe, cond::parse("__ret_frame").unwrap())
        .unwrap();

    let captured = target.collect_return_values(tid(10), addr(0x4040));
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].name, RETURN_VALUE_READ_ERROR);
}

#[test]
fn test_collect_without_routine() {
    let (mut target, env) = target();
    env.expl.set_var("__ret_frame", Value::bool_val(true));

    target.set_next_breakpoint(addr(0x4040), None).unwrap();
    let topframe = frame(Some("main.compute"), Some(0x4040), 32);
    target
        .configure_return_breakpoint(addr(0x4040), &topframe, cond::parse("__ret_frame").unwrap())
        .unwrap();

    // no routine is known for the stopped thread
    let captured = target.collect_return_values(tid(10), addr(0x4040));
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].name, RETURN_VALUE_READ_ERROR);
}

#[test]
fn test_frame_without_function_is_skipped() {
    let (mut target, _env) = target();
    target.set_next_breakpoint(addr(0x4040), None).unwrap();
    let topframe = frame(None, Some(0x4040), 32);
    target
        .configure_return_breakpoint(addr(0x4040), &topframe, cond::parse("__ret_frame").unwrap())
        .unwrap();
    // no descriptor was attached
    assert!(target.collect_return_values(tid(10), addr(0x4040)).is_empty());
}
