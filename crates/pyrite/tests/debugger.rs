//! Stepping, breakpoints, pause/resume, stop and forced returns.

use std::{cell::RefCell, rc::Rc};

use pretty_assertions::assert_eq;
use pyrite::{
    Breakpoint, Completion, EngineError, Interpreter, RecordingTracer, TraceEvent, Value,
    bytecode::{FunctionBuilder, FunctionType, ModuleBuilder, Program},
};

fn interpreter(module: ModuleBuilder) -> Interpreter {
    let mut program = Program::new();
    program.add_module(module.build());
    Interpreter::new(program)
}

/// `a = 10` on row 0, `b = 20` on row 1.
fn two_statements() -> ModuleBuilder {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    main.set_row(0);
    let ten = main.load_int(&mut module, 10);
    main.assign_name(&mut module, "a", ten);
    main.set_row(1);
    let twenty = main.load_int(&mut module, 20);
    main.assign_name(&mut module, "b", twenty);
    module.add_function(main.finish());
    module
}

/// ```text
/// 0: def f():
/// 10:    print("in f")
/// 11:    return 5
/// 1: r = f()
/// 2: print(r)
/// ```
fn call_program() -> ModuleBuilder {
    let mut module = ModuleBuilder::new("main");
    let mut f = FunctionBuilder::new("f", FunctionType::Plain);
    f.set_row(10);
    let text = f.load_str(&mut module, "in f");
    f.call_name(&mut module, "print", &[text]);
    f.set_row(11);
    let five = f.load_int(&mut module, 5);
    f.ret(Some(five));
    let f = module.add_function(f.finish());

    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    main.set_row(0);
    let function = main.make_function(f);
    main.assign_name(&mut module, "f", function);
    main.set_row(1);
    let callee = main.load_name(&mut module, "f");
    let result = main.call(callee, &[]);
    main.assign_name(&mut module, "r", result);
    main.set_row(2);
    let r = main.load_name(&mut module, "r");
    main.call_name(&mut module, "print", &[r]);
    module.add_function(main.finish());
    module
}

fn started(module: ModuleBuilder) -> Interpreter {
    let mut interpreter = interpreter(module);
    interpreter.start_call_module("main", |_| {}).unwrap();
    interpreter
}

fn row(interpreter: &Interpreter) -> u32 {
    interpreter.position().unwrap().row
}

#[test]
fn stepping_over_advances_one_statement() {
    let mut interpreter = started(two_statements());
    assert_eq!(row(&interpreter), 0);
    interpreter.debug_over().unwrap();
    assert_eq!(row(&interpreter), 1);
    assert!(interpreter.is_paused());
    let scope = interpreter.global_scope().unwrap();
    assert_eq!(scope.get_local("a"), Some(Value::Int(10)));
    assert_eq!(scope.get_local("b"), None);
}

#[test]
fn breakpoint_stops_a_run() {
    let mut interpreter = interpreter(two_statements());
    interpreter.update_breakpoints(vec![Breakpoint::new("main", 1)]);
    interpreter.start_call_module("main", |_| {}).unwrap();
    interpreter.run().unwrap();
    assert!(interpreter.is_paused());
    assert!(!interpreter.is_finished());
    assert_eq!(row(&interpreter), 1);
    assert!(interpreter.unhandled_exception().is_none());

    interpreter.resume().unwrap();
    assert!(interpreter.is_finished());
    assert_eq!(
        interpreter.global_scope().unwrap().get_local("b"),
        Some(Value::Int(20))
    );
}

#[test]
fn step_into_and_out_of_a_call() {
    let mut interpreter = started(call_program());
    interpreter.debug_over().unwrap();
    assert_eq!(row(&interpreter), 1);

    interpreter.debug_in().unwrap();
    let position = interpreter.position().unwrap();
    assert_eq!((position.function.as_str(), position.row), ("f", 10));
    let stack = interpreter.stack_entries();
    let functions: Vec<_> = stack.iter().map(|entry| entry.function.as_str()).collect();
    assert_eq!(functions, vec!["f", "<module>"]);
    assert_eq!(stack[1].row, 1);
    assert_eq!(interpreter.current_scope().unwrap().name(), "f");

    interpreter.debug_out().unwrap();
    let position = interpreter.position().unwrap();
    assert_eq!((position.function.as_str(), position.row), ("<module>", 2));
    assert_eq!(interpreter.output(), vec!["in f"]);
}

#[test]
fn stepping_over_a_call_stays_in_the_caller() {
    let mut interpreter = started(call_program());
    interpreter.debug_over().unwrap();
    interpreter.debug_over().unwrap();
    let position = interpreter.position().unwrap();
    assert_eq!((position.function.as_str(), position.row), ("<module>", 2));
    assert_eq!(interpreter.output(), vec!["in f"]);
}

#[test]
fn statement_steps_enter_calls() {
    let mut interpreter = started(call_program());
    interpreter.debug().unwrap();
    interpreter.debug().unwrap();
    assert_eq!(interpreter.position().unwrap().function, "f");
}

#[test]
fn force_return_skips_the_rest_of_the_function() {
    let mut interpreter = started(call_program());
    interpreter.debug_over().unwrap();
    interpreter.debug_in().unwrap();
    assert_eq!(interpreter.position().unwrap().function, "f");
    interpreter.force_return(Value::Int(99)).unwrap();
    interpreter.run().unwrap();
    assert!(interpreter.is_finished());
    assert_eq!(interpreter.output(), vec!["99"]);
}

#[test]
fn stop_reports_to_the_host_callback() {
    let mut interpreter = interpreter(call_program());
    let outcome = Rc::new(RefCell::new(None));
    let slot = outcome.clone();
    interpreter
        .start_call_module("main", move |completion| *slot.borrow_mut() = Some(completion))
        .unwrap();
    interpreter.debug_over().unwrap();
    interpreter.stop().unwrap();
    assert!(interpreter.is_finished());
    assert!(matches!(*outcome.borrow(), Some(Completion::Stopped)));
    assert_eq!(interpreter.stop(), Err(EngineError::NotRunning));
    assert!(interpreter.output().is_empty());
}

#[test]
fn pause_while_idle_in_a_run_takes_effect_immediately() {
    let mut interpreter = started(two_statements());
    interpreter.pause().unwrap();
    assert!(interpreter.is_paused());
    interpreter.run().unwrap();
    assert!(interpreter.is_finished());
    assert!(!interpreter.is_paused());
}

#[test]
fn single_steps_execute_one_instruction() {
    let mut interpreter = started(two_statements());
    let mut steps = 0;
    while interpreter.step().unwrap() {
        steps += 1;
    }
    // the step past the last instruction completes the module instead
    assert_eq!(steps, 6);
    assert!(interpreter.is_finished());
}

#[test]
fn tracer_sees_pauses_and_instructions() {
    let tracer = RecordingTracer::new();
    let mut interpreter = interpreter(two_statements());
    interpreter.set_tracer(tracer.clone());
    interpreter.update_breakpoints(vec![Breakpoint::new("main", 1)]);
    interpreter.run_module("main").unwrap();
    interpreter.run().unwrap();

    let events = tracer.events();
    assert_eq!(tracer.event_count(), events.len());
    assert!(
        events
            .iter()
            .any(|event| matches!(event, TraceEvent::Pause { row: Some(1), .. }))
    );
    let instructions = events
        .iter()
        .filter(|event| matches!(event, TraceEvent::Instruction { .. }))
        .count();
    assert_eq!(instructions, 6);
}
