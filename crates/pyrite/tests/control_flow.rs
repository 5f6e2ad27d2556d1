//! `try`/`except`/`finally`, loops, generators and slice assignment.

use pretty_assertions::assert_eq;
use pyrite::{
    ErrorCode, ExcType, Interpreter, Value,
    bytecode::{FunctionBuilder, FunctionType, LoopKind, ModuleBuilder, Opcode, Program},
};

fn run(module: ModuleBuilder) -> Interpreter {
    let mut program = Program::new();
    program.add_module(module.build());
    let mut interpreter = Interpreter::new(program);
    interpreter.run_module("main").unwrap();
    interpreter
}

fn print(body: &mut FunctionBuilder, module: &mut ModuleBuilder, text: &str) {
    let value = body.load_str(module, text);
    body.call_name(module, "print", &[value]);
}

fn raise_new(body: &mut FunctionBuilder, module: &mut ModuleBuilder, class: &str) {
    let class = body.load_name(module, class);
    let exception = body.call(class, &[]);
    body.raise(Some(exception));
}

#[test]
fn finally_runs_once_before_the_outer_handler() {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);

    let outer_handlers = main.new_label();
    let outer_handlers_end = main.new_label();
    let outer_handler_body = main.new_label();
    let outer_end = main.new_label();
    main.try_begin(outer_handlers, outer_handlers_end, None, outer_end);
    {
        let inner_handlers = main.new_label();
        let finally = main.new_label();
        let inner_end = main.new_label();
        main.try_begin(inner_handlers, inner_handlers, Some(finally), inner_end);
        raise_new(&mut main, &mut module, "ValueError");
        main.emit(Opcode::TryEnd, &[]);
        main.bind(inner_handlers);
        main.bind(finally);
        print(&mut main, &mut module, "finally");
        main.emit(Opcode::FinallyEnd, &[]);
        main.bind(inner_end);
    }
    main.emit(Opcode::TryEnd, &[]);
    main.bind(outer_handlers);
    main.except_handler(&mut module, Some("LookupError"), outer_handler_body, None);
    main.except_handler(&mut module, Some("ValueError"), outer_handler_body, Some("error"));
    main.bind(outer_handlers_end);
    main.bind(outer_handler_body);
    print(&mut main, &mut module, "caught");
    main.emit(Opcode::ExceptEnd, &[]);
    main.bind(outer_end);
    print(&mut main, &mut module, "after");
    module.add_function(main.finish());

    let interpreter = run(module);
    assert!(interpreter.unhandled_exception().is_none());
    assert_eq!(interpreter.output(), vec!["finally", "caught", "after"]);
    // the handler variable is unbound once the clause finishes
    assert!(interpreter.global_scope().unwrap().get_local("error").is_none());
}

#[test]
fn none_is_falsy_in_conditional_jumps() {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    let none = main.load_none(&mut module);
    let truthy = main.new_label();
    let end = main.new_label();
    main.jump_if_true(none, truthy);
    print(&mut main, &mut module, "falsy");
    main.jump(end);
    main.bind(truthy);
    print(&mut main, &mut module, "truthy");
    main.bind(end);
    module.add_function(main.finish());

    let interpreter = run(module);
    assert_eq!(interpreter.output(), vec!["falsy"]);
}

#[test]
fn break_inside_try_runs_finally_first() {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);

    let loop_exit = main.new_label();
    let loop_end = main.new_label();
    main.loop_begin(LoopKind::While, loop_end, None);
    let handlers = main.new_label();
    let finally = main.new_label();
    let try_end = main.new_label();
    main.try_begin(handlers, handlers, Some(finally), try_end);
    print(&mut main, &mut module, "body");
    main.emit(Opcode::Break, &[]);
    main.emit(Opcode::TryEnd, &[]);
    main.bind(handlers);
    main.bind(finally);
    print(&mut main, &mut module, "finally");
    main.emit(Opcode::FinallyEnd, &[]);
    main.bind(try_end);
    main.emit(Opcode::Continue, &[]);
    main.bind(loop_exit);
    main.emit(Opcode::LoopEnd, &[]);
    main.bind(loop_end);
    print(&mut main, &mut module, "after");
    module.add_function(main.finish());

    let interpreter = run(module);
    assert!(interpreter.unhandled_exception().is_none());
    assert_eq!(interpreter.output(), vec!["body", "finally", "after"]);
}

#[test]
fn bare_raise_reraises_the_handled_exception() {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    let handlers = main.new_label();
    let handlers_end = main.new_label();
    let handler_body = main.new_label();
    let end = main.new_label();
    main.try_begin(handlers, handlers_end, None, end);
    raise_new(&mut main, &mut module, "KeyError");
    main.emit(Opcode::TryEnd, &[]);
    main.bind(handlers);
    main.except_handler(&mut module, None, handler_body, None);
    main.bind(handlers_end);
    main.bind(handler_body);
    print(&mut main, &mut module, "handler");
    main.raise(None);
    main.emit(Opcode::ExceptEnd, &[]);
    main.bind(end);
    print(&mut main, &mut module, "unreachable");
    module.add_function(main.finish());

    let interpreter = run(module);
    let exception = interpreter.unhandled_exception().unwrap();
    assert_eq!(exception.exc_type(), ExcType::KeyError);
    assert_eq!(interpreter.output(), vec!["handler"]);
}

#[test]
fn bare_raise_without_an_active_exception_fails() {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    main.raise(None);
    module.add_function(main.finish());

    let interpreter = run(module);
    let exception = interpreter.unhandled_exception().unwrap();
    assert_eq!(exception.exc_type(), ExcType::RuntimeError);
    assert_eq!(exception.code(), ErrorCode::NoActiveException);
}

#[test]
fn unhandled_exception_keeps_earlier_output() {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    print(&mut main, &mut module, "before");
    let class = main.load_name(&mut module, "ValueError");
    let message = main.load_str(&mut module, "bad value");
    let exception = main.call(class, &[message]);
    main.raise(Some(exception));
    print(&mut main, &mut module, "after");
    module.add_function(main.finish());

    let interpreter = run(module);
    assert!(interpreter.is_finished());
    let exception = interpreter.unhandled_exception().unwrap();
    assert_eq!(exception.to_string(), "ValueError: bad value");
    assert_eq!(interpreter.output(), vec!["before"]);
}

/// `def gen(): yield 1; yield 2`, consumed by a `for` loop with an `else` clause.
#[test]
fn generator_drives_a_for_loop() {
    let mut module = ModuleBuilder::new("main");
    let mut gen_body = FunctionBuilder::new("gen", FunctionType::Plain);
    let one = gen_body.load_int(&mut module, 1);
    gen_body.yield_value(None, Some(one));
    let two = gen_body.load_int(&mut module, 2);
    gen_body.yield_value(None, Some(two));
    let gen_index = module.add_function(gen_body.finish());

    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    let function = main.make_function(gen_index);
    let generator = main.call(function, &[]);
    let iterator = main.register();
    main.emit(Opcode::GetIter, &[iterator.into(), generator.into()]);
    let no_break = main.new_label();
    let end = main.new_label();
    main.loop_begin(LoopKind::For, end, Some(no_break));
    let item = main.register();
    main.emit(Opcode::ForNext, &[item.into(), iterator.into()]);
    main.call_name(&mut module, "print", &[item]);
    main.emit(Opcode::Continue, &[]);
    main.bind(no_break);
    print(&mut main, &mut module, "exhausted");
    main.bind(end);
    print(&mut main, &mut module, "done");
    module.add_function(main.finish());

    let interpreter = run(module);
    assert!(interpreter.unhandled_exception().is_none());
    assert_eq!(interpreter.output(), vec!["1", "2", "exhausted", "done"]);
}

#[test]
fn exhausted_generator_raises_stop_iteration() {
    let mut module = ModuleBuilder::new("main");
    let mut gen_body = FunctionBuilder::new("gen", FunctionType::Plain);
    let one = gen_body.load_int(&mut module, 1);
    gen_body.yield_value(None, Some(one));
    let gen_index = module.add_function(gen_body.finish());

    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    let function = main.make_function(gen_index);
    let generator = main.call(function, &[]);
    let next = main.load_name(&mut module, "next");
    let first = main.call(next, &[generator]);
    main.assign_name(&mut module, "first", first);
    main.call_into(None, next, &[generator], &[]);
    module.add_function(main.finish());

    let interpreter = run(module);
    assert_eq!(
        interpreter.global_scope().unwrap().get_local("first"),
        Some(Value::Int(1))
    );
    assert_eq!(interpreter.unhandled_exception().unwrap().exc_type(), ExcType::StopIteration);
}

fn int_list(body: &mut FunctionBuilder, module: &mut ModuleBuilder, items: &[i64]) -> u32 {
    let registers: Vec<u32> = items.iter().map(|item| body.load_int(module, *item)).collect();
    body.build_list(&registers)
}

#[test]
fn slice_assignment_replaces_elements_positionally() {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    let list = int_list(&mut main, &mut module, &[1, 2, 3, 4]);
    main.assign_name(&mut module, "xs", list);
    let replacement = int_list(&mut main, &mut module, &[7, 8, 9]);
    let from = main.load_int(&mut module, 0);
    let to = main.load_int(&mut module, 3);
    let reference = main.register();
    main.emit(
        Opcode::RefRange,
        &[reference.into(), list.into(), from.into(), to.into(), None::<u32>.into()],
    );
    main.emit(Opcode::Assign, &[reference.into(), replacement.into()]);
    module.add_function(main.finish());

    let interpreter = run(module);
    assert!(interpreter.unhandled_exception().is_none());
    assert_eq!(
        interpreter.global_scope().unwrap().get_local("xs"),
        Some(Value::list(vec![Value::Int(7), Value::Int(8), Value::Int(9), Value::Int(4)]))
    );
}

#[test]
fn zero_slice_step_is_rejected() {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    let list = int_list(&mut main, &mut module, &[1, 2, 3]);
    let step = main.load_int(&mut module, 0);
    let reference = main.register();
    main.emit(
        Opcode::RefRange,
        &[reference.into(), list.into(), None::<u32>.into(), None::<u32>.into(), step.into()],
    );
    let value = main.register();
    main.emit(Opcode::Deref, &[value.into(), reference.into()]);
    module.add_function(main.finish());

    let interpreter = run(module);
    let exception = interpreter.unhandled_exception().unwrap();
    assert_eq!(exception.exc_type(), ExcType::ValueError);
    assert_eq!(exception.code(), ErrorCode::SliceStepZero);
}

#[test]
fn nonlocal_assignment_updates_the_enclosing_function() {
    use pyrite::Qualifier;

    let mut module = ModuleBuilder::new("main");
    // def outer(): count = 1; def inner(): nonlocal count; count = 5
    //              inner(); return count
    let mut inner = FunctionBuilder::new("inner", FunctionType::Plain);
    let five = inner.load_int(&mut module, 5);
    inner.assign_name_qualified(&mut module, "count", Qualifier::NonLocal, five);
    let inner = module.add_function(inner.finish());

    let mut outer = FunctionBuilder::new("outer", FunctionType::Plain);
    let one = outer.load_int(&mut module, 1);
    outer.assign_name(&mut module, "count", one);
    let function = outer.make_function(inner);
    outer.call_into(None, function, &[], &[]);
    let count = outer.load_name(&mut module, "count");
    outer.ret(Some(count));
    let outer = module.add_function(outer.finish());

    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    let function = main.make_function(outer);
    let result = main.call(function, &[]);
    main.assign_name(&mut module, "result", result);
    module.add_function(main.finish());

    let interpreter = run(module);
    assert!(interpreter.unhandled_exception().is_none());
    assert_eq!(
        interpreter.global_scope().unwrap().get_local("result"),
        Some(Value::Int(5))
    );
}
