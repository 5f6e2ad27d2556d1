//! The host-facing API: starting calls, imports, native modules, output,
//! input and resource limits.

use std::{cell::RefCell, rc::Rc};

use pretty_assertions::assert_eq;
use pyrite::{
    CallArgs, CallbackPrint, Completion, EngineError, ErrorCode, ExcType, Interpreter, NativeFn, NativeReturn,
    QueuedInput, ResourceLimits, RunResult, Value, Vm,
    bytecode::{
        ArgumentKind, BinaryOperator, CompareOperator, FunctionBuilder, FunctionType, LoopKind, ModuleBuilder, Opcode,
        Program,
    },
};

fn program(modules: Vec<ModuleBuilder>) -> Program {
    let mut program = Program::new();
    for module in modules {
        program.add_module(module.build());
    }
    program
}

fn global(interpreter: &Interpreter, name: &str) -> Option<Value> {
    interpreter.global_scope().unwrap().get_local(name)
}

fn print_text(body: &mut FunctionBuilder, module: &mut ModuleBuilder, text: &str) {
    let value = body.load_str(module, text);
    body.call_name(module, "print", &[value]);
}

/// `def add(x, y): return x + y` plus a module-level print.
fn library_module() -> ModuleBuilder {
    let mut module = ModuleBuilder::new("main");
    let mut add = FunctionBuilder::new("add", FunctionType::Plain);
    add.argument(&mut module, "x", ArgumentKind::Positional, None);
    add.argument(&mut module, "y", ArgumentKind::Positional, None);
    let x = add.load_name(&mut module, "x");
    let y = add.load_name(&mut module, "y");
    let sum = add.binary(BinaryOperator::Add, x, y);
    add.ret(Some(sum));
    let add = module.add_function(add.finish());

    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    let function = main.make_function(add);
    main.assign_name(&mut module, "add", function);
    print_text(&mut main, &mut module, "loaded");
    module.add_function(main.finish());
    module
}

#[test]
fn module_completion_delivers_the_module() {
    let mut interpreter = Interpreter::new(program(vec![library_module()]));
    let outcome = Rc::new(RefCell::new(None));
    let slot = outcome.clone();
    interpreter
        .start_call_module("main", move |completion| *slot.borrow_mut() = Some(completion))
        .unwrap();
    assert!(outcome.borrow().is_none());
    interpreter.run().unwrap();
    assert!(interpreter.is_finished());
    let completion = outcome.borrow_mut().take();
    let Some(Completion::Returned(Value::Module(module))) = completion else {
        panic!("expected the module value, got {completion:?}");
    };
    assert_eq!(module.name(), "main");
    assert!(interpreter.loaded_module("main").is_some());
}

#[test]
fn functions_of_loaded_modules_can_be_called() {
    let mut interpreter = Interpreter::new(program(vec![library_module()]));
    assert_eq!(
        interpreter.call_function("main", "add", vec![Value::Int(1), Value::Int(2)]).err(),
        Some(EngineError::ModuleNotLoaded("main".to_owned()))
    );
    interpreter.run_module("main").unwrap();

    let completion = interpreter
        .call_function("main", "add", vec![Value::Int(40), Value::Int(2)])
        .unwrap();
    assert!(matches!(completion, Completion::Returned(Value::Int(42))));

    let completion = interpreter.call_function("main", "add", vec![Value::Int(1)]).unwrap();
    let Completion::Raised(exception) = completion else {
        panic!("expected a missing argument error");
    };
    assert_eq!(exception.code(), ErrorCode::MissingArgument);
    assert_eq!(interpreter.unhandled_exception().unwrap().code(), ErrorCode::MissingArgument);

    assert_eq!(
        interpreter.call_function("main", "missing", vec![]).err(),
        Some(EngineError::UnknownFunction {
            module: "main".to_owned(),
            function: "missing".to_owned(),
        })
    );
}

#[test]
fn misuse_is_reported_to_the_host() {
    let mut interpreter = Interpreter::new(program(vec![library_module()]));
    assert_eq!(interpreter.run(), Err(EngineError::NotRunning));
    assert_eq!(interpreter.debug_in(), Err(EngineError::NotRunning));
    assert_eq!(
        interpreter.start_call_module("nowhere", |_| {}),
        Err(EngineError::UnknownModule("nowhere".to_owned()))
    );
    interpreter.start_call_module("main", |_| {}).unwrap();
    assert_eq!(interpreter.start_call_module("main", |_| {}), Err(EngineError::Busy));
    assert_eq!(
        interpreter.start_call_function("main", "add", vec![], |_| {}),
        Err(EngineError::Busy)
    );
    interpreter.run().unwrap();
    assert_eq!(interpreter.output(), vec!["loaded"]);
}

#[test]
fn modules_are_loaded_once() {
    let mut helper = ModuleBuilder::new("helper");
    let mut body = FunctionBuilder::new("<module>", FunctionType::Module);
    print_text(&mut body, &mut helper, "helper loaded");
    let value = body.load_int(&mut helper, 42);
    body.assign_name(&mut helper, "value", value);
    helper.add_function(body.finish());

    let mut main = ModuleBuilder::new("main");
    let mut body = FunctionBuilder::new("<module>", FunctionType::Module);
    let first = body.import(&mut main, "helper");
    body.assign_name(&mut main, "helper", first);
    let second = body.import(&mut main, "helper");
    let value = body.import_from(&mut main, second, "value");
    body.assign_name(&mut main, "value", value);
    let same = body.compare(CompareOperator::Is, first, second);
    body.assign_name(&mut main, "same", same);
    main.add_function(body.finish());

    let mut interpreter = Interpreter::new(program(vec![helper, main]));
    interpreter.run_module("main").unwrap();
    assert!(interpreter.unhandled_exception().is_none());
    assert_eq!(interpreter.output(), vec!["helper loaded"]);
    assert_eq!(global(&interpreter, "value"), Some(Value::Int(42)));
    assert_eq!(global(&interpreter, "same"), Some(Value::Bool(true)));
}

#[test]
fn circular_imports_are_detected() {
    let mut first = ModuleBuilder::new("first");
    let mut body = FunctionBuilder::new("<module>", FunctionType::Module);
    body.import(&mut first, "second");
    first.add_function(body.finish());

    let mut second = ModuleBuilder::new("second");
    let mut body = FunctionBuilder::new("<module>", FunctionType::Module);
    body.import(&mut second, "first");
    second.add_function(body.finish());

    let mut interpreter = Interpreter::new(program(vec![first, second]));
    interpreter.run_module("first").unwrap();
    let exception = interpreter.unhandled_exception().unwrap();
    assert_eq!(exception.exc_type(), ExcType::ImportError);
    assert_eq!(exception.code(), ErrorCode::CircularImport);
    assert!(interpreter.loaded_module("first").is_none());
}

#[test]
fn missing_modules_raise_module_not_found() {
    let mut main = ModuleBuilder::new("main");
    let mut body = FunctionBuilder::new("<module>", FunctionType::Module);
    body.import(&mut main, "nowhere");
    main.add_function(body.finish());

    let mut interpreter = Interpreter::new(program(vec![main]));
    interpreter.run_module("main").unwrap();
    let exception = interpreter.unhandled_exception().unwrap();
    assert_eq!(exception.exc_type(), ExcType::ModuleNotFoundError);
    assert!(exception.exc_type().is_subclass_of(ExcType::ImportError));
}

fn double(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let value = args.get_one_arg("double")?;
    let n = value.as_int().unwrap_or_default();
    Ok(Value::Int(n * 2).into())
}

#[test]
fn native_modules_are_importable() {
    let mut main = ModuleBuilder::new("main");
    let mut body = FunctionBuilder::new("<module>", FunctionType::Module);
    let hostmath = body.import(&mut main, "hostmath");
    let function = body.get_attr(&mut main, hostmath, "double");
    let arg = body.load_int(&mut main, 21);
    let result = body.call(function, &[arg]);
    body.assign_name(&mut main, "result", result);
    main.add_function(body.finish());

    let mut interpreter = Interpreter::new(program(vec![main]));
    interpreter.register_native_module("hostmath", vec![("double", double as NativeFn)]);
    interpreter.run_module("main").unwrap();
    assert!(interpreter.unhandled_exception().is_none());
    assert_eq!(global(&interpreter, "result"), Some(Value::Int(42)));
}

#[test]
fn print_separators_and_line_buffering() {
    let mut main = ModuleBuilder::new("main");
    let mut body = FunctionBuilder::new("<module>", FunctionType::Module);
    let print = body.load_name(&mut main, "print");
    let a = body.load_str(&mut main, "a");
    let one = body.load_int(&mut main, 1);
    let dash = body.load_str(&mut main, "-");
    let empty = body.load_str(&mut main, "");
    let sep = main.identifier("sep");
    let end = main.identifier("end");
    body.call_into(None, print, &[a, one], &[(sep, dash), (end, empty)]);
    print_text(&mut body, &mut main, "b");
    let tail = body.load_str(&mut main, "tail");
    body.call_into(None, print, &[tail], &[(end, empty)]);
    main.add_function(body.finish());

    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = lines.clone();
    let mut interpreter = Interpreter::new(program(vec![main]));
    interpreter.set_print_writer(CallbackPrint(move |line: &str| sink.borrow_mut().push(line.to_owned())));
    interpreter.run_module("main").unwrap();
    assert_eq!(interpreter.output(), vec!["a-1b", "tail"]);
    assert_eq!(interpreter.output_text(), "a-1b\ntail");
    assert_eq!(*lines.borrow(), vec!["a-1b".to_owned(), "tail".to_owned()]);
}

#[test]
fn input_reads_queued_lines() {
    let mut main = ModuleBuilder::new("main");
    let mut body = FunctionBuilder::new("<module>", FunctionType::Module);
    let input = body.load_name(&mut main, "input");
    let prompt = body.load_str(&mut main, "name? ");
    let name = body.call(input, &[prompt]);
    body.assign_name(&mut main, "name", name);
    body.call_into(None, input, &[], &[]);
    main.add_function(body.finish());

    let mut interpreter = Interpreter::new(program(vec![main]));
    interpreter.set_input_reader(QueuedInput::new(["ada"]));
    interpreter.run_module("main").unwrap();
    assert_eq!(global(&interpreter, "name"), Some(Value::str("ada")));
    assert_eq!(interpreter.unhandled_exception().unwrap().exc_type(), ExcType::EOFError);
}

#[test]
fn unbounded_recursion_hits_the_depth_limit() {
    let mut main = ModuleBuilder::new("main");
    let mut f = FunctionBuilder::new("f", FunctionType::Plain);
    let callee = f.load_name(&mut main, "f");
    let result = f.call(callee, &[]);
    f.ret(Some(result));
    let f = main.add_function(f.finish());
    let mut body = FunctionBuilder::new("<module>", FunctionType::Module);
    let function = body.make_function(f);
    body.assign_name(&mut main, "f", function);
    body.call_into(None, function, &[], &[]);
    main.add_function(body.finish());

    let limits = ResourceLimits::new().max_call_depth(50);
    let mut interpreter = Interpreter::with_limits(program(vec![main]), limits);
    interpreter.run_module("main").unwrap();
    let exception = interpreter.unhandled_exception().unwrap();
    assert_eq!(exception.exc_type(), ExcType::RecursionError);
    assert_eq!(exception.code(), ErrorCode::RecursionLimit);
    assert!(interpreter.stack_entries().is_empty());
}

/// `class C: def __len__(self): return len(self)` then `len(C())`, run on a
/// thread with a 2 MiB stack.
#[test]
fn native_reentry_is_bounded_on_a_small_stack() {
    let worker = std::thread::Builder::new()
        .stack_size(2 << 20)
        .spawn(|| {
            let mut main = ModuleBuilder::new("main");
            let mut len_method = FunctionBuilder::new("__len__", FunctionType::ClassMember);
            len_method.argument(&mut main, "self", ArgumentKind::Positional, None);
            let len = len_method.load_name(&mut main, "len");
            let receiver = len_method.load_name(&mut main, "self");
            let length = len_method.call(len, &[receiver]);
            len_method.ret(Some(length));
            let len_method = main.add_function(len_method.finish());

            let mut class_body = FunctionBuilder::new("C", FunctionType::ClassDef);
            let method = class_body.make_function(len_method);
            class_body.assign_name(&mut main, "__len__", method);
            let class_body = main.add_function(class_body.finish());

            let mut body = FunctionBuilder::new("<module>", FunctionType::Module);
            let class = body.make_class(&mut main, class_body, "C", &[]);
            let instance = body.call(class, &[]);
            body.call_name(&mut main, "len", &[instance]);
            main.add_function(body.finish());

            let mut interpreter = Interpreter::new(program(vec![main]));
            interpreter.run_module("main").unwrap();
            interpreter
                .unhandled_exception()
                .map(|exception| (exception.exc_type(), exception.code()))
        })
        .unwrap();
    assert_eq!(
        worker.join().unwrap(),
        Some((ExcType::RecursionError, ErrorCode::NestedCallLimit))
    );
}

#[test]
fn endless_loops_hit_the_instruction_limit() {
    let mut main = ModuleBuilder::new("main");
    let mut body = FunctionBuilder::new("<module>", FunctionType::Module);
    let end = body.new_label();
    body.loop_begin(LoopKind::While, end, None);
    body.emit(Opcode::Nop, &[]);
    body.emit(Opcode::Continue, &[]);
    body.emit(Opcode::LoopEnd, &[]);
    body.bind(end);
    main.add_function(body.finish());

    let limits = ResourceLimits::new().max_instructions(1_000);
    let mut interpreter = Interpreter::with_limits(program(vec![main]), limits);
    interpreter.run_module("main").unwrap();
    let exception = interpreter.unhandled_exception().unwrap();
    assert_eq!(exception.exc_type(), ExcType::TimeoutError);
    assert!(interpreter.is_finished());
}

#[test]
fn programs_round_trip_through_json() {
    let json = program(vec![library_module()]).to_json().unwrap();
    let mut interpreter = Interpreter::new(Program::from_json(&json).unwrap());
    interpreter.run_module("main").unwrap();
    assert_eq!(interpreter.output(), vec!["loaded"]);
    let names: Vec<String> = interpreter
        .global_scope()
        .unwrap()
        .variables()
        .into_iter()
        .map(|(name, _)| name.to_string())
        .collect();
    assert!(names.iter().any(|name| name == "add"));
}
