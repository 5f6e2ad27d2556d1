//! Class creation, method resolution order, `super()` and argument binding,
//! driven through compiled programs.

use pretty_assertions::assert_eq;
use pyrite::{
    ErrorCode, ExcType, Interpreter, Value,
    bytecode::{
        ArgumentKind, BinaryOperator, FunctionBuilder, FunctionType, ModuleBuilder, Opcode, Operand, Program,
    },
};

fn program(module: ModuleBuilder) -> Program {
    let mut program = Program::new();
    program.add_module(module.build());
    program
}

fn run(module: ModuleBuilder) -> Interpreter {
    let mut interpreter = Interpreter::new(program(module));
    interpreter.run_module("main").unwrap();
    interpreter
}

fn global(interpreter: &Interpreter, name: &str) -> Option<Value> {
    interpreter.global_scope().unwrap().get_local(name)
}

/// A class body assigning each `(name, text)` pair as a string attribute.
fn class_body(module: &mut ModuleBuilder, name: &str, attrs: &[(&str, &str)]) -> u32 {
    let mut body = FunctionBuilder::new(name, FunctionType::ClassDef);
    for (attr, text) in attrs {
        let value = body.load_str(module, text);
        body.assign_name(module, attr, value);
    }
    module.add_function(body.finish())
}

fn define_class(main: &mut FunctionBuilder, module: &mut ModuleBuilder, name: &str, parents: &[&str], attrs: &[(&str, &str)]) {
    let body = class_body(module, name, attrs);
    let parents: Vec<u32> = parents.iter().map(|parent| main.load_name(module, parent)).collect();
    let class = main.make_class(module, body, name, &parents);
    main.assign_name(module, name, class);
}

fn mro_names(value: &Value) -> Vec<String> {
    let Value::Class(class) = value else {
        panic!("expected a class, found {value:?}");
    };
    class
        .mro()
        .unwrap()
        .iter()
        .map(|class| class.name().to_owned())
        .collect()
}

#[test]
fn diamond_resolution_order() {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    define_class(&mut main, &mut module, "O", &[], &[("tag", "O")]);
    define_class(&mut main, &mut module, "A", &["O"], &[("tag", "A")]);
    define_class(&mut main, &mut module, "B", &["O"], &[("tag", "B"), ("only_b", "b")]);
    define_class(&mut main, &mut module, "C", &["A", "B"], &[]);
    let class = main.load_name(&mut module, "C");
    let instance = main.call(class, &[]);
    let tag = main.get_attr(&mut module, instance, "tag");
    main.assign_name(&mut module, "tag", tag);
    let only_b = main.get_attr(&mut module, instance, "only_b");
    main.assign_name(&mut module, "only_b", only_b);
    module.add_function(main.finish());

    let interpreter = run(module);
    assert!(interpreter.unhandled_exception().is_none());
    let class = global(&interpreter, "C").unwrap();
    assert_eq!(mro_names(&class), vec!["C", "A", "B", "O"]);
    assert_eq!(global(&interpreter, "tag"), Some(Value::str("A")));
    assert_eq!(global(&interpreter, "only_b"), Some(Value::str("b")));
}

#[test]
fn inconsistent_hierarchy_is_rejected() {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    define_class(&mut main, &mut module, "X", &[], &[]);
    define_class(&mut main, &mut module, "Y", &[], &[]);
    define_class(&mut main, &mut module, "A", &["X", "Y"], &[]);
    define_class(&mut main, &mut module, "B", &["Y", "X"], &[]);
    define_class(&mut main, &mut module, "C", &["A", "B"], &[]);
    module.add_function(main.finish());

    let interpreter = run(module);
    let exception = interpreter.unhandled_exception().unwrap();
    assert_eq!(exception.exc_type(), ExcType::TypeError);
    assert_eq!(exception.code(), ErrorCode::MroConflict);
    assert!(global(&interpreter, "B").is_some());
    assert!(global(&interpreter, "C").is_none());
}

#[test]
fn zero_argument_super_continues_after_the_defining_class() {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);

    // class Base: def greet(self): return "base"
    let mut greet_base = FunctionBuilder::new("greet", FunctionType::ClassMember);
    greet_base.argument(&mut module, "self", ArgumentKind::Positional, None);
    let text = greet_base.load_str(&mut module, "base");
    greet_base.ret(Some(text));
    let greet_base = module.add_function(greet_base.finish());
    let mut base_body = FunctionBuilder::new("Base", FunctionType::ClassDef);
    let method = base_body.make_function(greet_base);
    base_body.assign_name(&mut module, "greet", method);
    let base_body = module.add_function(base_body.finish());

    // class Child(Base): def greet(self): return super().greet() + "+child"
    let mut greet_child = FunctionBuilder::new("greet", FunctionType::ClassMember);
    greet_child.argument(&mut module, "self", ArgumentKind::Positional, None);
    let super_fn = greet_child.load_name(&mut module, "super");
    let proxy = greet_child.call(super_fn, &[]);
    let parent_greet = greet_child.get_attr(&mut module, proxy, "greet");
    let parent_text = greet_child.call(parent_greet, &[]);
    let suffix = greet_child.load_str(&mut module, "+child");
    let joined = greet_child.binary(BinaryOperator::Add, parent_text, suffix);
    greet_child.ret(Some(joined));
    let greet_child = module.add_function(greet_child.finish());
    let mut child_body = FunctionBuilder::new("Child", FunctionType::ClassDef);
    let method = child_body.make_function(greet_child);
    child_body.assign_name(&mut module, "greet", method);
    let child_body = module.add_function(child_body.finish());

    let base = main.make_class(&mut module, base_body, "Base", &[]);
    main.assign_name(&mut module, "Base", base);
    let child = main.make_class(&mut module, child_body, "Child", &[base]);
    let instance = main.call(child, &[]);
    let greet = main.get_attr(&mut module, instance, "greet");
    let result = main.call(greet, &[]);
    main.assign_name(&mut module, "result", result);
    module.add_function(main.finish());

    let interpreter = run(module);
    assert!(interpreter.unhandled_exception().is_none());
    assert_eq!(global(&interpreter, "result"), Some(Value::str("base+child")));
}

#[test]
fn init_receives_arguments() {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);

    // def __init__(self, x): self.x = x
    let mut init = FunctionBuilder::new("__init__", FunctionType::ClassMember);
    init.argument(&mut module, "self", ArgumentKind::Positional, None);
    init.argument(&mut module, "x", ArgumentKind::Positional, None);
    let receiver = init.load_name(&mut module, "self");
    let x = init.load_name(&mut module, "x");
    init.set_attr(&mut module, receiver, "x", x);
    let init = module.add_function(init.finish());
    let mut body = FunctionBuilder::new("Point", FunctionType::ClassDef);
    let method = body.make_function(init);
    body.assign_name(&mut module, "__init__", method);
    let body = module.add_function(body.finish());

    let class = main.make_class(&mut module, body, "Point", &[]);
    let seven = main.load_int(&mut module, 7);
    let point = main.call(class, &[seven]);
    let x = main.get_attr(&mut module, point, "x");
    main.assign_name(&mut module, "x", x);
    module.add_function(main.finish());

    let interpreter = run(module);
    assert!(interpreter.unhandled_exception().is_none());
    assert_eq!(global(&interpreter, "x"), Some(Value::Int(7)));
}

/// Builds `def f(a, b=1, *args, **kwargs): return (a, b, len(args), kwargs["extra"])`
/// and a main body that calls it through `call`.
fn binding_module(call: impl FnOnce(&mut FunctionBuilder, &mut ModuleBuilder, u32)) -> ModuleBuilder {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    let default_b = main.load_int(&mut module, 1);

    let mut f = FunctionBuilder::new("f", FunctionType::Plain);
    f.argument(&mut module, "a", ArgumentKind::Positional, None);
    f.argument(&mut module, "b", ArgumentKind::Positional, Some(default_b));
    f.argument(&mut module, "args", ArgumentKind::ArbitraryArguments, None);
    f.argument(&mut module, "kwargs", ArgumentKind::KeywordArguments, None);
    let a = f.load_name(&mut module, "a");
    let b = f.load_name(&mut module, "b");
    let len = f.load_name(&mut module, "len");
    let args = f.load_name(&mut module, "args");
    let arg_count = f.call(len, &[args]);
    let kwargs = f.load_name(&mut module, "kwargs");
    let key = f.load_str(&mut module, "extra");
    let extra = f.register();
    f.emit(Opcode::GetItem, &[extra.into(), kwargs.into(), key.into()]);
    let result = f.build_tuple(&[a, b, arg_count, extra]);
    f.ret(Some(result));
    let f = module.add_function(f.finish());

    let function = main.make_function(f);
    call(&mut main, &mut module, function);
    module.add_function(main.finish());
    module
}

#[test]
fn named_arguments_fill_parameters_and_the_collector() {
    let module = binding_module(|main, module, function| {
        let ten = main.load_int(module, 10);
        let two = main.load_int(module, 2);
        let three = main.load_int(module, 3);
        let b = module.identifier("b");
        let extra = module.identifier("extra");
        let result = main.register();
        main.call_into(Some(result), function, &[ten], &[(b, two), (extra, three)]);
        main.assign_name(module, "result", result);
    });

    let interpreter = run(module);
    assert!(interpreter.unhandled_exception().is_none());
    assert_eq!(
        global(&interpreter, "result"),
        Some(Value::tuple(vec![Value::Int(10), Value::Int(2), Value::Int(0), Value::Int(3)]))
    );
}

#[test]
fn a_parameter_bound_twice_is_an_error() {
    let module = binding_module(|main, module, function| {
        let one = main.load_int(module, 1);
        let two = main.load_int(module, 2);
        let three = main.load_int(module, 3);
        let b = module.identifier("b");
        let result = main.register();
        main.call_into(Some(result), function, &[one, two], &[(b, three)]);
        main.assign_name(module, "result", result);
    });

    let interpreter = run(module);
    let exception = interpreter.unhandled_exception().unwrap();
    assert_eq!(exception.exc_type(), ExcType::TypeError);
    assert_eq!(exception.code(), ErrorCode::DuplicateArgument);
    assert!(global(&interpreter, "result").is_none());
}

#[test]
fn spread_arguments_land_in_varargs() {
    let module = binding_module(|main, module, function| {
        let items: Vec<u32> = [1, 2, 3, 4].into_iter().map(|n| main.load_int(module, n)).collect();
        let list = main.build_list(&items);
        let three = main.load_int(module, 3);
        main.emit(Opcode::PushArg, &[list.into(), Operand::Raw(1)]);
        let extra = module.identifier("extra");
        main.emit(Opcode::PushNamedArg, &[extra.into(), three.into()]);
        let result = main.register();
        main.emit(Opcode::Call, &[result.into(), function.into()]);
        main.assign_name(module, "result", result);
    });

    let interpreter = run(module);
    assert!(interpreter.unhandled_exception().is_none());
    assert_eq!(
        global(&interpreter, "result"),
        Some(Value::tuple(vec![Value::Int(1), Value::Int(2), Value::Int(2), Value::Int(3)]))
    );
}
